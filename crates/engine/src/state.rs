use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use model::ScheduleConfig;
use tokio_util::sync::CancellationToken;

use crate::external::QuestionSource;
use crate::session::QuizSession;

/// Text input parked by a settings button; the user's next reply is
/// consumed as the value instead of being treated as an answer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PendingInput {
    SourceUrl,
    Interval,
    Timeout,
    QuietWindow,
}

/// Per-user question source slot.
#[derive(Default)]
pub(crate) enum SourceSlot {
    #[default]
    Missing,
    /// A URL is on record but reconnecting it failed at load time.
    Unavailable,
    Ready(Arc<dyn QuestionSource>),
}

/// Registration of a running scheduler loop. Dropping the token from the
/// state is what stops the loop; the loop itself never blocks a restart.
pub(crate) struct ScheduleHandle {
    pub cancel: CancellationToken,
}

/// All mutable state for one user, guarded by a single async mutex so the
/// scheduler task, the reply path, and watchdog tasks never interleave
/// their updates. No lock is shared across users.
#[derive(Default)]
pub(crate) struct UserState {
    pub config: ScheduleConfig,
    pub source: SourceSlot,
    pub source_url: Option<String>,
    pub session: Option<QuizSession>,
    pub schedule: Option<ScheduleHandle>,
    /// Dispatch flag of the latest resolution; whichever of the delayed
    /// timer or a manual next-question flips it first delivers.
    pub pending_next: Option<Arc<AtomicBool>>,
    pub pending_input: Option<PendingInput>,
}
