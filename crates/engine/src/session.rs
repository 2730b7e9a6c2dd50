use core::time::Duration;

use model::QuestionType;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Identity of one asked-question lifecycle. Watchdogs key their expiry
/// check on this, never on the user id alone, so a timer left over from a
/// replaced session can never resolve the current one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SessionId(pub(crate) u64);

/// One outstanding question. Created when the prompt is sent, destroyed the
/// moment it resolves by correct answer or timeout.
pub(crate) struct QuizSession {
    pub id: SessionId,
    pub question_type: QuestionType,
    /// Normalized accepted answers.
    pub answers: Box<[Box<str>]>,
    pub asked_at: Instant,
    /// Answer deadline; zero means no watchdog runs.
    pub timeout: Duration,
    /// Cancels the watchdog for this instance only.
    pub cancel: CancellationToken,
}

impl QuizSession {
    pub fn accepts(&self, normalized: &str) -> bool {
        self.answers.iter().any(|answer| answer.as_ref() == normalized)
    }

    /// Unspent part of the answer budget, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.asked_at.elapsed())
    }
}
