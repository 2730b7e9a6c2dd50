use core::future::Future;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{Local, NaiveTime};
use dashmap::DashMap;
use model::{QuestionMode, QuestionType, QuietWindow, Record, UserId, question};
use store::{SettingsStore, UserSettings};
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::commands::{self, Command};
use crate::error::{Error, Result};
use crate::external::{Fetch, Keyboard, MessageGateway, SourceConnector};
use crate::session::{QuizSession, SessionId};
use crate::state::{PendingInput, ScheduleHandle, SourceSlot, UserState};

/// Fixed delay before the follow-up question when no answer budget applies.
const NEXT_DELAY: Duration = Duration::from_secs(2);
/// Poll period while a quiet window is active. Polling does not consume the
/// configured interval.
const QUIET_POLL: Duration = Duration::from_secs(60);

type Slot = Arc<Mutex<UserState>>;
type Registry = DashMap<UserId, Slot>;
/// Time-of-day reader for the quiet-window check.
type Clock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// What caused a question delivery. Automatic triggers honor the per-user
/// auto-send switch; manual ones do not.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduler,
    Resolution,
    Manual,
}

struct Internal {
    /// Sharded per-user registry; each slot serializes its own writers.
    users: Registry,
    gateway: Arc<dyn MessageGateway>,
    connector: Arc<dyn SourceConnector>,
    store: Arc<dyn SettingsStore>,
    clock: Clock,
    /// Monotonic session-instance counter.
    counter: AtomicU64,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Internal>,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn MessageGateway>,
        connector: Arc<dyn SourceConnector>,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self::with_clock(gateway, connector, store, Arc::new(|| Local::now().time()))
    }

    fn with_clock(
        gateway: Arc<dyn MessageGateway>,
        connector: Arc<dyn SourceConnector>,
        store: Arc<dyn SettingsStore>,
        clock: Clock,
    ) -> Self {
        let internal = Internal {
            users: Registry::default(),
            gateway,
            connector,
            store,
            clock,
            counter: AtomicU64::new(0),
        };
        Self { inner: Arc::new(internal) }
    }

    /// Loads persisted settings, re-establishes question sources, and
    /// resumes the schedule of every user with an interval on record. One
    /// user failing to reconnect never aborts the load for the others.
    pub async fn bootstrap(&self) -> core::result::Result<(), store::error::Error> {
        for (user, settings) in self.inner.store.load_all().await? {
            let UserSettings { config, source_url } = settings;
            let slot = self.inner.slot(user);
            let mut state = slot.lock().await;
            state.config = config;
            state.source_url = source_url;
            if let Some(url) = state.source_url.clone() {
                match self.inner.connector.connect(&url).await {
                    Ok(source) => state.source = SourceSlot::Ready(source),
                    Err(err) => {
                        log::error!("{user}: failed to reconnect question source: {err}");
                        state.source = SourceSlot::Unavailable;
                    }
                }
            }
            let resume = state.config.interval_minutes.is_some();
            drop(state);

            if resume {
                if let Err(err) = self.inner.spawn_schedule(user).await {
                    log::error!("{user}: failed to resume schedule: {err}");
                }
            }
        }
        Ok(())
    }

    /// Greets the user with the command menu.
    pub async fn show_menu(&self, user: UserId) {
        self.inner.send(user, "Hello! Pick a command below:", Some(&commands::command_keyboard())).await;
    }

    /// Routes a pressed inline button by its token.
    pub async fn on_button(&self, user: UserId, token: &str) {
        let Some(command) = Command::parse(token) else {
            log::debug!("{user}: ignoring unknown button token {token:?}");
            return;
        };
        self.inner.handle_command(user, command).await;
    }

    /// Routes an incoming text reply: pending command input first, then the
    /// live session, otherwise guidance.
    pub async fn on_reply(&self, user: UserId, text: &str) {
        let pending = {
            let slot = self.inner.slot(user);
            let mut state = slot.lock().await;
            state.pending_input.take()
        };
        match pending {
            Some(input) => self.inner.handle_input(user, input, text).await,
            None => self.inner.check_answer(user, text).await,
        }
    }
}

impl Internal {
    fn slot(&self, user: UserId) -> Slot {
        self.users.entry(user).or_default().clone()
    }

    /// Delivery failures are transient: log and carry on.
    async fn send(&self, user: UserId, text: &str, keyboard: Option<&Keyboard>) {
        if let Err(err) = self.gateway.send(user, text, keyboard).await {
            log::warn!("{user}: {err}");
        }
    }

    /// Persists the user's settings after a mutation. Persistence faults are
    /// logged; the in-memory state stays authoritative for this process.
    async fn persist(&self, user: UserId, state: &UserState) {
        let settings = UserSettings { config: state.config.clone(), source_url: state.source_url.clone() };
        if let Err(err) = self.store.save(user, &settings).await {
            log::error!("{user}: failed to persist settings: {err}");
        }
    }

    async fn handle_command(self: &Arc<Self>, user: UserId, command: Command) {
        match command {
            Command::Setup => {
                self.park_input(user, PendingInput::SourceUrl, "Send the URL of your question sheet now.").await;
            }
            Command::SetInterval => {
                self.park_input(user, PendingInput::Interval, "Enter the question interval in minutes (e.g. 15).")
                    .await;
            }
            Command::SetTimeout => {
                self.park_input(user, PendingInput::Timeout, "Enter the answer timeout in minutes (0 disables it).")
                    .await;
            }
            Command::SetQuietWindow => {
                self.park_input(
                    user,
                    PendingInput::QuietWindow,
                    "Enter the quiet window as HH:MM-HH:MM (e.g. 22:00-07:00).",
                )
                .await;
            }
            Command::ChooseMode => self.send(user, "Choose a question mode:", Some(&commands::mode_keyboard())).await,
            Command::SetMode(mode) => self.set_mode(user, mode).await,
            Command::ShowSettings => self.show_settings(user).await,
            Command::StartSchedule => self.start_schedule(user).await,
            Command::StopSchedule => self.stop_schedule(user).await,
            Command::StopAutoSend => self.stop_auto_send(user).await,
            Command::NextQuestion => self.manual_next(user).await,
        }
    }

    async fn park_input(&self, user: UserId, input: PendingInput, prompt: &str) {
        {
            let slot = self.slot(user);
            slot.lock().await.pending_input = Some(input);
        }
        self.send(user, prompt, None).await;
    }

    async fn handle_input(self: &Arc<Self>, user: UserId, input: PendingInput, text: &str) {
        let text = text.trim();
        match input {
            PendingInput::SourceUrl => match self.connector.connect(text).await {
                Ok(source) => {
                    let slot = self.slot(user);
                    let mut state = slot.lock().await;
                    state.source = SourceSlot::Ready(source);
                    state.source_url = Some(text.to_owned());
                    self.persist(user, &state).await;
                    drop(state);
                    self.send(user, "Question source linked. Press \"Start schedule\" to begin.", None).await;
                }
                Err(err) => self.send(user, &err.to_string(), None).await,
            },
            PendingInput::Interval => match text.parse::<u32>() {
                Ok(minutes) if minutes > 0 => {
                    let slot = self.slot(user);
                    let mut state = slot.lock().await;
                    state.config.interval_minutes = Some(minutes);
                    self.persist(user, &state).await;
                    drop(state);
                    self.send(user, &format!("Question interval set to {minutes} minutes."), None).await;
                }
                _ => self.send(user, "Enter a whole number of minutes greater than zero.", None).await,
            },
            PendingInput::Timeout => match text.parse::<u32>() {
                Ok(minutes) => {
                    let slot = self.slot(user);
                    let mut state = slot.lock().await;
                    state.config.timeout_minutes = minutes;
                    self.persist(user, &state).await;
                    drop(state);
                    let confirmation = if minutes == 0 {
                        "Answer timeout disabled.".to_owned()
                    } else {
                        format!("Answer timeout set to {minutes} minutes.")
                    };
                    self.send(user, &confirmation, None).await;
                }
                Err(_) => self.send(user, "Enter a whole number of minutes.", None).await,
            },
            PendingInput::QuietWindow => match text.parse::<QuietWindow>() {
                Ok(window) => {
                    let slot = self.slot(user);
                    let mut state = slot.lock().await;
                    state.config.quiet = Some(window);
                    self.persist(user, &state).await;
                    drop(state);
                    self.send(user, &format!("Quiet window set to {window}."), None).await;
                }
                Err(err) => self.send(user, &err.to_string(), None).await,
            },
        }
    }

    async fn set_mode(&self, user: UserId, mode: QuestionMode) {
        {
            let slot = self.slot(user);
            let mut state = slot.lock().await;
            state.config.mode = mode;
            self.persist(user, &state).await;
        }
        let confirmation = match mode {
            QuestionMode::Random => "Question mode set to random.".to_owned(),
            QuestionMode::Fixed(question_type) => format!("Question mode set to {question_type}."),
        };
        self.send(user, &confirmation, None).await;
    }

    async fn show_settings(&self, user: UserId) {
        let text = {
            let slot = self.slot(user);
            let state = slot.lock().await;
            let config = &state.config;
            let interval = match config.interval_minutes {
                Some(minutes) => format!("{minutes} minutes"),
                None => "not set".to_owned(),
            };
            let timeout = match config.timeout_minutes {
                0 => "disabled".to_owned(),
                minutes => format!("{minutes} minutes"),
            };
            let quiet = match config.quiet {
                Some(window) => window.to_string(),
                None => "not set".to_owned(),
            };
            let mode = match config.mode {
                QuestionMode::Random => "random".to_owned(),
                QuestionMode::Fixed(question_type) => question_type.to_string(),
            };
            let auto = if config.auto_send { "on" } else { "off" };
            format!(
                "Your current settings:\nMode: {mode}\nInterval: {interval}\nTimeout: {timeout}\n\
                 Quiet window: {quiet}\nAutomatic sending: {auto}"
            )
        };
        self.send(user, &text, None).await;
    }

    /// Registers and spawns the delivery loop. `Ok(false)` means a loop is
    /// already running, which makes starting idempotent.
    async fn spawn_schedule(self: &Arc<Self>, user: UserId) -> Result<bool> {
        let slot = self.slot(user);
        let mut state = slot.lock().await;
        if state.schedule.is_some() {
            return Ok(false);
        }
        if state.config.interval_minutes.is_none() {
            return Err(Error::NoInterval);
        }
        let cancel = CancellationToken::new();
        state.schedule = Some(ScheduleHandle { cancel: cancel.clone() });
        drop(state);

        let inner = Arc::clone(self);
        spawn_logged(user, "schedule", async move { inner.run_schedule(user, cancel).await });
        Ok(true)
    }

    async fn start_schedule(self: &Arc<Self>, user: UserId) {
        {
            // An explicit start also turns automatic sending back on.
            let slot = self.slot(user);
            let mut state = slot.lock().await;
            if !state.config.auto_send {
                state.config.auto_send = true;
                self.persist(user, &state).await;
            }
        }
        match self.spawn_schedule(user).await {
            Ok(true) => {
                let minutes = {
                    let slot = self.slot(user);
                    let state = slot.lock().await;
                    state.config.interval_minutes.unwrap_or_default()
                };
                self.send(user, &format!("Automatic questions started: one every {minutes} minutes."), None).await;
            }
            Ok(false) => self.send(user, "Automatic questions are already running.", None).await,
            Err(err) => self.send(user, &err.to_string(), None).await,
        }
    }

    async fn stop_schedule(&self, user: UserId) {
        let stopped = {
            let slot = self.slot(user);
            let mut state = slot.lock().await;
            match state.schedule.take() {
                Some(handle) => {
                    handle.cancel.cancel();
                    true
                }
                None => false,
            }
        };
        let text = if stopped { "Automatic questions stopped." } else { "No schedule is currently running." };
        self.send(user, text, None).await;
    }

    async fn stop_auto_send(&self, user: UserId) {
        let text = {
            let slot = self.slot(user);
            let mut state = slot.lock().await;
            if state.config.auto_send {
                state.config.auto_send = false;
                self.persist(user, &state).await;
                "Automatic sending disabled. Manual questions still work."
            } else {
                "Automatic sending is already disabled."
            }
        };
        self.send(user, text, None).await;
    }

    /// Per-user delivery loop. It ends only when its registration is
    /// removed, which cancels the token; config changes are picked up on
    /// the next iteration at the latest.
    async fn run_schedule(self: Arc<Self>, user: UserId, cancel: CancellationToken) {
        log::info!("{user}: schedule started");
        loop {
            let (interval, quiet) = {
                let slot = self.slot(user);
                let state = slot.lock().await;
                let Some(minutes) = state.config.interval_minutes else {
                    log::warn!("{user}: interval vanished from config; stopping schedule");
                    break;
                };
                (Duration::from_secs(u64::from(minutes) * 60), state.config.quiet)
            };

            if let Some(window) = quiet {
                if window.contains((self.clock)()) {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = time::sleep(QUIET_POLL) => continue,
                    }
                }
            }

            self.deliver(user, Trigger::Scheduler).await;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = time::sleep(interval) => {}
            }
        }

        // Stop paths take the handle before cancelling, so an uncancelled
        // token on exit means the registration is still ours to clear.
        if !cancel.is_cancelled() {
            let slot = self.slot(user);
            slot.lock().await.schedule = None;
        }
        log::info!("{user}: schedule stopped");
    }

    /// Sends one question. Faults are user-visible guidance, never fatal.
    async fn deliver(self: &Arc<Self>, user: UserId, trigger: Trigger) {
        if let Err(err) = self.try_deliver(user, trigger).await {
            log::warn!("{user}: question not delivered: {err}");
            self.send(user, &err.to_string(), None).await;
        }
    }

    async fn try_deliver(self: &Arc<Self>, user: UserId, trigger: Trigger) -> Result<()> {
        let slot = self.slot(user);
        let source = {
            let state = slot.lock().await;
            if trigger != Trigger::Manual && !state.config.auto_send {
                log::info!("{user}: automatic sending disabled; question skipped");
                return Ok(());
            }
            match &state.source {
                SourceSlot::Ready(source) => Arc::clone(source),
                SourceSlot::Unavailable => return Err(Error::SourceUnavailable),
                SourceSlot::Missing => return Err(Error::NoSource),
            }
        };

        // Fetch outside the user lock so replies stay responsive meanwhile.
        let record = match source.fetch_random(user).await {
            Ok(Fetch::Record(record)) => record,
            Ok(Fetch::Empty) => return Err(Error::SourceEmpty),
            Err(_) => return Err(Error::SourceUnavailable),
        };

        let mut state = slot.lock().await;
        let question_type = match state.config.mode {
            QuestionMode::Fixed(question_type) => question_type,
            QuestionMode::Random => pick(&state.config.random_pool),
        };
        let answers = question::normalized_answers(question_type.answer_field(&record));
        if answers.is_empty() {
            return Err(Error::SourceEmpty);
        }

        let id = SessionId(self.counter.fetch_add(1, Ordering::Relaxed));
        let timeout = Duration::from_secs(u64::from(state.config.timeout_minutes) * 60);
        let cancel = CancellationToken::new();
        let prompt = prompt_text(question_type, &record);
        let session = QuizSession {
            id,
            question_type,
            answers: answers.into_boxed_slice(),
            asked_at: Instant::now(),
            timeout,
            cancel: cancel.clone(),
        };

        // Replacing a live session retires its watchdog first.
        if let Some(old) = state.session.replace(session) {
            old.cancel.cancel();
        }
        // A fresh question supersedes any outstanding deliver-next.
        if let Some(flag) = state.pending_next.take() {
            flag.store(true, Ordering::Release);
        }
        drop(state);

        self.send(user, &prompt, None).await;
        log::info!("{user}: question {id:?} sent ({question_type})");

        if !timeout.is_zero() {
            // The session is installed before the watchdog timer starts.
            let inner = Arc::clone(self);
            spawn_logged(user, "watchdog", async move { inner.run_watchdog(user, id, timeout, cancel).await });
        }
        Ok(())
    }

    /// Deadline task for one session instance. Expiry performs a single
    /// serialized check under the user mutex; a replaced or already
    /// resolved session makes this a silent no-op.
    async fn run_watchdog(self: Arc<Self>, user: UserId, id: SessionId, timeout: Duration, cancel: CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = time::sleep(timeout) => {}
        }

        let slot = self.slot(user);
        let mut state = slot.lock().await;
        let expired = match &state.session {
            Some(session) if session.id == id => state.session.take(),
            _ => None,
        };
        let Some(session) = expired else { return };

        self.arm_next(&mut state, user, NEXT_DELAY);
        drop(state);

        let answers = session.answers.join(", ");
        self.send(user, &format!("Time's up! Accepted answers: {answers}."), None).await;
        log::info!("{user}: {} question {id:?} timed out", session.question_type);
    }

    async fn check_answer(self: &Arc<Self>, user: UserId, text: &str) {
        let normalized = question::normalize_reply(text);
        let slot = self.slot(user);
        let mut state = slot.lock().await;
        let resolved = match &state.session {
            Some(session) if session.accepts(&normalized) => state.session.take(),
            Some(_) => {
                drop(state);
                self.send(user, "Incorrect, try again.", None).await;
                return;
            }
            None => {
                drop(state);
                self.send(user, "No question is waiting for an answer. Press \"Next question\" to get one.", None)
                    .await;
                return;
            }
        };
        let Some(session) = resolved else { return };

        // This take is the resolution; a racing watchdog now sees nothing.
        session.cancel.cancel();
        let delay = if session.timeout.is_zero() { NEXT_DELAY } else { session.remaining() };
        self.arm_next(&mut state, user, delay);
        drop(state);

        let answers = session.answers.join(", ");
        self.send(user, &format!("Correct! Accepted answers: {answers}."), None).await;
        log::info!("{user}: question {:?} answered correctly", session.id);
    }

    /// Installs the per-resolution dispatch flag and spawns the delayed
    /// follow-up. Exactly one of this timer and a manual next-question wins
    /// the flag, so a single resolution yields a single delivery.
    fn arm_next(self: &Arc<Self>, state: &mut UserState, user: UserId, delay: Duration) {
        let flag = Arc::new(AtomicBool::new(false));
        state.pending_next = Some(Arc::clone(&flag));

        let inner = Arc::clone(self);
        spawn_logged(user, "deliver-next", async move {
            time::sleep(delay).await;
            if flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
                return; // a manual next-question got there first
            }
            {
                let slot = inner.slot(user);
                let mut state = slot.lock().await;
                if state.pending_next.as_ref().is_some_and(|current| Arc::ptr_eq(current, &flag)) {
                    state.pending_next = None;
                }
            }
            inner.deliver(user, Trigger::Resolution).await;
        });
    }

    async fn manual_next(self: &Arc<Self>, user: UserId) {
        let won = {
            let slot = self.slot(user);
            let mut state = slot.lock().await;
            match state.pending_next.take() {
                Some(flag) => flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok(),
                None => true,
            }
        };
        if won {
            self.deliver(user, Trigger::Manual).await;
        } else {
            self.send(user, "Your next question is already on its way.", None).await;
        }
    }
}

/// Spawns a task whose panic is logged instead of vanishing with the
/// detached join handle.
fn spawn_logged<F>(user: UserId, what: &'static str, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(task);
    tokio::spawn(async move {
        if let Err(err) = handle.await {
            if err.is_panic() {
                log::error!("{user}: {what} task panicked: {err}");
            }
        }
    });
}

fn pick(pool: &[QuestionType]) -> QuestionType {
    use rand::seq::SliceRandom;
    pool.choose(&mut rand::thread_rng()).copied().unwrap_or(QuestionType::Reading)
}

fn prompt_text(question_type: QuestionType, record: &Record) -> String {
    let shown = question_type.prompt_field(record);
    match question_type {
        QuestionType::Reading => format!("What is the reading of: {shown}?"),
        QuestionType::Meaning => format!("What is the meaning of: {shown}?"),
        QuestionType::ReverseReading => format!("Which term has the reading: {shown}?"),
        QuestionType::ReverseMeaning => format!("Which term means: {shown}?"),
    }
}
