//! Turn coordinator: schedules generation and speech onto the worker pool.
//!
//! A conversation turn runs in two phases, each behind its own gate:
//!
//! ```text
//!   submit_turn ─► [thinking gate] generate ─► resubmit ─► [talking gate] speak ─► callback
//! ```
//!
//! The thinking gate is released before the deliver half is resubmitted, so a
//! later turn may generate while an earlier one is still speaking. Under
//! [`TurnOrdering::Pipelined`] that means message/talking notifications from
//! different turns are not guaranteed to follow submission order. Under
//! [`TurnOrdering::Strict`] each turn takes a FIFO ticket and runs both phases
//! on one worker before the next ticket is admitted.
//!
//! Every consumer-visible effect leaves through the [`NotificationSender`];
//! nothing here calls into consumer state.

use crate::backend::{ResponseGenerator, SpeechSynthesizer};
use crate::config::{ChatConfig, TurnOrdering};
use crate::directive::{Directive, DirectiveSet};
use crate::error::{Result, ZiraError};
use crate::gate::{PhaseGates, Ticket, TurnSequencer};
use crate::notification::{Notification, NotificationReceiver, NotificationSender, notification_channel};
use crate::pool::{Job, WorkerPool};
use crate::turn::{Turn, TurnCallback, TurnId, TurnState};
use crate::voice::{VoiceOptions, VoiceOverride, resolve_voice};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a successful submission turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A normal turn was queued.
    Queued(TurnId),
    /// The clear-history directive matched.
    HistoryCleared(TurnId),
    /// The termination directive matched; a farewell turn was queued.
    Farewell(TurnId),
}

impl SubmitOutcome {
    pub fn turn_id(self) -> TurnId {
        match self {
            Self::Queued(id) | Self::HistoryCleared(id) | Self::Farewell(id) => id,
        }
    }
}

/// Counts turns between acceptance and completion.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightToken {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        InFlightToken(Arc::clone(self))
    }

    fn current(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    count = self
                        .idle
                        .wait_timeout(count, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    count = self.idle.wait(count).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        true
    }
}

struct InFlightToken(Arc<InFlight>);

impl Drop for InFlightToken {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

struct Shared {
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    default_voice: Arc<VoiceOptions>,
    gates: PhaseGates,
    sequencer: TurnSequencer,
    ordering: TurnOrdering,
    directives: DirectiveSet,
    generation_fallback: String,
    synthesis_fallback: Option<String>,
    notifications: NotificationSender,
    pool: WorkerPool,
    next_turn: AtomicU64,
    accepting: AtomicBool,
    in_flight: Arc<InFlight>,
    session: CancellationToken,
}

impl Shared {
    fn emit(&self, turn: TurnId, notification: Notification) {
        self.notifications.emit(turn, notification);
    }
}

/// Orchestrates conversation turns across the worker pool.
pub struct TurnCoordinator {
    shared: Arc<Shared>,
}

impl TurnCoordinator {
    /// Start the worker pool and return the coordinator together with the
    /// consumer's end of the notification channel.
    ///
    /// The voice defaults in `config` are snapshotted here and never change
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the pool cannot start.
    pub fn new(
        config: &ChatConfig,
        generator: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Result<(Self, NotificationReceiver)> {
        config.validate()?;
        let pool = WorkerPool::start(&config.pool)?;
        let (notifications, rx) = notification_channel();

        let shared = Arc::new(Shared {
            generator,
            synthesizer,
            default_voice: Arc::new(config.voice.clone()),
            gates: PhaseGates::default(),
            sequencer: TurnSequencer::new(),
            ordering: config.turns.ordering,
            directives: DirectiveSet::from_config(&config.directives),
            generation_fallback: config.turns.generation_fallback.clone(),
            synthesis_fallback: config.turns.synthesis_fallback.clone(),
            notifications,
            pool,
            next_turn: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
            in_flight: Arc::new(InFlight::default()),
            session: CancellationToken::new(),
        });

        info!(
            workers = shared.pool.size(),
            ordering = ?shared.ordering,
            "turn coordinator ready"
        );
        Ok((Self { shared }, rx))
    }

    /// Accept a user message.
    ///
    /// Returns immediately; all effects arrive later as notifications.
    /// Directive phrases are handled here without touching the generator.
    ///
    /// # Errors
    ///
    /// - [`ZiraError::InvalidInput`] for blank input or a bad voice override
    ///   (nothing is created or emitted).
    /// - [`ZiraError::QueueSaturated`] when a bounded pool queue is full.
    /// - [`ZiraError::ShuttingDown`] after shutdown or session termination.
    pub fn submit_turn(
        &self,
        input: &str,
        callback: Option<TurnCallback>,
        voice: Option<VoiceOverride>,
    ) -> Result<SubmitOutcome> {
        let text = normalize(input)?;
        validate_override(voice.as_ref())?;
        self.ensure_accepting()?;

        match self.shared.directives.detect(text) {
            Some(Directive::ClearHistory) => self.clear_history(callback),
            Some(Directive::Terminate { farewell }) => {
                let id = self.next_id();
                let shared = Arc::clone(&self.shared);
                let terminate: TurnCallback = Box::new(move || {
                    if let Some(cb) = callback {
                        run_callback(id, cb);
                    }
                    shared.accepting.store(false, Ordering::SeqCst);
                    shared.session.cancel();
                    info!(turn = %id, "session terminated by farewell directive");
                });
                self.enqueue(Turn::new(id, farewell, Some(terminate), voice), true)?;
                Ok(SubmitOutcome::Farewell(id))
            }
            None => {
                let id = self.enqueue(Turn::new(self.next_id(), text.to_owned(), callback, voice), false)?;
                Ok(SubmitOutcome::Queued(id))
            }
        }
    }

    /// Speak a fixed assistant message, skipping generation.
    ///
    /// Emits the message and talking notifications, then runs `callback`.
    ///
    /// # Errors
    ///
    /// Same as [`submit_turn`](Self::submit_turn), minus directive handling.
    pub fn submit_message(
        &self,
        text: &str,
        callback: Option<TurnCallback>,
        voice: Option<VoiceOverride>,
    ) -> Result<TurnId> {
        let text = normalize(text)?;
        validate_override(voice.as_ref())?;
        self.ensure_accepting()?;
        self.enqueue(Turn::new(self.next_id(), text.to_owned(), callback, voice), true)
    }

    /// The immutable default voice snapshot.
    pub fn default_voice(&self) -> &VoiceOptions {
        &self.shared.default_voice
    }

    /// Cancelled once a farewell turn has finished speaking.
    pub fn session_token(&self) -> CancellationToken {
        self.shared.session.clone()
    }

    pub fn is_session_terminated(&self) -> bool {
        self.shared.session.is_cancelled()
    }

    /// Turns accepted but not yet done.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.current()
    }

    /// Notifications enqueued so far across all turns.
    pub fn notifications_emitted(&self) -> u64 {
        self.shared.notifications.emitted()
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.shared.pool.size()
    }

    /// Block until no turn is in flight, or `timeout` elapses.
    ///
    /// Returns `true` if idle was reached. Must not be called from a turn
    /// callback.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.in_flight.wait_idle(Some(timeout))
    }

    /// Stop accepting turns, let in-flight turns finish, then stop the pool.
    ///
    /// Must not be called from a turn callback; signal through
    /// [`session_token`](Self::session_token) instead.
    pub fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        info!(in_flight = self.in_flight(), "shutting down; draining turns");
        self.shared.in_flight.wait_idle(None);
        self.shared.pool.close();
        info!("turn coordinator shut down");
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.shared.accepting.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ZiraError::ShuttingDown)
        }
    }

    fn next_id(&self) -> TurnId {
        TurnId::from_raw(self.shared.next_turn.fetch_add(1, Ordering::Relaxed))
    }

    fn clear_history(&self, callback: Option<TurnCallback>) -> Result<SubmitOutcome> {
        let id = self.next_id();
        let token = self.shared.in_flight.enter();
        let shared = Arc::clone(&self.shared);

        let submitted = match self.shared.ordering {
            TurnOrdering::Pipelined => self
                .shared
                .pool
                .submit(Box::new(move || run_clear(&shared, id, None, callback, token))),
            TurnOrdering::Strict => self.shared.sequencer.issue_with(|ticket| {
                self.shared
                    .pool
                    .submit(Box::new(move || run_clear(&shared, id, Some(ticket), callback, token)))
            }),
        };

        match submitted {
            Ok(()) => {
                info!(turn = %id, "clear-history directive accepted");
                Ok(SubmitOutcome::HistoryCleared(id))
            }
            Err(e) => {
                warn!(turn = %id, error = %e, "clear-history rejected by worker pool");
                Err(e)
            }
        }
    }

    /// Hand a turn to the pool. `speak_only` skips the thinking phase.
    fn enqueue(&self, turn: Turn, speak_only: bool) -> Result<TurnId> {
        let id = turn.id();
        let token = self.shared.in_flight.enter();
        let shared = Arc::clone(&self.shared);

        let submitted = match self.shared.ordering {
            TurnOrdering::Pipelined => {
                let job: Job = if speak_only {
                    Box::new(move || {
                        let text = turn.input().to_owned();
                        run_talking(&shared, turn, text, token);
                    })
                } else {
                    Box::new(move || run_pipelined(shared, turn, token))
                };
                self.shared.pool.submit(job)
            }
            TurnOrdering::Strict => self.shared.sequencer.issue_with(|ticket| {
                self.shared
                    .pool
                    .submit(Box::new(move || run_strict(&shared, ticket, turn, speak_only, token)))
            }),
        };

        match submitted {
            Ok(()) => {
                info!(turn = %id, speak_only, "turn accepted");
                Ok(id)
            }
            Err(e) => {
                warn!(turn = %id, error = %e, "turn rejected by worker pool");
                Err(e)
            }
        }
    }
}

fn normalize(input: &str) -> Result<&str> {
    let text = input.trim();
    if text.is_empty() {
        return Err(ZiraError::InvalidInput("message is empty".to_owned()));
    }
    Ok(text)
}

fn validate_override(voice: Option<&VoiceOverride>) -> Result<()> {
    match voice {
        Some(v) => v
            .validate()
            .map_err(|e| ZiraError::InvalidInput(e.to_string())),
        None => Ok(()),
    }
}

/// Thinking phase on this worker, talking phase resubmitted to the pool.
fn run_pipelined(shared: Arc<Shared>, mut turn: Turn, token: InFlightToken) {
    let response = run_thinking(&shared, &mut turn);

    let id = turn.id();
    let deliver_shared = Arc::clone(&shared);
    let deliver: Job = Box::new(move || run_talking(&deliver_shared, turn, response, token));
    if let Err((err, deliver)) = shared.pool.try_submit(deliver) {
        // Never drop a deliver phase; no gate is held here, so run it inline.
        debug!(turn = %id, error = %err, "deliver resubmission refused; running inline");
        deliver();
    }
}

fn run_strict(shared: &Shared, ticket: Ticket, mut turn: Turn, speak_only: bool, token: InFlightToken) {
    let _slot = shared.sequencer.wait_for(ticket);
    let response = if speak_only {
        turn.input().to_owned()
    } else {
        run_thinking(shared, &mut turn)
    };
    run_talking(shared, turn, response, token);
}

fn run_thinking(shared: &Shared, turn: &mut Turn) -> String {
    let id = turn.id();
    turn.advance(TurnState::Thinking);

    let _gate = shared.gates.thinking.acquire();
    shared.emit(id, Notification::ThinkingStateChanged { active: true });

    let started = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| shared.generator.generate(turn.input())));
    let response = match outcome {
        Ok(Ok(text)) => {
            debug!(turn = %id, elapsed_ms = started.elapsed().as_millis() as u64, "response generated");
            text
        }
        Ok(Err(e)) => {
            warn!(turn = %id, error = %e, "response generator failed; using fallback");
            shared.generation_fallback.clone()
        }
        Err(panic) => {
            error!(turn = %id, panic = panic_message(&*panic), "response generator panicked; using fallback");
            shared.generation_fallback.clone()
        }
    };

    shared.emit(id, Notification::ThinkingStateChanged { active: false });
    response
}

fn run_talking(shared: &Shared, mut turn: Turn, text: String, token: InFlightToken) {
    let id = turn.id();
    turn.advance(TurnState::Talking);

    {
        let _gate = shared.gates.talking.acquire();
        shared.emit(id, Notification::MessageReady { text: text.clone() });

        let options = resolve_voice(turn.voice(), &shared.default_voice);
        shared.emit(id, Notification::TalkingStateChanged { active: true });
        let outcome = catch_unwind(AssertUnwindSafe(|| shared.synthesizer.speak(&text, &options)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("panicked: {}", panic_message(&*panic))),
        };
        shared.emit(id, Notification::TalkingStateChanged { active: false });

        if let Some(reason) = failure {
            warn!(turn = %id, error = %reason, "speech synthesis failed");
            if let Some(fallback) = &shared.synthesis_fallback {
                shared.emit(id, Notification::MessageReady { text: fallback.clone() });
            }
        }
    }

    if let Some(cb) = turn.complete() {
        run_callback(id, cb);
    }
    debug!(turn = %id, "turn done");
    drop(token);
}

fn run_clear(
    shared: &Shared,
    id: TurnId,
    ticket: Option<Ticket>,
    callback: Option<TurnCallback>,
    token: InFlightToken,
) {
    let _slot = ticket.map(|t| shared.sequencer.wait_for(t));
    shared.emit(id, Notification::HistoryCleared);
    if let Some(cb) = callback {
        run_callback(id, cb);
    }
    debug!(turn = %id, "history cleared");
    drop(token);
}

fn run_callback(id: TurnId, cb: TurnCallback) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(cb)) {
        error!(turn = %id, panic = panic_message(&*panic), "turn callback panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
