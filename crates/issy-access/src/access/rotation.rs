//! Rotation engine: keeps a displayed access code in step with the
//! 10-second grid.
//!
//! Two layers:
//!
//! - [`Rotator`] is a synchronous state machine driven by explicit
//!   timestamps. It decides when a generation is due, guards against
//!   overlapping generations and filters out stale or cancelled results.
//! - [`RotationEngine`] drives a `Rotator` from a tokio interval, runs
//!   generations through a [`CodeSource`] and publishes code, countdown and
//!   phase on `watch` channels.
//!
//! Regeneration happens once per time counter regardless of the poll
//! interval: the counter is recorded as seen when its generation is
//! dispatched, and every in-flight generation carries a [`Ticket`] so a late
//! result can never overwrite a newer code or touch a reset/disposed engine.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::access::clock::{Clock, SystemClock};
use crate::access::config::RotationConfig;
use crate::access::core;
use crate::access::types::*;

/// Collaborator-supplied error callback.
pub type ErrorSink = Arc<dyn Fn(&AccessError) + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Code source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Produces the code for one counter. Async so that hosts whose digest
/// primitive suspends can plug in without blocking the poll loop.
#[async_trait]
pub trait CodeSource: Send + Sync {
    async fn generate(&self, credential: &Credential, counter: u64, now_ms: u64) -> AccessResult<GeneratedCode>;
}

/// The in-process HMAC-SHA256 generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacCodeSource;

#[async_trait]
impl CodeSource for HmacCodeSource {
    async fn generate(&self, credential: &Credential, counter: u64, now_ms: u64) -> AccessResult<GeneratedCode> {
        core::generate_for(credential, Some(counter), now_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Synchronous state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identifies one dispatched generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    counter: u64,
}

impl Ticket {
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

/// A generation the caller must run and report back via [`Rotator::complete`].
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub ticket: Ticket,
    pub credential: Credential,
}

/// What a poll produced.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    /// Countdown to publish; `None` while idle or disposed.
    pub remaining_seconds: Option<u64>,
    /// A generation to dispatch, if a boundary was crossed.
    pub request: Option<GenerationRequest>,
}

/// How a finished generation was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The code replaced the displayed one.
    Displayed(GeneratedCode),
    /// Generation failed; the previous code stays displayed.
    Failed(AccessError),
    /// The result belonged to a reset/disposed engine or an elapsed counter.
    Discarded,
}

/// Clock-driven rotation state machine.
#[derive(Debug)]
pub struct Rotator {
    credential: Option<Credential>,
    phase: Phase,
    epoch: u64,
    last_seen_counter: Option<u64>,
    in_flight: Option<Ticket>,
    current: Option<GeneratedCode>,
    remaining_seconds: u64,
    disposed: bool,
}

impl Rotator {
    pub fn new(credential: Option<Credential>) -> Self {
        let mut rotator = Self {
            credential: None,
            phase: Phase::Idle,
            epoch: 0,
            last_seen_counter: None,
            in_flight: None,
            current: None,
            remaining_seconds: 0,
            disposed: false,
        };
        rotator.reset(credential);
        rotator
    }

    /// Replace the credential and discard everything derived from the old one.
    pub fn reset(&mut self, credential: Option<Credential>) {
        if self.disposed {
            return;
        }
        self.epoch += 1;
        self.last_seen_counter = None;
        self.in_flight = None;
        self.current = None;
        self.remaining_seconds = 0;
        self.phase = if credential.is_some() {
            Phase::Initializing
        } else {
            Phase::Idle
        };
        self.credential = credential;
    }

    /// Tear down permanently. Later polls and completions are no-ops.
    pub fn dispose(&mut self) {
        self.reset(None);
        self.disposed = true;
    }

    /// Observe the clock at `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> PollOutcome {
        if self.disposed {
            return PollOutcome::default();
        }
        let Some(credential) = &self.credential else {
            return PollOutcome::default();
        };

        self.remaining_seconds = core::seconds_until_next_rotation_at(now_ms);
        let counter = core::time_counter_at(now_ms);

        let mut request = None;
        if self.last_seen_counter != Some(counter) {
            if let Some(pending) = self.in_flight {
                log::trace!(
                    "boundary {} deferred, generation for {} still pending",
                    counter,
                    pending.counter
                );
            } else {
                let ticket = Ticket {
                    epoch: self.epoch,
                    counter,
                };
                self.last_seen_counter = Some(counter);
                self.in_flight = Some(ticket);
                if self.phase == Phase::Live {
                    self.phase = Phase::Regenerating;
                }
                request = Some(GenerationRequest {
                    ticket,
                    credential: credential.clone(),
                });
            }
        }

        PollOutcome {
            remaining_seconds: Some(self.remaining_seconds),
            request,
        }
    }

    /// Apply the result of the generation identified by `ticket`.
    pub fn complete(&mut self, ticket: Ticket, result: AccessResult<GeneratedCode>, now_ms: u64) -> Completion {
        if self.disposed || ticket.epoch != self.epoch {
            return Completion::Discarded;
        }
        if self.in_flight == Some(ticket) {
            self.in_flight = None;
        }
        self.phase = if self.current.is_some() {
            Phase::Live
        } else {
            Phase::Initializing
        };

        match result {
            Ok(code) => {
                let wall = core::time_counter_at(now_ms);
                let behind_display = self
                    .current
                    .as_ref()
                    .is_some_and(|shown| shown.counter >= ticket.counter);
                if ticket.counter != wall || behind_display {
                    log::debug!("discarding code for counter {} (now {})", ticket.counter, wall);
                    return Completion::Discarded;
                }
                log::debug!("rotated to counter {}", ticket.counter);
                self.current = Some(code.clone());
                self.phase = Phase::Live;
                Completion::Displayed(code)
            }
            Err(err) => {
                log::warn!("access code generation failed for counter {}: {}", ticket.counter, err);
                Completion::Failed(err)
            }
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current(&self) -> Option<&GeneratedCode> {
        self.current.as_ref()
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn last_seen_counter(&self) -> Option<u64> {
        self.last_seen_counter
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> DisplayState {
        DisplayState {
            phase: self.phase,
            loading: self.phase == Phase::Initializing,
            code: self.current.clone(),
            remaining_seconds: self.remaining_seconds,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tokio driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct EngineState {
    rotator: Rotator,
    poll_task: Option<JoinHandle<()>>,
    generation: Option<(Ticket, AbortHandle)>,
}

impl EngineState {
    fn abort_tasks(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some((_, handle)) = self.generation.take() {
            handle.abort();
        }
    }
}

struct Shared {
    id: String,
    config: RotationConfig,
    clock: Arc<dyn Clock>,
    source: Arc<dyn CodeSource>,
    on_error: ErrorSink,
    state: Mutex<EngineState>,
    code_tx: watch::Sender<Option<GeneratedCode>>,
    countdown_tx: watch::Sender<u64>,
    phase_tx: watch::Sender<Phase>,
}

impl Shared {
    fn publish_phase(&self, phase: Phase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    async fn on_tick(self: &Arc<Self>) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;
        let outcome = state.rotator.poll(now);

        if let Some(remaining) = outcome.remaining_seconds {
            self.countdown_tx.send_replace(remaining);
        }
        self.publish_phase(state.rotator.phase());

        if let Some(request) = outcome.request {
            let ticket = request.ticket;
            let shared = Arc::clone(self);
            let task = tokio::spawn(async move { shared.run_generation(request, now).await });
            state.generation = Some((ticket, task.abort_handle()));
        }
    }

    async fn run_generation(self: Arc<Self>, request: GenerationRequest, dispatched_ms: u64) {
        let ticket = request.ticket;
        let result = self
            .source
            .generate(&request.credential, ticket.counter(), dispatched_ms)
            .await;

        let completion = {
            let mut state = self.state.lock().await;
            if matches!(state.generation, Some((t, _)) if t == ticket) {
                state.generation = None;
            }
            let completion = state.rotator.complete(ticket, result, self.clock.now_ms());
            if let Completion::Displayed(code) = &completion {
                self.code_tx.send_replace(Some(code.clone()));
            }
            if !state.rotator.is_disposed() {
                self.publish_phase(state.rotator.phase());
            }
            completion
        };

        if let Completion::Failed(err) = completion {
            (self.on_error)(&err);
        }
    }
}

async fn poll_loop(shared: Weak<Shared>, interval_ms: u64) {
    let mut ticker = time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.on_tick().await;
    }
}

/// Builder for [`RotationEngine`].
pub struct RotationEngineBuilder {
    credential: Option<Credential>,
    config: RotationConfig,
    clock: Arc<dyn Clock>,
    source: Arc<dyn CodeSource>,
    on_error: ErrorSink,
}

impl RotationEngineBuilder {
    pub fn config(mut self, config: RotationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn source(mut self, source: Arc<dyn CodeSource>) -> Self {
        self.source = source;
        self
    }

    pub fn on_error(mut self, sink: impl Fn(&AccessError) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(sink);
        self
    }

    /// Start the engine. Must be called inside a tokio runtime.
    pub fn spawn(self) -> AccessResult<RotationEngine> {
        self.config.validate()?;

        let has_credential = self.credential.is_some();
        let rotator = Rotator::new(self.credential);
        let (code_tx, _) = watch::channel(None);
        let (countdown_tx, _) = watch::channel(0);
        let (phase_tx, _) = watch::channel(rotator.phase());

        let shared = Arc::new(Shared {
            id: uuid::Uuid::new_v4().to_string(),
            config: self.config,
            clock: self.clock,
            source: self.source,
            on_error: self.on_error,
            state: Mutex::new(EngineState {
                rotator,
                poll_task: None,
                generation: None,
            }),
            code_tx,
            countdown_tx,
            phase_tx,
        });

        if has_credential {
            let task = tokio::spawn(poll_loop(Arc::downgrade(&shared), shared.config.poll_interval_ms));
            // Nobody else can hold the lock before the engine is returned.
            if let Ok(mut state) = shared.state.try_lock() {
                state.poll_task = Some(task);
            }
        }
        log::info!("rotation engine {} started (credential: {})", shared.id, has_credential);

        Ok(RotationEngine { shared })
    }
}

/// Live, self-refreshing access code display model.
pub struct RotationEngine {
    shared: Arc<Shared>,
}

impl RotationEngine {
    /// Builder with the system clock, the HMAC generator and a logging
    /// error sink.
    pub fn builder(credential: Option<Credential>) -> RotationEngineBuilder {
        RotationEngineBuilder {
            credential,
            config: RotationConfig::default(),
            clock: Arc::new(SystemClock),
            source: Arc::new(HmacCodeSource),
            on_error: Arc::new(|err: &AccessError| log::error!("access code error: {}", err)),
        }
    }

    /// Start with defaults and the given error sink.
    pub fn start(
        credential: Credential,
        on_error: impl Fn(&AccessError) + Send + Sync + 'static,
    ) -> AccessResult<Self> {
        Self::builder(Some(credential)).on_error(on_error).spawn()
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn config(&self) -> &RotationConfig {
        &self.shared.config
    }

    /// Current display state assembled from the published channels.
    pub fn snapshot(&self) -> DisplayState {
        let phase = *self.shared.phase_tx.borrow();
        DisplayState {
            phase,
            loading: phase == Phase::Initializing,
            code: self.shared.code_tx.borrow().clone(),
            remaining_seconds: *self.shared.countdown_tx.borrow(),
        }
    }

    pub fn urgency(&self) -> Urgency {
        self.shared.config.urgency(*self.shared.countdown_tx.borrow())
    }

    /// Fires only when a new code is displayed (or cleared on reset).
    pub fn subscribe_code(&self) -> watch::Receiver<Option<GeneratedCode>> {
        self.shared.code_tx.subscribe()
    }

    /// Fires on every poll tick.
    pub fn subscribe_countdown(&self) -> watch::Receiver<u64> {
        self.shared.countdown_tx.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.shared.phase_tx.subscribe()
    }

    /// Swap the credential. Any change fully resets the engine; `None`
    /// stops polling.
    pub async fn set_credential(&self, credential: Option<Credential>) {
        let mut state = self.shared.state.lock().await;
        if state.rotator.is_disposed() {
            return;
        }
        if let Some((_, handle)) = state.generation.take() {
            handle.abort();
        }

        let has_credential = credential.is_some();
        state.rotator.reset(credential);
        self.shared.code_tx.send_replace(None);
        self.shared.publish_phase(state.rotator.phase());

        if has_credential {
            if state.poll_task.is_none() {
                let task = tokio::spawn(poll_loop(
                    Arc::downgrade(&self.shared),
                    self.shared.config.poll_interval_ms,
                ));
                state.poll_task = Some(task);
            }
        } else {
            if let Some(task) = state.poll_task.take() {
                task.abort();
            }
            self.shared.countdown_tx.send_replace(0);
        }
        log::info!("rotation engine {} credential reset (present: {})", self.shared.id, has_credential);
    }

    /// Stop polling and drop all state. Generations still in flight finish
    /// as no-ops.
    pub async fn dispose(&self) {
        let mut state = self.shared.state.lock().await;
        if state.rotator.is_disposed() {
            return;
        }
        state.abort_tasks();
        state.rotator.dispose();
        self.shared.code_tx.send_replace(None);
        self.shared.countdown_tx.send_replace(0);
        self.shared.publish_phase(Phase::Idle);
        log::info!("rotation engine {} disposed", self.shared.id);
    }

    pub async fn is_disposed(&self) -> bool {
        self.shared.state.lock().await.rotator.is_disposed()
    }
}
