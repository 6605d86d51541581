use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use futures::Stream;
use inference::{error::error_code, EngineConnector, InferenceEngine, ProgressReporter};
use shared::{
    domain::{SessionId, SessionState},
    error::{FailureKind, SessionFailure},
    protocol::{LoadProgress, SessionEvent},
};
use tokio::sync::{broadcast, watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use crate::{error::SessionError, filter::strip_think_tags, PromptProfile, RetryPolicy};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The keyword was blank; nothing happened.
    Skipped,
    Completed(String),
    /// The completion call failed; carries the static failure message.
    Failed(String),
    /// The engine could not be loaded; carries the static failure message.
    LoadFailed(String),
}

impl GenerationOutcome {
    pub fn display_text(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Skipped => None,
            GenerationOutcome::Completed(text)
            | GenerationOutcome::Failed(text)
            | GenerationOutcome::LoadFailed(text) => Some(text),
        }
    }
}

struct SessionSlot {
    state: SessionState,
    engine: Option<Arc<dyn InferenceEngine>>,
    load_attempts: u32,
    last_failure: Option<SessionFailure>,
}

/// Owns a transient state (`Loading` or `Generating`) while its future is
/// in flight. If the future is dropped before `disarm`, the session falls
/// back to `fallback` so later intents are not locked out.
struct StateMark<'a> {
    controller: &'a SessionController,
    held: SessionState,
    fallback: SessionState,
    armed: bool,
}

impl<'a> StateMark<'a> {
    fn new(controller: &'a SessionController, held: SessionState, fallback: SessionState) -> Self {
        Self {
            controller,
            held,
            fallback,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StateMark<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut slot = self.controller.slot();
            if slot.state != self.held {
                return;
            }
            slot.state = self.fallback;
        }
        warn!(
            session_id = %self.controller.session_id,
            abandoned = %self.held,
            state = %self.fallback,
            "session: in-flight call abandoned by caller"
        );
        if self.fallback == SessionState::Ready {
            self.controller
                .notify_state(SessionState::Ready, &self.controller.profile.messages.ready);
        }
    }
}

/// Owns one engine handle and serializes loads and generations against it.
pub struct SessionController {
    session_id: SessionId,
    profile: PromptProfile,
    retry_policy: RetryPolicy,
    connector: Arc<dyn EngineConnector>,
    inner: StdMutex<SessionSlot>,
    load_gate: Mutex<()>,
    progress: Arc<watch::Sender<LoadProgress>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(profile: PromptProfile, connector: Arc<dyn EngineConnector>) -> Self {
        let (progress, _) = watch::channel(LoadProgress::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session_id: SessionId::new(),
            profile,
            retry_policy: RetryPolicy::default(),
            connector,
            inner: StdMutex::new(SessionSlot {
                state: SessionState::Uninitialized,
                engine: None,
                load_attempts: 0,
                last_failure: None,
            }),
            load_gate: Mutex::new(()),
            progress: Arc::new(progress),
            events,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn profile(&self) -> &PromptProfile {
        &self.profile
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// The slot is never held across an await, so a poisoned lock only
    /// means a panic elsewhere; the state itself is still consistent.
    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.slot().state
    }

    pub fn is_loaded(&self) -> bool {
        self.slot().engine.is_some()
    }

    pub fn load_attempts(&self) -> u32 {
        self.slot().load_attempts
    }

    pub fn last_failure(&self) -> Option<SessionFailure> {
        self.slot().last_failure.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Load progress of the current (or most recent) attempt. Dropping the
    /// stream unsubscribes.
    pub fn load_progress(&self) -> impl Stream<Item = LoadProgress> + Send + 'static {
        WatchStream::new(self.progress.subscribe())
    }

    /// Acquires the engine unless it is already held. Never fails: callers
    /// inspect the returned state. Concurrent callers wait on the in-flight
    /// attempt rather than starting another one.
    pub async fn ensure_loaded(&self) -> SessionState {
        let _gate = self.load_gate.lock().await;

        let (attempt, previous) = {
            let mut slot = self.slot();
            match slot.state {
                state if state.is_loaded() => return state,
                SessionState::LoadFailed if self.retry_policy == RetryPolicy::Never => {
                    debug!(
                        session_id = %self.session_id,
                        "engine: load previously failed and retries are disabled"
                    );
                    return slot.state;
                }
                _ => {}
            }
            let previous = slot.state;
            slot.state = SessionState::Loading;
            slot.load_attempts += 1;
            (slot.load_attempts, previous)
        };
        let mark = StateMark::new(self, SessionState::Loading, previous);

        let messages = &self.profile.messages;
        self.progress
            .send_replace(LoadProgress::new(0.0, messages.initializing.clone()));
        self.notify_state(SessionState::Loading, &messages.loading);
        info!(
            session_id = %self.session_id,
            model_id = %self.profile.model_id,
            attempt,
            "engine: load requested"
        );

        let acquired = self
            .connector
            .acquire(
                &self.profile.model_id,
                &self.profile.engine_options,
                ProgressReporter::new(Arc::clone(&self.progress)),
            )
            .await;

        mark.disarm();
        match acquired {
            Ok(engine) => {
                {
                    let mut slot = self.slot();
                    slot.engine = Some(engine);
                    slot.state = SessionState::Ready;
                }
                info!(
                    session_id = %self.session_id,
                    model_id = %self.profile.model_id,
                    attempt,
                    "engine: loaded"
                );
                self.notify_state(SessionState::Ready, &messages.ready);
                SessionState::Ready
            }
            Err(err) => {
                let failure = SessionFailure::new(
                    FailureKind::Load,
                    error_code(&err),
                    format!("{err:#}"),
                );
                error!(
                    session_id = %self.session_id,
                    model_id = %self.profile.model_id,
                    attempt,
                    code = ?failure.code,
                    error = %failure.message,
                    "engine: load failed"
                );
                {
                    let mut slot = self.slot();
                    slot.state = SessionState::LoadFailed;
                    slot.last_failure = Some(failure);
                }
                self.notify_failure(FailureKind::Load, &messages.load_failed);
                self.notify_state(SessionState::LoadFailed, &messages.error);
                SessionState::LoadFailed
            }
        }
    }

    /// One completion for `keyword` against an already loaded engine.
    ///
    /// Blank keywords are skipped. Engine failures are reported through the
    /// outcome; only guard violations are returned as errors.
    pub async fn generate(&self, keyword: &str) -> Result<GenerationOutcome, SessionError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            debug!(session_id = %self.session_id, "generate: blank keyword skipped");
            return Ok(GenerationOutcome::Skipped);
        }

        let engine = {
            let mut slot = self.slot();
            match slot.state {
                SessionState::Ready => {}
                SessionState::Generating => return Err(SessionError::Busy),
                state => return Err(SessionError::NotReady { state }),
            }
            let Some(engine) = slot.engine.clone() else {
                return Err(SessionError::NotReady { state: slot.state });
            };
            slot.state = SessionState::Generating;
            engine
        };

        let mark = StateMark::new(self, SessionState::Generating, SessionState::Ready);
        let messages = &self.profile.messages;
        self.notify_state(SessionState::Generating, &messages.generating);
        let request = self.profile.template.build_messages(keyword);
        let completed = engine.complete(&request).await;
        mark.disarm();

        let outcome = match completed {
            Ok(raw) => {
                let text = strip_think_tags(&raw);
                self.slot().state = SessionState::Ready;
                info!(
                    session_id = %self.session_id,
                    model_id = %engine.model_id(),
                    raw_chars = raw.chars().count(),
                    chars = text.chars().count(),
                    "generate: completion received"
                );
                let _ = self.events.send(SessionEvent::PromptGenerated {
                    session_id: self.session_id,
                    text: text.clone(),
                });
                GenerationOutcome::Completed(text)
            }
            Err(err) => {
                let failure = SessionFailure::new(
                    FailureKind::Generation,
                    error_code(&err),
                    format!("{err:#}"),
                );
                error!(
                    session_id = %self.session_id,
                    model_id = %engine.model_id(),
                    code = ?failure.code,
                    error = %failure.message,
                    "generate: completion failed"
                );
                {
                    let mut slot = self.slot();
                    slot.state = SessionState::Ready;
                    slot.last_failure = Some(failure);
                }
                self.notify_failure(FailureKind::Generation, &messages.generation_failed);
                GenerationOutcome::Failed(messages.generation_failed.clone())
            }
        };

        self.notify_state(SessionState::Ready, &messages.ready);
        Ok(outcome)
    }

    /// The user intent behind a button press: load on first use, then
    /// generate.
    pub async fn request_load_and_generate(
        &self,
        keyword: &str,
    ) -> Result<GenerationOutcome, SessionError> {
        if keyword.trim().is_empty() {
            return Ok(GenerationOutcome::Skipped);
        }

        match self.ensure_loaded().await {
            SessionState::Ready => {}
            SessionState::Generating => return Err(SessionError::Busy),
            _ => {
                return Ok(GenerationOutcome::LoadFailed(
                    self.profile.messages.load_failed.clone(),
                ))
            }
        }

        self.generate(keyword).await
    }

    fn notify_state(&self, state: SessionState, status: &str) {
        let _ = self.events.send(SessionEvent::StateChanged {
            session_id: self.session_id,
            state,
            status: status.to_string(),
        });
    }

    fn notify_failure(&self, kind: FailureKind, message: &str) {
        let _ = self.events.send(SessionEvent::Failed {
            session_id: self.session_id,
            kind,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
