// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scripted collaborators for driving the form controller.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use waitlist_gate::{
    challenge::{ChallengeError, ChallengeProvider, StaticToken},
    clock::ManualClock,
    config::Config,
    store::{KeyValueStore, MemoryStore, StoreError},
    FormSurface, SubmissionError, SubmissionLimiter, SubmissionResult, UserMessage,
    WaitlistBackend, WaitlistForm,
};

/// Something the form asked its surface to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    ClearErrors,
    FieldError(UserMessage),
    Focus,
    Busy(bool),
    Success { already_registered: bool },
    Reset,
}

/// Surface that records every call.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn field_errors(&self) -> Vec<UserMessage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::FieldError(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Busy state after the last `set_busy` call.
    pub fn busy(&self) -> bool {
        self.events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                SurfaceEvent::Busy(busy) => Some(busy),
                _ => None,
            })
            .unwrap_or(false)
    }

    fn push(&self, event: SurfaceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl FormSurface for RecordingSurface {
    fn clear_errors(&self) {
        self.push(SurfaceEvent::ClearErrors);
    }

    fn show_field_error(&self, message: UserMessage) {
        self.push(SurfaceEvent::FieldError(message));
    }

    fn focus_field(&self) {
        self.push(SurfaceEvent::Focus);
    }

    fn set_busy(&self, busy: bool) {
        self.push(SurfaceEvent::Busy(busy));
    }

    fn show_success(&self, already_registered: bool) {
        self.push(SurfaceEvent::Success { already_registered });
    }

    fn reset(&self) {
        self.push(SurfaceEvent::Reset);
    }
}

/// One call the backend received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub identifier: String,
    pub token: Option<String>,
    /// Whether the limiter considered the identifier limited mid-call
    pub limited_during_call: Option<bool>,
}

/// Backend answering from a queue. An exhausted queue answers 500.
#[derive(Default)]
pub struct ScriptedBackend {
    answers: Mutex<VecDeque<Result<SubmissionResult, SubmissionError>>>,
    calls: Mutex<Vec<BackendCall>>,
    watch: Mutex<Option<(SubmissionLimiter, Duration)>>,
    gate: Option<Gate>,
}

/// Holds a call open until released.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Gate) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn then(self, answer: Result<SubmissionResult, SubmissionError>) -> Self {
        self.answers.lock().unwrap().push_back(answer);
        self
    }

    pub fn then_created(self, status: u16, identifier: &str) -> Self {
        self.then(Ok(SubmissionResult {
            status,
            record: Some(serde_json::json!({ "identifier": identifier })),
            already_exists: false,
        }))
    }

    pub fn then_exists(self) -> Self {
        self.then(Ok(SubmissionResult {
            status: 409,
            record: None,
            already_exists: true,
        }))
    }

    pub fn then_status(self, status: u16) -> Self {
        self.then(Err(SubmissionError::Status { status }))
    }

    pub fn watch(&self, limiter: SubmissionLimiter, window: Duration) {
        *self.watch.lock().unwrap() = Some((limiter, window));
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WaitlistBackend for ScriptedBackend {
    async fn submit(
        &self,
        identifier: &str,
        challenge_token: Option<&str>,
    ) -> Result<SubmissionResult, SubmissionError> {
        let limited_during_call = self
            .watch
            .lock()
            .unwrap()
            .as_ref()
            .map(|(limiter, window)| limiter.is_rate_limited(identifier, *window));

        self.calls.lock().unwrap().push(BackendCall {
            identifier: identifier.to_string(),
            token: challenge_token.map(str::to_string),
            limited_during_call,
        });

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SubmissionError::Status { status: 500 }))
    }
}

/// Challenge provider that always fails.
#[derive(Debug, Default)]
pub struct BrokenChallenge;

#[async_trait]
impl ChallengeProvider for BrokenChallenge {
    async fn acquire_token(&self) -> Result<String, ChallengeError> {
        Err(ChallengeError::Timeout)
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "storage disabled").into())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(io::Error::new(io::ErrorKind::Other, "quota exceeded").into())
    }
}

pub const TOKEN: &str = "challenge-token";

/// A form wired to recording fakes.
pub struct Fixture {
    pub form: WaitlistForm,
    pub backend: Arc<ScriptedBackend>,
    pub surface: Arc<RecordingSurface>,
    pub store: Arc<MemoryStore>,
    pub clock: ManualClock,
    pub config: Config,
}

impl Fixture {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self::build(backend, Arc::new(StaticToken(TOKEN.to_string())), None)
    }

    pub fn with_challenge(backend: ScriptedBackend, challenge: Arc<dyn ChallengeProvider>) -> Self {
        Self::build(backend, challenge, None)
    }

    /// Limiter backed by `store` instead of the fixture's memory store.
    pub fn with_store(backend: ScriptedBackend, store: Arc<dyn KeyValueStore>) -> Self {
        Self::build(backend, Arc::new(StaticToken(TOKEN.to_string())), Some(store))
    }

    fn build(
        backend: ScriptedBackend,
        challenge: Arc<dyn ChallengeProvider>,
        store_override: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        let mut config = Config::default();
        config.form.auto_reset_ms = 50;

        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(1_700_000_000_000);
        let limiter_store =
            store_override.unwrap_or_else(|| store.clone() as Arc<dyn KeyValueStore>);
        let limiter = SubmissionLimiter::with_clock(
            &config.rate_limit,
            Some(limiter_store),
            Arc::new(clock.clone()),
        );

        let backend = Arc::new(backend);
        backend.watch(limiter.clone(), config.rate_limit.window());
        let surface = Arc::new(RecordingSurface::default());

        let form = WaitlistForm::new(
            config.clone(),
            limiter,
            backend.clone(),
            challenge,
            surface.clone(),
        );

        Self {
            form,
            backend,
            surface,
            store,
            clock,
            config,
        }
    }

    pub fn window(&self) -> Duration {
        self.config.rate_limit.window()
    }

    pub fn is_limited(&self, identifier: &str) -> bool {
        self.form.limiter().is_rate_limited(identifier, self.window())
    }

    /// Raw rate-limit record as stored.
    pub fn stored_record(&self) -> serde_json::Value {
        self.store
            .get(&self.config.rate_limit.storage_key)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
            .unwrap_or(serde_json::Value::Null)
    }
}
