// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bot-challenge token acquisition.
//!
//! Challenge widgets (Turnstile, reCAPTCHA) report results through
//! callbacks. [`CallbackChallenge`] turns that into a single awaitable
//! request: each request parks a sender in a pending slot, the first
//! callback to fire takes it, and later callbacks find the slot empty.

use crate::config::ChallengeConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{oneshot, OnceCell};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Challenge error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("Challenge provider unavailable: {0}")]
    Unavailable(String),

    #[error("Challenge verification timed out")]
    Timeout,

    #[error("Challenge widget error: {0}")]
    Widget(String),

    #[error("Challenge request superseded by a newer request")]
    Superseded,
}

/// Source of bot-challenge tokens.
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    async fn acquire_token(&self) -> Result<String, ChallengeError>;
}

/// Provider used when no challenge is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChallenge;

#[async_trait]
impl ChallengeProvider for NoChallenge {
    async fn acquire_token(&self) -> Result<String, ChallengeError> {
        Err(ChallengeError::Unavailable(
            "no challenge provider configured".to_string(),
        ))
    }
}

/// Provider handing out a token obtained elsewhere.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl ChallengeProvider for StaticToken {
    async fn acquire_token(&self) -> Result<String, ChallengeError> {
        Ok(self.0.clone())
    }
}

/// Handle of a rendered widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetHandle(pub String);

/// Low-level widget API in render/execute/callback style.
#[async_trait]
pub trait WidgetDriver: Send + Sync {
    /// Load the provider script. Called until it first succeeds.
    async fn load(&self) -> Result<(), ChallengeError>;

    /// Render the widget once; results are reported through `callbacks`.
    fn render(
        &self,
        config: &ChallengeConfig,
        callbacks: WidgetCallbacks,
    ) -> Result<WidgetHandle, ChallengeError>;

    /// Start a verification on a rendered widget.
    fn execute(&self, handle: &WidgetHandle) -> Result<(), ChallengeError>;
}

type Settlement = Result<String, ChallengeError>;

#[derive(Debug, Default)]
struct PendingSlot {
    request: Option<(u64, oneshot::Sender<Settlement>)>,
}

/// Callbacks handed to the widget at render time.
#[derive(Debug, Clone, Default)]
pub struct WidgetCallbacks {
    slot: Arc<Mutex<PendingSlot>>,
}

impl WidgetCallbacks {
    pub fn on_token(&self, token: impl Into<String>) {
        self.settle(Ok(token.into()));
    }

    pub fn on_error(&self, message: impl Into<String>) {
        self.settle(Err(ChallengeError::Widget(message.into())));
    }

    pub fn on_timeout(&self) {
        self.settle(Err(ChallengeError::Timeout));
    }

    fn lock(&self) -> MutexGuard<'_, PendingSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, result: Settlement) {
        match self.lock().request.take() {
            Some((id, sender)) => {
                debug!(request = id, ok = result.is_ok(), "Challenge request settled");
                // The requester may already have given up
                let _ = sender.send(result);
            }
            None => debug!("Challenge callback with no pending request ignored"),
        }
    }

    fn park(&self, id: u64, sender: oneshot::Sender<Settlement>) {
        if let Some((previous, sender)) = self.lock().request.replace((id, sender)) {
            debug!(request = previous, "Superseding pending challenge request");
            let _ = sender.send(Err(ChallengeError::Superseded));
        }
    }

    /// Drop the pending request if it is still `id`.
    fn abandon(&self, id: u64) {
        let mut slot = self.lock();
        if slot.request.as_ref().is_some_and(|(pending, _)| *pending == id) {
            slot.request = None;
        }
    }
}

/// Awaitable wrapper around a callback-style challenge widget.
///
/// Owns the loaded flag, the rendered widget handle and the pending slot,
/// so one instance serves every submission of a form.
pub struct CallbackChallenge<D> {
    driver: D,
    config: ChallengeConfig,
    loaded: OnceCell<()>,
    widget: Mutex<Option<WidgetHandle>>,
    callbacks: WidgetCallbacks,
    next_request: AtomicU64,
}

impl<D: WidgetDriver> CallbackChallenge<D> {
    pub fn new(driver: D, config: ChallengeConfig) -> Self {
        Self {
            driver,
            config,
            loaded: OnceCell::new(),
            widget: Mutex::new(None),
            callbacks: WidgetCallbacks::default(),
            next_request: AtomicU64::new(1),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn widget_handle(&self) -> Result<WidgetHandle, ChallengeError> {
        let mut widget = self.widget.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = widget.as_ref() {
            return Ok(handle.clone());
        }

        let handle = self.driver.render(&self.config, self.callbacks.clone())?;
        debug!(widget = %handle.0, action = %self.config.action, "Challenge widget rendered");
        *widget = Some(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl<D: WidgetDriver> ChallengeProvider for CallbackChallenge<D> {
    async fn acquire_token(&self) -> Result<String, ChallengeError> {
        // One deadline covers loading and settlement together
        let deadline = Instant::now() + self.config.load_timeout();

        match timeout_at(deadline, self.loaded.get_or_try_init(|| self.driver.load())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Challenge provider failed to load");
                return Err(e);
            }
            Err(_) => {
                warn!(budget_ms = self.config.load_timeout_ms, "Loading challenge provider timed out");
                return Err(ChallengeError::Timeout);
            }
        }

        let handle = self.widget_handle()?;
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.callbacks.park(id, sender);

        if let Err(e) = self.driver.execute(&handle) {
            self.callbacks.abandon(id);
            return Err(e);
        }

        match timeout_at(deadline, receiver).await {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(_)) => Err(ChallengeError::Superseded),
            Err(_) => {
                self.callbacks.abandon(id);
                warn!(request = id, "Challenge verification timed out");
                Err(ChallengeError::Timeout)
            }
        }
    }
}
