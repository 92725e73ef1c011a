// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Waitlist form controller.
//!
//! Drives one signup attempt through validation, bot detection, the
//! client-side rate limit, challenge acquisition and submission, and tells
//! a [`FormSurface`] what to display at each step.
//!
//! Rate-limit bookkeeping follows the backend's verdict: an identifier is
//! tracked only after a confirmed success, and cleared after any failure.

use crate::challenge::ChallengeProvider;
use crate::config::Config;
use crate::limiter::SubmissionLimiter;
use crate::submission::{SubmissionResult, WaitlistBackend};
use crate::validate::{is_bot, normalize_identifier, validate_email, ValidationError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

pub const SUCCESS_TITLE: &str = "You're on the waitlist!";
pub const SUCCESS_MESSAGE: &str = "We'll be in touch soon with updates.";

/// Short, non-technical messages shown next to the email field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMessage {
    EmailRequired,
    EmailInvalid,
    RateLimit,
    VerificationFailed,
    SubmissionError,
}

impl UserMessage {
    pub fn text(&self) -> &'static str {
        match self {
            Self::EmailRequired => "Email is required",
            Self::EmailInvalid => "Please enter a valid email address",
            Self::RateLimit => "Please wait before submitting again.",
            Self::VerificationFailed => "Verification failed. Please try again.",
            Self::SubmissionError => "Something went wrong. Please try again.",
        }
    }

    /// Message for a failed submission with the given status.
    pub fn for_status(status: Option<u16>) -> Self {
        match status {
            Some(403) => Self::VerificationFailed,
            Some(400) => Self::EmailRequired,
            _ => Self::SubmissionError,
        }
    }
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl From<&ValidationError> for UserMessage {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::Required => Self::EmailRequired,
            ValidationError::Invalid(_) => Self::EmailInvalid,
        }
    }
}

/// Where the form is in a signup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Idle,
    Validating,
    BotChecking,
    RateLimitChecking,
    ChallengeAcquiring,
    Submitting,
    Registered,
}

/// What the form shows. Implemented by whatever renders it.
pub trait FormSurface: Send + Sync {
    /// Hide any message from a previous attempt.
    fn clear_errors(&self);

    fn show_field_error(&self, message: UserMessage);

    fn focus_field(&self);

    /// Disable the submit control and show the busy indicator, or undo it.
    fn set_busy(&self, busy: bool);

    fn show_success(&self, already_registered: bool);

    /// Return to the empty, enabled form.
    fn reset(&self);
}

/// Values read from the form.
#[derive(Debug, Clone, Default)]
pub struct FormInput {
    pub email: String,
    /// Hidden field real users never fill
    pub honeypot: Option<String>,
}

impl FormInput {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            honeypot: None,
        }
    }

    pub fn with_honeypot(mut self, value: impl Into<String>) -> Self {
        self.honeypot = Some(value.into());
        self
    }
}

/// Result of one [`WaitlistForm::submit`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The backend accepted the identifier, or already had it
    Registered(SubmissionResult),
    /// Input failed validation; nothing was sent
    Rejected(UserMessage),
    /// Refused by the client-side rate limit; nothing was sent
    RateLimited,
    /// Honeypot filled; dropped without any feedback
    Discarded,
    /// The backend or transport failed; the form is ready for a retry
    Failed {
        message: UserMessage,
        status: Option<u16>,
    },
    /// Another attempt is in flight, or the form shows its success state
    Ignored(FormState),
}

/// Restores an abandoned attempt on drop.
struct Attempt<'a> {
    form: &'a WaitlistForm,
    finished: bool,
}

impl Attempt<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(state = ?self.form.state(), "Submission abandoned before completing");
        self.form.surface.set_busy(false);
        self.form.transition(FormState::Idle);
    }
}

/// Controller for one waitlist form.
pub struct WaitlistForm {
    config: Config,
    limiter: SubmissionLimiter,
    backend: Arc<dyn WaitlistBackend>,
    challenge: Arc<dyn ChallengeProvider>,
    surface: Arc<dyn FormSurface>,
    state: Mutex<FormState>,
    registrations: AtomicU64,
}

impl WaitlistForm {
    pub fn new(
        config: Config,
        limiter: SubmissionLimiter,
        backend: Arc<dyn WaitlistBackend>,
        challenge: Arc<dyn ChallengeProvider>,
        surface: Arc<dyn FormSurface>,
    ) -> Self {
        Self {
            config,
            limiter,
            backend,
            challenge,
            surface,
            state: Mutex::new(FormState::Idle),
            registrations: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> FormState {
        *self.lock_state()
    }

    pub fn limiter(&self) -> &SubmissionLimiter {
        &self.limiter
    }

    fn lock_state(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: FormState) {
        let mut state = self.lock_state();
        debug!(from = ?*state, to = ?next, "Form transition");
        *state = next;
    }

    /// Move from `Idle` to `Validating`, or report the current state.
    fn begin(&self) -> Result<(), FormState> {
        let mut state = self.lock_state();
        if *state != FormState::Idle {
            return Err(*state);
        }
        *state = FormState::Validating;
        Ok(())
    }

    /// Run one signup attempt.
    ///
    /// Dropping the returned future part-way returns the form to `Idle`
    /// with the submit control enabled.
    pub async fn submit(&self, input: &FormInput) -> SubmitOutcome {
        if let Err(state) = self.begin() {
            debug!(?state, "Submit ignored");
            return SubmitOutcome::Ignored(state);
        }

        let attempt = Attempt {
            form: self,
            finished: false,
        };
        let outcome = self.run(input).await;
        attempt.finish();
        outcome
    }

    async fn run(&self, input: &FormInput) -> SubmitOutcome {
        self.surface.clear_errors();
        let email = normalize_identifier(&input.email);

        if let Err(e) = validate_email(&email) {
            let message = UserMessage::from(&e);
            debug!(error = %e, "Validation failed");
            return self.halt(SubmitOutcome::Rejected(message), Some(message));
        }

        self.transition(FormState::BotChecking);
        if is_bot(input.honeypot.as_deref()) {
            warn!("Bot detected via honeypot");
            return self.halt(SubmitOutcome::Discarded, None);
        }

        self.transition(FormState::RateLimitChecking);
        if self.limiter.is_rate_limited(&email, self.config.rate_limit.window()) {
            info!(identifier = %email, "Submission refused by client-side rate limit");
            return self.halt(SubmitOutcome::RateLimited, Some(UserMessage::RateLimit));
        }

        self.transition(FormState::ChallengeAcquiring);
        let token = match self.challenge.acquire_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                // The backend decides whether a token is required
                warn!(error = %e, "Challenge unavailable, submitting without token");
                None
            }
        };

        self.transition(FormState::Submitting);
        self.surface.set_busy(true);

        match self.backend.submit(&email, token.as_deref()).await {
            Ok(result) => {
                self.limiter.track_submission(&email);
                self.registrations.fetch_add(1, Ordering::SeqCst);
                self.transition(FormState::Registered);
                self.surface.show_success(result.already_exists);
                info!(
                    identifier = %email,
                    status = result.status,
                    already_exists = result.already_exists,
                    "Joined waitlist"
                );
                SubmitOutcome::Registered(result)
            }
            Err(e) => {
                error!(identifier = %email, error = %e, "Waitlist submission error");
                self.limiter.clear_rate_limit(&email);

                let message = UserMessage::for_status(e.status());
                self.surface.show_field_error(message);
                self.surface.set_busy(false);
                self.transition(FormState::Idle);
                SubmitOutcome::Failed {
                    message,
                    status: e.status(),
                }
            }
        }
    }

    /// Stop before any network call, optionally pointing at the field.
    fn halt(&self, outcome: SubmitOutcome, message: Option<UserMessage>) -> SubmitOutcome {
        if let Some(message) = message {
            self.surface.show_field_error(message);
            self.surface.focus_field();
        }
        self.transition(FormState::Idle);
        outcome
    }

    /// Return a registered form to its initial state.
    ///
    /// Does nothing while an attempt is in flight.
    pub fn reset(&self) -> bool {
        {
            let mut state = self.lock_state();
            if !matches!(*state, FormState::Idle | FormState::Registered) {
                return false;
            }
            *state = FormState::Idle;
        }
        self.surface.set_busy(false);
        self.surface.reset();
        true
    }

    /// Reset after the configured delay, unless the form was reset (or
    /// registered again) in the meantime.
    pub async fn reset_after_delay(&self) -> bool {
        let registration = self.registrations.load(Ordering::SeqCst);
        tokio::time::sleep(self.config.form.auto_reset_delay()).await;

        if self.registrations.load(Ordering::SeqCst) != registration
            || self.state() != FormState::Registered
        {
            return false;
        }
        self.reset()
    }
}
