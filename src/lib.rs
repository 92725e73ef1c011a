// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Waitlist Gate
//!
//! The signup pipeline behind a waitlist form:
//!
//! - Email validation and honeypot bot detection
//! - Client-side per-email throttling over durable storage (fail-open)
//! - Challenge token acquisition with a timeout budget
//! - Submission with acknowledgement reconciliation
//! - Form orchestration that only throttles confirmed signups
//! - An edge relay that verifies tokens and writes to the database

pub mod challenge;
pub mod clock;
pub mod config;
pub mod form;
pub mod limiter;
pub mod relay;
pub mod store;
pub mod submission;
pub mod telemetry;
pub mod validate;

pub use config::{Config, RelayConfig};
pub use form::{FormInput, FormState, FormSurface, SubmitOutcome, UserMessage, WaitlistForm};
pub use limiter::SubmissionLimiter;
pub use submission::{SubmissionClient, SubmissionError, SubmissionResult, WaitlistBackend};
