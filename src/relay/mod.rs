// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Edge relay between browsers and the waitlist database.
//!
//! Browsers never hold database credentials. The relay checks the
//! challenge token, normalizes the email, applies the per-email and
//! per-address counters and performs the insert with the service key,
//! answering in the shape the submission client reconciles. Each signup
//! gets a verification token redeemed through `/verify-email`.

pub mod database;
pub mod handlers;
pub mod throttle;
pub mod turnstile;
pub mod verification;

use crate::config::{ConfigError, RelayConfig};
use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use database::{InsertOutcome, RestClient, WaitlistTable};
pub use handlers::RelayState;
pub use throttle::{CounterKind, RateLimitTable};
pub use turnstile::TurnstileVerifier;
pub use verification::{LinkSender, LogSender, TokenTable};

/// Relay error types.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream {service} answered with status {status}")]
    Upstream { service: &'static str, status: u16 },
}

impl RelayState {
    /// Build relay state from configuration, sharing one HTTP client.
    /// Verification links are logged until a sender is swapped in.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::new();
        let rest = RestClient::new(
            config.rest_url(),
            config.supabase_service_key.clone(),
            client.clone(),
        );
        Ok(Self {
            verifier: TurnstileVerifier::new(
                config.turnstile_verify_url.clone(),
                config.turnstile_secret.clone(),
                client,
            ),
            table: WaitlistTable::new(rest.clone(), config.table.clone()),
            limits: RateLimitTable::new(rest.clone()),
            tokens: TokenTable::new(rest),
            link_base: config.verify_link_base()?,
            sender: Arc::new(LogSender),
        })
    }
}

/// Build the relay router.
pub fn router(state: Arc<RelayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("prefer"),
        ]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::health))
        .route("/signup", post(handlers::signup))
        .route(
            "/verify-email",
            get(handlers::verify_email).post(handlers::verify_email),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
