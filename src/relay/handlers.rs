// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the waitlist relay.

use super::database::{InsertOutcome, NewSignup, WaitlistTable};
use super::throttle::{CounterKind, RateLimitTable};
use super::turnstile::TurnstileVerifier;
use super::verification::{deliver, verification_link, LinkSender, TokenTable};
use crate::validate::{is_disposable, normalize_identifier, validate_email};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Shared relay state.
pub struct RelayState {
    pub verifier: TurnstileVerifier,
    pub table: WaitlistTable,
    pub limits: RateLimitTable,
    pub tokens: TokenTable,
    /// Page verification links point at
    pub link_base: Url,
    pub sender: Arc<dyn LinkSender>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Signup request. Accepts both the client's field names and the older
/// `email` / `turnstileToken` spelling.
#[derive(Debug, Deserialize)]
pub struct SignupBody {
    #[serde(default, alias = "email")]
    pub identifier: Option<String>,
    #[serde(
        default,
        rename = "challengeToken",
        alias = "turnstileToken",
        alias = "turnstile_token"
    )]
    pub challenge_token: Option<String>,
}

/// Acknowledgement row echoed to the client.
#[derive(Debug, Serialize)]
pub struct Acknowledgement {
    pub identifier: String,
}

/// Verification token, from the query string or a JSON body.
#[derive(Debug, Default, Deserialize)]
pub struct TokenParam {
    #[serde(default)]
    pub token: Option<String>,
}

/// Refused verification, flagged so a landing page can explain it.
#[derive(Debug, Serialize)]
pub struct VerifyRefusal {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
}

/// Successful verification.
#[derive(Debug, Serialize)]
pub struct Verified {
    pub success: bool,
    pub message: &'static str,
    pub email: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "waitlist-relay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn reject(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// First client address reported by the edge, if any.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("cf-connecting-ip")
        .or_else(|| header("x-forwarded-for").and_then(|v| v.split(',').next()))
        .or_else(|| header("x-real-ip"))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Accept a waitlist signup.
pub async fn signup(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: SignupBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Unparseable signup body");
            return reject(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(identifier), Some(token)) = (
        non_empty(request.identifier),
        non_empty(request.challenge_token),
    ) else {
        return reject(StatusCode::BAD_REQUEST, "Missing email or challenge token");
    };

    let email = normalize_identifier(&identifier);
    if validate_email(&email).is_err() {
        return reject(StatusCode::BAD_REQUEST, "Invalid email format");
    }
    if is_disposable(&email) {
        debug!("Disposable email refused");
        return reject(
            StatusCode::BAD_REQUEST,
            "Disposable email addresses are not allowed",
        );
    }

    let ip = client_ip(&headers);
    match state.verifier.verify(&token, ip.as_deref()).await {
        Ok(true) => {}
        Ok(false) => {
            info!(ip = ?ip, "Challenge verification failed");
            return reject(StatusCode::FORBIDDEN, "Challenge verification failed");
        }
        Err(e) => {
            error!(error = %e, "Challenge verification unavailable");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }

    let now = Utc::now();
    let email_counter = state.limits.check(&email, CounterKind::Email, now).await;
    if email_counter
        .as_ref()
        .is_some_and(|c| c.is_exhausted(CounterKind::Email))
    {
        info!("Email counter exhausted");
        return reject(StatusCode::TOO_MANY_REQUESTS, CounterKind::Email.refusal());
    }

    // Without a known address there is nothing to key the counter on
    let ip_counter = match ip.as_deref() {
        Some(ip) => state.limits.check(ip, CounterKind::Ip, now).await,
        None => None,
    };
    if ip_counter
        .as_ref()
        .is_some_and(|c| c.is_exhausted(CounterKind::Ip))
    {
        info!(ip = ?ip, "Address counter exhausted");
        return reject(StatusCode::TOO_MANY_REQUESTS, CounterKind::Ip.refusal());
    }

    let verification_token = match state.tokens.issue(&email, now).await {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "Verification token not issued");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let row = NewSignup {
        email: &email,
        verification_token: &verification_token,
        verified: false,
        ip_address: ip.as_deref(),
    };
    match state.table.insert(&row).await {
        Ok(InsertOutcome::Inserted { stored }) => {
            info!(ip = ?ip, "Signup stored");

            let email_record =
                state
                    .limits
                    .record(&email, CounterKind::Email, email_counter.as_ref(), now);
            match ip.as_deref() {
                Some(ip) => {
                    let ip_record =
                        state
                            .limits
                            .record(ip, CounterKind::Ip, ip_counter.as_ref(), now);
                    tokio::join!(email_record, ip_record);
                }
                None => email_record.await,
            }

            let link = verification_link(&state.link_base, &verification_token);
            deliver(state.sender.as_ref(), &email, &link).await;

            (
                StatusCode::CREATED,
                Json(vec![Acknowledgement {
                    identifier: stored.unwrap_or(email),
                }]),
            )
                .into_response()
        }
        Ok(InsertOutcome::Duplicate) => {
            info!(ip = ?ip, "Duplicate signup");
            reject(StatusCode::CONFLICT, "This email is already on the waitlist.")
        }
        Err(e) => {
            warn!(error = %e, "Signup not stored");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Database write failed")
        }
    }
}

fn refuse(error: &'static str, already_verified: bool, expired: bool) -> Response {
    let flag = |set: bool| set.then_some(true);
    (
        StatusCode::BAD_REQUEST,
        Json(VerifyRefusal {
            error,
            already_verified: flag(already_verified),
            expired: flag(expired),
        }),
    )
        .into_response()
}

/// Redeem a verification token from an emailed link (GET) or a page
/// posting it back (POST).
pub async fn verify_email(
    State(state): State<Arc<RelayState>>,
    method: Method,
    Query(query): Query<TokenParam>,
    body: Bytes,
) -> Response {
    let mut token = query.token;
    if token.is_none() && method == Method::POST && !body.is_empty() {
        match serde_json::from_slice::<TokenParam>(&body) {
            Ok(param) => token = param.token,
            Err(e) => {
                debug!(error = %e, "Unparseable verification body");
                return reject(StatusCode::BAD_REQUEST, "Invalid request body");
            }
        }
    }
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        return reject(StatusCode::BAD_REQUEST, "Missing verification token");
    };

    let record = match state.tokens.find(&token).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!("Unknown verification token");
            return reject(StatusCode::NOT_FOUND, "Invalid verification token");
        }
        Err(e) => {
            error!(error = %e, "Verification token lookup failed");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    if record.used {
        return refuse("This verification link has already been used", true, false);
    }
    let now = Utc::now();
    if record.is_expired(now) {
        return refuse(
            "This verification link has expired. Please request a new one.",
            false,
            true,
        );
    }

    match state.table.mark_verified(&record.email, &token, now).await {
        Ok(true) => {}
        Ok(false) => {
            error!("No signup row carries this verification token");
            return reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to verify email. Please contact support.",
            );
        }
        Err(e) => {
            error!(error = %e, "Failed to mark signup verified");
            return reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to verify email. Please contact support.",
            );
        }
    }

    // Verification already stands
    if let Err(e) = state.tokens.mark_used(&token).await {
        warn!(error = %e, "Failed to mark verification token used");
    }

    info!("Email verified");
    (
        StatusCode::OK,
        Json(Verified {
            success: true,
            message: "Email verified successfully! You'll receive waitlist updates.",
            email: record.email,
        }),
    )
        .into_response()
}
