// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Waitlist submission client.
//!
//! Sends one signup request and reconciles the response:
//! - 2xx with a matching acknowledgement (or no JSON body) is a success
//! - 409 means the identifier is already on the waitlist, also a success
//! - anything else is a [`SubmissionError`]
//!
//! A 2xx whose declared JSON body cannot be parsed is treated as a failure:
//! the backend claimed success without a verifiable acknowledgement.

use crate::config::SubmissionConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    /// HTTP status returned by the backend
    pub status: u16,
    /// Record echoed back by the backend, when it returned one
    pub record: Option<Value>,
    /// The identifier was already on the waitlist
    pub already_exists: bool,
}

/// Submission error types.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("submission failed with status {status}")]
    Status { status: u16 },

    #[error("response with status {status} was not valid JSON: {reason}")]
    MalformedBody { status: u16, reason: String },

    #[error("acknowledgement missing or mismatched")]
    AcknowledgementMismatch { status: u16 },

    #[error("submission request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl SubmissionError {
    /// HTTP status associated with the failure, if the request completed.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status }
            | Self::MalformedBody { status, .. }
            | Self::AcknowledgementMismatch { status } => Some(*status),
            Self::Network(_) => None,
        }
    }
}

/// Anything that accepts waitlist submissions.
#[async_trait]
pub trait WaitlistBackend: Send + Sync {
    async fn submit(
        &self,
        identifier: &str,
        challenge_token: Option<&str>,
    ) -> Result<SubmissionResult, SubmissionError>;
}

/// Request body sent to the signup endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest<'a> {
    pub identifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_token: Option<&'a str>,
}

/// HTTP client for the signup endpoint.
#[derive(Debug, Clone)]
pub struct SubmissionClient {
    config: SubmissionConfig,
    client: reqwest::Client,
}

impl SubmissionClient {
    pub fn new(config: SubmissionConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: SubmissionConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl WaitlistBackend for SubmissionClient {
    async fn submit(
        &self,
        identifier: &str,
        challenge_token: Option<&str>,
    ) -> Result<SubmissionResult, SubmissionError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header(ACCEPT, "application/json")
            .header("Prefer", "return=representation")
            .json(&SignupRequest {
                identifier,
                challenge_token,
            });

        if let Some(key) = &self.config.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        debug!(
            endpoint = %self.config.endpoint,
            has_token = challenge_token.is_some(),
            "Submitting to waitlist"
        );

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::CONFLICT {
            info!(status = status.as_u16(), "Identifier already on waitlist");
            return Ok(SubmissionResult {
                status: status.as_u16(),
                record: None,
                already_exists: true,
            });
        }

        if !status.is_success() {
            error!(status = status.as_u16(), "Waitlist submission failed");
            return Err(SubmissionError::Status {
                status: status.as_u16(),
            });
        }

        if status == StatusCode::NO_CONTENT || !declares_json(response.headers().get(CONTENT_TYPE))
        {
            // Row-level security can suppress the returned representation
            info!(status = status.as_u16(), "Waitlist submission accepted without body");
            return Ok(SubmissionResult {
                status: status.as_u16(),
                record: None,
                already_exists: false,
            });
        }

        let body = response.bytes().await?;
        let parsed: Value = serde_json::from_slice(&body).map_err(|e| {
            error!(status = status.as_u16(), error = %e, "Waitlist response was not valid JSON");
            SubmissionError::MalformedBody {
                status: status.as_u16(),
                reason: e.to_string(),
            }
        })?;

        reconcile(status.as_u16(), identifier, parsed)
    }
}

/// Check the acknowledgement in a parsed 2xx body against the submitted
/// identifier.
pub fn reconcile(
    status: u16,
    identifier: &str,
    body: Value,
) -> Result<SubmissionResult, SubmissionError> {
    let candidate = match body {
        Value::Array(items) => items.into_iter().next(),
        Value::Object(_) => Some(body),
        _ => None,
    };

    let acknowledged = candidate
        .as_ref()
        .and_then(acknowledged_identifier)
        .is_some_and(|echoed| echoed.to_lowercase() == identifier.to_lowercase());

    if !acknowledged {
        error!(status, identifier, "Waitlist acknowledgement missing or mismatched");
        return Err(SubmissionError::AcknowledgementMismatch { status });
    }

    info!(status, "Waitlist submission acknowledged");
    Ok(SubmissionResult {
        status,
        record: candidate,
        already_exists: false,
    })
}

/// The identifier a record acknowledges, under `identifier` or `email`.
fn acknowledged_identifier(record: &Value) -> Option<&str> {
    record
        .get("identifier")
        .or_else(|| record.get("email"))
        .and_then(Value::as_str)
}

fn declares_json(content_type: Option<&HeaderValue>) -> bool {
    content_type
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_lowercase())
        .is_some_and(|media| media == "application/json" || media.ends_with("+json"))
}
