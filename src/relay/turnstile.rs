// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Server-side challenge token verification.

use super::RelayError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

/// Verification verdict from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Client for the provider's siteverify endpoint.
#[derive(Debug, Clone)]
pub struct TurnstileVerifier {
    verify_url: String,
    secret: String,
    client: reqwest::Client,
}

impl TurnstileVerifier {
    pub fn new(verify_url: String, secret: String, client: reqwest::Client) -> Self {
        Self {
            verify_url,
            secret,
            client,
        }
    }

    /// Check a token, returning whether the provider accepted it.
    pub async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, RelayError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest {
                secret: &self.secret,
                response: token,
                remoteip: remote_ip,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RelayError::Upstream {
                service: "turnstile",
                status: response.status().as_u16(),
            });
        }

        let verdict: VerifyResponse = response.json().await?;
        if verdict.success {
            debug!(hostname = ?verdict.hostname, "Challenge token verified");
        } else {
            warn!(error_codes = ?verdict.error_codes, "Challenge token rejected");
        }
        Ok(verdict.success)
    }
}
