// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Email verification tokens and the links that carry them.

use super::database::{expect_success, RestClient};
use super::RelayError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const TABLE: &str = "verification_tokens";

/// How long an issued token stays redeemable.
pub fn token_lifetime() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Serialize)]
struct NewToken<'a> {
    email: &'a str,
    token: &'a str,
    expires_at: DateTime<Utc>,
    used: bool,
}

/// A stored token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenRecord {
    pub email: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Client for the token table.
#[derive(Debug, Clone)]
pub struct TokenTable {
    rest: RestClient,
}

impl TokenTable {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Store a fresh random token for `email` and return it.
    pub async fn issue(&self, email: &str, now: DateTime<Utc>) -> Result<String, RelayError> {
        let token = Uuid::new_v4().to_string();
        let response = self
            .rest
            .request(Method::POST, TABLE)
            .json(&NewToken {
                email,
                token: &token,
                expires_at: now + token_lifetime(),
                used: false,
            })
            .send()
            .await?;

        expect_success(response, TABLE).await?;
        debug!("Verification token issued");
        Ok(token)
    }

    pub async fn find(&self, token: &str) -> Result<Option<TokenRecord>, RelayError> {
        let response = self
            .rest
            .request(Method::GET, TABLE)
            .query(&[
                ("select", "email,expires_at,used".to_string()),
                ("token", format!("eq.{token}")),
            ])
            .send()
            .await?;

        let response = expect_success(response, TABLE).await?;
        let rows: Vec<TokenRecord> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn mark_used(&self, token: &str) -> Result<(), RelayError> {
        let response = self
            .rest
            .request(Method::PATCH, TABLE)
            .query(&[("token", format!("eq.{token}"))])
            .json(&serde_json::json!({ "used": true }))
            .send()
            .await?;

        expect_success(response, TABLE).await?;
        Ok(())
    }
}

/// Link a new signup follows to confirm their address.
pub fn verification_link(base: &Url, token: &str) -> Url {
    let mut link = base.clone();
    link.query_pairs_mut().append_pair("token", token);
    link
}

/// Delivers verification links.
#[async_trait]
pub trait LinkSender: Send + Sync {
    async fn send(&self, email: &str, link: &Url) -> anyhow::Result<()>;
}

/// Writes the link to the log instead of mailing it.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl LinkSender for LogSender {
    async fn send(&self, email: &str, link: &Url) -> anyhow::Result<()> {
        info!(email, link = %link, "Verification link");
        Ok(())
    }
}

/// Hand the link to `sender`; a failed delivery never fails the signup.
pub async fn deliver(sender: &dyn LinkSender, email: &str, link: &Url) {
    if let Err(e) = sender.send(email, link).await {
        warn!(error = %e, "Failed to send verification link");
    }
}
