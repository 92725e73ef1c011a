// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Table access over the database's REST interface.

use super::RelayError;
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

/// Authenticated client for the REST interface, shared by every table.
#[derive(Debug, Clone)]
pub struct RestClient {
    rest_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl RestClient {
    pub fn new(rest_url: String, service_key: String, client: reqwest::Client) -> Self {
        Self {
            rest_url,
            service_key,
            client,
        }
    }

    /// Start a request against `table` carrying the service credentials.
    pub fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

/// Pass a successful response through, logging and mapping anything else.
///
/// Error bodies may hold internal details; they are logged, never forwarded.
pub async fn expect_success(response: Response, table: &str) -> Result<Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(table, status = status.as_u16(), body = %body, "Database request failed");
    Err(RelayError::Upstream {
        service: "database",
        status: status.as_u16(),
    })
}

/// Rows returned under `Prefer: return=representation`. Anything that is
/// not an array reads as no rows.
pub async fn rows(response: Response) -> Vec<Value> {
    match response.json::<Value>().await {
        Ok(Value::Array(rows)) => rows,
        _ => Vec::new(),
    }
}

/// Outcome of inserting a signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row created; carries the email the database stored, when returned
    Inserted { stored: Option<String> },
    /// Unique constraint hit: the email is already present
    Duplicate,
}

/// A signup row as written.
#[derive(Debug, Serialize)]
pub struct NewSignup<'a> {
    pub email: &'a str,
    pub verification_token: &'a str,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<&'a str>,
}

/// Client for the signup table.
#[derive(Debug, Clone)]
pub struct WaitlistTable {
    rest: RestClient,
    table: String,
}

impl WaitlistTable {
    pub fn new(rest: RestClient, table: String) -> Self {
        Self { rest, table }
    }

    /// Insert a signup whose email is already normalized.
    pub async fn insert(&self, signup: &NewSignup<'_>) -> Result<InsertOutcome, RelayError> {
        let response = self
            .rest
            .request(Method::POST, &self.table)
            .header("Prefer", "return=representation")
            .json(signup)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            debug!("Signup already present");
            return Ok(InsertOutcome::Duplicate);
        }

        let response = expect_success(response, &self.table).await?;
        let stored = rows(response)
            .await
            .first()
            .and_then(|row| row.get("email"))
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!(returned = stored.is_some(), "Signup stored");
        Ok(InsertOutcome::Inserted { stored })
    }

    /// Flag the row holding `email` and `token` as verified. Returns
    /// whether a row matched.
    pub async fn mark_verified(
        &self,
        email: &str,
        token: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, RelayError> {
        let response = self
            .rest
            .request(Method::PATCH, &self.table)
            .query(&[
                ("email", format!("eq.{email}")),
                ("verification_token", format!("eq.{token}")),
            ])
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "verified": true, "verified_at": now }))
            .send()
            .await?;

        let response = expect_success(response, &self.table).await?;
        Ok(!rows(response).await.is_empty())
    }
}
