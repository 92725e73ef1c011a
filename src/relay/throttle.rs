// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Server-side submission counters kept in the `rate_limits` table.
//!
//! One row per (identifier, kind). A row whose window has lapsed reads as
//! absent, and the next recorded signup starts a fresh window. Both the
//! check and the update fail open: an unreachable table never blocks a
//! signup.

use super::database::{expect_success, RestClient};
use super::RelayError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TABLE: &str = "rate_limits";

/// What a counter is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    Email,
    Ip,
}

impl CounterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::Email => "email",
            CounterKind::Ip => "ip",
        }
    }

    /// Signups allowed per window.
    pub fn max(self) -> u32 {
        match self {
            CounterKind::Email => 1,
            CounterKind::Ip => 5,
        }
    }

    pub fn window(self) -> Duration {
        match self {
            CounterKind::Email => Duration::hours(24),
            CounterKind::Ip => Duration::hours(1),
        }
    }

    /// Error shown when the counter is exhausted.
    pub fn refusal(self) -> &'static str {
        match self {
            CounterKind::Email => {
                "You've already joined the waitlist. Check your email for verification."
            }
            CounterKind::Ip => "Too many submissions from this location. Please try again later.",
        }
    }
}

/// A live counter row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Counter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl Counter {
    pub fn is_exhausted(&self, kind: CounterKind) -> bool {
        self.count >= kind.max()
    }
}

#[derive(Debug, Serialize)]
struct CounterRow<'a> {
    identifier: &'a str,
    #[serde(rename = "type")]
    kind: CounterKind,
    count: u32,
    window_start: DateTime<Utc>,
}

/// Client for the counter table.
#[derive(Debug, Clone)]
pub struct RateLimitTable {
    rest: RestClient,
}

impl RateLimitTable {
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Counter for `identifier` whose window is still open at `now`.
    pub async fn current(
        &self,
        identifier: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
    ) -> Result<Option<Counter>, RelayError> {
        let since = (now - kind.window()).to_rfc3339_opts(SecondsFormat::Millis, true);
        let response = self
            .rest
            .request(Method::GET, TABLE)
            .query(&[
                ("select", "count,window_start".to_string()),
                ("identifier", format!("eq.{identifier}")),
                ("type", format!("eq.{}", kind.as_str())),
                ("window_start", format!("gte.{since}")),
            ])
            .send()
            .await?;

        let response = expect_success(response, TABLE).await?;
        let rows: Vec<Counter> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    /// Like [`current`](Self::current), but a failed lookup counts as no
    /// counter.
    pub async fn check(
        &self,
        identifier: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
    ) -> Option<Counter> {
        match self.current(identifier, kind, now).await {
            Ok(counter) => counter,
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "Rate limit check failed, allowing");
                None
            }
        }
    }

    /// Count one more signup against `identifier`, continuing the open
    /// window in `current` or starting a new one at `now`. Failures are
    /// logged and dropped.
    pub async fn record(
        &self,
        identifier: &str,
        kind: CounterKind,
        current: Option<&Counter>,
        now: DateTime<Utc>,
    ) {
        let row = CounterRow {
            identifier,
            kind,
            count: current.map_or(1, |c| c.count.saturating_add(1)),
            window_start: current.map_or(now, |c| c.window_start),
        };

        let result = async {
            let response = self
                .rest
                .request(Method::POST, TABLE)
                .query(&[("on_conflict", "identifier,type")])
                .header("Prefer", "resolution=merge-duplicates")
                .json(&row)
                .send()
                .await?;
            expect_success(response, TABLE).await
        }
        .await;

        match result {
            Ok(_) => debug!(kind = kind.as_str(), count = row.count, "Rate limit recorded"),
            Err(e) => warn!(kind = kind.as_str(), error = %e, "Failed to record rate limit"),
        }
    }
}
