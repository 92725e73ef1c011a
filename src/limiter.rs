// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Client-side submission throttling.
//!
//! Remembers when each identifier last submitted successfully and refuses
//! a repeat within the configured window. The record is advisory: every
//! storage fault fails open, so a broken store never blocks a signup.

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::store::{KeyValueStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identifier -> last successful submission (epoch milliseconds).
pub type RateLimitRecord = HashMap<String, i64>;

/// Per-identifier throttle over a durable key/value store.
#[derive(Debug, Clone)]
pub struct SubmissionLimiter {
    /// Absent when the environment offers no durable storage
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    storage_key: String,
}

impl SubmissionLimiter {
    /// Create a limiter over `store` using the system clock.
    pub fn new(config: &RateLimitConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(config, Some(store), Arc::new(SystemClock))
    }

    /// Create a limiter with no storage behind it. It never limits.
    pub fn without_storage(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, None, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &RateLimitConfig,
        store: Option<Arc<dyn KeyValueStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            storage_key: config.storage_key.clone(),
        }
    }

    /// Whether `identifier` submitted less than `window` ago.
    ///
    /// Returns `false` for an empty identifier, a zero window, missing
    /// storage, unreadable storage or corrupt data.
    pub fn is_rate_limited(&self, identifier: &str, window: Duration) -> bool {
        if window.is_zero() {
            return false;
        }
        let Some(store) = self.usable_store(identifier) else {
            return false;
        };

        let record = match read_record(store, &self.storage_key) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Rate limit check failed, allowing submission");
                return false;
            }
        };

        let Some(&last_submitted_at) = record.get(identifier) else {
            return false;
        };

        let elapsed = self.clock.now_millis().saturating_sub(last_submitted_at);
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let limited = elapsed < window_ms;
        debug!(identifier, elapsed_ms = elapsed, window_ms, limited, "Rate limit checked");
        limited
    }

    /// Record a successful submission for `identifier` at the current time.
    pub fn track_submission(&self, identifier: &str) {
        let Some(store) = self.usable_store(identifier) else {
            return;
        };

        let mut record = match read_record(store, &self.storage_key) {
            Ok(record) => record,
            Err(e @ StoreError::Corrupt(_)) => {
                warn!(error = %e, "Discarding unparseable rate limit record");
                RateLimitRecord::new()
            }
            // Writing now could overwrite entries we failed to read
            Err(e) => {
                warn!(identifier, error = %e, "Failed to read rate limit record, not tracking");
                return;
            }
        };
        record.insert(identifier.to_string(), self.clock.now_millis());

        match write_record(store, &self.storage_key, &record) {
            Ok(()) => info!(identifier, "Rate limit applied"),
            Err(e) => warn!(identifier, error = %e, "Failed to persist submission timestamp"),
        }
    }

    /// Forget any submission recorded for `identifier`.
    pub fn clear_rate_limit(&self, identifier: &str) {
        let Some(store) = self.usable_store(identifier) else {
            return;
        };

        let mut record = match read_record(store, &self.storage_key) {
            Ok(record) => record,
            Err(e) => {
                warn!(identifier, error = %e, "Failed to clear rate limit");
                return;
            }
        };

        if record.remove(identifier).is_none() {
            return;
        }

        match write_record(store, &self.storage_key, &record) {
            Ok(()) => info!(identifier, "Rate limit cleared"),
            Err(e) => warn!(identifier, error = %e, "Failed to clear rate limit"),
        }
    }

    fn usable_store(&self, identifier: &str) -> Option<&dyn KeyValueStore> {
        if identifier.is_empty() {
            return None;
        }
        self.store.as_deref()
    }
}

fn read_record(store: &dyn KeyValueStore, key: &str) -> Result<RateLimitRecord, StoreError> {
    match store.get(key)? {
        // A stored `null` reads as an empty record
        Some(raw) => Ok(serde_json::from_str::<Option<RateLimitRecord>>(&raw)?.unwrap_or_default()),
        None => Ok(RateLimitRecord::new()),
    }
}

fn write_record(
    store: &dyn KeyValueStore,
    key: &str,
    record: &RateLimitRecord,
) -> Result<(), StoreError> {
    store.set(key, &serde_json::to_string(record)?)
}
