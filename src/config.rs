// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the waitlist signup pipeline.
//!
//! Every section has serde defaults so a partial config (or none at all)
//! still yields a working pipeline pointed at a local relay.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Configuration for the waitlist form pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote submission endpoint
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Bot-challenge widget configuration
    #[serde(default)]
    pub challenge: ChallengeConfig,

    /// Client-side throttling configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Form behaviour
    #[serde(default)]
    pub form: FormConfig,
}

/// Backend the Submission Client talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Signup endpoint (default: http://127.0.0.1:8787/signup)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key sent as `apikey` and bearer token when talking to the
    /// database REST API directly
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Challenge widget configuration. The site key is public.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_site_key")]
    pub site_key: String,

    /// Action label reported to the provider (default: waitlist_signup)
    #[serde(default = "default_action")]
    pub action: String,

    /// Container the widget renders into (default: turnstile-widget)
    #[serde(default = "default_widget_id")]
    pub widget_id: String,

    /// Budget for one token acquisition, script load included,
    /// in milliseconds (default: 5000)
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

/// Client-side submission throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window during which a repeat submission is refused in milliseconds
    /// (default: 30000)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Storage key holding the serialized record map
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

/// Form controller behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    /// Delay before a registered form returns to idle in milliseconds
    /// (default: 4000)
    #[serde(default = "default_auto_reset_ms")]
    pub auto_reset_ms: u64,
}

/// Configuration for the relay service sitting in front of the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Server bind address (default: 0.0.0.0:8787)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the hosted database project
    pub supabase_url: String,

    /// Service-role key used for inserts. Never sent to browsers.
    pub supabase_service_key: String,

    /// Table receiving signups (default: waitlist)
    #[serde(default = "default_table")]
    pub table: String,

    /// Secret half of the challenge key pair
    pub turnstile_secret: String,

    /// Token verification endpoint
    #[serde(default = "default_verify_url")]
    pub turnstile_verify_url: String,

    /// Page the emailed verification link points at; the token is
    /// appended as `?token=`
    #[serde(default = "default_verify_link_base")]
    pub verify_link_base: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_table() -> String {
    "waitlist".to_string()
}

fn default_verify_url() -> String {
    "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
}

fn default_verify_link_base() -> String {
    "http://127.0.0.1:8787/verify-email".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8787/signup".to_string()
}

fn default_site_key() -> String {
    "1x00000000000000000000AA".to_string() // Cloudflare always-pass test key
}

fn default_action() -> String {
    "waitlist_signup".to_string()
}

fn default_widget_id() -> String {
    "turnstile-widget".to_string()
}

fn default_load_timeout_ms() -> u64 {
    5000
}

fn default_window_ms() -> u64 {
    30000
}

fn default_storage_key() -> String {
    "waitlistRateLimit".to_string()
}

fn default_auto_reset_ms() -> u64 {
    4000
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            site_key: default_site_key(),
            action: default_action(),
            widget_id: default_widget_id(),
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            storage_key: default_storage_key(),
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            auto_reset_ms: default_auto_reset_ms(),
        }
    }
}

impl ChallengeConfig {
    /// Get the token acquisition budget
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl RateLimitConfig {
    /// Get the throttling window
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl FormConfig {
    pub fn auto_reset_delay(&self) -> Duration {
        Duration::from_millis(self.auto_reset_ms)
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Config {
            submission: SubmissionConfig {
                endpoint: lookup("WAITLIST_ENDPOINT").unwrap_or_else(default_endpoint),
                api_key: lookup("WAITLIST_API_KEY").filter(|k| !k.is_empty()),
            },
            challenge: ChallengeConfig {
                site_key: lookup("TURNSTILE_SITE_KEY").unwrap_or_else(default_site_key),
                action: lookup("TURNSTILE_ACTION").unwrap_or_else(default_action),
                widget_id: lookup("TURNSTILE_WIDGET_ID").unwrap_or_else(default_widget_id),
                load_timeout_ms: parse_u64("TURNSTILE_LOAD_TIMEOUT_MS", default_load_timeout_ms()),
            },
            rate_limit: RateLimitConfig {
                window_ms: parse_u64("WAITLIST_RATE_LIMIT_MS", default_window_ms()),
                ..Default::default()
            },
            form: FormConfig {
                auto_reset_ms: parse_u64("WAITLIST_AUTO_RESET_MS", default_auto_reset_ms()),
            },
        }
    }
}

impl RelayConfig {
    /// Load relay configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let config = Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(default_bind_addr),
            supabase_url: required("SUPABASE_URL")?,
            supabase_service_key: required("SUPABASE_SERVICE_KEY")?,
            table: lookup("SUPABASE_TABLE").unwrap_or_else(default_table),
            turnstile_secret: required("TURNSTILE_SECRET_KEY")?,
            turnstile_verify_url: lookup("TURNSTILE_VERIFY_URL").unwrap_or_else(default_verify_url),
            verify_link_base: lookup("VERIFY_LINK_BASE").unwrap_or_else(default_verify_link_base),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every configured URL parses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.supabase_url).map_err(|source| ConfigError::InvalidUrl {
            var: "SUPABASE_URL",
            source,
        })?;
        Url::parse(&self.turnstile_verify_url).map_err(|source| ConfigError::InvalidUrl {
            var: "TURNSTILE_VERIFY_URL",
            source,
        })?;
        self.verify_link_base()?;
        Ok(())
    }

    /// Root of the database's REST interface; tables hang off it.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url.trim_end_matches('/'))
    }

    /// Parsed verification link base.
    pub fn verify_link_base(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.verify_link_base).map_err(|source| ConfigError::InvalidUrl {
            var: "VERIFY_LINK_BASE",
            source,
        })
    }
}
