// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Environment and logging setup shared by the binaries.

use std::path::Path;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line on stdout
    Json,
    /// Human-readable lines on stderr
    Compact,
}

/// Load a `.env` file into the process environment. Variables already set
/// are left alone. Returns whether a file was loaded.
pub fn load_dotenv(path: Option<&Path>) -> bool {
    match path {
        Some(path) => dotenvy::from_path(path).is_ok(),
        None => dotenvy::dotenv().is_ok(),
    }
}

/// Filter from `RUST_LOG`, falling back to `default`.
pub fn env_filter(default: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy()
}

/// Load `.env`, then install the global subscriber.
///
/// The order matters: `RUST_LOG` may itself come from `.env`.
pub fn init(format: LogFormat, default: Level) {
    load_dotenv(None);
    let filter = env_filter(default);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}
