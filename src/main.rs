// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Waitlist Relay Service
//!
//! Edge proxy between the waitlist form and the hosted database:
//!
//! - CORS preflight handling for browser clients
//! - Challenge token verification
//! - Email normalization and validation
//! - Per-email and per-address counters, exhausted ones answered with 429
//! - Insert with the service key, duplicates reported as 409
//! - Verification tokens, redeemed at `/verify-email`
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! honoured):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8787)
//! - `SUPABASE_URL`: Database project URL (required)
//! - `SUPABASE_SERVICE_KEY`: Service-role key (required)
//! - `SUPABASE_TABLE`: Signup table (default: waitlist)
//! - `TURNSTILE_SECRET_KEY`: Challenge secret (required)
//! - `TURNSTILE_VERIFY_URL`: Verification endpoint (default: Cloudflare siteverify)
//! - `VERIFY_LINK_BASE`: Page verification links point at
//!   (default: http://127.0.0.1:8787/verify-email)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};

use waitlist_gate::{
    config::RelayConfig,
    relay::{self, RelayState},
    telemetry::{self, LogFormat},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init(LogFormat::Json, Level::INFO);

    let config = RelayConfig::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        table = %config.table,
        "Starting waitlist relay"
    );

    let state = Arc::new(RelayState::from_config(&config)?);
    let app = relay::router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
