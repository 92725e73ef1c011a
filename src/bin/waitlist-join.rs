// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Terminal front-end for the waitlist form.
//!
//! Runs one signup attempt through the full client pipeline. Rate-limit
//! state persists in a JSON file between runs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, Level};

use waitlist_gate::{
    challenge::{ChallengeProvider, NoChallenge, StaticToken},
    form::{SUCCESS_MESSAGE, SUCCESS_TITLE},
    store::FileStore,
    telemetry::{self, LogFormat},
    Config, FormInput, FormSurface, SubmissionClient, SubmissionLimiter, SubmitOutcome,
    UserMessage, WaitlistForm,
};

#[derive(Parser)]
#[command(name = "waitlist-join", about = "Join the waitlist from the terminal")]
struct Args {
    /// Email address to register
    email: String,

    /// Signup endpoint (overrides WAITLIST_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// File holding client-side rate-limit state
    #[arg(long, default_value = ".waitlist-state.json")]
    state_file: PathBuf,

    /// Challenge token obtained from the widget
    #[arg(long)]
    token: Option<String>,

    /// Value for the hidden honeypot field
    #[arg(long, hide = true)]
    honeypot: Option<String>,
}

struct TerminalSurface;

impl FormSurface for TerminalSurface {
    fn clear_errors(&self) {}

    fn show_field_error(&self, message: UserMessage) {
        eprintln!("{message}");
    }

    fn focus_field(&self) {}

    fn set_busy(&self, busy: bool) {
        if busy {
            eprintln!("Submitting...");
        }
    }

    fn show_success(&self, already_registered: bool) {
        println!("{SUCCESS_TITLE}");
        if already_registered {
            println!("This email was already registered.");
        }
        println!("{SUCCESS_MESSAGE}");
    }

    fn reset(&self) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    telemetry::init(LogFormat::Compact, Level::WARN);

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(endpoint) = args.endpoint {
        config.submission.endpoint = endpoint;
    }
    debug!(endpoint = %config.submission.endpoint, state_file = %args.state_file.display(), "Configured");

    let limiter = SubmissionLimiter::new(
        &config.rate_limit,
        Arc::new(FileStore::new(&args.state_file)),
    );
    let backend = Arc::new(SubmissionClient::new(config.submission.clone()));
    let challenge: Arc<dyn ChallengeProvider> = match args.token {
        Some(token) => Arc::new(StaticToken(token)),
        None => Arc::new(NoChallenge),
    };

    let form = WaitlistForm::new(config, limiter, backend, challenge, Arc::new(TerminalSurface));

    let mut input = FormInput::new(args.email);
    input.honeypot = args.honeypot;

    let code = match form.submit(&input).await {
        SubmitOutcome::Registered(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    };
    Ok(code)
}
