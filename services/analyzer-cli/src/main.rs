//! Circuit Analyzer command-line client
//!
//! Single-binary client that:
//! 1. Signs in against the Circuit Analyzer API and keeps the session on disk
//! 2. Sends authenticated API requests, renewing the access token when it
//!    expires
//! 3. Exits with status 2 when the session can no longer be renewed

mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use session_auth::CURRENT_USER_PATH;
use session_renewal::{EndReason, Error as SessionError, SessionClient};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ApiRequest;

use crate::cli::{Cli, Command};
use crate::config::Config;

/// Exit status when the user has to sign in again.
const EXIT_SESSION_EXPIRED: u8 = 2;

const HEALTH_PATH: &str = "/api/health";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if session_expired(&e) => {
            eprintln!("error: {e:#}");
            eprintln!("sign in again with `circuit-analyzer login <email> <password>`");
            ExitCode::from(EXIT_SESSION_EXPIRED)
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with LOG_LEVEL / RUST_LOG support. Logs go to stderr
/// so command output on stdout stays machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn session_expired(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<SessionError>()
            .is_some_and(SessionError::is_auth_expired)
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = Config::resolve_path(cli.config);
    debug!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let credentials_path = config.session.credentials_path.clone();
    if let Some(dir) = credentials_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        credentials = %credentials_path.display(),
        "configuration loaded"
    );

    let client = SessionClient::connect(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
        Some(credentials_path),
        Arc::new(report_session_end),
    )
    .await
    .context("failed to open session")?;

    execute(&client, cli.command).await
}

/// Re-authentication entry point: the session is gone, tell the user.
fn report_session_end(reason: &EndReason) {
    match reason {
        EndReason::SignedOut => eprintln!("signed out"),
        other => eprintln!("session ended: {other}"),
    }
}

async fn execute(client: &SessionClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            client.sign_in(&email, &password).await.context("sign-in failed")?;
            println!("signed in as {email}");
        }
        Command::Signup {
            email,
            name,
            password,
        } => {
            client
                .sign_up(&email, &name, &password)
                .await
                .context("sign-up failed")?;
            println!("account created, signed in as {email}");
        }
        Command::Google { id_token } => {
            client
                .sign_in_google(&id_token)
                .await
                .context("Google sign-in failed")?;
            println!("signed in with Google");
        }
        Command::Logout => {
            client.sign_out().await;
        }
        Command::Whoami => {
            let user: Value = client.get_json(CURRENT_USER_PATH).await?;
            print_json(&user)?;
        }
        Command::Health => {
            let health: Value = client.get_json(HEALTH_PATH).await?;
            print_json(&health)?;
        }
        Command::Request { method, path, body } => {
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = &body {
                request = request.json(body)?;
            }
            let response = client.send(request).await?;
            eprintln!("{}", response.status());
            println!("{}", response.text());
            if !response.is_success() {
                anyhow::bail!("request failed with {}", response.status());
            }
        }
    }
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
