//! keyfob - command-line driver for the session lifecycle library.
//!
//! Wires the composition root: one `AuthConfig`, one `SessionManager`,
//! hydrated once at startup, then a single lifecycle command.

use std::io::{self, Write as _};
use std::sync::Arc;

use anyhow::{Context, Result};
use keyfob_core::{token, AuthConfig, SessionManager};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn usage() -> ! {
    eprintln!("Usage: keyfob <login [--remember] | status | refresh | logout>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  KEYFOB_AUTH_URL   base URL of the authentication endpoints (required)");
    eprintln!("  KEYFOB_API_URL    base URL of the data API (required)");
    eprintln!("  KEYFOB_EMAIL      login email (prompted if unset)");
    eprintln!("  KEYFOB_PASSWORD   login password (prompted if unset)");
    std::process::exit(2);
}

fn build_session() -> Result<Arc<SessionManager>> {
    let auth_url =
        std::env::var("KEYFOB_AUTH_URL").context("KEYFOB_AUTH_URL must be set")?;
    let api_url = std::env::var("KEYFOB_API_URL").context("KEYFOB_API_URL must be set")?;

    let config = AuthConfig::new(auth_url, api_url)?;
    let session = SessionManager::with_http(config)
        .map_err(|e| anyhow::anyhow!("Failed to build session manager: {}", e))?;
    session.hydrate();
    Ok(Arc::new(session))
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn cmd_login(session: &SessionManager, remember: bool) -> Result<()> {
    if session.is_authenticated() {
        println!("Already signed in as {}.", whoami(session));
        return Ok(());
    }

    let email = match std::env::var("KEYFOB_EMAIL") {
        Ok(email) if !email.is_empty() => email,
        _ => prompt_line("Email")?,
    };
    let password = match std::env::var("KEYFOB_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    if session.login(&email, &password, remember).await {
        println!("Signed in as {}.", whoami(session));
    } else {
        let reason = session
            .error()
            .unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("Login failed: {}", reason);
    }
    Ok(())
}

fn cmd_status(session: &SessionManager) {
    if !session.is_authenticated() {
        println!("Not signed in.");
        return;
    }

    println!("Signed in as {}.", whoami(session));
    if !session.roles().is_empty() {
        println!("Roles: {}", session.roles().join(", "));
    }
    if let Some(org) = session.organization() {
        println!("Organization: {}", org);
    }
    if let Some(access) = session.access_token() {
        match token::decode_expiry(&access) {
            Some(expiry) => println!("Access credential expires at {}.", expiry),
            None => println!("Access credential has no readable expiry."),
        }
    }
}

async fn cmd_refresh(session: &SessionManager) -> Result<()> {
    match session.refresh_access_token().await {
        Some(_) => {
            println!("Access credential refreshed.");
            Ok(())
        }
        None => anyhow::bail!("Refresh failed; signed out."),
    }
}

fn whoami(session: &SessionManager) -> String {
    session
        .user()
        .map(|u| {
            if u.display_name.is_empty() {
                u.email
            } else {
                u.display_name
            }
        })
        .unwrap_or_else(|| "unknown user".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(|s| s.as_str()) else {
        usage();
    };

    let session = build_session()?;
    info!(command, "keyfob starting");

    match command {
        "login" => {
            let remember = args.iter().any(|a| a == "--remember");
            cmd_login(&session, remember).await?;
        }
        "status" => cmd_status(&session),
        "refresh" => cmd_refresh(&session).await?,
        "logout" => {
            session.logout();
            println!("Signed out.");
        }
        _ => usage(),
    }

    Ok(())
}
