//! CLI auth command handlers for login, status, logout, and token.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, PromptFn, VerificationPrompt};
use crate::config::CardataConfig;

fn print_prompt(prompt: &VerificationPrompt) {
    println!("🔗 Visit: {}", prompt.verification_uri);
    println!("📋 Enter code: {}", prompt.user_code);
    if !prompt.verification_uri_complete.is_empty() {
        println!("   or open: {}", prompt.verification_uri_complete);
    }
    println!("⏳ Waiting for authorization...");
}

pub fn terminal_prompt() -> PromptFn {
    Arc::new(print_prompt)
}

/// Cancellation token that fires on Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn authenticator(config: &CardataConfig) -> Result<Authenticator, Box<dyn std::error::Error>> {
    Ok(config.authenticator(terminal_prompt())?)
}

/// Handle `cardata login`.
pub async fn handle_login(config: &CardataConfig) -> Result<(), Box<dyn std::error::Error>> {
    let auth = authenticator(config)?;
    let session = auth.new_session(&ctrl_c_token()).await?;
    println!("✅ Login successful (gcid {})", session.gcid);
    println!("   Session saved to {}", config.session_path().display());
    Ok(())
}

/// Handle `cardata status`.
pub async fn handle_status(config: &CardataConfig) -> Result<(), Box<dyn std::error::Error>> {
    let auth = authenticator(config)?;
    match auth.stored_session()? {
        None => println!("❌ Not logged in"),
        Some(session) => {
            let remaining = session.expires_at - Utc::now();
            println!("gcid:       {}", session.gcid);
            println!("client id:  {}", session.client_id);
            println!("scope:      {}", session.scope);
            println!("expires at: {}", session.expires_at.to_rfc3339());
            if session.is_expired() {
                println!("status:     ⚠️  expired (will refresh on next use)");
            } else {
                println!("status:     ✅ valid for {} min", remaining.num_minutes());
            }
            if !session.matches_client(auth.client_id()) {
                println!("⚠️  Session belongs to a different client id");
            }
        }
    }
    Ok(())
}

/// Handle `cardata logout`.
pub async fn handle_logout(config: &CardataConfig) -> Result<(), Box<dyn std::error::Error>> {
    authenticator(config)?.logout()?;
    println!("✅ Logged out");
    Ok(())
}

/// Handle `cardata token`.
pub async fn handle_token(config: &CardataConfig) -> Result<(), Box<dyn std::error::Error>> {
    let auth = authenticator(config)?;
    let session = auth.get_session(&ctrl_c_token()).await?;
    println!("{}", session.access_token);
    Ok(())
}
