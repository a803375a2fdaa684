//! Sign-in commands and the terminal login prompt

use async_trait::async_trait;

use super::settle;
use crate::auth::LoginPrompt;
use crate::error::{ExpenseError, ExpenseResult};
use crate::services::ExpenseSession;

/// Reads the identity provider's access token from the terminal without
/// echoing it
pub struct TerminalPrompt;

#[async_trait]
impl LoginPrompt for TerminalPrompt {
    async fn provider_token(&self, provider: &str) -> ExpenseResult<String> {
        let prompt = format!("Access token for {}: ", provider);
        tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
            .await
            .map_err(|e| ExpenseError::Internal(format!("Prompt task failed: {}", e)))?
            .map_err(|e| ExpenseError::LoginFailed(format!("Failed to read access token: {}", e)))
    }
}

/// Sign in and make sure the user profile exists
pub async fn handle_login(session: &ExpenseSession) -> ExpenseResult<()> {
    let creds = session.sign_in().await?;
    let view = session.open_view();

    if let Some(profile) = settle(&view, session.user_profile(view.token()).await)? {
        println!("Signed in as {}", creds.user_id);
        println!("Profile: {}", profile.id);
    }
    Ok(())
}

pub fn handle_logout(session: &ExpenseSession) -> ExpenseResult<()> {
    let was_signed_in = session.auth().is_authenticated();
    session.sign_out()?;
    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

pub async fn handle_whoami(session: &ExpenseSession) -> ExpenseResult<()> {
    let Some(creds) = session.auth().current() else {
        println!("Not signed in. Run 'expense-tracker login'.");
        return Ok(());
    };

    println!("User: {}", creds.user_id);
    let view = session.open_view();
    match settle(&view, session.account(view.token()).await)? {
        Some(Some(account)) => println!("Account: {} ({})", account.name, account.id),
        Some(None) => println!("Account: none. Ask the account owner to add you."),
        None => {}
    }
    Ok(())
}
