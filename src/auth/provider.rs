//! Identity providers
//!
//! An [`IdentityProvider`] turns user interaction into [`Credentials`] and
//! can try to renew them silently. The interactive part is delegated to a
//! [`LoginPrompt`] supplied by whatever front end owns the session.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::credentials::Credentials;
use crate::config::Settings;
use crate::error::{ExpenseError, ExpenseResult};
use crate::gateway::http::{API_VERSION, API_VERSION_HEADER, AUTH_HEADER};

/// Source of credentials for an [`AuthenticationSession`](super::AuthenticationSession)
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the interactive login flow
    async fn login(&self) -> ExpenseResult<Credentials>;

    /// Try to renew `current` without user interaction
    ///
    /// `Ok(None)` means the provider declined (for example an expired
    /// session); that is an expected outcome, not an error.
    async fn refresh(&self, current: &Credentials) -> ExpenseResult<Option<Credentials>>;
}

/// The caller-provided half of an interactive login
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Obtain an access token from the named identity provider
    async fn provider_token(&self, provider: &str) -> ExpenseResult<String>;
}

#[derive(Serialize)]
struct LoginBody<'a> {
    access_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    authentication_token: String,
    user: LoginUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginUser {
    user_id: String,
}

impl From<LoginResponse> for Credentials {
    fn from(resp: LoginResponse) -> Self {
        Credentials::new(resp.user.user_id, resp.authentication_token)
    }
}

/// Client-directed login against the backend's `/.auth` endpoints
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    provider: String,
    prompt: Arc<dyn LoginPrompt>,
}

impl HttpIdentityProvider {
    pub fn new(settings: &Settings, prompt: Arc<dyn LoginPrompt>) -> ExpenseResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ExpenseError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: settings.backend_root().to_string(),
            provider: settings.auth_provider.clone(),
            prompt,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn login(&self) -> ExpenseResult<Credentials> {
        let access_token = self.prompt.provider_token(&self.provider).await?;
        if access_token.trim().is_empty() {
            return Err(ExpenseError::LoginFailed("No access token was entered".into()));
        }

        let url = format!("{}/.auth/login/{}", self.base_url, self.provider);
        let resp = self
            .http
            .post(&url)
            .header(API_VERSION_HEADER, API_VERSION)
            .json(&LoginBody {
                access_token: access_token.trim(),
            })
            .send()
            .await
            .map_err(|e| ExpenseError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExpenseError::LoginFailed(format!(
                "Identity provider answered {}: {}",
                status, body
            )));
        }

        let login: LoginResponse = resp
            .json()
            .await
            .map_err(|e| ExpenseError::LoginFailed(format!("Unreadable login response: {}", e)))?;
        info!(user_id = %login.user.user_id, provider = %self.provider, "Signed in");
        Ok(login.into())
    }

    async fn refresh(&self, current: &Credentials) -> ExpenseResult<Option<Credentials>> {
        let url = format!("{}/.auth/refresh", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header(AUTH_HEADER, &current.token)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await
            .map_err(|e| ExpenseError::Network(e.to_string()))?;

        let status = resp.status();
        match status.as_u16() {
            200..=299 => {
                let refreshed: LoginResponse = resp.json().await?;
                debug!(user_id = %refreshed.user.user_id, "Token refreshed");
                Ok(Some(refreshed.into()))
            }
            400 | 401 | 403 => {
                debug!(%status, "Refresh declined");
                Ok(None)
            }
            code => Err(ExpenseError::Server {
                status: code,
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Token prefix the offline table store accepts
pub const LOCAL_TOKEN_PREFIX: &str = "local-";

/// Issues offline tokens for the local table store
///
/// Login never prompts; refresh always succeeds with a fresh token.
pub struct LocalIdentityProvider {
    user_id: String,
}

impl LocalIdentityProvider {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    fn issue(&self) -> Credentials {
        Credentials::new(
            self.user_id.clone(),
            format!("{}{}", LOCAL_TOKEN_PREFIX, uuid::Uuid::new_v4()),
        )
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn login(&self) -> ExpenseResult<Credentials> {
        Ok(self.issue())
    }

    async fn refresh(&self, _current: &Credentials) -> ExpenseResult<Option<Credentials>> {
        Ok(Some(self.issue()))
    }
}
