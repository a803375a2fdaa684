//! User profile and account records
//!
//! Both are singletons per signed-in user.

use serde::{Deserialize, Serialize};

use super::ids::{AccountId, UserProfileId};

/// Per-user profile row, created lazily on first sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserProfileId,

    /// Identity-provider user id, stamped by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl UserProfile {
    pub fn new() -> Self {
        Self {
            id: UserProfileId::new(),
            user_id: None,
        }
    }
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared account expenses are booked against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,

    #[serde(default)]
    pub name: String,
}
