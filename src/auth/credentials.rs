//! Bearer credentials and their on-disk store

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ExpenseResult;
use crate::storage::{read_json_opt, remove_if_exists, write_json_atomic};

/// A signed-in user and the bearer token the backend accepts for them
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub user_id: String,
    pub token: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Persists the session so a restarted process can skip the login prompt
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> ExpenseResult<Option<Credentials>> {
        read_json_opt(&self.path)
    }

    pub fn save(&self, credentials: &Credentials) -> ExpenseResult<()> {
        write_json_atomic(&self.path, credentials)
    }

    pub fn clear(&self) -> ExpenseResult<()> {
        remove_if_exists(&self.path)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
