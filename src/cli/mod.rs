//! CLI command handlers
//!
//! Bridges clap argument parsing with [`ExpenseSession`]. Every handler runs
//! inside a [`ViewScope`] so Ctrl-C cancels the command without reporting an
//! error.

pub mod auth;
pub mod expense;
pub mod period;
pub mod summary;

pub use auth::{handle_login, handle_logout, handle_whoami, TerminalPrompt};
pub use expense::{handle_expense_command, ExpenseCommands};
pub use period::{handle_period_command, PeriodCommands};
pub use summary::handle_summary_command;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone};

use crate::audit::AuditLogger;
use crate::auth::{
    AuthenticationSession, HttpIdentityProvider, IdentityProvider, LocalIdentityProvider,
    SessionStore,
};
use crate::config::{Settings, TrackerPaths};
use crate::error::{ExpenseError, ExpenseResult};
use crate::gateway::{HttpGateway, LocalGateway, RemoteDataGateway};
use crate::models::Money;
use crate::services::{ExpenseSession, ViewScope};

/// User id the offline store signs in as
pub const OFFLINE_USER_ID: &str = "local";

/// Build the session for the configured backend
///
/// Offline mode reads and writes the JSON tables under the data directory
/// and signs in without prompting.
pub fn open_session(paths: &TrackerPaths, settings: &Settings) -> ExpenseResult<ExpenseSession> {
    paths.ensure_directories()?;

    let (gateway, provider): (Arc<dyn RemoteDataGateway>, Arc<dyn IdentityProvider>) =
        if settings.offline {
            (
                Arc::new(LocalGateway::open(paths)?),
                Arc::new(LocalIdentityProvider::new(OFFLINE_USER_ID)),
            )
        } else {
            (
                Arc::new(HttpGateway::new(settings)?),
                Arc::new(HttpIdentityProvider::new(settings, Arc::new(TerminalPrompt))?),
            )
        };

    let auth = AuthenticationSession::new(provider, Some(SessionStore::new(paths.session_file())));
    let session = ExpenseSession::new(gateway, auth);

    Ok(if settings.audit_enabled {
        session.with_audit(AuditLogger::new(paths.audit_log()))
    } else {
        session
    })
}

/// Unwrap a result for `view`; `Ok(None)` means the command was cancelled
pub(crate) fn settle<T>(view: &ViewScope, result: ExpenseResult<T>) -> ExpenseResult<Option<T>> {
    match view.deliver(result) {
        Some(result) => result.map(Some),
        None => {
            println!("Cancelled.");
            Ok(None)
        }
    }
}

pub(crate) fn parse_amount(input: &str) -> ExpenseResult<Money> {
    Money::parse(input).map_err(|e| {
        ExpenseError::Validation(format!(
            "Invalid amount '{}'. Use a format like '12.34'. Error: {}",
            input, e
        ))
    })
}

/// Parse `YYYY-MM-DD` (local midnight) or a full RFC 3339 timestamp
pub(crate) fn parse_date(input: &str) -> ExpenseResult<DateTime<FixedOffset>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(input) {
        return Ok(timestamp);
    }

    let invalid = || {
        ExpenseError::Validation(format!(
            "Invalid date format: '{}'. Use YYYY-MM-DD or RFC 3339",
            input
        ))
    };
    let midnight = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|_| invalid())?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(invalid)?;

    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(invalid)
}
