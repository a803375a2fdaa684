//! Plain-text formatting for terminal output

pub mod expense;
pub mod period;

pub use expense::{format_expense_details, format_expense_list, format_expense_row};
pub use period::{format_period_list, format_summary, format_summary_list};

use crate::config::Settings;

/// Currency and date preferences taken from [`Settings`]
#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub currency_symbol: String,
    pub date_format: String,
}

impl DisplayOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            currency_symbol: settings.currency_symbol.clone(),
            date_format: settings.date_format.clone(),
        }
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Truncate to `max_len` characters, marking the cut with "..."
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{}...", kept)
}
