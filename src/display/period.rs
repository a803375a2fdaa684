//! Expense period and summary formatting

use chrono::{DateTime, FixedOffset};

use super::DisplayOptions;
use crate::models::expense_period::with_end_dates;
use crate::models::{ExpensePeriod, ExpensePeriodSummary};

fn date_range(
    start: &DateTime<FixedOffset>,
    end: Option<&DateTime<FixedOffset>>,
    opts: &DisplayOptions,
) -> String {
    match end {
        Some(end) => format!(
            "{} - {}",
            start.format(&opts.date_format),
            end.format(&opts.date_format)
        ),
        None => format!("{} - ...", start.format(&opts.date_format)),
    }
}

/// Periods with their implied end dates, most recent first
pub fn format_period_list(periods: &[ExpensePeriod], opts: &DisplayOptions) -> String {
    if periods.is_empty() {
        return "No expense periods found.\n".to_string();
    }

    let mut output = format!("{:8}  {:25}  {:>14}\n", "Id", "Period", "Available");
    output.push_str(&"-".repeat(51));
    output.push('\n');

    for (period, end) in with_end_dates(periods) {
        output.push_str(&format!(
            "{:8}  {:25}  {:>14}\n",
            period.id.short(),
            date_range(&period.start_date, end.as_ref(), opts),
            period.amount_available.format_with_symbol(&opts.currency_symbol)
        ));
    }

    output
}

pub fn format_summary(summary: &ExpensePeriodSummary, opts: &DisplayOptions) -> String {
    let sym = &opts.currency_symbol;
    let mut output = String::new();
    output.push_str(&format!(
        "Period:     {}\n",
        date_range(&summary.start_date, summary.end_date.as_ref(), opts)
    ));
    output.push_str(&format!(
        "Available:  {}\n",
        summary.amount_available.format_with_symbol(sym)
    ));
    output.push_str(&format!(
        "Spent:      {} ({} expenses)\n",
        summary.amount_spent().format_with_symbol(sym),
        summary.expenses_count
    ));
    output.push_str(&format!(
        "Remaining:  {}\n",
        summary.amount_remaining.format_with_symbol(sym)
    ));
    output
}

pub fn format_summary_list(summaries: &[ExpensePeriodSummary], opts: &DisplayOptions) -> String {
    if summaries.is_empty() {
        return "No expense periods found.\n".to_string();
    }

    let sym = &opts.currency_symbol;
    let mut output = format!(
        "{:25}  {:>12}  {:>12}  {:>5}\n",
        "Period", "Available", "Remaining", "Count"
    );
    output.push_str(&"-".repeat(60));
    output.push('\n');

    for summary in summaries {
        output.push_str(&format!(
            "{:25}  {:>12}  {:>12}  {:>5}\n",
            date_range(&summary.start_date, summary.end_date.as_ref(), opts),
            summary.amount_available.format_with_symbol(sym),
            summary.amount_remaining.format_with_symbol(sym),
            summary.expenses_count
        ));
    }

    output
}
