//! Expense period CLI commands

use clap::Subcommand;

use super::{parse_amount, parse_date, settle};
use crate::display::{format_period_list, DisplayOptions};
use crate::error::ExpenseResult;
use crate::services::{CreateExpensePeriodInput, ExpenseSession, UpdateExpensePeriodInput};

/// Expense period subcommands
#[derive(Subcommand)]
pub enum PeriodCommands {
    /// List periods, most recent first
    List,
    /// Start a new period
    Add {
        /// Amount available over the period, e.g. "500"
        amount: String,
        /// Start date (YYYY-MM-DD or RFC 3339), defaults to now
        #[arg(short, long)]
        start: Option<String>,
    },
    /// Edit a period
    Edit {
        /// Period ID or unique ID prefix
        id: String,
        #[arg(short, long)]
        amount: Option<String>,
        #[arg(short, long)]
        start: Option<String>,
    },
    /// Delete a period
    Delete {
        /// Period ID or unique ID prefix
        id: String,
    },
}

pub async fn handle_period_command(
    session: &ExpenseSession,
    opts: &DisplayOptions,
    cmd: PeriodCommands,
) -> ExpenseResult<()> {
    let view = session.open_view();
    let token = view.token();

    match cmd {
        PeriodCommands::List => {
            if let Some(periods) = settle(&view, session.expense_periods(token).await)? {
                print!("{}", format_period_list(&periods, opts));
            }
        }
        PeriodCommands::Add { amount, start } => {
            let input = CreateExpensePeriodInput {
                amount_available: parse_amount(&amount)?,
                start_date: start.as_deref().map(parse_date).transpose()?,
            };
            if let Some(period) = settle(&view, session.insert_expense_period(token, input).await)? {
                println!(
                    "Started period {} on {} with {}",
                    period.id.short(),
                    period.start_date.format(&opts.date_format),
                    period.amount_available.format_with_symbol(&opts.currency_symbol)
                );
            }
        }
        PeriodCommands::Edit { id, amount, start } => {
            let input = UpdateExpensePeriodInput {
                amount_available: amount.as_deref().map(parse_amount).transpose()?,
                start_date: start.as_deref().map(parse_date).transpose()?,
            };
            let Some(period) = settle(&view, session.find_expense_period(token, &id).await)? else {
                return Ok(());
            };
            if let Some(updated) =
                settle(&view, session.update_expense_period(token, &period.id, input).await)?
            {
                println!("Updated period {}", updated.id.short());
            }
        }
        PeriodCommands::Delete { id } => {
            let Some(period) = settle(&view, session.find_expense_period(token, &id).await)? else {
                return Ok(());
            };
            if settle(&view, session.delete_expense_period(token, &period.id).await)?.is_some() {
                println!("Deleted period {}", period.id.short());
            }
        }
    }

    Ok(())
}
