//! Expense CLI commands

use clap::Subcommand;

use super::{parse_amount, parse_date, settle};
use crate::display::{format_expense_details, format_expense_list, DisplayOptions};
use crate::error::ExpenseResult;
use crate::services::{CreateExpenseItemInput, ExpenseSession, UpdateExpenseItemInput};

/// Expense subcommands
#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// List the most recent expenses, newest first
    List {
        /// Show at most this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show one expense
    Show {
        /// Expense ID or unique ID prefix
        id: String,
    },
    /// Record an expense
    Add {
        /// Amount, e.g. "12.34"
        amount: String,
        /// What the money was spent on
        description: String,
        /// Date (YYYY-MM-DD or RFC 3339), defaults to now
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Edit an expense
    Edit {
        /// Expense ID or unique ID prefix
        id: String,
        #[arg(short, long)]
        amount: Option<String>,
        #[arg(short = 'D', long)]
        description: Option<String>,
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Delete an expense
    Delete {
        /// Expense ID or unique ID prefix
        id: String,
    },
}

pub async fn handle_expense_command(
    session: &ExpenseSession,
    opts: &DisplayOptions,
    cmd: ExpenseCommands,
) -> ExpenseResult<()> {
    let view = session.open_view();
    let token = view.token();

    match cmd {
        ExpenseCommands::List { limit } => {
            if let Some(mut items) = settle(&view, session.expense_items(token).await)? {
                if let Some(limit) = limit {
                    items.truncate(limit);
                }
                print!("{}", format_expense_list(&items, opts));
            }
        }
        ExpenseCommands::Show { id } => {
            if let Some(item) = settle(&view, session.find_expense_item(token, &id).await)? {
                print!("{}", format_expense_details(&item, opts));
            }
        }
        ExpenseCommands::Add {
            amount,
            description,
            date,
        } => {
            let input = CreateExpenseItemInput {
                amount: parse_amount(&amount)?,
                description,
                date: date.as_deref().map(parse_date).transpose()?,
            };
            if let Some(item) = settle(&view, session.insert_expense_item(token, input).await)? {
                println!("Recorded expense {}", item.id.short());
                print!("{}", format_expense_details(&item, opts));
            }
        }
        ExpenseCommands::Edit {
            id,
            amount,
            description,
            date,
        } => {
            let input = UpdateExpenseItemInput {
                amount: amount.as_deref().map(parse_amount).transpose()?,
                description,
                date: date.as_deref().map(parse_date).transpose()?,
            };
            let Some(item) = settle(&view, session.find_expense_item(token, &id).await)? else {
                return Ok(());
            };
            if let Some(updated) =
                settle(&view, session.update_expense_item(token, &item.id, input).await)?
            {
                println!("Updated expense {}", updated.id.short());
                print!("{}", format_expense_details(&updated, opts));
            }
        }
        ExpenseCommands::Delete { id } => {
            let Some(item) = settle(&view, session.find_expense_item(token, &id).await)? else {
                return Ok(());
            };
            if settle(&view, session.delete_expense_item(token, &item.id).await)?.is_some() {
                println!("Deleted expense {} ({})", item.id.short(), item.description);
            }
        }
    }

    Ok(())
}
