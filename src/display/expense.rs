//! Expense item formatting

use super::{truncate, DisplayOptions};
use crate::models::ExpenseItem;

const DESCRIPTION_WIDTH: usize = 32;

/// One register row: short id, date, description, amount
pub fn format_expense_row(item: &ExpenseItem, opts: &DisplayOptions) -> String {
    format!(
        "{:8}  {:10}  {:width$}  {:>14}",
        item.id.short(),
        item.date.format(&opts.date_format).to_string(),
        truncate(&item.description, DESCRIPTION_WIDTH),
        item.amount.format_with_symbol(&opts.currency_symbol),
        width = DESCRIPTION_WIDTH
    )
}

pub fn format_expense_list(items: &[ExpenseItem], opts: &DisplayOptions) -> String {
    if items.is_empty() {
        return "No expenses found.\n".to_string();
    }

    let mut output = format!(
        "{:8}  {:10}  {:width$}  {:>14}\n",
        "Id",
        "Date",
        "Description",
        "Amount",
        width = DESCRIPTION_WIDTH
    );
    output.push_str(&"-".repeat(8 + 2 + 10 + 2 + DESCRIPTION_WIDTH + 2 + 14));
    output.push('\n');

    for item in items {
        output.push_str(&format_expense_row(item, opts));
        output.push('\n');
    }

    output
}

pub fn format_expense_details(item: &ExpenseItem, opts: &DisplayOptions) -> String {
    let mut output = String::new();
    output.push_str(&format!("Expense:     {}\n", item.id));
    output.push_str(&format!("Date:        {}\n", item.date.to_rfc3339()));
    output.push_str(&format!(
        "Amount:      {}\n",
        item.amount.format_with_symbol(&opts.currency_symbol)
    ));
    output.push_str(&format!("Description: {}\n", item.description));
    if let Some(created_by) = &item.created_by {
        output.push_str(&format!("Created by:  {}\n", created_by));
    }
    output
}
