//! Summary command

use super::settle;
use crate::display::{format_summary, format_summary_list, DisplayOptions};
use crate::error::ExpenseResult;
use crate::services::ExpenseSession;

/// Print every period's summary, or only the current one
pub async fn handle_summary_command(
    session: &ExpenseSession,
    opts: &DisplayOptions,
    current: bool,
) -> ExpenseResult<()> {
    let view = session.open_view();

    if current {
        if let Some(summary) = settle(
            &view,
            session.current_expense_period_summary(view.token()).await,
        )? {
            print!("{}", format_summary(&summary, opts));
        }
    } else if let Some(summaries) =
        settle(&view, session.expense_period_summaries(view.token()).await)?
    {
        print!("{}", format_summary_list(&summaries, opts));
    }

    Ok(())
}
