//! Service layer
//!
//! `ExpenseSession` is the object views talk to. It validates input, reads
//! through the query cache, runs mutations with the right invalidations and
//! records them in the audit log.

pub mod expense_item;
pub mod expense_period;
pub mod session;
pub mod view;

pub use expense_item::{CreateExpenseItemInput, UpdateExpenseItemInput};
pub use expense_period::{CreateExpensePeriodInput, UpdateExpensePeriodInput};
pub use session::ExpenseSession;
pub use view::ViewScope;
