//! List query shape shared by both gateways
//!
//! Table lists are always "most recent first, at most 100 rows". This is a
//! fixed bound, not a page: callers never ask for the next 100.

use std::cmp::Ordering;

/// Row cap for every table list
pub const LIST_LIMIT: usize = 100;

/// Order-by column and row cap for a table list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    /// Wire name of the sort column; rows are sorted descending on it
    pub order_by: Option<&'static str>,
    pub top: usize,
}

impl ListQuery {
    /// Newest first on `column`, capped at [`LIST_LIMIT`]
    pub const fn newest_first(column: &'static str) -> Self {
        Self {
            order_by: Some(column),
            top: LIST_LIMIT,
        }
    }

    /// Unordered, for singleton tables
    pub const fn unordered() -> Self {
        Self {
            order_by: None,
            top: LIST_LIMIT,
        }
    }

    /// OData query parameters for the table endpoint
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(column) = self.order_by {
            params.push(("$orderby", format!("{} desc", column)));
        }
        params.push(("$top", self.top.to_string()));
        params
    }

    /// Apply the query to an in-memory collection
    ///
    /// `newer` orders two rows by the sort column; ties keep no particular
    /// order.
    pub fn apply<T, F>(&self, mut rows: Vec<T>, newer: F) -> Vec<T>
    where
        F: Fn(&T, &T) -> Ordering,
    {
        if self.order_by.is_some() {
            rows.sort_by(|a, b| newer(b, a));
        }
        rows.truncate(self.top);
        rows
    }
}

/// Query for the `ExpenseItem` table
pub const EXPENSE_ITEMS: ListQuery = ListQuery::newest_first("date");

/// Query for the `ExpensePeriod` table
pub const EXPENSE_PERIODS: ListQuery = ListQuery::newest_first("startDate");
