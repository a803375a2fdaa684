//! Expense tracker client
//!
//! A client for a hosted expense-tracking backend built around a
//! single-flight query cache. Views read through the cache, mutations drop
//! the cached queries they affect, and a rejected credential is refreshed
//! or re-entered once before the call is retried.
//!
//! # Architecture
//!
//! - `config`: paths and settings
//! - `error`: the crate error type
//! - `models`: expense items, periods, summaries, profiles and money
//! - `storage`: JSON file helpers and the local table store
//! - `auth`: credentials, identity providers and the authentication session
//! - `gateway`: the remote data gateway (HTTP and offline)
//! - `cache`: the query coordinator
//! - `services`: `ExpenseSession` and `ViewScope`
//! - `audit`: the mutation audit log
//! - `display`, `cli`: terminal front end
//!
//! # Example
//!
//! ```rust,ignore
//! use expense_tracker::cli::open_session;
//! use expense_tracker::config::{Settings, TrackerPaths};
//!
//! let paths = TrackerPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let session = open_session(&paths, &settings)?;
//! let view = session.open_view();
//! let items = session.expense_items(view.token()).await?;
//! ```

pub mod audit;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod services;
pub mod storage;

pub use error::{ExpenseError, ExpenseResult};
