//! Local storage layer
//!
//! JSON file storage with atomic writes. Backs the persisted auth session
//! and the offline table store.

pub mod file_io;
pub mod table;

pub use file_io::{read_json, read_json_opt, remove_if_exists, write_json_atomic};
pub use table::{JsonTable, Record};
