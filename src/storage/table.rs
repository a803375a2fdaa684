//! JSON-file table for local records
//!
//! Each table lives in one file (`data/<Table>.json`) holding an array of
//! rows. Rows are kept in memory keyed by id and written back atomically on
//! every change; a change whose write fails is undone in memory too.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ExpenseError;

use super::file_io::{read_json, write_json_atomic};

/// A row that can live in a [`JsonTable`]
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync {
    /// Primary key as stored on disk
    fn key(&self) -> String;
}

/// Repository for one table's persistence
pub struct JsonTable<T: Record> {
    path: PathBuf,
    rows: RwLock<HashMap<String, T>>,
}

impl<T: Record> JsonTable<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Open a table and load whatever is already on disk
    pub fn open(path: PathBuf) -> Result<Self, ExpenseError> {
        let table = Self::new(path);
        table.load()?;
        Ok(table)
    }

    /// Load rows from disk, replacing the in-memory copy
    pub fn load(&self) -> Result<(), ExpenseError> {
        let file_rows: Vec<T> = read_json(&self.path)?;

        let mut rows = self.rows.write().map_err(|e| {
            ExpenseError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        rows.clear();
        for row in file_rows {
            rows.insert(row.key(), row);
        }
        Ok(())
    }

    fn save_locked(&self, rows: &HashMap<String, T>) -> Result<(), ExpenseError> {
        let mut out: Vec<&T> = rows.values().collect();
        out.sort_by_key(|r| r.key());
        write_json_atomic(&self.path, &out)
    }

    pub fn get(&self, key: &str) -> Result<Option<T>, ExpenseError> {
        let rows = self.rows.read().map_err(|e| {
            ExpenseError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(rows.get(key).cloned())
    }

    /// All rows, in no particular order
    pub fn all(&self) -> Result<Vec<T>, ExpenseError> {
        let rows = self.rows.read().map_err(|e| {
            ExpenseError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(rows.values().cloned().collect())
    }

    /// Insert a row; fails if the key is already taken
    pub fn insert(&self, row: T) -> Result<T, ExpenseError> {
        let mut rows = self.rows.write().map_err(|e| {
            ExpenseError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        let key = row.key();
        if rows.contains_key(&key) {
            return Err(ExpenseError::Server {
                status: 409,
                message: format!("A record with id '{}' already exists", key),
            });
        }
        rows.insert(key.clone(), row.clone());
        if let Err(e) = self.save_locked(&rows) {
            rows.remove(&key);
            return Err(e);
        }
        Ok(row)
    }

    /// Replace an existing row; returns `None` if the key is unknown
    pub fn replace(&self, row: T) -> Result<Option<T>, ExpenseError> {
        let mut rows = self.rows.write().map_err(|e| {
            ExpenseError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        let key = row.key();
        let Some(previous) = rows.insert(key.clone(), row.clone()) else {
            rows.remove(&key);
            return Ok(None);
        };
        if let Err(e) = self.save_locked(&rows) {
            rows.insert(key, previous);
            return Err(e);
        }
        Ok(Some(row))
    }

    /// Remove a row; returns whether it existed
    pub fn remove(&self, key: &str) -> Result<bool, ExpenseError> {
        let mut rows = self.rows.write().map_err(|e| {
            ExpenseError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        let Some(previous) = rows.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.save_locked(&rows) {
            rows.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    pub fn len(&self) -> Result<usize, ExpenseError> {
        let rows = self.rows.read().map_err(|e| {
            ExpenseError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(rows.len())
    }

    pub fn is_empty(&self) -> Result<bool, ExpenseError> {
        Ok(self.len()? == 0)
    }
}
