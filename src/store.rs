//! The persistence boundary for relationship mutation.
//!
//! [`RelationStore`] is the small set of row operations the relation adapters
//! need. [`MemoryStore`] implements it over plain JSON rows and serves as the
//! fixture store for tests and the CLI.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A stored row: column name to value.
pub type Row = Map<String, Value>;

/// Row-level operations over a relational store.
///
/// Column values are compared as strings; a JSON number `3` and the string
/// `"3"` refer to the same key. A table nothing has been written to yet
/// reads as empty.
pub trait RelationStore {
    fn exists(&self, table: &str, id: &str) -> Result<bool, StoreError>;

    /// Read a whole row.
    fn fetch(&self, table: &str, id: &str) -> Result<Row, StoreError>;

    /// Read one column of a row. `None` when the column is null or unset.
    fn column(&self, table: &str, id: &str, column: &str) -> Result<Option<String>, StoreError>;

    fn set_column(
        &mut self,
        table: &str,
        id: &str,
        column: &str,
        value: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Values of `select` for every row whose `column` equals `value`.
    ///
    /// Selecting `"id"` yields row ids.
    fn select_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
        select: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Insert a row and return its id. Uses `row["id"]` when present.
    fn insert(&mut self, table: &str, row: Row) -> Result<String, StoreError>;

    /// Merge `values` into an existing row.
    fn update(&mut self, table: &str, id: &str, values: &Row) -> Result<(), StoreError>;

    fn delete(&mut self, table: &str, id: &str) -> Result<(), StoreError>;

    /// Delete every row matching all `conditions`, returning the count.
    fn delete_where(&mut self, table: &str, conditions: &[(&str, &str)])
        -> Result<usize, StoreError>;

    /// Run `f` atomically: if it returns `Err`, none of its writes persist.
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, E>;
}

/// In-memory tables of JSON rows, keyed by table name then row id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    tables: BTreeMap<String, BTreeMap<String, Row>>,
    /// Tables whose writes fail, for exercising rollback.
    #[serde(skip)]
    poisoned: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table if it does not exist.
    pub fn create_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    /// Builder form of [`RelationStore::insert`] for fixtures.
    pub fn with_row(mut self, table: &str, id: &str, row: Value) -> Self {
        let mut row = row.as_object().cloned().unwrap_or_default();
        row.insert("id".to_string(), Value::String(id.to_string()));
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), row);
        self
    }

    pub fn row(&self, table: &str, id: &str) -> Option<&Row> {
        self.tables.get(table).and_then(|rows| rows.get(id))
    }

    pub fn rows(&self, table: &str) -> impl Iterator<Item = (&String, &Row)> {
        self.tables.get(table).into_iter().flat_map(|rows| rows.iter())
    }

    /// Make every later write to `table` fail with a backend error.
    pub fn poison(&mut self, table: &str) {
        self.poisoned.insert(table.to_string());
    }

    fn rows_or_empty(&self, table: &str) -> &BTreeMap<String, Row> {
        static EMPTY: BTreeMap<String, Row> = BTreeMap::new();
        self.tables.get(table).unwrap_or(&EMPTY)
    }

    fn table(&self, table: &str) -> Result<&BTreeMap<String, Row>, StoreError> {
        self.tables.get(table).ok_or_else(|| StoreError::UnknownTable {
            table: table.to_string(),
        })
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut BTreeMap<String, Row>, StoreError> {
        if self.poisoned.contains(table) {
            return Err(StoreError::Backend {
                message: format!("writes to {} are failing", table),
            });
        }
        self.tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })
    }

    fn row_mut(&mut self, table: &str, id: &str) -> Result<&mut Row, StoreError> {
        self.table_mut(table)?
            .get_mut(id)
            .ok_or_else(|| StoreError::MissingRow {
                table: table.to_string(),
                id: id.to_string(),
            })
    }
}

/// String form of a key column.
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl RelationStore for MemoryStore {
    fn exists(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self.rows_or_empty(table).contains_key(id))
    }

    fn fetch(&self, table: &str, id: &str) -> Result<Row, StoreError> {
        self.table(table)?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::MissingRow {
                table: table.to_string(),
                id: id.to_string(),
            })
    }

    fn column(&self, table: &str, id: &str, column: &str) -> Result<Option<String>, StoreError> {
        let row = self.fetch(table, id)?;
        Ok(row.get(column).and_then(key_string))
    }

    fn set_column(
        &mut self,
        table: &str,
        id: &str,
        column: &str,
        value: Option<&str>,
    ) -> Result<(), StoreError> {
        let row = self.row_mut(table, id)?;
        let value = value.map_or(Value::Null, |v| Value::String(v.to_string()));
        row.insert(column.to_string(), value);
        Ok(())
    }

    fn select_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
        select: &str,
    ) -> Result<Vec<String>, StoreError> {
        let matches = self
            .rows_or_empty(table)
            .iter()
            .filter(|(_, row)| row.get(column).and_then(key_string).as_deref() == Some(value))
            .filter_map(|(id, row)| {
                if select == "id" {
                    Some(id.clone())
                } else {
                    row.get(select).and_then(key_string)
                }
            })
            .collect();
        Ok(matches)
    }

    fn insert(&mut self, table: &str, mut row: Row) -> Result<String, StoreError> {
        self.create_table(table);
        let rows = self.table_mut(table)?;

        let id = match row.get("id").and_then(key_string) {
            Some(id) => id,
            None => {
                let mut next = rows.len() + 1;
                while rows.contains_key(&next.to_string()) {
                    next += 1;
                }
                next.to_string()
            }
        };

        if rows.contains_key(&id) {
            return Err(StoreError::Backend {
                message: format!("duplicate id {} in {}", id, table),
            });
        }

        row.insert("id".to_string(), Value::String(id.clone()));
        rows.insert(id.clone(), row);
        Ok(id)
    }

    fn update(&mut self, table: &str, id: &str, values: &Row) -> Result<(), StoreError> {
        let row = self.row_mut(table, id)?;
        for (column, value) in values {
            if column != "id" {
                row.insert(column.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn delete(&mut self, table: &str, id: &str) -> Result<(), StoreError> {
        self.table_mut(table)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::MissingRow {
                table: table.to_string(),
                id: id.to_string(),
            })
    }

    fn delete_where(
        &mut self,
        table: &str,
        conditions: &[(&str, &str)],
    ) -> Result<usize, StoreError> {
        if !self.tables.contains_key(table) {
            return Ok(0);
        }
        let rows = self.table_mut(table)?;
        let before = rows.len();
        rows.retain(|_, row| {
            !conditions.iter().all(|(column, value)| {
                row.get(*column).and_then(key_string).as_deref() == Some(*value)
            })
        });
        Ok(before - rows.len())
    }

    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let snapshot = self.tables.clone();
        let result = f(self);
        if result.is_err() {
            self.tables = snapshot;
        }
        result
    }
}
