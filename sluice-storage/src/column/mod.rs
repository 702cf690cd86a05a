//! Column store boundary.
//!
//! The pipeline needs three things from the destination store: an
//! existence check for a physical table, batch accumulation keyed by row
//! id, and an atomic commit of that batch. A row is a map of column name to
//! JSON value; writing to an existing row merges its columns.
//!
//! A commit carries a [`CommitDeadline`]. The store checks it immediately
//! before making the batch visible and aborts instead of committing late, so
//! a timed-out commit never leaves rows behind.

mod lmdb;
mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use sluice_core::{CommitError, FieldMap, TableName};

pub use lmdb::{LmdbColumnStore, LmdbStoreError};
pub use memory::InMemoryColumnStore;

// ============================================================================
// BATCH
// ============================================================================

/// Pending inserts for one table, committed as a unit.
///
/// Rows keep their first-insertion order. Inserting the same row key twice
/// merges the second set of columns over the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    table: TableName,
    rows: Vec<(String, FieldMap)>,
    index: HashMap<String, usize>,
}

impl Batch {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Accumulate an insert. Rows with an empty key are rejected.
    pub fn insert(&mut self, row_key: impl Into<String>, values: FieldMap) -> Result<(), CommitError> {
        let row_key = row_key.into();
        if row_key.is_empty() {
            return Err(CommitError::InvalidRow {
                row_key,
                reason: "row key must not be empty".to_string(),
            });
        }

        match self.index.get(&row_key) {
            Some(&slot) => {
                let (_, existing) = &mut self.rows[slot];
                merge_columns(existing, values);
            }
            None => {
                self.index.insert(row_key.clone(), self.rows.len());
                self.rows.push((row_key, values));
            }
        }
        Ok(())
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn rows(&self) -> &[(String, FieldMap)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> (TableName, Vec<(String, FieldMap)>) {
        (self.table, self.rows)
    }
}

/// Overlay `update` onto `row`, column by column.
pub(crate) fn merge_columns(row: &mut FieldMap, update: FieldMap) {
    for (column, value) in update {
        row.insert(column, value);
    }
}

// ============================================================================
// DEADLINE
// ============================================================================

/// Point in time after which a commit must abort rather than apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitDeadline {
    at: Option<Instant>,
    budget: Duration,
}

impl CommitDeadline {
    /// Deadline `budget` from now. A budget too large to represent never
    /// expires.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
            budget,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// `Ok` while time remains, otherwise the timeout the caller reports.
    pub fn check(&self) -> Result<(), CommitError> {
        if self.is_expired() {
            return Err(CommitError::Timeout {
                after_ms: u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Destination store for transformed records.
#[async_trait]
pub trait ColumnStore: Send + Sync {
    async fn table_exists(&self, table: &TableName) -> Result<bool, CommitError>;

    /// Provision a table. Creating an existing table is a no-op.
    async fn create_table(&self, table: &TableName) -> Result<(), CommitError>;

    /// Apply every row of the batch, or none of them.
    ///
    /// Returns the number of rows written. Fails with
    /// [`CommitError::MissingTable`] if the table does not exist, and with
    /// [`CommitError::Timeout`] only when the deadline passed before the
    /// batch became visible, in which case nothing was written.
    async fn commit(&self, batch: Batch, deadline: CommitDeadline) -> Result<usize, CommitError>;

    /// Read back a single row.
    async fn get_row(&self, table: &TableName, row_key: &str) -> Result<Option<FieldMap>, CommitError>;

    /// Number of rows in a table.
    async fn row_count(&self, table: &TableName) -> Result<usize, CommitError>;
}
