//! In-memory column store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use sluice_core::{CommitError, FieldMap, TableName};

use super::{merge_columns, Batch, ColumnStore, CommitDeadline};

type Rows = BTreeMap<String, FieldMap>;

/// Column store held in process memory.
///
/// Commits stage every row against a copy of the table and swap it in only
/// when the whole batch applied. A failure can be injected for the next
/// commit to exercise the all-or-nothing path, and commits or table checks
/// can be slowed down to exercise deadlines.
#[derive(Debug, Default)]
pub struct InMemoryColumnStore {
    tables: RwLock<HashMap<String, Rows>>,
    fail_next: Mutex<Option<CommitError>>,
    commit_delay: Mutex<Duration>,
    check_delay: Mutex<Duration>,
    commits: AtomicU64,
}

impl InMemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given tables already provisioned.
    pub fn with_tables<I, T>(tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let store = Self::new();
        if let Ok(mut map) = store.tables.write() {
            for table in tables {
                map.insert(table.into(), Rows::new());
            }
        }
        store
    }

    /// Make the next commit fail with `error` after its rows were staged.
    pub fn fail_next_commit(&self, error: CommitError) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(error);
        }
    }

    /// Spend `delay` applying every following commit's rows.
    pub fn delay_commits(&self, delay: Duration) {
        if let Ok(mut slot) = self.commit_delay.lock() {
            *slot = delay;
        }
    }

    /// Spend `delay` answering every following table check.
    pub fn delay_table_checks(&self, delay: Duration) {
        if let Ok(mut slot) = self.check_delay.lock() {
            *slot = delay;
        }
    }

    /// Number of commits that reached the store, successful or not.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    async fn pause(slot: &Mutex<Duration>) -> Result<(), CommitError> {
        let delay = *slot.lock().map_err(|_| Self::poisoned())?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn poisoned() -> CommitError {
        CommitError::Store {
            reason: "column store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl ColumnStore for InMemoryColumnStore {
    async fn table_exists(&self, table: &TableName) -> Result<bool, CommitError> {
        Self::pause(&self.check_delay).await?;
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables.contains_key(table.as_str()))
    }

    async fn create_table(&self, table: &TableName) -> Result<(), CommitError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        tables.entry(table.as_str().to_string()).or_default();
        Ok(())
    }

    async fn commit(&self, batch: Batch, deadline: CommitDeadline) -> Result<usize, CommitError> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        let (table, rows) = batch.into_rows();
        Self::pause(&self.commit_delay).await?;

        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        let current = tables
            .get(table.as_str())
            .ok_or_else(|| CommitError::MissingTable {
                table: table.to_string(),
            })?;

        let mut staged = current.clone();
        let written = rows.len();
        for (row_key, values) in rows {
            merge_columns(staged.entry(row_key).or_default(), values);
        }

        let injected = self.fail_next.lock().map_err(|_| Self::poisoned())?.take();
        if let Some(error) = injected {
            return Err(error);
        }
        deadline.check()?;

        tables.insert(table.as_str().to_string(), staged);
        Ok(written)
    }

    async fn get_row(&self, table: &TableName, row_key: &str) -> Result<Option<FieldMap>, CommitError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .get(table.as_str())
            .and_then(|rows| rows.get(row_key))
            .cloned())
    }

    async fn row_count(&self, table: &TableName) -> Result<usize, CommitError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        tables
            .get(table.as_str())
            .map(|rows| rows.len())
            .ok_or_else(|| CommitError::MissingTable {
                table: table.to_string(),
            })
    }
}
