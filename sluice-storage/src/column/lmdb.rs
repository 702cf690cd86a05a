//! LMDB-backed column store.
//!
//! Uses the heed crate (Rust bindings for LMDB). Each physical table is a
//! named database inside one environment; a row is the JSON-encoded column
//! map stored under the row key.
//!
//! # Atomicity
//!
//! A batch commit is a single LMDB write transaction. Any failure while
//! applying rows drops the transaction, which aborts it, so readers never
//! observe part of a batch. The same holds for a commit whose deadline
//! passed while rows were being applied.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use sluice_core::{CommitError, FieldMap, TableName};

use super::{merge_columns, Batch, ColumnStore, CommitDeadline};

/// Default upper bound on the number of tables per environment.
pub const DEFAULT_MAX_TABLES: u32 = 256;

/// Error type for LMDB store setup.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// The requested map size does not fit in a `usize` byte count.
    #[error("LMDB map size of {0} MB is too large")]
    MapSizeOverflow(usize),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn store_error(e: impl std::fmt::Display) -> CommitError {
    CommitError::Store {
        reason: e.to_string(),
    }
}

/// Column store persisted in an LMDB environment.
#[derive(Clone)]
pub struct LmdbColumnStore {
    env: Env,
}

impl LmdbColumnStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the environment in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        Self::open_with_max_tables(path, max_size_mb, DEFAULT_MAX_TABLES)
    }

    pub fn open_with_max_tables<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        max_tables: u32,
    ) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or(LmdbStoreError::MapSizeOverflow(max_size_mb))?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_tables)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        Ok(Self { env })
    }

    fn exists_blocking(&self, table: &TableName) -> Result<bool, CommitError> {
        let rtxn = self.env.read_txn().map_err(store_error)?;
        let db: Option<Database<Bytes, Bytes>> = self
            .env
            .open_database(&rtxn, Some(table.as_str()))
            .map_err(store_error)?;
        Ok(db.is_some())
    }

    fn create_blocking(&self, table: &TableName) -> Result<(), CommitError> {
        let mut wtxn = self.env.write_txn().map_err(store_error)?;
        let _: Database<Bytes, Bytes> = self
            .env
            .create_database(&mut wtxn, Some(table.as_str()))
            .map_err(store_error)?;
        wtxn.commit().map_err(store_error)
    }

    fn commit_blocking(&self, batch: Batch, deadline: CommitDeadline) -> Result<usize, CommitError> {
        let (table, rows) = batch.into_rows();
        let mut wtxn = self.env.write_txn().map_err(store_error)?;

        let db: Database<Bytes, Bytes> = self
            .env
            .open_database(&wtxn, Some(table.as_str()))
            .map_err(store_error)?
            .ok_or_else(|| CommitError::MissingTable {
                table: table.to_string(),
            })?;

        let written = rows.len();
        for (row_key, values) in rows {
            let key = row_key.as_bytes();
            let mut row = match db.get(&wtxn, key).map_err(store_error)? {
                Some(existing) => serde_json::from_slice::<FieldMap>(existing)
                    .map_err(|e| CommitError::InvalidRow {
                        row_key: row_key.clone(),
                        reason: format!("stored row is not a column map: {e}"),
                    })?,
                None => FieldMap::new(),
            };
            merge_columns(&mut row, values);

            let encoded = serde_json::to_vec(&row).map_err(|e| CommitError::InvalidRow {
                row_key: row_key.clone(),
                reason: e.to_string(),
            })?;
            db.put(&mut wtxn, key, &encoded)
                .map_err(|e| CommitError::InvalidRow {
                    row_key: row_key.clone(),
                    reason: e.to_string(),
                })?;
        }

        if let Err(timeout) = deadline.check() {
            wtxn.abort();
            return Err(timeout);
        }
        wtxn.commit().map_err(store_error)?;
        Ok(written)
    }

    fn get_row_blocking(&self, table: &TableName, row_key: &str) -> Result<Option<FieldMap>, CommitError> {
        let rtxn = self.env.read_txn().map_err(store_error)?;
        let Some(db) = self
            .env
            .open_database::<Bytes, Bytes>(&rtxn, Some(table.as_str()))
            .map_err(store_error)?
        else {
            return Ok(None);
        };
        match db.get(&rtxn, row_key.as_bytes()).map_err(store_error)? {
            Some(bytes) => serde_json::from_slice(bytes).map(Some).map_err(store_error),
            None => Ok(None),
        }
    }

    fn row_count_blocking(&self, table: &TableName) -> Result<usize, CommitError> {
        let rtxn = self.env.read_txn().map_err(store_error)?;
        let db = self
            .env
            .open_database::<Bytes, Bytes>(&rtxn, Some(table.as_str()))
            .map_err(store_error)?
            .ok_or_else(|| CommitError::MissingTable {
                table: table.to_string(),
            })?;
        let count = db.len(&rtxn).map_err(store_error)?;
        usize::try_from(count).map_err(store_error)
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, CommitError>
    where
        T: Send + 'static,
        F: FnOnce(LmdbColumnStore) -> Result<T, CommitError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| CommitError::Store {
                reason: format!("store task failed: {e}"),
            })?
    }
}

#[async_trait]
impl ColumnStore for LmdbColumnStore {
    async fn table_exists(&self, table: &TableName) -> Result<bool, CommitError> {
        let table = table.clone();
        self.run_blocking(move |store| store.exists_blocking(&table)).await
    }

    async fn create_table(&self, table: &TableName) -> Result<(), CommitError> {
        let table = table.clone();
        self.run_blocking(move |store| store.create_blocking(&table)).await
    }

    async fn commit(&self, batch: Batch, deadline: CommitDeadline) -> Result<usize, CommitError> {
        self.run_blocking(move |store| store.commit_blocking(batch, deadline))
            .await
    }

    async fn get_row(&self, table: &TableName, row_key: &str) -> Result<Option<FieldMap>, CommitError> {
        let table = table.clone();
        let row_key = row_key.to_string();
        self.run_blocking(move |store| store.get_row_blocking(&table, &row_key))
            .await
    }

    async fn row_count(&self, table: &TableName) -> Result<usize, CommitError> {
        let table = table.clone();
        self.run_blocking(move |store| store.row_count_blocking(&table)).await
    }
}
