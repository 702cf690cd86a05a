//! Artifact store boundary for uploaded processing code.
//!
//! Artifacts are opaque blobs keyed by [`ArtifactName`]
//! (`<tenantId>_<collection>_<key>`). Two implementations ship here: an
//! in-memory map for tests and a directory-backed store for single-node
//! deployments.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use sluice_core::{ArtifactName, LoadError};

/// Error type for artifact store operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ArtifactStoreError {
    /// The name cannot be mapped onto the backing store.
    #[error("Invalid artifact name: {reason}")]
    InvalidName { reason: String },

    #[error("Artifact I/O error: {0}")]
    Io(String),

    #[error("Artifact store lock poisoned")]
    LockPoisoned,
}

impl From<ArtifactStoreError> for LoadError {
    fn from(e: ArtifactStoreError) -> Self {
        LoadError::Store {
            reason: e.to_string(),
        }
    }
}

impl From<std::io::Error> for ArtifactStoreError {
    fn from(e: std::io::Error) -> Self {
        ArtifactStoreError::Io(e.to_string())
    }
}

/// Keyed blob storage for transform artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch an artifact. `Ok(None)` means nothing was uploaded under the name.
    async fn get(&self, name: &ArtifactName) -> Result<Option<Vec<u8>>, ArtifactStoreError>;

    /// Store an artifact, replacing any previous upload under the same name.
    async fn put(&self, name: &ArtifactName, bytes: Vec<u8>) -> Result<(), ArtifactStoreError>;

    /// Remove an artifact. Returns whether one existed.
    async fn delete(&self, name: &ArtifactName) -> Result<bool, ArtifactStoreError>;
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Artifact store backed by a map. Used by tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, name: &ArtifactName) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| ArtifactStoreError::LockPoisoned)?;
        Ok(blobs.get(name.as_str()).cloned())
    }

    async fn put(&self, name: &ArtifactName, bytes: Vec<u8>) -> Result<(), ArtifactStoreError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| ArtifactStoreError::LockPoisoned)?;
        blobs.insert(name.as_str().to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, name: &ArtifactName) -> Result<bool, ArtifactStoreError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| ArtifactStoreError::LockPoisoned)?;
        Ok(blobs.remove(name.as_str()).is_some())
    }
}

// ============================================================================
// FILESYSTEM
// ============================================================================

/// Artifact store that keeps one file per artifact under a root directory.
///
/// Writes go to a uniquely named temporary sibling first and are renamed
/// into place, so a concurrent reader sees either the old or the new body
/// and concurrent writers of the same name never share a staging file. The
/// last rename wins.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, ArtifactStoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &ArtifactName) -> Result<PathBuf, ArtifactStoreError> {
        let raw = name.as_str();
        if raw.is_empty() || raw.starts_with('.') {
            return Err(ArtifactStoreError::InvalidName {
                reason: "name must not be empty or start with '.'".to_string(),
            });
        }
        if raw.contains(['/', '\\', '\0']) {
            return Err(ArtifactStoreError::InvalidName {
                reason: "name must not contain path separators".to_string(),
            });
        }
        Ok(self.root.join(raw))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get(&self, name: &ArtifactName) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &ArtifactName, bytes: Vec<u8>) -> Result<(), ArtifactStoreError> {
        let path = self.path_for(name)?;
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || stage_and_rename(&root, &path, &bytes))
            .await
            .map_err(|e| ArtifactStoreError::Io(format!("artifact write task failed: {e}")))?
    }

    async fn delete(&self, name: &ArtifactName) -> Result<bool, ArtifactStoreError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `bytes` to a fresh staging file under `root` and move it onto
/// `path`. The staging file is removed if anything fails.
fn stage_and_rename(root: &Path, path: &Path, bytes: &[u8]) -> Result<(), ArtifactStoreError> {
    let mut staging = tempfile::Builder::new()
        .prefix(".upload-")
        .tempfile_in(root)?;
    staging.write_all(bytes)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| e.error)?;
    Ok(())
}
