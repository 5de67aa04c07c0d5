//! Durable persistence contract for cached token entries, plus the two
//! reference implementations: an in-memory store and a plain JSON file.
//!
//! The mutation operations take full snapshots (`existing`, `to_keep`)
//! because file-shaped backends rewrite the whole entry set on every change;
//! the persisted format must round-trip all entry fields, including
//! provider-opaque ones, with no loss.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use log::{debug, info};
use tokio::fs;

use super::models::CacheEntry;
use crate::error::StoreError;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load every persisted entry. An absent backing file is an empty set,
    /// not an error.
    async fn load_entries(&self) -> Result<Vec<CacheEntry>, StoreError>;

    /// Persist `new_entries` alongside the already-persisted `existing`
    /// snapshot. The caller has already deduplicated the batch.
    async fn add_entries(
        &self,
        new_entries: &[CacheEntry],
        existing: &[CacheEntry],
    ) -> Result<(), StoreError>;

    /// Drop `to_remove`, retaining exactly `to_keep`.
    async fn remove_entries(
        &self,
        to_remove: &[CacheEntry],
        to_keep: &[CacheEntry],
    ) -> Result<(), StoreError>;

    /// Drop every persisted entry.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Whether the backing medium offers OS-level secret protection.
    fn is_secure(&self) -> bool {
        false
    }
}

/// In-memory token store for tests and simple embeddings.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: RwLock<Vec<CacheEntry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load_entries(&self) -> Result<Vec<CacheEntry>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;
        Ok(entries.clone())
    }

    async fn add_entries(
        &self,
        new_entries: &[CacheEntry],
        _existing: &[CacheEntry],
    ) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;
        entries.extend_from_slice(new_entries);
        Ok(())
    }

    async fn remove_entries(
        &self,
        _to_remove: &[CacheEntry],
        to_keep: &[CacheEntry],
    ) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;
        *entries = to_keep.to_vec();
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Other("lock poisoned".into()))?;
        entries.clear();
        Ok(())
    }
}

/// File-backed token store: one JSON array, rewritten whole on mutation.
///
/// Offers no OS-level secret protection; callers that need it plug in a
/// keychain-backed [`TokenStore`] instead.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default per-user location.
    pub fn at_default_path() -> Result<Self, StoreError> {
        Ok(Self::new(Self::default_path()?))
    }

    /// Default location: XDG config directory on Linux, dot-directory in the
    /// home directory elsewhere.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .ok_or_else(|| StoreError::Other("no config directory".into()))?
                .join("azure-account")
        } else {
            dirs::home_dir()
                .ok_or_else(|| StoreError::Other("no home directory".into()))?
                .join(".azure-account")
        };
        Ok(dir.join("tokens.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_entries(&self, entries: &[CacheEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, payload).await?;

        // Token material is secret; keep the file owner-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        debug!("wrote {} token entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load_entries(&self) -> Result<Vec<CacheEntry>, StoreError> {
        match fs::read(&self.path).await {
            Ok(raw) => {
                let entries: Vec<CacheEntry> = serde_json::from_slice(&raw)?;
                debug!("loaded {} token entries from {:?}", entries.len(), self.path);
                Ok(entries)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn add_entries(
        &self,
        new_entries: &[CacheEntry],
        existing: &[CacheEntry],
    ) -> Result<(), StoreError> {
        let mut all = existing.to_vec();
        all.extend_from_slice(new_entries);
        self.write_entries(&all).await
    }

    async fn remove_entries(
        &self,
        to_remove: &[CacheEntry],
        to_keep: &[CacheEntry],
    ) -> Result<(), StoreError> {
        debug!(
            "removing {} token entries, keeping {}",
            to_remove.len(),
            to_keep.len()
        );
        self.write_entries(to_keep).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("cleared token store at {:?}", self.path);
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
