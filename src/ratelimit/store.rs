//! Persistence for rate limit state.
//!
//! The whole map is loaded and saved at once. Implementations only move bytes;
//! window logic lives in the limiter.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::entry::RateLimitEntry;
use crate::error::Result;

/// Rate limit entries keyed by client id.
pub type RateLimitStore = BTreeMap<String, RateLimitEntry>;

/// Trait for rate limit state storage.
///
/// This abstracts over the file-backed store used in production and the
/// in-memory store used in tests and ephemeral deployments.
#[async_trait]
pub trait RateLimitStateStore: Send + Sync {
    /// Load the full store.
    async fn load(&self) -> Result<RateLimitStore>;

    /// Replace the full store.
    async fn save(&self, store: &RateLimitStore) -> Result<()>;
}

/// JSON file store.
///
/// A missing file loads as an empty store. Saves go through a temporary file
/// and a rename so readers never see a half-written map.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl RateLimitStateStore for FileStateStore {
    async fn load(&self) -> Result<RateLimitStore> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %self.path.display(), "No rate limit state yet");
                return Ok(RateLimitStore::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, store: &RateLimitStore) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(store)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        trace!(path = %self.path.display(), entries = store.len(), "Saved rate limit state");
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    store: Mutex<RateLimitStore>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> RateLimitStore {
        self.store.lock().clone()
    }
}

#[async_trait]
impl RateLimitStateStore for MemoryStateStore {
    async fn load(&self) -> Result<RateLimitStore> {
        Ok(self.store.lock().clone())
    }

    async fn save(&self, store: &RateLimitStore) -> Result<()> {
        *self.store.lock() = store.clone();
        Ok(())
    }
}
