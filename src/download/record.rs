//! Log of granted downloads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::email::Email;
use crate::error::Result;

/// One granted download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: Uuid,
    pub email: Email,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub downloaded_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn new(
        email: Email,
        client_id: impl Into<String>,
        user_agent: Option<String>,
        downloaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            client_id: client_id.into(),
            user_agent,
            downloaded_at,
        }
    }
}

/// Destination for download records.
#[async_trait]
pub trait DownloadLog: Send + Sync {
    async fn record(&self, record: &DownloadRecord) -> Result<()>;
}

/// Appends one JSON object per line to a file.
#[derive(Debug, Clone)]
pub struct FileDownloadLog {
    path: PathBuf,
}

impl FileDownloadLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DownloadLog for FileDownloadLog {
    async fn record(&self, record: &DownloadRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryDownloadLog {
    records: Mutex<Vec<DownloadRecord>>,
}

impl MemoryDownloadLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DownloadRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DownloadLog for MemoryDownloadLog {
    async fn record(&self, record: &DownloadRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
