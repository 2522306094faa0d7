//! services/agent/src/adapters/watermark.rs
//!
//! This module contains the file-backed implementation of the `WatermarkStore`
//! port: one small JSON document holding the timestamp of the last completed
//! poll cycle, readable by anything that wants to inspect it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use taskpilot_core::ports::{PortError, PortResult, WatermarkStore};

/// On-disk shape: `{"last_check": "<RFC 3339 timestamp>"}`.
#[derive(Serialize, Deserialize)]
struct WatermarkFile {
    last_check: DateTime<Utc>,
}

/// A `WatermarkStore` backed by a single JSON file.
#[derive(Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    /// Creates a new `FileWatermarkStore`. The file is created on first `store`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self) -> PortResult<Option<DateTime<Utc>>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PortError::Unexpected(e.to_string())),
        };

        let file: WatermarkFile =
            serde_json::from_str(&contents).map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Some(file.last_check))
    }

    async fn store(&self, at: DateTime<Utc>) -> PortResult<()> {
        let contents = serde_json::to_string_pretty(&WatermarkFile { last_check: at })
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Write-then-rename so a crash mid-write never leaves a torn file.
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}
