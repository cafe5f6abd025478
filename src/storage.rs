//! # Upload Persistence
//!
//! Keeps a copy of every accepted upload on disk. This runs as a detached
//! background task: the response never waits for it and a failed write is only
//! logged.

use actix_web::web::Bytes;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

/// Spawn the write and return immediately.
///
/// The handle is returned for tests; the request handler drops it.
pub fn spawn_persist(dir: PathBuf, bytes: Bytes) -> JoinHandle<()> {
    tokio::spawn(async move {
        match persist(&dir, &bytes).await {
            Ok(path) => tracing::debug!(path = %path.display(), bytes = bytes.len(), "Upload saved"),
            Err(e) => tracing::error!(dir = %dir.display(), "Failed to save upload: {:#}", e),
        }
    })
}

/// Write `bytes` into `dir` (created if needed) under a fresh timestamped name.
pub async fn persist(dir: &Path, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let path = dir.join(upload_file_name(Utc::now()));
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(path)
}

/// `audio_<unix millis>_<random>.wav`; the suffix keeps same-millisecond uploads apart.
pub fn upload_file_name(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("audio_{}_{}.wav", at.timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_is_timestamp_derived() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let name = upload_file_name(at);
        assert!(name.starts_with("audio_1700000000123_"));
        assert!(name.ends_with(".wav"));
        assert_ne!(name, upload_file_name(at));
    }

    #[tokio::test]
    async fn test_persist_creates_directory_and_writes_bytes() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("uploads");

        let path = persist(&dir, b"RIFF....WAVE").await.unwrap();
        assert!(path.starts_with(&dir));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"RIFF....WAVE");
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let root = tempfile::tempdir().unwrap();
        // A regular file where the directory should be makes create_dir_all fail.
        let blocker = root.path().join("uploads");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let handle = spawn_persist(blocker.clone(), Bytes::from_static(b"data"));
        handle.await.unwrap();
        assert!(blocker.is_file());
    }
}
