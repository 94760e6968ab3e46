//! JSON document persistence.
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! crash leaves either the old document or the new one, never a torn file.
//! This is best-effort crash consistency for a single document; there is no
//! atomicity across documents or between a document and its index rows
//! (rebuilding indexes recovers from that).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use curio_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::index::PathLocks;

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Read and deserialize a document. Absence is `Ok(None)`; a zero-length
/// file is treated as a corrupt leftover, deleted, and reported absent.
pub(crate) async fn read_json<T: DeserializeOwned>(
    locks: &PathLocks,
    path: &Path,
) -> Result<Option<T>> {
    let permit = locks.read(path).await;
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() {
        drop(permit);
        let _exclusive = locks.write(path).await;
        // Re-check under the exclusive permit; a concurrent save may have
        // replaced the file in the meantime.
        if fs::metadata(path).await.map(|m| m.len() == 0).unwrap_or(false) {
            warn!(path = %path.display(), "deleting zero-length document");
            if let Err(e) = fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "could not delete corrupt document");
            }
        }
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Serialize and write a document atomically, replacing any existing one.
pub(crate) async fn write_json<T: Serialize>(
    locks: &PathLocks,
    path: &Path,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let _permit = locks.write(path).await;
    let tmp = tmp_path(path);
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Serialize and write a brand-new document. An existing file at the path
/// means an id collision, which is fatal rather than retried.
pub(crate) async fn create_json<T: Serialize>(
    locks: &PathLocks,
    path: &Path,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let _permit = locks.write(path).await;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                Error::DocumentExists(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn absent_is_none_and_zero_length_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let locks = PathLocks::default();
        let path = dir.path().join("doc.json");

        let missing: Option<Value> = read_json(&locks, &path).await.unwrap();
        assert!(missing.is_none());

        fs::write(&path, b"").await.unwrap();
        let corrupt: Option<Value> = read_json(&locks, &path).await.unwrap();
        assert!(corrupt.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn create_refuses_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let locks = PathLocks::default();
        let path = dir.path().join("doc.json");

        create_json(&locks, &path, &json!({"a": 1})).await.unwrap();
        let err = create_json(&locks, &path, &json!({"a": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentExists(_)));

        // Ordinary write replaces and leaves no temp file behind.
        write_json(&locks, &path, &json!({"a": 3})).await.unwrap();
        let back: Option<Value> = read_json(&locks, &path).await.unwrap();
        assert_eq!(back, Some(json!({"a": 3})));
        assert!(!tmp_path(&path).exists());
    }
}
