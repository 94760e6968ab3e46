//! Generic two-column index files.
//!
//! An index is an append-only CSV file of `key,value` rows. Lookups stream
//! the file lazily; removal rewrites the surviving rows to a `.new` sibling
//! and renames it over the original, never truncating in place. Append order
//! is preserved, and removal keeps the relative order of survivors.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::csv;

/// One index row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl Entry {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Per-path lock table: one counting semaphore of capacity 2 per file path,
/// created lazily and kept for the life of the owning store.
///
/// A reader takes one permit, a writer takes both, so readers may overlap
/// but a writer is exclusive. The table is owned by a store instance, not
/// process-wide, so two store roots in one process never share locks.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Semaphore>>>,
}

impl PathLocks {
    fn semaphore(&self, path: &Path) -> Arc<Semaphore> {
        let mut locks = self.locks.lock();
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Semaphore::new(2)))
            .clone()
    }

    pub async fn read(&self, path: &Path) -> OwnedSemaphorePermit {
        self.semaphore(path)
            .acquire_owned()
            .await
            .expect("path lock semaphore is never closed")
    }

    pub async fn write(&self, path: &Path) -> OwnedSemaphorePermit {
        self.semaphore(path)
            .acquire_many_owned(2)
            .await
            .expect("path lock semaphore is never closed")
    }
}

/// Index file operations over one lock table.
///
/// Expected conditions (missing file on read or remove) are not errors;
/// append failures are logged and reported as `false` rather than
/// propagated. Blank keys are precondition violations and panic.
#[derive(Debug, Clone)]
pub struct IndexManager {
    locks: Arc<PathLocks>,
}

impl IndexManager {
    #[must_use]
    pub fn new(locks: Arc<PathLocks>) -> Self {
        Self { locks }
    }

    /// Stream entries matching `predicate`, in file order.
    ///
    /// The stream holds a read permit on the index until it is dropped, so
    /// callers should not buffer it across unrelated writes to the same
    /// index. Cancellation stops the stream at the next row without error. A
    /// missing file yields an empty stream; a zero-length file is treated as
    /// corrupt and deleted.
    pub async fn lookup<P>(
        &self,
        path: &Path,
        predicate: P,
        cancel: &CancellationToken,
    ) -> BoxStream<'static, Entry>
    where
        P: Fn(&Entry) -> bool + Send + 'static,
    {
        let permit = self.locks.read(path).await;
        let file = match OpenOptions::new().read(true).open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return stream::empty().boxed(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index open failed");
                return stream::empty().boxed();
            }
        };
        if file.metadata().await.map(|m| m.len() == 0).unwrap_or(false) {
            drop(file);
            drop(permit);
            self.delete_if_empty(path).await;
            return stream::empty().boxed();
        }

        let lines = BufReader::new(file).lines();
        let state = LookupState {
            lines,
            predicate,
            cancel: cancel.clone(),
            path: path.to_path_buf(),
            _permit: permit,
        };
        stream::unfold(state, |mut state| async move {
            loop {
                if state.cancel.is_cancelled() {
                    return None;
                }
                match state.lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let Some((key, value)) = csv::parse_row(&line) else {
                            warn!(path = %state.path.display(), "skipping malformed index row");
                            continue;
                        };
                        let entry = Entry { key, value };
                        if (state.predicate)(&entry) {
                            return Some((entry, state));
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        warn!(path = %state.path.display(), error = %e, "index read failed");
                        return None;
                    }
                }
            }
        })
        .boxed()
    }

    /// Collect every entry of an index.
    pub async fn all(&self, path: &Path, cancel: &CancellationToken) -> Vec<Entry> {
        self.lookup(path, |_| true, cancel).await.collect().await
    }

    /// Append one entry. Blank keys are programming errors; I/O failures are
    /// logged and reported as `false`.
    pub async fn add(&self, path: &Path, key: &str, value: &str) -> bool {
        self.add_many(path, &[Entry::new(key, value)]).await
    }

    /// Append several entries under one exclusive permit.
    pub async fn add_many(&self, path: &Path, entries: &[Entry]) -> bool {
        for entry in entries {
            assert!(!entry.key.trim().is_empty(), "index key must be non-blank");
        }
        if entries.is_empty() {
            return true;
        }
        let _permit = self.locks.write(path).await;
        let mut body = String::new();
        for entry in entries {
            body.push_str(&csv::format_row(&entry.key, &entry.value));
        }
        let result = async {
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .await?;
            file.write_all(body.as_bytes()).await?;
            file.flush().await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index append failed");
                false
            }
        }
    }

    /// Remove all entries with the given key. Missing file or key is a
    /// success.
    pub async fn remove_by_key(&self, path: &Path, key: &str) -> bool {
        assert!(!key.trim().is_empty(), "index key must be non-blank");
        let key = key.to_string();
        self.remove_where(path, move |e| e.key == key).await
    }

    /// Remove all entries with the given value.
    pub async fn remove_by_value(&self, path: &Path, value: &str) -> bool {
        let value = value.to_string();
        self.remove_where(path, move |e| e.value == value).await
    }

    /// Rewrite-and-rename removal: surviving rows go to a `.new` sibling
    /// which replaces the original. An index left empty is deleted outright.
    async fn remove_where(&self, path: &Path, condemned: impl Fn(&Entry) -> bool) -> bool {
        let _permit = self.locks.write(path).await;
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index read failed");
                return false;
            }
        };
        let mut survivors = String::new();
        let mut removed = 0usize;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // Malformed rows survive until the next rebuild.
            if let Some((key, value)) = csv::parse_row(line) {
                if condemned(&Entry { key, value }) {
                    removed += 1;
                    continue;
                }
            }
            survivors.push_str(line);
            survivors.push_str("\r\n");
        }
        if removed == 0 {
            return true;
        }
        debug!(path = %path.display(), removed, "pruned index rows");
        match self.replace_contents(path, &survivors).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index rewrite failed");
                false
            }
        }
    }

    /// Replace an index wholesale with the given entries, atomically.
    /// Rebuilds use this; an empty entry list deletes the file.
    pub async fn rebuild(&self, path: &Path, entries: &[Entry]) -> bool {
        let _permit = self.locks.write(path).await;
        let mut body = String::new();
        for entry in entries {
            body.push_str(&csv::format_row(&entry.key, &entry.value));
        }
        match self.replace_contents(path, &body).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index rebuild failed");
                false
            }
        }
    }

    /// Caller must hold the exclusive permit.
    async fn replace_contents(&self, path: &Path, body: &str) -> std::io::Result<()> {
        if body.is_empty() {
            return match fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            };
        }
        let mut sibling = path.as_os_str().to_os_string();
        sibling.push(".new");
        let sibling = PathBuf::from(sibling);
        fs::write(&sibling, body.as_bytes()).await?;
        fs::rename(&sibling, path).await
    }

    async fn delete_if_empty(&self, path: &Path) {
        let _permit = self.locks.write(path).await;
        // Re-check: a writer may have appended while we waited.
        if fs::metadata(path).await.map(|m| m.len() == 0).unwrap_or(false) {
            warn!(path = %path.display(), "deleting zero-length index file");
            if let Err(e) = fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "could not delete empty index");
            }
        }
    }
}

struct LookupState<P> {
    lines: tokio::io::Lines<BufReader<tokio::fs::File>>,
    predicate: P,
    cancel: CancellationToken,
    path: PathBuf,
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, IndexManager, CancellationToken) {
        let dir = tempfile::tempdir().unwrap();
        let manager = IndexManager::new(Arc::new(PathLocks::default()));
        (dir, manager, CancellationToken::new())
    }

    #[tokio::test]
    async fn add_then_lookup_round_trips_in_order() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        assert!(index.add(&path, "alice", "a.json").await);
        assert!(index.add(&path, "bob", "b.json").await);
        assert!(index.add(&path, "alice", "a2.json").await);

        let all = index.all(&path, &cancel).await;
        assert_eq!(
            all,
            vec![
                Entry::new("alice", "a.json"),
                Entry::new("bob", "b.json"),
                Entry::new("alice", "a2.json"),
            ]
        );
    }

    #[tokio::test]
    async fn lookup_with_prefix_predicate() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        index.add(&path, "alice", "a.json").await;
        index.add(&path, "bob", "b.json").await;

        let hits: Vec<Entry> = index
            .lookup(&path, |e| e.key.starts_with('a'), &cancel)
            .await
            .collect()
            .await;
        assert_eq!(hits, vec![Entry::new("alice", "a.json")]);
    }

    #[tokio::test]
    async fn missing_file_reads_empty_and_removes_ok() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("absent.csv");
        assert!(index.all(&path, &cancel).await.is_empty());
        assert!(index.remove_by_key(&path, "anything").await);
    }

    #[tokio::test]
    async fn remove_by_key_is_exact_and_order_preserving() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        for (k, v) in [("a", "1"), ("b", "2"), ("a", "3"), ("c", "4")] {
            index.add(&path, k, v).await;
        }
        assert!(index.remove_by_key(&path, "a").await);
        let all = index.all(&path, &cancel).await;
        assert_eq!(all, vec![Entry::new("b", "2"), Entry::new("c", "4")]);

        // Removing a key that is not there is a no-op success.
        assert!(index.remove_by_key(&path, "zz").await);
        assert_eq!(index.all(&path, &cancel).await.len(), 2);
    }

    #[tokio::test]
    async fn removing_the_last_entry_deletes_the_file() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        index.add(&path, "only", "o.json").await;
        assert!(index.remove_by_value(&path, "o.json").await);
        assert!(!path.exists());
        assert!(index.all(&path, &cancel).await.is_empty());
    }

    #[tokio::test]
    async fn zero_length_index_is_deleted_on_read() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        fs::write(&path, b"").await.unwrap();
        assert!(index.all(&path, &cancel).await.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn cancellation_stops_the_stream_without_error() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        index.add(&path, "a", "1").await;
        index.add(&path, "b", "2").await;

        let mut stream = index.lookup(&path, |_| true, &cancel).await;
        assert!(stream.next().await.is_some());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn quoted_values_survive_the_codec() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        index.add(&path, "a,b \"c\"", "v.json").await;
        let all = index.all(&path, &cancel).await;
        assert_eq!(all, vec![Entry::new("a,b \"c\"", "v.json")]);
    }

    #[tokio::test]
    async fn concurrent_readers_do_not_deadlock() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        index.add(&path, "a", "1").await;

        let mut first = index.lookup(&path, |_| true, &cancel).await;
        let mut second = index.lookup(&path, |_| true, &cancel).await;
        assert!(first.next().await.is_some());
        assert!(second.next().await.is_some());
    }

    #[tokio::test]
    async fn rebuild_replaces_and_empty_rebuild_deletes() {
        let (dir, index, cancel) = manager();
        let path = dir.path().join("names.csv");
        index.add(&path, "old", "x").await;
        index
            .rebuild(&path, &[Entry::new("n1", "f1"), Entry::new("n2", "f2")])
            .await;
        assert_eq!(
            index.all(&path, &cancel).await,
            vec![Entry::new("n1", "f1"), Entry::new("n2", "f2")]
        );
        index.rebuild(&path, &[]).await;
        assert!(!path.exists());
    }
}
