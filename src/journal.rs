//! The per-user `.transfers_state` journal of in-flight uploads and downloads.
//!
//! One record per line, fields colon-separated: `local_path:remote_path:bytes_completed:
//! total_bytes:timestamp`. Malformed lines are dropped rather than rejected, mirroring the
//! donor's tolerant parsing at load time.

use crate::error::{Error, ErrorKind, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Journal entries are evicted this long after their last-touched timestamp.
pub const TRANSFER_TIMEOUT_SECS: u64 = 60 * 60;

const JOURNAL_FILE_NAME: &str = ".transfers_state";

/// One in-flight transfer, as recorded in a user's journal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferRecord {
    /// The path as seen by the peer that initiated the transfer.
    pub local_path: String,
    /// The absolute path on the server.
    pub remote_path: String,
    /// Bytes transferred so far.
    pub bytes_completed: u64,
    /// Total size of the transfer.
    pub total_bytes: u64,
    /// UNIX timestamp, in seconds, of the last update to this record.
    pub timestamp: u64,
}

impl TransferRecord {
    fn to_line(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.local_path, self.remote_path, self.bytes_completed, self.total_bytes, self.timestamp
        )
    }

    fn parse(line: &str) -> Option<TransferRecord> {
        let mut parts = line.splitn(5, ':');
        let local_path = parts.next()?.to_string();
        let remote_path = parts.next()?.to_string();
        let bytes_completed: u64 = parts.next()?.parse().ok()?;
        let total_bytes: u64 = parts.next()?.parse().ok()?;
        let timestamp: u64 = parts.next()?.parse().ok()?;
        Some(TransferRecord {
            local_path,
            remote_path,
            bytes_completed,
            total_bytes,
            timestamp,
        })
    }
}

/// Per-process registry of per-user-directory journal mutexes, so two sessions for the same
/// user never interleave a read-modify-write cycle on the journal file.
#[derive(Clone, Default)]
pub struct TransferJournal {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl TransferJournal {
    /// Creates an empty journal coordinator. One instance is shared by the whole server.
    pub fn new() -> Self {
        TransferJournal::default()
    }

    async fn lock_for(&self, user_dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(user_dir.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Appends a new record to `user_dir`'s journal.
    pub async fn add(&self, user_dir: &Path, record: &TransferRecord, now: u64) -> Result<()> {
        let lock = self.lock_for(user_dir).await;
        let _guard = lock.lock().await;
        let mut records = read_records(user_dir).await?;
        records.retain(|r| r.remote_path != record.remote_path);
        records.push(record.clone());
        write_records(user_dir, &records).await?;
        let _ = now;
        Ok(())
    }

    /// Updates the `bytes_completed` field of the record matching `remote_path`. A call with
    /// the same `bytes` value applied twice has the same effect as once.
    pub async fn update(&self, user_dir: &Path, remote_path: &str, bytes: u64, now: u64) -> Result<()> {
        let lock = self.lock_for(user_dir).await;
        let _guard = lock.lock().await;
        let mut records = read_records(user_dir).await?;
        for record in &mut records {
            if record.remote_path == remote_path {
                record.bytes_completed = bytes;
                record.timestamp = now;
            }
        }
        write_records(user_dir, &records).await
    }

    /// Removes the record matching `local_path`.
    pub async fn remove(&self, user_dir: &Path, local_path: &str) -> Result<()> {
        let lock = self.lock_for(user_dir).await;
        let _guard = lock.lock().await;
        let mut records = read_records(user_dir).await?;
        records.retain(|r| r.local_path != local_path);
        write_records(user_dir, &records).await
    }

    /// Returns the currently active (non-expired) transfer records for `user_dir`.
    pub async fn active(&self, user_dir: &Path) -> Result<Vec<TransferRecord>> {
        let lock = self.lock_for(user_dir).await;
        let _guard = lock.lock().await;
        read_records(user_dir).await
    }

    /// Drops entries whose `timestamp + TRANSFER_TIMEOUT_SECS < now`.
    pub async fn clear(&self, user_dir: &Path, now: u64) -> Result<()> {
        let lock = self.lock_for(user_dir).await;
        let _guard = lock.lock().await;
        let mut records = read_records(user_dir).await?;
        records.retain(|r| r.timestamp + TRANSFER_TIMEOUT_SECS >= now);
        write_records(user_dir, &records).await
    }
}

async fn read_records(user_dir: &Path) -> Result<Vec<TransferRecord>> {
    let path = user_dir.join(JOURNAL_FILE_NAME);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::with_source(ErrorKind::FileOpenFailed, "failed to read transfer journal", e)),
    };
    Ok(contents.lines().filter_map(TransferRecord::parse).collect())
}

async fn write_records(user_dir: &Path, records: &[TransferRecord]) -> Result<()> {
    let path = user_dir.join(JOURNAL_FILE_NAME);
    let tmp_path = user_dir.join(".transfers_state.tmp");
    let body = records.iter().map(TransferRecord::to_line).collect::<Vec<_>>().join("\n");
    tokio::fs::write(&tmp_path, body.as_bytes())
        .await
        .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed writing transfer journal", e))?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| Error::with_source(ErrorKind::FileWriteFailed, "failed renaming transfer journal into place", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(remote: &str, bytes: u64, total: u64, ts: u64) -> TransferRecord {
        TransferRecord {
            local_path: format!("local-{remote}"),
            remote_path: remote.to_string(),
            bytes_completed: bytes,
            total_bytes: total,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn add_then_active_round_trips() {
        let dir = tempdir().unwrap();
        let journal = TransferJournal::new();
        journal.add(dir.path(), &record("a.txt", 0, 100, 1000), 1000).await.unwrap();
        let active = journal.active(dir.path()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].remote_path, "a.txt");
    }

    #[tokio::test]
    async fn update_is_idempotent() {
        let dir = tempdir().unwrap();
        let journal = TransferJournal::new();
        journal.add(dir.path(), &record("a.txt", 0, 100, 1000), 1000).await.unwrap();
        journal.update(dir.path(), "a.txt", 50, 1001).await.unwrap();
        let once = journal.active(dir.path()).await.unwrap();
        journal.update(dir.path(), "a.txt", 50, 1001).await.unwrap();
        let twice = journal.active(dir.path()).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(once[0].bytes_completed, 50);
    }

    #[tokio::test]
    async fn remove_drops_the_matching_record() {
        let dir = tempdir().unwrap();
        let journal = TransferJournal::new();
        journal.add(dir.path(), &record("a.txt", 0, 100, 1000), 1000).await.unwrap();
        journal.remove(dir.path(), "local-a.txt").await.unwrap();
        assert!(journal.active(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_evicts_only_stale_entries() {
        let dir = tempdir().unwrap();
        let journal = TransferJournal::new();
        journal.add(dir.path(), &record("stale.txt", 0, 100, 0), 0).await.unwrap();
        journal.add(dir.path(), &record("fresh.txt", 0, 100, 5000), 5000).await.unwrap();
        let now = TRANSFER_TIMEOUT_SECS + 100;
        journal.clear(dir.path(), now).await.unwrap();
        let remaining = journal.active(dir.path()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].remote_path, "fresh.txt");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_on_read() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(JOURNAL_FILE_NAME), b"not:a:valid:record\na.txt:b.txt:1:2:3")
            .await
            .unwrap();
        let journal = TransferJournal::new();
        let active = journal.active(dir.path()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].local_path, "a.txt");
    }
}
