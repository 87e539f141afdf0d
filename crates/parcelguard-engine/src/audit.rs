//! Append-only audit log.
//!
//! Every automatic or manual decision lands here. The log is also the source
//! of truth for resolution state: the ledger is rebuilt from it on startup.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::model::{AuditActionType, AuditLogEntry};

pub trait AuditLog: Send + Sync {
    /// Durably record `entry`. An `Err` means nothing was recorded.
    fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Every entry, oldest first.
    fn entries(&self) -> Result<Vec<AuditLogEntry>, StoreError>;

    /// Entries of the given types (all types when empty), newest first.
    fn history(
        &self,
        action_types: &[AuditActionType],
        limit: Option<usize>,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut entries: Vec<AuditLogEntry> = self
            .entries()?
            .into_iter()
            .filter(|e| action_types.is_empty() || action_types.contains(&e.action_type))
            .collect();
        entries.reverse();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
    available: AtomicBool,
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage of the audit store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log is offline".to_string()));
        }
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log is offline".to_string()));
        }
        Ok(self.entries.read().clone())
    }
}

// ============================================================================
// JSON lines file
// ============================================================================

/// File operations the append path relies on.
trait LogFile: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Open log file plus the length covered by complete, synced lines.
struct LogTail<F> {
    file: F,
    committed: u64,
}

impl<F: LogFile> LogTail<F> {
    /// Write and sync one line. On failure the file is cut back to
    /// `committed`, so a partial line never ends up in front of later ones.
    fn append_line(&mut self, line: &[u8]) -> io::Result<()> {
        let written = self.file.write_all(line).and_then(|()| self.file.sync());
        if let Err(err) = written {
            if let Err(cut) = self.file.truncate_to(self.committed) {
                tracing::error!(error = %cut, "could not cut back partial audit line");
            }
            return Err(err);
        }
        self.committed += line.len() as u64;
        Ok(())
    }
}

/// One JSON object per line, synced to disk after every append.
pub struct JsonlAuditLog {
    tail: Mutex<LogTail<File>>,
    path: PathBuf,
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl JsonlAuditLog {
    /// Open (or create) the log at `path` and replay what is already there.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let entries = Self::replay(&mut file, path)?;
        let committed = file.metadata()?.len();
        tracing::debug!(path = %path.display(), entries = entries.len(), "audit log opened");

        Ok(Self {
            tail: Mutex::new(LogTail { file, committed }),
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(file: &mut File, path: &Path) -> Result<Vec<AuditLogEntry>, StoreError> {
        file.seek(SeekFrom::Start(0))?;
        let lines: Vec<String> = BufReader::new(&*file)
            .lines()
            .collect::<std::io::Result<_>>()?;
        let last = lines.iter().rposition(|l| !l.trim().is_empty());

        let mut entries = Vec::with_capacity(lines.len());
        let mut offset = 0u64;
        for (n, line) in lines.iter().enumerate() {
            if !line.trim().is_empty() {
                match serde_json::from_str::<AuditLogEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    // A crash mid-append leaves at most one torn line at the tail.
                    Err(err) if Some(n) == last => {
                        tracing::warn!(
                            path = %path.display(),
                            line = n + 1,
                            error = %err,
                            "dropping torn trailing audit entry"
                        );
                        file.set_len(offset)?;
                        break;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            offset += line.len() as u64 + 1;
        }
        Ok(entries)
    }
}

impl AuditLog for JsonlAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        self.tail.lock().append_line(line.as_bytes())?;
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(self.entries.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(action_type: AuditActionType, subject: &str) -> AuditLogEntry {
        AuditLogEntry::new(action_type, "admin-1", vec![subject.to_string()], json!({}))
    }

    #[test]
    fn history_filters_and_orders_newest_first() {
        let log = MemoryAuditLog::new();
        log.append(&entry(AuditActionType::ArchiveDuplicateListing, "a"))
            .unwrap();
        log.append(&entry(AuditActionType::AutoDeleteOverlap, "b"))
            .unwrap();
        log.append(&entry(AuditActionType::ArchiveDuplicateListing, "c"))
            .unwrap();

        let archived = log
            .history(&[AuditActionType::ArchiveDuplicateListing], None)
            .unwrap();
        let subjects: Vec<&str> = archived.iter().map(|e| e.subject_ids[0].as_str()).collect();
        assert_eq!(subjects, vec!["c", "a"]);

        let latest = log.history(&[], Some(1)).unwrap();
        assert_eq!(latest[0].subject_ids, vec!["c".to_string()]);
    }

    #[test]
    fn offline_memory_log_rejects_appends() {
        let log = MemoryAuditLog::new();
        log.set_available(false);
        assert!(log
            .append(&entry(AuditActionType::ResolveOverlap, "a"))
            .is_err());
        log.set_available(true);
        assert!(log.is_empty());
    }

    #[test]
    fn jsonl_log_replays_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("log.jsonl");
        {
            let log = JsonlAuditLog::open(&path).unwrap();
            log.append(&entry(AuditActionType::DeleteDuplicateListing, "p1"))
                .unwrap();
            log.append(&entry(AuditActionType::ResolutionConflict, "p1"))
                .unwrap();
        }

        let reopened = JsonlAuditLog::open(&path).unwrap();
        let entries = reopened.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action_type, AuditActionType::DeleteDuplicateListing);
        assert_eq!(entries[1].action_type, AuditActionType::ResolutionConflict);
    }

    /// Accepts `budget` bytes, then fails every write.
    struct ShortFile {
        data: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
            }
            let n = buf.len().min(self.budget);
            self.data.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogFile for ShortFile {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_line() {
        let mut tail = LogTail {
            file: ShortFile {
                data: Vec::new(),
                budget: 64,
            },
            committed: 0,
        };
        tail.append_line(b"first\n").unwrap();

        tail.file.budget = 3;
        assert!(tail.append_line(b"second entry\n").is_err());
        assert_eq!(tail.file.data, b"first\n");
        assert_eq!(tail.committed, 6);

        tail.file.budget = 64;
        tail.append_line(b"third\n").unwrap();
        assert_eq!(tail.file.data, b"first\nthird\n");
    }

    #[test]
    fn torn_tail_is_ignored_but_corrupt_middle_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let good = serde_json::to_string(&entry(AuditActionType::ResolveOverlap, "a")).unwrap();

        std::fs::write(&path, format!("{good}\n{{\"id\": \"trunc")).unwrap();
        {
            let log = JsonlAuditLog::open(&path).unwrap();
            assert_eq!(log.entries().unwrap().len(), 1);
            log.append(&entry(AuditActionType::ResolveOverlap, "b")).unwrap();
        }
        assert_eq!(JsonlAuditLog::open(&path).unwrap().entries().unwrap().len(), 2);

        std::fs::write(&path, format!("not json\n{good}\n")).unwrap();
        assert!(matches!(
            JsonlAuditLog::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
