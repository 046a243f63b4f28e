//! Append-only JSON Lines log of sync outcomes.
//!
//! # Storage layout
//!
//! ```text
//! <history dir>/
//!   history.jsonl        (one SyncOutcome per line)
//!   history.jsonl.old    (single rotated backup)
//!   history.jsonl.tmp    (transient, only during retention cleanup)
//!   .history.lock        (advisory lock, content irrelevant)
//! ```
//!
//! Every read and write takes an in-process mutex and then the advisory file
//! lock, so the daemon and CLI readers never observe a torn line.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration as ChronoDuration, Utc};
use gitsync_core::{GlobalSyncPolicy, SyncOutcome};

use crate::error::{io_err, HistoryError};
use crate::lock::FileLock;

pub const HISTORY_FILE: &str = "history.jsonl";
pub const BACKUP_FILE: &str = "history.jsonl.old";
pub const TEMP_FILE: &str = "history.jsonl.tmp";
pub const LOCK_FILE: &str = ".history.lock";

/// Retention and rotation knobs, taken from [`GlobalSyncPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistorySettings {
    /// Result count used when a query asks for `limit = 0`.
    pub max_entries: usize,
    /// Records older than this are dropped by cleanup. 0 disables cleanup.
    pub retention_days: u32,
    /// Rotation threshold. 0 disables rotation.
    pub max_file_bytes: u64,
}

impl HistorySettings {
    pub fn from_policy(policy: &GlobalSyncPolicy) -> Self {
        Self {
            max_entries: policy.history_max_entries,
            retention_days: policy.history_retention_days,
            max_file_bytes: policy.history_max_file_bytes(),
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self::from_policy(&GlobalSyncPolicy::default())
    }
}

/// Filters for [`HistoryStore::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum results; 0 means the configured `max_entries`.
    pub limit: usize,
    pub repo: Option<PathBuf>,
    pub failed_only: bool,
}

#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
    settings: HistorySettings,
    guard: Mutex<()>,
}

impl HistoryStore {
    /// Open (and create if needed) the history directory.
    pub fn open(dir: impl Into<PathBuf>, settings: HistorySettings) -> Result<Self, HistoryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        Ok(Self {
            dir,
            settings,
            guard: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> HistorySettings {
        self.settings
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(TEMP_FILE)
    }

    // -----------------------------------------------------------------------
    // Record
    // -----------------------------------------------------------------------

    /// Append `outcome`, logging and swallowing any failure.
    pub fn record(&self, outcome: &SyncOutcome) {
        if let Err(e) = self.try_record(outcome) {
            tracing::error!(
                "failed to record history for {}: {}",
                outcome.repo_path.display(),
                e
            );
        }
    }

    /// Append `outcome` as one newline-terminated JSON object, flushed to disk.
    pub fn try_record(&self, outcome: &SyncOutcome) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        let _inner = self.lock_inner();
        let _lock = FileLock::acquire(&self.lock_path())?;

        self.rotate_if_needed()?;

        let path = self.history_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.write_all(line.as_bytes()).map_err(|e| io_err(&path, e))?;
        file.sync_data().map_err(|e| io_err(&path, e))?;
        drop(file);

        self.rotate_if_needed()?;
        Ok(())
    }

    /// Move the live file to the `.old` backup once it exceeds the threshold.
    ///
    /// Caller must hold the file lock. Returns `true` if a rotation happened.
    fn rotate_if_needed(&self) -> Result<bool, HistoryError> {
        let max_bytes = self.settings.max_file_bytes;
        if max_bytes == 0 {
            return Ok(false);
        }
        let path = self.history_path();
        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(io_err(&path, err)),
        };
        if size <= max_bytes {
            return Ok(false);
        }

        let backup = self.backup_path();
        fs::rename(&path, &backup).map_err(|e| io_err(&backup, e))?;
        tracing::info!(
            "rotated history file ({} bytes) to {}",
            size,
            backup.display()
        );
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Matching records, newest first, truncated to the query limit.
    ///
    /// Lines that do not parse are skipped.
    pub fn query(&self, query: &HistoryQuery) -> Result<Vec<SyncOutcome>, HistoryError> {
        let contents = {
            let _inner = self.lock_inner();
            let _lock = FileLock::acquire(&self.lock_path())?;
            self.read_live_file()?
        };

        let mut records: Vec<SyncOutcome> = parse_lines(&contents)
            .filter(|r| query.repo.as_deref().map_or(true, |p| r.repo_path == p))
            .filter(|r| !query.failed_only || r.is_failed())
            .collect();

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let limit = if query.limit == 0 {
            self.settings.max_entries
        } else {
            query.limit
        };
        records.truncate(limit);
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------------

    /// Drop records older than the retention window. Returns how many were removed.
    ///
    /// The file is only rewritten when something was removed, and always via
    /// a temp file renamed over the original.
    pub fn clean_old_entries(&self) -> Result<usize, HistoryError> {
        self.clean_old_entries_with(|_| Ok(()))
    }

    fn clean_old_entries_with(
        &self,
        before_rename: impl FnOnce(&Path) -> io::Result<()>,
    ) -> Result<usize, HistoryError> {
        if self.settings.retention_days == 0 {
            return Ok(0);
        }
        let window = ChronoDuration::days(i64::from(self.settings.retention_days));
        let Some(cutoff) = Utc::now().checked_sub_signed(window) else {
            // Window reaches past the earliest representable time: nothing is old enough.
            return Ok(0);
        };

        let _inner = self.lock_inner();
        let _lock = FileLock::acquire(&self.lock_path())?;

        let contents = self.read_live_file()?;
        let mut kept = String::with_capacity(contents.len());
        let mut removed = 0usize;
        for record in parse_lines(&contents) {
            if record.timestamp < cutoff {
                removed += 1;
                continue;
            }
            kept.push_str(&serde_json::to_string(&record)?);
            kept.push('\n');
        }
        if removed == 0 {
            return Ok(0);
        }

        let tmp = self.temp_path();
        let path = self.history_path();
        let write_tmp = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(kept.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write_tmp().and_then(|_| before_rename(&tmp)) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&tmp, e));
        }
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;

        tracing::info!("removed {} history entries older than {}", removed, cutoff);
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn lock_inner(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_live_file(&self) -> Result<String, HistoryError> {
        let path = self.history_path();
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(io_err(&path, err)),
        }
    }
}

fn parse_lines(contents: &str) -> impl Iterator<Item = SyncOutcome> + '_ {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<SyncOutcome>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("skipping malformed history line: {}", e);
                None
            }
        })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gitsync_core::Direction;
    use std::time::Duration;
    use tempfile::TempDir;

    fn outcome(repo: &str, error: Option<&str>) -> SyncOutcome {
        SyncOutcome::completed(
            repo,
            Direction::Push,
            Duration::from_millis(5),
            error.map(str::to_string),
        )
    }

    fn aged(repo: &str, days: i64) -> SyncOutcome {
        let mut o = outcome(repo, None);
        o.timestamp = Utc::now() - ChronoDuration::days(days);
        o
    }

    fn store(dir: &Path, settings: HistorySettings) -> HistoryStore {
        HistoryStore::open(dir, settings).expect("open store")
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn record_appends_one_line_per_outcome() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path(), HistorySettings::default());
        store.record(&outcome("/a", None));
        store.record(&outcome("/b", Some("boom")));

        let raw = fs::read_to_string(store.history_path()).unwrap();
        assert!(raw.ends_with('\n'));
        assert_eq!(raw.lines().count(), 2);
        for line in raw.lines() {
            serde_json::from_str::<SyncOutcome>(line).expect("valid JSON line");
        }
        assert!(dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn query_filters_and_sorts_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path(), HistorySettings::default());
        store.record(&aged("/a", 3));
        store.record(&aged("/b", 2));
        let mut failed = outcome("/a", Some("network down"));
        failed.timestamp = Utc::now() - ChronoDuration::days(1);
        store.record(&failed);

        let all = store.query(&HistoryQuery::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let only_a = store
            .query(&HistoryQuery {
                repo: Some(PathBuf::from("/a")),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(only_a.len(), 2);
        assert_eq!(only_a[0], failed);

        let failures = store
            .query(&HistoryQuery {
                failed_only: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(failures, vec![failed]);

        let newest = store
            .query(&HistoryQuery {
                limit: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].repo_path, PathBuf::from("/a"));
    }

    #[test]
    fn zero_limit_falls_back_to_max_entries() {
        let dir = TempDir::new().unwrap();
        let settings = HistorySettings {
            max_entries: 2,
            ..Default::default()
        };
        let store = store(dir.path(), settings);
        for _ in 0..5 {
            store.record(&outcome("/a", None));
        }
        assert_eq!(store.query(&HistoryQuery::default()).unwrap().len(), 2);
    }

    #[test]
    fn query_on_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path(), HistorySettings::default());
        assert!(store.query(&HistoryQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path(), HistorySettings::default());
        store.record(&outcome("/a", None));
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.history_path())
            .unwrap();
        file.write_all(b"{not json\n").unwrap();
        store.record(&outcome("/b", None));

        assert_eq!(store.query(&HistoryQuery::default()).unwrap().len(), 2);
    }

    #[test]
    fn oversized_file_rotates_once_before_next_append() {
        let dir = TempDir::new().unwrap();
        let big = store(dir.path(), HistorySettings::default());
        for _ in 0..20 {
            big.record(&outcome("/a", None));
        }
        let before = fs::read_to_string(big.history_path()).unwrap();
        assert!(before.len() > 1024);

        let small = store(
            dir.path(),
            HistorySettings {
                max_file_bytes: 1024,
                ..Default::default()
            },
        );
        small.record(&outcome("/b", None));

        assert_eq!(fs::read_to_string(small.backup_path()).unwrap(), before);
        assert_eq!(line_count(&small.history_path()), 1);
    }

    #[test]
    fn rotation_overwrites_previous_backup() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(BACKUP_FILE), "stale\n").unwrap();
        let store = store(
            dir.path(),
            HistorySettings {
                max_file_bytes: 10,
                ..Default::default()
            },
        );
        store.record(&outcome("/a", None));

        let backup = fs::read_to_string(store.backup_path()).unwrap();
        assert!(!backup.contains("stale"));
        assert_eq!(backup.lines().count(), 1);
        assert!(!store.history_path().exists());
    }

    #[test]
    fn zero_threshold_disables_rotation() {
        let dir = TempDir::new().unwrap();
        let store = store(
            dir.path(),
            HistorySettings {
                max_file_bytes: 0,
                ..Default::default()
            },
        );
        for _ in 0..10 {
            store.record(&outcome("/a", None));
        }
        assert!(!store.backup_path().exists());
        assert_eq!(line_count(&store.history_path()), 10);
    }

    #[test]
    fn clean_removes_only_expired_records() {
        let dir = TempDir::new().unwrap();
        let store = store(
            dir.path(),
            HistorySettings {
                retention_days: 30,
                ..Default::default()
            },
        );
        store.record(&aged("/old", 45));
        store.record(&aged("/recent", 5));
        store.record(&aged("/older", 31));

        assert_eq!(store.clean_old_entries().unwrap(), 2);
        let left = store.query(&HistoryQuery::default()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].repo_path, PathBuf::from("/recent"));
        assert!(!dir.path().join(TEMP_FILE).exists());
    }

    #[test]
    fn clean_with_nothing_expired_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path(), HistorySettings::default());
        store.record(&outcome("/a", None));
        let before = fs::read_to_string(store.history_path()).unwrap();
        assert_eq!(store.clean_old_entries().unwrap(), 0);
        assert_eq!(fs::read_to_string(store.history_path()).unwrap(), before);
    }

    #[test]
    fn retention_beyond_calendar_range_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let store = store(
            dir.path(),
            HistorySettings {
                retention_days: u32::MAX,
                ..Default::default()
            },
        );
        store.record(&aged("/ancient", 20_000));
        store.record(&aged("/recent", 1));

        assert_eq!(store.clean_old_entries().unwrap(), 0);
        assert_eq!(line_count(&store.history_path()), 2);
    }

    #[test]
    fn failed_rewrite_leaves_original_intact() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path(), HistorySettings::default());
        store.record(&aged("/old", 90));
        store.record(&aged("/new", 1));
        let before = fs::read_to_string(store.history_path()).unwrap();

        let result = store.clean_old_entries_with(|tmp| {
            assert!(tmp.exists());
            Err(io::Error::new(io::ErrorKind::Other, "simulated crash"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(store.history_path()).unwrap(), before);
        assert!(!dir.path().join(TEMP_FILE).exists());
    }

    #[test]
    fn record_into_unwritable_dir_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let store = store(dir.path(), HistorySettings::default());
        fs::create_dir(store.history_path()).unwrap();
        store.record(&outcome("/a", None));
        assert!(store.try_record(&outcome("/a", None)).is_err());
    }
}
