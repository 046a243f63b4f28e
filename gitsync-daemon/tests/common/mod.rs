#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use git2::{Repository, RepositoryInitOptions, Signature};
use gitsync_core::{RepositorySyncSpec, SyncOutcome};
use gitsync_daemon::NotificationSink;
use gitsync_sync::{RepoSyncer, SyncError};
use tempfile::TempDir;

/// Counts calls and concurrent executions; optionally fails for some paths.
#[derive(Default)]
pub struct FakeSyncer {
    pub work: Duration,
    /// Replaces `work` for the very first call only.
    pub first_work: Option<Duration>,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub per_repo: Mutex<HashMap<PathBuf, usize>>,
    pub failing: Vec<PathBuf>,
}

impl FakeSyncer {
    pub fn with_work(work: Duration) -> Self {
        Self {
            work,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, path: &Path) -> usize {
        self.per_repo
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl RepoSyncer for FakeSyncer {
    fn sync(&self, spec: &RepositorySyncSpec) -> Result<(), SyncError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let work = match self.first_work {
            Some(first) if self.calls() == 0 => first,
            _ => self.work,
        };
        if !work.is_zero() {
            std::thread::sleep(work);
        }
        *self
            .per_repo
            .lock()
            .unwrap()
            .entry(spec.path.clone())
            .or_default() += 1;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&spec.path) {
            return Err(SyncError::RepositoryState {
                path: spec.path.clone(),
                message: "repository has uncommitted changes".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<SyncOutcome>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<SyncOutcome> {
        self.events.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, outcome: &SyncOutcome) {
        self.events.lock().unwrap().push(outcome.clone());
    }
}

/// Let blocking-pool work finish without advancing the paused clock.
pub async fn settle(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
        tokio::task::yield_now().await;
    }
}

pub fn spec(path: &str, interval: u64) -> RepositorySyncSpec {
    let mut spec = RepositorySyncSpec::new(path);
    spec.interval = Some(interval);
    spec
}

// ---------------------------------------------------------------------------
// Git fixtures
// ---------------------------------------------------------------------------

pub struct GitFixture {
    pub dir: TempDir,
    pub remote: PathBuf,
    pub work: PathBuf,
}

impl GitFixture {
    /// Working repo on `main` with one pushed commit and a bare `origin`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let remote = dir.path().join("remote.git");
        let work = dir.path().join("work");

        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).initial_head("main");
        Repository::init_opts(&remote, &opts).expect("init remote");

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&work, &opts).expect("init work");
        repo.remote("origin", remote.to_str().expect("utf-8"))
            .expect("add origin");
        commit_file(&repo, "README.md", "hello\n");
        let mut origin = repo.find_remote("origin").unwrap();
        origin
            .push(&["refs/heads/main:refs/heads/main"], None)
            .expect("initial push");

        Self { dir, remote, work }
    }

    pub fn repo(&self) -> Repository {
        Repository::open(&self.work).expect("open work")
    }

    pub fn remote_head(&self) -> Option<git2::Oid> {
        Repository::open_bare(&self.remote)
            .ok()?
            .refname_to_id("refs/heads/main")
            .ok()
    }
}

pub fn commit_file(repo: &Repository, name: &str, contents: &str) -> git2::Oid {
    let workdir = repo.workdir().expect("non-bare");
    fs::write(workdir.join(name), contents).expect("write");
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parents)
        .unwrap()
}
