//! One periodic task per enabled repository.
//!
//! Every task waits out the initial delay, then ticks on its own interval.
//! A tick takes a [`ConcurrencyGate`] permit, runs the sync on the blocking
//! pool, and hands the outcome to history and the notification sink. Ticks
//! missed while an attempt is running are skipped, never queued, so attempts
//! for one repository never overlap.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use gitsync_core::{RepositorySyncSpec, SyncConfig, SyncOutcome, SyncStatus};
use gitsync_sync::{HistoryStore, RepoSyncer};

use crate::gate::ConcurrencyGate;
use crate::notifier::NotificationSink;
use crate::paths::{INITIAL_SYNC_DELAY, SCHEDULER_STOP_GRACE};

/// Start-up delay and stop grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTiming {
    pub initial_delay: Duration,
    pub stop_grace: Duration,
}

impl Default for ScheduleTiming {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_SYNC_DELAY,
            stop_grace: SCHEDULER_STOP_GRACE,
        }
    }
}

/// Collaborators every per-repository task shares.
#[derive(Clone)]
pub struct SyncServices {
    pub syncer: Arc<dyn RepoSyncer>,
    pub history: Option<Arc<HistoryStore>>,
    pub notifier: Arc<dyn NotificationSink>,
}

/// Reporting view of one scheduled repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSchedule {
    pub path: PathBuf,
    pub interval_secs: u64,
    pub next_run: DateTime<Utc>,
    pub runs: u64,
    pub last_status: Option<SyncStatus>,
}

type ScheduleBoard = Arc<Mutex<BTreeMap<PathBuf, RepoSchedule>>>;

struct ScheduleEntry {
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    repos: Vec<RepositorySyncSpec>,
    interval_default: u64,
    gate: ConcurrencyGate,
    services: SyncServices,
    timing: ScheduleTiming,
    shutdown_tx: broadcast::Sender<()>,
    entries: BTreeMap<PathBuf, ScheduleEntry>,
    board: ScheduleBoard,
}

impl Scheduler {
    /// Build from a config snapshot. Each task gets its own copy of its spec.
    pub fn new(config: &SyncConfig, services: SyncServices, timing: ScheduleTiming) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            repos: config.enabled_repositories().cloned().collect(),
            interval_default: config.global.default_interval,
            gate: ConcurrencyGate::new(config.global.max_concurrent_syncs),
            services,
            timing,
            shutdown_tx,
            entries: BTreeMap::new(),
            board: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Spawn a task for every enabled repository. Must run inside a tokio runtime.
    pub fn start(&mut self) {
        let first_run = Instant::now() + self.timing.initial_delay;
        for spec in &self.repos {
            if self.entries.contains_key(&spec.path) {
                continue;
            }
            let interval = Duration::from_secs(spec.interval.unwrap_or(self.interval_default));
            update_board(&self.board, spec, interval, first_run, None);

            let task = RepoTask {
                spec: spec.clone(),
                interval,
                gate: self.gate.clone(),
                services: self.services.clone(),
                board: Arc::clone(&self.board),
            };
            let shutdown_rx = self.shutdown_tx.subscribe();
            let handle = tokio::spawn(task.run(first_run, shutdown_rx));
            self.entries
                .insert(spec.path.clone(), ScheduleEntry { handle });
        }
        tracing::info!(
            repositories = self.entries.len(),
            max_concurrent = self.gate.capacity(),
            "scheduler started"
        );
    }

    /// Cancel every task and wait up to the grace period for them to exit.
    ///
    /// A sync already running on the blocking pool finishes on its own; a
    /// task still inside one when the grace period ends is left to drain.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(());
        let deadline = Instant::now() + self.timing.stop_grace;
        let mut timed_out = Vec::new();
        for (path, entry) in std::mem::take(&mut self.entries) {
            match tokio::time::timeout_at(deadline, entry.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(repo = %path.display(), error = %err, "sync task failed")
                }
                Err(_) => timed_out.push(path),
            }
        }
        if !timed_out.is_empty() {
            tracing::warn!(
                pending = timed_out.len(),
                grace = ?self.timing.stop_grace,
                "timed out waiting for sync tasks to stop"
            );
        }
        self.lock_board().clear();
        tracing::info!("scheduler stopped");
    }

    /// Snapshot of every scheduled repository, ordered by path.
    pub fn status(&self) -> Vec<RepoSchedule> {
        self.lock_board().values().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    fn lock_board(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, RepoSchedule>> {
        self.board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct RepoTask {
    spec: RepositorySyncSpec,
    interval: Duration,
    gate: ConcurrencyGate,
    services: SyncServices,
    board: ScheduleBoard,
}

impl RepoTask {
    async fn run(self, first_run: Instant, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval_at(first_run, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let scheduled = tokio::select! {
                _ = shutdown_rx.recv() => break,
                at = ticker.tick() => at,
            };
            let following = next_tick(scheduled, Instant::now(), self.interval);

            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = self.gate.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(err) => {
                        tracing::error!(repo = %self.spec.path.display(), error = %err, "cannot acquire sync permit");
                        break;
                    }
                },
            };
            let outcome = self.attempt().await;
            drop(permit);

            let status = outcome.status;
            self.publish(outcome).await;

            // A tick that fell due during the attempt fires as soon as we loop.
            let next = following.max(Instant::now());
            update_board(&self.board, &self.spec, self.interval, next, Some(status));
        }
        tracing::debug!(repo = %self.spec.path.display(), "sync task stopped");
    }

    async fn attempt(&self) -> SyncOutcome {
        let started = std::time::Instant::now();
        let syncer = Arc::clone(&self.services.syncer);
        let spec = self.spec.clone();
        let error = match tokio::task::spawn_blocking(move || syncer.sync(&spec)).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(err) => Some(format!("sync task failed: {err}")),
        };
        let outcome = SyncOutcome::completed(
            &self.spec.path,
            self.spec.direction,
            started.elapsed(),
            error,
        );

        match &outcome.error_message {
            None => tracing::info!(
                repo = %self.spec.path.display(),
                direction = %self.spec.direction,
                duration_ms = outcome.duration_ms,
                "sync completed"
            ),
            Some(err) => tracing::warn!(
                repo = %self.spec.path.display(),
                direction = %self.spec.direction,
                duration_ms = outcome.duration_ms,
                error = %err,
                "sync failed"
            ),
        }
        outcome
    }

    /// Record and notify on the blocking pool; neither can fail the attempt.
    async fn publish(&self, outcome: SyncOutcome) {
        let history = self.services.history.clone();
        let notifier = Arc::clone(&self.services.notifier);
        let published = tokio::task::spawn_blocking(move || {
            if let Some(history) = history {
                history.record(&outcome);
            }
            notifier.notify(&outcome);
        })
        .await;
        if let Err(err) = published {
            tracing::error!(repo = %self.spec.path.display(), error = %err, "failed to publish sync outcome");
        }
    }
}

/// Deadline the ticker arms after firing the tick due at `scheduled` at time
/// `fired`: the first point of the interval grid strictly after `fired`, or
/// simply `scheduled + interval` when the tick was on time.
fn next_tick(scheduled: Instant, fired: Instant, interval: Duration) -> Instant {
    let late = fired.saturating_duration_since(scheduled);
    if interval.is_zero() || late < interval {
        return scheduled + interval;
    }
    let periods = late.as_nanos() / interval.as_nanos() + 1;
    let offset = interval.as_nanos().saturating_mul(periods);
    scheduled + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
}

fn update_board(
    board: &ScheduleBoard,
    spec: &RepositorySyncSpec,
    interval: Duration,
    next: Instant,
    status: Option<SyncStatus>,
) {
    let until = next.saturating_duration_since(Instant::now());
    let next_run =
        Utc::now() + chrono::Duration::from_std(until).unwrap_or_else(|_| chrono::Duration::zero());

    let mut board = board.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let entry = board.entry(spec.path.clone()).or_insert_with(|| RepoSchedule {
        path: spec.path.clone(),
        interval_secs: interval.as_secs(),
        next_run,
        runs: 0,
        last_status: None,
    });
    entry.next_run = next_run;
    if let Some(status) = status {
        entry.runs += 1;
        entry.last_status = Some(status);
    }
}
