mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gitsync_core::{SyncConfig, SyncStatus};
use gitsync_daemon::{NoopNotifier, ScheduleTiming, Scheduler, SyncServices};
use gitsync_sync::{HistoryQuery, HistorySettings, HistoryStore};
use tempfile::TempDir;

use common::{settle, spec, FakeSyncer, RecordingNotifier};

const TIMING: ScheduleTiming = ScheduleTiming {
    initial_delay: Duration::from_secs(10),
    stop_grace: Duration::from_secs(5),
};

fn config(paths: &[&str], interval: u64, max_concurrent: usize) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.global.max_concurrent_syncs = max_concurrent;
    config.repositories = paths.iter().map(|p| spec(p, interval)).collect();
    config
}

fn services(syncer: &Arc<FakeSyncer>) -> SyncServices {
    SyncServices {
        syncer: syncer.clone(),
        history: None,
        notifier: Arc::new(NoopNotifier),
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_attempts_never_exceed_gate_capacity() {
    let paths = ["/r/a", "/r/b", "/r/c", "/r/d", "/r/e", "/r/f"];
    let syncer = Arc::new(FakeSyncer::with_work(Duration::from_millis(15)));
    let mut scheduler = Scheduler::new(&config(&paths, 30, 2), services(&syncer), TIMING);
    scheduler.start();

    tokio::time::sleep(Duration::from_secs(11)).await;
    settle(|| syncer.calls() >= paths.len()).await;
    scheduler.stop().await;

    assert!(syncer.peak() <= 2, "peak concurrency was {}", syncer.peak());
    for path in paths {
        assert!(syncer.calls_for(Path::new(path)) >= 1, "{path} never ran");
    }
}

#[tokio::test(start_paused = true)]
async fn first_attempt_follows_initial_delay_then_interval() {
    let syncer = Arc::new(FakeSyncer::default());
    let mut scheduler = Scheduler::new(&config(&["/r/a"], 30, 1), services(&syncer), TIMING);
    scheduler.start();

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(syncer.calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle(|| syncer.calls() == 1).await;
    assert_eq!(syncer.calls(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle(|| syncer.calls() == 2).await;
    assert_eq!(syncer.calls(), 2);

    let status = scheduler.status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].path, PathBuf::from("/r/a"));
    assert_eq!(status[0].interval_secs, 30);
    assert_eq!(status[0].runs, 2);
    assert_eq!(status[0].last_status, Some(SyncStatus::Success));

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failures_are_isolated_and_published() {
    let dir = TempDir::new().unwrap();
    let history = Arc::new(HistoryStore::open(dir.path(), HistorySettings::default()).unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let syncer = Arc::new(FakeSyncer {
        failing: vec![PathBuf::from("/r/dirty")],
        ..Default::default()
    });
    let services = SyncServices {
        syncer: syncer.clone(),
        history: Some(history.clone()),
        notifier: notifier.clone(),
    };

    let mut scheduler = Scheduler::new(&config(&["/r/clean", "/r/dirty"], 30, 5), services, TIMING);
    scheduler.start();
    tokio::time::sleep(Duration::from_secs(11)).await;
    settle(|| notifier.events().len() == 2).await;
    scheduler.stop().await;

    let records = history.query(&HistoryQuery::default()).unwrap();
    assert_eq!(records.len(), 2);
    let failed: Vec<_> = records.iter().filter(|r| r.is_failed()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].repo_path, PathBuf::from("/r/dirty"));
    assert!(failed[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("uncommitted changes"));
    assert_eq!(notifier.events().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_before_first_tick_cancels_everything() {
    let syncer = Arc::new(FakeSyncer::default());
    let mut scheduler = Scheduler::new(&config(&["/r/a", "/r/b"], 30, 1), services(&syncer), TIMING);
    scheduler.start();
    assert!(scheduler.is_running());
    assert_eq!(scheduler.status().len(), 2);

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(scheduler.status().is_empty());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(syncer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn disabled_repositories_are_not_scheduled() {
    let mut cfg = config(&["/r/on", "/r/off"], 60, 1);
    cfg.repositories[1].enabled = false;
    let syncer = Arc::new(FakeSyncer::default());
    let mut scheduler = Scheduler::new(&cfg, services(&syncer), TIMING);
    scheduler.start();

    let status = scheduler.status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].path, PathBuf::from("/r/on"));

    tokio::time::sleep(Duration::from_secs(11)).await;
    settle(|| syncer.calls() == 1).await;
    scheduler.stop().await;
    assert_eq!(syncer.calls_for(Path::new("/r/off")), 0);
}

#[tokio::test(start_paused = true)]
async fn default_interval_applies_when_repo_has_none() {
    let mut cfg = config(&["/r/a"], 30, 1);
    cfg.repositories[0].interval = None;
    cfg.global.default_interval = 120;
    let syncer = Arc::new(FakeSyncer::default());
    let scheduler = {
        let mut s = Scheduler::new(&cfg, services(&syncer), TIMING);
        s.start();
        s
    };
    assert_eq!(scheduler.status()[0].interval_secs, 120);
    assert_eq!(scheduler.gate().capacity(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overrunning_attempt_skips_missed_ticks() {
    let syncer = Arc::new(FakeSyncer {
        first_work: Some(Duration::from_millis(2500)),
        ..Default::default()
    });
    let timing = ScheduleTiming {
        initial_delay: Duration::from_millis(50),
        stop_grace: Duration::from_secs(5),
    };
    let mut scheduler = Scheduler::new(&config(&["/r/slow"], 1, 1), services(&syncer), timing);
    scheduler.start();

    for _ in 0..400 {
        if syncer.calls() >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(syncer.calls(), 1, "first attempt never finished");

    // Two ticks fell due during the 2.5s attempt; only one may run right away.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(syncer.calls(), 2);
    let status = scheduler.status();
    assert_eq!(status[0].runs, 2);
    assert!(
        status[0].next_run > Utc::now(),
        "next run should be the next grid point, not the past"
    );

    tokio::time::sleep(Duration::from_millis(1500)).await;
    scheduler.stop().await;
    assert!(syncer.calls() >= 3);
    assert_eq!(syncer.peak(), 1, "attempts for one repository overlapped");
}
