//! git-sync daemon runtime: scheduler, concurrency gate, config watcher,
//! notifications, and systemd integration.

mod daemon;
mod error;
pub mod gate;
pub mod live;
pub mod notifier;
pub mod paths;
pub mod scheduler;
pub mod supervisor;
pub mod systemd;
pub mod watcher;

pub use daemon::{init_tracing, start_blocking, Daemon, DaemonOptions};
pub use error::DaemonError;
pub use gate::ConcurrencyGate;
pub use live::LiveConfig;
pub use notifier::{DesktopNotifier, NoopNotifier, NotificationSink};
pub use scheduler::{RepoSchedule, ScheduleTiming, Scheduler, SyncServices};
pub use systemd::{generate_unit, install as install_systemd, uninstall as uninstall_systemd};
pub use watcher::{ConfigWatcher, WatchEvent};
