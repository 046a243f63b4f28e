//! Outcome notifications.
//!
//! The scheduler hands every [`SyncOutcome`] to a [`NotificationSink`];
//! whether anything reaches the user is the sink's business.

use std::time::Duration;

use gitsync_core::{GlobalSyncPolicy, SyncOutcome};

const MAX_ERROR_CHARS: usize = 100;

pub trait NotificationSink: Send + Sync {
    /// Called once per completed attempt from a blocking context.
    fn notify(&self, outcome: &SyncOutcome);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _outcome: &SyncOutcome) {}
}

/// Desktop popups via `notify-send`. Silently inert where that is unavailable.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    timeout_ms: u64,
}

/// Rendered notification content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopMessage {
    pub title: String,
    pub body: String,
    pub urgency: &'static str,
    pub icon: &'static str,
}

impl DesktopNotifier {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    pub fn message(outcome: &SyncOutcome) -> DesktopMessage {
        let repo = outcome
            .repo_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| outcome.repo_path.display().to_string());
        let duration = format_duration(outcome.duration());

        match outcome.error_message.as_deref() {
            None => DesktopMessage {
                title: format!("✓ Git Sync: {repo}"),
                body: format!(
                    "Successfully synced\nDirection: {}\nDuration: {duration}",
                    outcome.direction
                ),
                urgency: "normal",
                icon: "dialog-information",
            },
            Some(error) => DesktopMessage {
                title: format!("✗ Git Sync Failed: {repo}"),
                body: format!(
                    "Direction: {}\nDuration: {duration}\nError: {}",
                    outcome.direction,
                    truncate(error, MAX_ERROR_CHARS)
                ),
                urgency: "critical",
                icon: "dialog-error",
            },
        }
    }

    #[cfg(target_os = "linux")]
    fn send(&self, message: &DesktopMessage) {
        use std::process::{Command, Stdio};

        let status = Command::new("notify-send")
            .arg("--app-name=git-sync")
            .arg(format!("--urgency={}", message.urgency))
            .arg(format!("--icon={}", message.icon))
            .arg(format!("--expire-time={}", self.timeout_ms))
            .arg(&message.title)
            .arg(&message.body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::debug!(%status, "notify-send exited unsuccessfully"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("notify-send not installed; skipping desktop notification");
            }
            Err(err) => tracing::warn!(error = %err, "failed to run notify-send"),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn send(&self, _message: &DesktopMessage) {
        tracing::debug!("desktop notifications are only delivered on Linux");
    }
}

impl NotificationSink for DesktopNotifier {
    fn notify(&self, outcome: &SyncOutcome) {
        self.send(&Self::message(outcome));
    }
}

/// Sink selected by `enable_notifications`.
pub fn from_policy(policy: &GlobalSyncPolicy) -> std::sync::Arc<dyn NotificationSink> {
    if policy.enable_notifications {
        std::sync::Arc::new(DesktopNotifier::new(policy.notification_timeout_ms))
    } else {
        std::sync::Arc::new(NoopNotifier)
    }
}

/// Whole milliseconds below one second, tenths of a second above.
fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
