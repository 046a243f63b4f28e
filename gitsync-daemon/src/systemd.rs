use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::{systemd_unit_path, systemd_user_dir, SYSTEMD_UNIT};

/// Render a `Type=notify` user unit running `<binary> daemon`.
pub fn generate_unit(binary_path: &Path, config_path: Option<&Path>) -> String {
    let mut exec = format!("{} daemon", binary_path.display());
    if let Some(config) = config_path {
        exec.push_str(&format!(" --config {}", config.display()));
    }

    format!(
        "[Unit]
Description=Git Sync Daemon
Documentation=man:git-sync(1)
After=network-online.target
Wants=network-online.target

[Service]
Type=notify
ExecStart={exec}
ExecReload=/bin/kill -HUP $MAINPID
Restart=on-failure
RestartSec=30
TimeoutStopSec=15

[Install]
WantedBy=default.target
"
    )
}

/// Write the unit for the current user, reload systemd, enable it and
/// optionally start it.
pub fn install(
    home: &Path,
    binary_path: &Path,
    config_path: Option<&Path>,
    start: bool,
) -> Result<PathBuf, DaemonError> {
    ensure_linux()?;

    let unit_dir = systemd_user_dir(home);
    if !unit_dir.exists() {
        fs::create_dir_all(&unit_dir).map_err(|e| io_err(&unit_dir, e))?;
    }

    let unit = systemd_unit_path(home);
    fs::write(&unit, generate_unit(binary_path, config_path)).map_err(|e| io_err(&unit, e))?;

    run_systemctl(&["daemon-reload"], false)?;
    run_systemctl(&["enable", SYSTEMD_UNIT], false)?;
    if start {
        run_systemctl(&["restart", SYSTEMD_UNIT], false)?;
    }

    Ok(unit)
}

/// Stop and disable the unit, then remove it. Missing units are fine.
pub fn uninstall(home: &Path) -> Result<(), DaemonError> {
    ensure_linux()?;

    let unit = systemd_unit_path(home);
    if unit.exists() {
        let _ = run_systemctl(&["stop", SYSTEMD_UNIT], true);
        let _ = run_systemctl(&["disable", SYSTEMD_UNIT], true);
        fs::remove_file(&unit).map_err(|e| io_err(&unit, e))?;
        run_systemctl(&["daemon-reload"], false)?;
    }

    Ok(())
}

/// `systemctl --user is-active` for the unit.
pub fn is_active() -> bool {
    Command::new("systemctl")
        .args(["--user", "is-active", "--quiet", SYSTEMD_UNIT])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
fn ensure_linux() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn ensure_linux() -> Result<(), DaemonError> {
    Err(DaemonError::Systemd(
        "systemd management is only supported on Linux".to_string(),
    ))
}

fn run_systemctl(args: &[&str], ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .map_err(|e| io_err("systemctl", e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Err(DaemonError::Systemd(format!(
        "systemctl --user {} failed (status {}): {} {}",
        args.join(" "),
        output.status,
        stdout,
        stderr
    )))
}
