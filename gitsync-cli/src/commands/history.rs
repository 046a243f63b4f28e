//! `git-sync history`: recorded sync attempts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Args, ValueEnum};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gitsync_core::SyncOutcome;
use gitsync_daemon::paths;
use gitsync_sync::{HistoryQuery, HistorySettings, HistoryStore};

use super::load_config;

const ERROR_COLUMN_WIDTH: usize = 60;
const WATCH_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Arguments for `git-sync history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Maximum number of records (0 = `history_max_entries`).
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Only records for this repository path, as written in the config.
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Only failed attempts.
    #[arg(long)]
    pub failed: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Keep running and redraw the table whenever new attempts are recorded.
    #[arg(long, short, conflicts_with = "format")]
    pub watch: bool,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "time")]
    time: String,
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "direction")]
    direction: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "duration")]
    duration: String,
    #[tabled(rename = "error")]
    error: String,
}

impl HistoryArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let (_, config) = load_config(config)?;
        let home = dirs::home_dir().context("could not determine home directory")?;
        let dir = paths::history_dir(&config.global, &home);
        let store = HistoryStore::open(&dir, HistorySettings::from_policy(&config.global))
            .with_context(|| format!("failed to open history at {}", dir.display()))?;

        let query = HistoryQuery {
            limit: self.limit,
            repo: self.repo,
            failed_only: self.failed,
        };
        let records = store.query(&query).context("failed to read sync history")?;

        if self.watch {
            return watch(&store, &query, records);
        }
        match self.format {
            OutputFormat::Json => print_json(&records),
            OutputFormat::Table => {
                print_table(&records);
                Ok(())
            }
        }
    }
}

/// Poll the store and redraw when something newer than the last seen record lands.
fn watch(store: &HistoryStore, query: &HistoryQuery, initial: Vec<SyncOutcome>) -> Result<()> {
    println!("Watching sync history (Ctrl+C to exit)...");
    print_table(&initial);
    let mut latest = initial.first().map(|r| r.timestamp);

    loop {
        std::thread::sleep(WATCH_POLL);
        let records = match store.query(query) {
            Ok(records) => records,
            Err(err) => {
                eprintln!("error reading history: {err}");
                continue;
            }
        };
        if let Some(newest) = newest_since(&records, latest) {
            print!("\x1b[2J\x1b[H");
            println!("Watching sync history (Ctrl+C to exit)...");
            print_table(&records);
            latest = Some(newest);
        }
    }
}

/// Timestamp of the newest record strictly after `seen`, if any.
fn newest_since(records: &[SyncOutcome], seen: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    records
        .iter()
        .map(|r| r.timestamp)
        .filter(|ts| seen.map_or(true, |seen| *ts > seen))
        .max()
}

fn print_json(records: &[SyncOutcome]) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(records).context("failed to serialize history JSON")?
    );
    Ok(())
}

fn print_table(records: &[SyncOutcome]) {
    if records.is_empty() {
        println!("No sync history recorded.");
        return;
    }

    let failed = records.iter().filter(|r| r.is_failed()).count();
    let rows: Vec<HistoryRow> = records
        .iter()
        .map(|record| HistoryRow {
            time: record
                .timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            repository: record.repo_path.display().to_string(),
            direction: record.direction.to_string(),
            status: record.status.to_string(),
            duration: format!("{:.1}s", record.duration().as_secs_f64()),
            error: record
                .error_message
                .as_deref()
                .map(|e| shorten(e, ERROR_COLUMN_WIDTH))
                .unwrap_or_default(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let summary = format!("{} attempts, {} failed", records.len(), failed);
    if failed > 0 {
        println!("{}", summary.red());
    } else {
        println!("{}", summary.green());
    }
}

/// First line only, cut to `max` characters.
fn shorten(message: &str, max: usize) -> String {
    let line = message.lines().next().unwrap_or_default();
    if line.chars().count() <= max {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
