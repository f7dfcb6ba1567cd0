//! Writing backups and history exports to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{store::PersistentStore, tracker::Tracker, traits::Clock};

/// File name for a JSON backup taken on the clock's current day.
pub fn backup_file_name<C: Clock>(clock: &C) -> String {
    format!("vape_tracker_backup_{}.json", clock.today().format("%Y-%m-%d"))
}

/// Export the full snapshot as JSON to `path`.
pub fn write_backup<S, C>(tracker: &Tracker<S, C>, path: &Path) -> Result<()>
where
    S: PersistentStore,
    C: Clock,
{
    let snapshot = tracker
        .export_snapshot()
        .context("Failed to capture snapshot")?;
    let json = snapshot.to_json().context("Failed to serialize snapshot")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Export the full snapshot into `output_dir` under the dated backup name.
///
/// # Returns
/// The path to the created backup file.
pub fn write_backup_to_dir<S, C>(tracker: &Tracker<S, C>, output_dir: &Path) -> Result<PathBuf>
where
    S: PersistentStore,
    C: Clock,
{
    let path = output_dir.join(backup_file_name(tracker.clock()));
    write_backup(tracker, &path)?;
    Ok(path)
}

/// Export the day-by-day history to a timestamped CSV file.
///
/// This writes every day with at least one event, newest first, with `date`
/// and `count` columns.
///
/// # Arguments
/// * `output_dir` - Directory where the CSV file will be created
///
/// # Returns
/// The path to the created CSV file on success.
pub fn export_history_csv<S, C>(tracker: &Tracker<S, C>, output_dir: &Path) -> Result<PathBuf>
where
    S: PersistentStore,
    C: Clock,
{
    let history = tracker
        .history_all()
        .context("Failed to fetch history for export")?;

    let export_time = tracker.clock().now();
    let filename = format!(
        "vape_tracker_history_{}.csv",
        export_time.format("%Y%m%d_%H%M%S")
    );

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let output_path = output_dir.join(&filename);

    let mut wtr = csv::Writer::from_path(&output_path).context("Failed to create CSV writer")?;
    for record in history {
        wtr.serialize(record)
            .context("Failed to serialize history entry")?;
    }
    wtr.flush().context("Failed to flush CSV writer")?;

    Ok(output_path)
}

/// Read a backup file and import it, replacing all state.
pub fn import_backup<S, C>(tracker: &Tracker<S, C>, path: &Path) -> Result<crate::ImportSummary>
where
    S: PersistentStore,
    C: Clock,
{
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let summary = tracker
        .import_json(&json)
        .with_context(|| format!("Failed to import {}", path.display()))?;
    Ok(summary)
}
