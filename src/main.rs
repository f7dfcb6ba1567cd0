use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vape_tracker::{
    Clock, DateRange, FileStore, IntervalStats, RangeSummary, SystemClock, Tracker,
    analytics::{format_gap, gaps_from_previous, time_since},
    config::AppConfig,
    export,
    store::parse_date_time,
};

type AppTracker = Tracker<FileStore, SystemClock>;

#[derive(Parser, Debug)]
#[command(name = "vape-tracker")]
#[command(about = "Log vape sessions and review daily history")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log an event now
    Log,
    /// Undo the latest event of today
    Undo,
    /// Remove today's event at the given time (YYYY-MM-DDTHH:MM[:SS])
    Remove { timestamp: String },
    /// Today's count and time since the last event
    Status,
    /// Today's events with the gap before each
    Today,
    /// Day-by-day history, newest first
    History {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Totals, averages and intervals over the last N days
    Stats {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Write a JSON backup (defaults to the export directory)
    Export { path: Option<PathBuf> },
    /// Write the history as CSV into the export directory
    ExportCsv,
    /// Replace all state with a JSON backup
    Import { path: PathBuf },
    /// Print the status line on every refresh tick
    Watch,
    /// Delete all stored state
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("vape_tracker=debug");

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let config = Arc::new(config);

    let state_path = config.storage.state_path();
    tracing::debug!("Using state file {}", state_path.display());
    let tracker = Tracker::new(FileStore::new(state_path), SystemClock);

    match args.command {
        Command::Log => {
            let event = tracker.log_event()?;
            println!(
                "Logged at {} ({} today)",
                event.format("%H:%M"),
                tracker.today_count()?
            );
        }
        Command::Undo => {
            let before = tracker.today_count()?;
            tracker.remove_last_event()?;
            if before == 0 {
                println!("Nothing to undo today");
            } else {
                println!("Removed latest event ({} today)", tracker.today_count()?);
            }
        }
        Command::Remove { timestamp } => {
            let target = parse_date_time(&timestamp)
                .with_context(|| format!("Invalid timestamp: {}", timestamp))?;
            if tracker.remove_event(target)? {
                println!("Removed event at {}", target.format("%H:%M:%S"));
            } else {
                println!("No event today at {}", target.format("%H:%M:%S"));
            }
        }
        Command::Status => print_status(&tracker)?,
        Command::Today => print_today(&tracker)?,
        Command::History { from, to } => print_history(&tracker, from, to)?,
        Command::Stats { days } => {
            let days = days.unwrap_or(config.statistics.default_range_days);
            print_stats(&tracker, days)?;
        }
        Command::Export { path } => {
            let path = match path {
                Some(path) => {
                    export::write_backup(&tracker, &path)?;
                    path
                }
                None => export::write_backup_to_dir(&tracker, &config.export.output_dir)?,
            };
            println!("Backup written to {}", path.display());
        }
        Command::ExportCsv => {
            let path = export::export_history_csv(&tracker, &config.export.output_dir)?;
            println!("History written to {}", path.display());
        }
        Command::Import { path } => {
            let summary = export::import_backup(&tracker, &path)?;
            println!(
                "Imported {} days of history and {} events for today",
                summary.days, summary.events
            );
            if summary.dropped_zero_days > 0 {
                println!("Skipped {} days with no events", summary.dropped_zero_days);
            }
        }
        Command::Watch => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
            run_watch(rt, &tracker, &config)?;
        }
        Command::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete all data without --yes");
            }
            tracker.reset()?;
            println!("All data cleared");
        }
    }

    if tracker.skipped_entries() > 0 {
        tracing::warn!(
            "{} malformed stored entries were ignored",
            tracker.skipped_entries()
        );
    }

    Ok(())
}

/// Re-read the state on every tick, like the home screen widget refresh.
fn run_watch(rt: tokio::runtime::Runtime, tracker: &AppTracker, config: &AppConfig) -> Result<()> {
    rt.block_on(async {
        let interval_secs = config.refresh.watch_interval_secs.max(1);
        tracing::info!("Starting watch loop with interval: {} seconds", interval_secs);

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let tracker = tracker.clone();
                    let refreshed = tokio::task::spawn_blocking(move || print_status(&tracker)).await;
                    match refreshed {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::error!("Failed to refresh status: {:#}", e),
                        Err(e) => tracing::error!("Refresh task failed: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Stopping watch loop");
                    return Ok(());
                }
            }
        }
    })
}

fn print_status(tracker: &AppTracker) -> Result<()> {
    let count = tracker.today_count()?;
    let last = tracker.last_event_time()?;
    let now = tracker.clock().now();
    println!(
        "{}  today: {}  since last: {}",
        now.format("%Y-%m-%d %H:%M"),
        count,
        time_since(last, now)
    );
    Ok(())
}

fn print_today(tracker: &AppTracker) -> Result<()> {
    let events = tracker.list_today()?;
    if events.is_empty() {
        println!("No events today");
        return Ok(());
    }
    for (event, gap) in gaps_from_previous(&events) {
        match gap {
            Some(minutes) => println!("{}  +{}", event.format("%H:%M:%S"), format_gap(minutes)),
            None => println!("{}", event.format("%H:%M:%S")),
        }
    }
    Ok(())
}

fn print_history(tracker: &AppTracker, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    let records = match (from, to) {
        (None, None) => tracker.history_all()?,
        (from, to) => tracker.history_in_range(
            from.unwrap_or(NaiveDate::MIN),
            to.unwrap_or(NaiveDate::MAX),
        )?,
    };
    if records.is_empty() {
        println!("No history yet");
    }
    for record in records {
        println!("{}  {}", record.date.format("%Y-%m-%d"), record.count);
    }
    Ok(())
}

fn print_stats(tracker: &AppTracker, days: u32) -> Result<()> {
    let label = DateRange::from_days(days)
        .map(|range| range.label().to_string())
        .unwrap_or_else(|| format!("{} Days", days));

    let summary: RangeSummary = tracker.range_summary(days)?;
    println!("{}", label);
    println!("  total:         {}", summary.total);
    println!("  daily average: {:.1}", summary.daily_average);
    if let Some(peak) = summary.peak.filter(|peak| peak.count > 0) {
        println!("  peak:          {} ({})", peak.date.format("%Y-%m-%d"), peak.count);
    }
    if let Some(trough) = summary.trough {
        println!("  lowest:        {} ({})", trough.date.format("%Y-%m-%d"), trough.count);
    }

    let events = tracker.list_today()?;
    match IntervalStats::from_events(&events) {
        Some(stats) => {
            println!("Today's intervals");
            println!("  average:  {}", format_gap(stats.average_whole_minutes()));
            println!("  longest:  {}", format_gap(stats.longest));
            println!("  shortest: {}", format_gap(stats.shortest));
        }
        None => println!("Not enough events today for interval stats"),
    }
    Ok(())
}
