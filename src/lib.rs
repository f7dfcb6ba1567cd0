//! Vape Tracker Library
//!
//! This module exposes the event-logging engine behind the `vape-tracker`
//! CLI: persistence backends, day rollover, history aggregation, statistics
//! and backup snapshots.

pub mod analytics;
pub mod config;
pub mod error;
pub mod export;
pub mod snapshot;
pub mod store;
pub mod tracker;
pub mod traits;

// Re-export commonly used types
pub use analytics::{
    DateRange,
    // Interval analysis
    IntervalStats,
    // Range statistics
    RangeSummary,
    average_interval,
    daily_average,
    // Display helpers
    format_gap,
    gaps_from_previous,
    intervals_minutes,
    max_interval,
    min_interval,
    peak_day,
    time_since,
    total_count,
    trough_day,
};
pub use config::AppConfig;
pub use error::{StoreError, StoreResult, TrackerError, TrackerResult};
pub use snapshot::{ImportSummary, Snapshot};
pub use store::{FileStore, MemoryStore, PersistentStore, StoreWrite, StoredState, WriteBatch};
pub use tracker::{DayRecord, DayStatus, EngineState, MAX_RANGE_DAYS, Tracker};
pub use traits::{Clock, MockClock, SystemClock};
