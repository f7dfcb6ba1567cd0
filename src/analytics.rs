//! Statistics over logged events and day buckets.
//!
//! Everything here is a pure function of its input; the tracker hands in
//! today's events or a dense bucket range and nothing is written back.

use chrono::NaiveDateTime;

use crate::tracker::DayRecord;

// ==================== Range Presets ====================

/// Preset ranges offered for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateRange {
    #[default]
    Week,
    TwoWeeks,
    Month,
    ThreeMonths,
}

impl DateRange {
    pub const ALL: [DateRange; 4] = [
        DateRange::Week,
        DateRange::TwoWeeks,
        DateRange::Month,
        DateRange::ThreeMonths,
    ];

    /// Number of days covered, today included.
    pub fn days(&self) -> u32 {
        match self {
            DateRange::Week => 7,
            DateRange::TwoWeeks => 14,
            DateRange::Month => 30,
            DateRange::ThreeMonths => 90,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateRange::Week => "7 Days",
            DateRange::TwoWeeks => "14 Days",
            DateRange::Month => "30 Days",
            DateRange::ThreeMonths => "90 Days",
        }
    }

    pub fn from_days(days: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|range| range.days() == days)
    }
}

// ==================== Interval Analysis ====================

/// Whole minutes between consecutive events, after sorting.
///
/// Partial minutes are truncated, so two events 90 seconds apart are 1 minute
/// apart. Fewer than two events give an empty list.
pub fn intervals_minutes(events: &[NaiveDateTime]) -> Vec<i64> {
    let mut sorted = events.to_vec();
    sorted.sort();
    sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_minutes())
        .collect()
}

pub fn average_interval(intervals: &[i64]) -> Option<f64> {
    if intervals.is_empty() {
        return None;
    }
    let total: i64 = intervals.iter().sum();
    Some(total as f64 / intervals.len() as f64)
}

pub fn max_interval(intervals: &[i64]) -> Option<i64> {
    intervals.iter().copied().max()
}

pub fn min_interval(intervals: &[i64]) -> Option<i64> {
    intervals.iter().copied().min()
}

/// Summary of the gaps between today's events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalStats {
    /// Number of gaps (events - 1)
    pub count: usize,
    pub average_minutes: f64,
    pub longest: i64,
    pub shortest: i64,
}

impl IntervalStats {
    /// `None` with fewer than two events.
    pub fn from_events(events: &[NaiveDateTime]) -> Option<Self> {
        Self::from_intervals(&intervals_minutes(events))
    }

    pub fn from_intervals(intervals: &[i64]) -> Option<Self> {
        Some(Self {
            count: intervals.len(),
            average_minutes: average_interval(intervals)?,
            longest: max_interval(intervals)?,
            shortest: min_interval(intervals)?,
        })
    }

    /// Average truncated to whole minutes.
    pub fn average_whole_minutes(&self) -> i64 {
        self.average_minutes.trunc() as i64
    }
}

/// Today's events newest first, each paired with the minutes since the
/// event before it. The oldest event has no predecessor.
pub fn gaps_from_previous(events: &[NaiveDateTime]) -> Vec<(NaiveDateTime, Option<i64>)> {
    let mut sorted = events.to_vec();
    sorted.sort_by(|a, b| b.cmp(a));

    sorted
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let gap = sorted
                .get(index + 1)
                .map(|previous| (*event - *previous).num_minutes());
            (*event, gap)
        })
        .collect()
}

// ==================== Day Buckets ====================

pub fn total_count(buckets: &[DayRecord]) -> u64 {
    buckets.iter().map(|b| u64::from(b.count)).sum()
}

/// Mean count per bucket, zero days included. 0 for no buckets.
pub fn daily_average(buckets: &[DayRecord]) -> f64 {
    if buckets.is_empty() {
        return 0.0;
    }
    total_count(buckets) as f64 / buckets.len() as f64
}

/// Bucket with the highest count. Ties go to the first (oldest) bucket.
pub fn peak_day(buckets: &[DayRecord]) -> Option<DayRecord> {
    buckets.iter().fold(None, |best: Option<DayRecord>, bucket| match best {
        Some(best) if best.count >= bucket.count => Some(best),
        _ => Some(*bucket),
    })
}

/// Non-empty bucket with the lowest count. Ties go to the first (oldest)
/// bucket; `None` when every bucket is zero.
pub fn trough_day(buckets: &[DayRecord]) -> Option<DayRecord> {
    buckets
        .iter()
        .filter(|bucket| bucket.count > 0)
        .min_by_key(|bucket| bucket.count)
        .copied()
}

/// Overview of a dense bucket range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSummary {
    pub days: usize,
    pub total: u64,
    pub daily_average: f64,
    pub peak: Option<DayRecord>,
    pub trough: Option<DayRecord>,
}

impl RangeSummary {
    pub fn from_buckets(buckets: &[DayRecord]) -> Self {
        Self {
            days: buckets.len(),
            total: total_count(buckets),
            daily_average: daily_average(buckets),
            peak: peak_day(buckets),
            trough: trough_day(buckets),
        }
    }
}

// ==================== Display Helpers ====================

/// Elapsed time since the last event as `HH:MM`, or `--:--` without one.
///
/// A last event in the future (clock moved back) reads as `00:00`.
pub fn time_since(last: Option<NaiveDateTime>, now: NaiveDateTime) -> String {
    let Some(last) = last else {
        return "--:--".to_string();
    };
    let minutes = (now - last).num_minutes().max(0);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Gap length as `1h 5m`, or `5m` under an hour.
pub fn format_gap(minutes: i64) -> String {
    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours > 0 {
        format!("{}h {}m", hours, rest)
    } else {
        format!("{}m", rest)
    }
}
