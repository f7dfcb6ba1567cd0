use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use super::state::EngineState;

/// Count of events on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub count: u32,
}

impl DayRecord {
    pub fn new(date: NaiveDate, count: u32) -> Self {
        Self { date, count }
    }
}

impl EngineState {
    /// Persisted history with the live count laid over the logical day.
    fn merged_history(&self) -> BTreeMap<NaiveDate, u32> {
        let mut merged = self.history.clone();
        if let Some(day) = self.current_day {
            merged.insert(day, self.today_count);
        }
        merged.retain(|_, count| *count > 0);
        merged
    }

    /// Every day with at least one event, newest first.
    pub fn history_all(&self) -> Vec<DayRecord> {
        self.merged_history()
            .into_iter()
            .rev()
            .map(|(date, count)| DayRecord::new(date, count))
            .collect()
    }

    /// `history_all` restricted to `start..=end`.
    pub fn history_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<DayRecord> {
        self.history_all()
            .into_iter()
            .filter(|record| record.date >= start && record.date <= end)
            .collect()
    }

    /// One bucket per day for the `days` days ending at `today`, oldest
    /// first. Days without events are present with a zero count.
    ///
    /// The range stops at the earliest representable date.
    pub fn range_buckets(&self, today: NaiveDate, days: u32) -> Vec<DayRecord> {
        let merged = self.merged_history();
        let representable = u64::try_from((today - NaiveDate::MIN).num_days()).unwrap_or(0) + 1;
        (0..u64::from(days).min(representable))
            .rev()
            .filter_map(|days_ago| today.checked_sub_days(Days::new(days_ago)))
            .map(|date| {
                let count = merged.get(&date).copied().unwrap_or(0);
                DayRecord::new(date, count)
            })
            .collect()
    }
}
