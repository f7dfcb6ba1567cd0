//! Export/import of the complete tracker state.
//!
//! The JSON layout matches the backups written by the phone app, so
//! old backups import unchanged:
//!
//! ```text
//! {
//!   "version": 1,
//!   "history": [ { "date": "YYYY-MM-DD", "count": 3 } ],
//!   "todayTimestamps": [ "YYYY-MM-DDTHH:MM:SS" ],
//!   "lastSmokeTime": "YYYY-MM-DDTHH:MM:SS",
//!   "currentDate": "YYYY-MM-DD",
//!   "smokesToday": 3
//! }
//! ```
//!
//! Every field is optional on import. Parsing is done in full before anything
//! is written, so a rejected document never touches the store.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    error::{TrackerError, TrackerResult},
    store::{StoreWrite, WriteBatch, format_date, format_date_time, parse_date, parse_date_time},
    tracker::{DayRecord, EngineState},
};

/// Validated snapshot of the tracker state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Newest first on export; on import a later duplicate date wins.
    pub history: Vec<DayRecord>,
    pub today_timestamps: Vec<NaiveDateTime>,
    pub last_event_time: Option<NaiveDateTime>,
    pub current_date: Option<NaiveDate>,
    pub today_count: Option<u32>,
}

/// What an import replaced the state with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub days: usize,
    pub events: usize,
    /// History entries with a zero count, which are never stored.
    pub dropped_zero_days: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    history: Option<Vec<RawDayRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    today_timestamps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_smoke_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    smokes_today: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDayRecord {
    date: String,
    count: i64,
}

impl Snapshot {
    pub const CURRENT_VERSION: u32 = 1;

    /// Parse and validate a snapshot document.
    ///
    /// Shape problems (not JSON, wrong types, missing `date`/`count`, negative
    /// counts) are `Schema` errors; unparseable dates are `Parse` errors.
    pub fn from_json(json: &str) -> TrackerResult<Self> {
        let raw: RawSnapshot =
            serde_json::from_str(json).map_err(|e| TrackerError::Schema(e.to_string()))?;

        if let Some(version) = raw.version.filter(|v| *v > Self::CURRENT_VERSION) {
            return Err(TrackerError::Schema(format!(
                "snapshot version {} is newer than supported version {}",
                version,
                Self::CURRENT_VERSION
            )));
        }

        let history = raw
            .history
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let date = parse_date(&entry.date).ok_or_else(|| {
                    TrackerError::Parse(format!("history[{}].date: {:?}", index, entry.date))
                })?;
                let count = u32::try_from(entry.count).map_err(|_| {
                    TrackerError::Schema(format!("history[{}].count: {}", index, entry.count))
                })?;
                Ok(DayRecord::new(date, count))
            })
            .collect::<TrackerResult<Vec<_>>>()?;

        let today_timestamps = raw
            .today_timestamps
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, value)| {
                parse_date_time(value).ok_or_else(|| {
                    TrackerError::Parse(format!("todayTimestamps[{}]: {:?}", index, value))
                })
            })
            .collect::<TrackerResult<Vec<_>>>()?;

        let last_event_time = raw
            .last_smoke_time
            .as_deref()
            .map(|value| {
                parse_date_time(value)
                    .ok_or_else(|| TrackerError::Parse(format!("lastSmokeTime: {:?}", value)))
            })
            .transpose()?;

        let current_date = raw
            .current_date
            .as_deref()
            .map(|value| {
                parse_date(value)
                    .ok_or_else(|| TrackerError::Parse(format!("currentDate: {:?}", value)))
            })
            .transpose()?;

        let today_count = raw
            .smokes_today
            .map(|value| {
                u32::try_from(value)
                    .map_err(|_| TrackerError::Schema(format!("smokesToday: {}", value)))
            })
            .transpose()?;

        Ok(Self {
            history,
            today_timestamps,
            last_event_time,
            current_date,
            today_count,
        })
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> TrackerResult<String> {
        let raw = RawSnapshot {
            version: Some(Self::CURRENT_VERSION),
            history: Some(
                self.history
                    .iter()
                    .map(|record| RawDayRecord {
                        date: format_date(record.date),
                        count: i64::from(record.count),
                    })
                    .collect(),
            ),
            today_timestamps: Some(
                self.today_timestamps
                    .iter()
                    .map(|time| format_date_time(*time))
                    .collect(),
            ),
            last_smoke_time: self.last_event_time.map(format_date_time),
            current_date: self.current_date.map(format_date),
            smokes_today: self.today_count.map(i64::from),
        };

        serde_json::to_string_pretty(&raw).map_err(|e| TrackerError::Schema(e.to_string()))
    }

    /// Capture the state as seen after rollover.
    pub(crate) fn capture(state: &EngineState) -> Self {
        Self {
            history: state.history_all(),
            today_timestamps: state.today_events.clone(),
            last_event_time: state.last_event_time,
            current_date: state.current_day,
            today_count: Some(state.today_count),
        }
    }

    /// Build the replacement state and the batch that writes it.
    ///
    /// A missing `currentDate` means `today`. The live count always equals the
    /// number of imported events; a disagreeing `smokesToday` is logged.
    pub(crate) fn restore(&self, today: NaiveDate) -> (EngineState, WriteBatch, ImportSummary) {
        let current_day = self.current_date.unwrap_or(today);
        let events = self.today_timestamps.clone();
        let today_count = u32::try_from(events.len()).unwrap_or(u32::MAX);

        if let Some(declared) = self.today_count.filter(|d| *d != today_count) {
            tracing::warn!(
                "Snapshot declares {} events today but lists {}; using the listed events",
                declared,
                today_count
            );
        }

        let mut history = BTreeMap::new();
        let mut dropped_zero_days = 0;
        for record in &self.history {
            if record.count == 0 {
                dropped_zero_days += 1;
                history.remove(&record.date);
            } else {
                history.insert(record.date, record.count);
            }
        }
        if today_count > 0 {
            history.insert(current_day, today_count);
        }

        let mut batch = WriteBatch::new();
        batch.push(StoreWrite::ClearAll);
        batch.push(StoreWrite::CurrentDay(current_day));
        batch.push(StoreWrite::TodayCount(today_count));
        batch.push(StoreWrite::LastEventTime(self.last_event_time));
        batch.push(StoreWrite::TodayEvents(events.clone()));
        for (date, count) in &history {
            batch.push(StoreWrite::PutHistory(*date, *count));
        }

        let summary = ImportSummary {
            days: history.len(),
            events: events.len(),
            dropped_zero_days,
        };

        let state = EngineState {
            current_day: Some(current_day),
            today_events: events,
            today_count,
            last_event_time: self.last_event_time,
            history,
        };

        (state, batch, summary)
    }
}
