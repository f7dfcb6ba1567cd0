use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::store::{StoredState, TIMESTAMP_DELIMITER, parse_date, parse_date_time};

/// Decoded tracker state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    /// Day the live counters belong to. `None` before first use.
    pub current_day: Option<NaiveDate>,
    /// Today's events in logging order.
    pub today_events: Vec<NaiveDateTime>,
    pub today_count: u32,
    /// Never cleared once set.
    pub last_event_time: Option<NaiveDateTime>,
    pub history: BTreeMap<NaiveDate, u32>,
}

impl EngineState {
    /// Decode raw store contents.
    ///
    /// Entries that fail to parse are skipped and logged; the second value is
    /// the number of entries dropped this way.
    pub fn decode(raw: &StoredState) -> (Self, usize) {
        let mut skipped = 0;

        let current_day = match raw.settings.current_date.as_deref() {
            Some(value) => {
                let parsed = parse_date(value);
                if parsed.is_none() {
                    tracing::warn!("Skipping unparseable current date {:?}", value);
                    skipped += 1;
                }
                parsed
            }
            None => None,
        };

        let today_count = match u32::try_from(raw.settings.smokes_today) {
            Ok(count) => Some(count),
            Err(_) => {
                tracing::warn!(
                    "Skipping out-of-range today count {}",
                    raw.settings.smokes_today
                );
                skipped += 1;
                None
            }
        };

        let last_event_time = match raw.settings.last_smoke_time.as_deref() {
            Some(value) => {
                let parsed = parse_date_time(value);
                if parsed.is_none() {
                    tracing::warn!("Skipping unparseable last event time {:?}", value);
                    skipped += 1;
                }
                parsed
            }
            None => None,
        };

        let mut today_events = Vec::new();
        if let Some(joined) = raw.timestamps.as_deref() {
            for part in joined.split(TIMESTAMP_DELIMITER).filter(|p| !p.is_empty()) {
                match parse_date_time(part) {
                    Some(event) => today_events.push(event),
                    None => {
                        tracing::warn!("Skipping unparseable event timestamp {:?}", part);
                        skipped += 1;
                    }
                }
            }
        }

        let mut history = BTreeMap::new();
        for (key, count) in &raw.history {
            let Some(date) = parse_date(key) else {
                tracing::warn!("Skipping history entry with bad date {:?}", key);
                skipped += 1;
                continue;
            };
            match u32::try_from(*count) {
                Ok(count) if count > 0 => {
                    history.insert(date, count);
                }
                _ => {
                    tracing::warn!("Skipping history entry {} with count {}", key, count);
                    skipped += 1;
                }
            }
        }

        // A lost count is rebuilt from the events that survived decoding
        let today_count = today_count
            .unwrap_or_else(|| u32::try_from(today_events.len()).unwrap_or(u32::MAX));

        let state = Self {
            current_day,
            today_events,
            today_count,
            last_event_time,
            history,
        };
        (state, skipped)
    }

    /// Day the live counters are attributed to, falling back to `today` when
    /// no day has been recorded yet.
    pub fn logical_day(&self, today: NaiveDate) -> NaiveDate {
        self.current_day.unwrap_or(today)
    }
}
