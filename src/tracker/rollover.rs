use chrono::NaiveDate;

use super::state::EngineState;
use crate::store::{StoreWrite, WriteBatch};

/// Outcome of checking the logical day against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    /// Logical day already matches the clock.
    Current,
    /// A new day started; `archived` is the finished day and its count, if
    /// anything was logged on it.
    RolledOver { archived: Option<(NaiveDate, u32)> },
    /// The stored day is later than the clock. Nothing is rewound.
    AheadOfClock { stored: NaiveDate },
}

impl EngineState {
    /// Move the live counters onto `today`, archiving the finished day.
    ///
    /// The returned batch holds every write of the transition and must be
    /// applied as one unit.
    pub fn roll_over(&mut self, today: NaiveDate) -> (DayStatus, WriteBatch) {
        let mut batch = WriteBatch::new();

        match self.current_day {
            Some(day) if day == today => return (DayStatus::Current, batch),
            Some(day) if day > today => {
                return (DayStatus::AheadOfClock { stored: day }, batch);
            }
            _ => {}
        }

        let archived = match self.current_day {
            Some(day) if self.today_count > 0 => {
                self.history.insert(day, self.today_count);
                batch.push(StoreWrite::PutHistory(day, self.today_count));
                Some((day, self.today_count))
            }
            _ => None,
        };

        // A stale entry for the new day would shadow the fresh zero count.
        if self.history.remove(&today).is_some() {
            batch.push(StoreWrite::RemoveHistory(today));
        }

        self.today_events.clear();
        self.today_count = 0;
        self.current_day = Some(today);

        batch.push(StoreWrite::TodayEvents(Vec::new()));
        batch.push(StoreWrite::TodayCount(0));
        batch.push(StoreWrite::CurrentDay(today));

        (DayStatus::RolledOver { archived }, batch)
    }
}
