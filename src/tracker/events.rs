use chrono::{NaiveDate, NaiveDateTime};

use super::state::EngineState;
use crate::store::{StoreWrite, WriteBatch};

impl EngineState {
    /// Append an event at `now` and keep today's history entry in sync.
    pub fn log(&mut self, now: NaiveDateTime) -> WriteBatch {
        let day = self.logical_day(now.date());

        self.today_events.push(now);
        self.today_count = self.today_count.saturating_add(1);
        self.last_event_time = Some(now);
        self.history.insert(day, self.today_count);

        let mut batch = WriteBatch::new();
        batch.push(StoreWrite::TodayEvents(self.today_events.clone()));
        batch.push(StoreWrite::LastEventTime(Some(now)));
        batch.push(StoreWrite::TodayCount(self.today_count));
        batch.push(StoreWrite::PutHistory(day, self.today_count));
        batch
    }

    /// Remove the latest event of the day, wherever it sits in the list.
    pub fn remove_latest(&mut self, today: NaiveDate) -> (Option<NaiveDateTime>, WriteBatch) {
        let index = self
            .today_events
            .iter()
            .enumerate()
            .max_by_key(|(_, event)| **event)
            .map(|(index, _)| index);

        match index {
            Some(index) => {
                let (removed, batch) = self.remove_at(index, today);
                (Some(removed), batch)
            }
            None => (None, WriteBatch::new()),
        }
    }

    /// Remove the first event equal to `target`. Returns an empty batch when
    /// no event matches.
    pub fn remove_matching(&mut self, target: NaiveDateTime, today: NaiveDate) -> (bool, WriteBatch) {
        match self.today_events.iter().position(|event| *event == target) {
            Some(index) => {
                let (_, batch) = self.remove_at(index, today);
                (true, batch)
            }
            None => (false, WriteBatch::new()),
        }
    }

    fn remove_at(&mut self, index: usize, today: NaiveDate) -> (NaiveDateTime, WriteBatch) {
        let day = self.logical_day(today);
        let removed = self.today_events.remove(index);
        self.today_count = self.today_count.saturating_sub(1);

        let mut batch = WriteBatch::new();
        batch.push(StoreWrite::TodayEvents(self.today_events.clone()));
        batch.push(StoreWrite::TodayCount(self.today_count));

        if self.today_count > 0 {
            self.history.insert(day, self.today_count);
        } else {
            self.history.remove(&day);
        }
        batch.push(StoreWrite::PutHistory(day, self.today_count));

        // Only the latest event drives the display time; with nothing left the
        // old value is kept for continuity.
        let was_latest = self.today_events.iter().all(|event| *event <= removed);
        if was_latest {
            if let Some(latest) = self.today_events.iter().max().copied() {
                self.last_event_time = Some(latest);
                batch.push(StoreWrite::LastEventTime(Some(latest)));
            }
        }

        (removed, batch)
    }
}
