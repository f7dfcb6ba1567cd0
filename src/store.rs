//! Persistent store for tracker state.
//!
//! The tracker owns three logical partitions:
//! - settings: current logical day, today's count, last event time
//! - today's events: a single `|`-joined string of local date-times
//! - history: calendar date -> positive count
//!
//! Values are kept as raw strings so that a damaged entry only loses itself
//! when decoded. All mutations go through a [`WriteBatch`] that is applied as
//! one unit.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime};
use fs2::FileExt;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

pub const TIMESTAMP_DELIMITER: &str = "|";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_TIME_NO_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Format a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Format a local date-time as `YYYY-MM-DDTHH:MM:SS`, with a fractional part
/// only when the value has one.
pub fn format_date_time(time: NaiveDateTime) -> String {
    time.format(DATE_TIME_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Parse an ISO local date-time. Seconds may be omitted.
pub fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, DATE_TIME_NO_SECONDS_FORMAT))
        .ok()
}

// ==================== Persisted Layout ====================

/// Scalar settings partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub smokes_today: i64,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_smoke_time: Option<String>,
}

/// Raw contents of all three partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub settings: StoredSettings,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamps: Option<String>,
    #[serde(default, deserialize_with = "lenient_counts")]
    pub history: BTreeMap<String, i64>,
}

// ==================== Lenient Decoding ====================
//
// A value of the wrong JSON type must not fail the whole document. Mistyped
// text keeps its JSON rendering and mistyped counts become `INVALID_COUNT`;
// both are then rejected, logged and counted by the state decoder.

/// Stand-in for a count that is not an integer. Never a valid count.
pub const INVALID_COUNT: i64 = -1;

fn count_or_invalid(value: &Value) -> i64 {
    value.as_i64().unwrap_or(INVALID_COUNT)
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(count_or_invalid(&Value::deserialize(deserializer)?))
}

fn lenient_counts<'de, D>(deserializer: D) -> Result<BTreeMap<String, i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let count = count_or_invalid(&value);
            (key, count)
        })
        .collect())
}

/// A single key write against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    CurrentDay(NaiveDate),
    TodayCount(u32),
    LastEventTime(Option<NaiveDateTime>),
    TodayEvents(Vec<NaiveDateTime>),
    /// A zero count deletes the entry.
    PutHistory(NaiveDate, u32),
    RemoveHistory(NaiveDate),
    /// Wipe every partition.
    ClearAll,
}

/// Writes applied together, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<StoreWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: StoreWrite) {
        self.writes.push(write);
    }

    pub fn append(&mut self, other: WriteBatch) {
        self.writes.extend(other.writes);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreWrite> {
        self.writes.iter()
    }
}

impl StoredState {
    /// Apply every write of the batch to this state.
    pub fn apply(&mut self, batch: &WriteBatch) {
        for write in batch.iter() {
            match write {
                StoreWrite::CurrentDay(date) => {
                    self.settings.current_date = Some(format_date(*date));
                }
                StoreWrite::TodayCount(count) => {
                    self.settings.smokes_today = i64::from(*count);
                }
                StoreWrite::LastEventTime(time) => {
                    self.settings.last_smoke_time = time.map(format_date_time);
                }
                StoreWrite::TodayEvents(events) if events.is_empty() => {
                    self.timestamps = None;
                }
                StoreWrite::TodayEvents(events) => {
                    let joined = events
                        .iter()
                        .map(|event| format_date_time(*event))
                        .collect::<Vec<_>>()
                        .join(TIMESTAMP_DELIMITER);
                    self.timestamps = Some(joined);
                }
                StoreWrite::PutHistory(date, 0) | StoreWrite::RemoveHistory(date) => {
                    self.history.remove(&format_date(*date));
                }
                StoreWrite::PutHistory(date, count) => {
                    self.history.insert(format_date(*date), i64::from(*count));
                }
                StoreWrite::ClearAll => {
                    *self = StoredState::default();
                }
            }
        }
    }
}

// ==================== Store Trait ====================

/// Guard held for the duration of a load-modify-write sequence.
///
/// Releases the in-process lock and, for file-backed stores, the lock file
/// when dropped.
#[derive(Debug)]
pub struct StoreGuard<'a> {
    _local: MutexGuard<'a, ()>,
    _file: Option<File>,
}

impl<'a> StoreGuard<'a> {
    fn local(local: MutexGuard<'a, ()>) -> Self {
        Self {
            _local: local,
            _file: None,
        }
    }

    fn with_lock_file(local: MutexGuard<'a, ()>, file: File) -> Self {
        Self {
            _local: local,
            _file: Some(file),
        }
    }
}

/// Key/value store holding the tracker partitions.
///
/// `apply` must make the whole batch visible at once. `exclusive` hands out the
/// store-wide critical section: every handle sharing one store serializes its
/// read-modify-write sequences through it.
pub trait PersistentStore: Send + Sync {
    fn load(&self) -> StoreResult<StoredState>;

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()>;

    fn clear(&self) -> StoreResult<()>;

    fn exclusive(&self) -> StoreResult<StoreGuard<'_>>;
}

// ==================== Memory Store ====================

/// In-process store, used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoredState>,
    gate: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing raw contents.
    pub fn with_state(state: StoredState) -> Self {
        Self {
            state: Mutex::new(state),
            gate: Mutex::new(()),
        }
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> StoreResult<StoredState> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.clone())
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        state.apply(batch);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        *state = StoredState::default();
        Ok(())
    }

    fn exclusive(&self) -> StoreResult<StoreGuard<'_>> {
        let local = self.gate.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(StoreGuard::local(local))
    }
}

// ==================== File Store ====================

/// Store backed by a single JSON document.
///
/// Every batch rewrites the document through a uniquely named temp file that
/// is synced and renamed over the original, so readers see either the old or
/// the new state. `exclusive` also takes an OS lock on a `<name>.lock` file
/// next to the document, which serializes separate handles and processes
/// working on the same path.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    gate: Mutex<()>,
    io: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file the cross-handle lock is taken on.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("state"));
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn acquire_lock(&self) -> StoreResult<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        FileExt::lock_exclusive(&lock_file)?;

        Ok(lock_file)
    }

    fn read(&self) -> StoreResult<StoredState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoredState::default()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(StoredState::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            StoreError::Corrupt(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write(&self, state: &StoredState) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }
}

impl PersistentStore for FileStore {
    fn load(&self) -> StoreResult<StoredState> {
        let _io = self.io.lock().map_err(|_| StoreError::Poisoned)?;
        self.read()
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        let _io = self.io.lock().map_err(|_| StoreError::Poisoned)?;
        let mut state = self.read()?;
        state.apply(batch);
        self.write(&state)
    }

    fn clear(&self) -> StoreResult<()> {
        let _io = self.io.lock().map_err(|_| StoreError::Poisoned)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exclusive(&self) -> StoreResult<StoreGuard<'_>> {
        let local = self.gate.lock().map_err(|_| StoreError::Poisoned)?;
        let file = self.acquire_lock()?;
        Ok(StoreGuard::with_lock_file(local, file))
    }
}

/// Write to a fresh temp file next to `path`, sync, then rename over `path`.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
