//! Bounded rolling history: recent climate points and archived sessions.
//!
//! Both buffers are fixed-capacity and evict their oldest entry on overflow.
//! Persistence goes through the [`HistoryStore`] trait so the engine never
//! depends on a particular storage backend.

use crate::core::posture::PostureLabel;
use crate::core::session::OccupancySession;
use crate::protocol::types::SensorReading;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Climate points kept for the trend chart.
pub const TELEMETRY_CAPACITY: usize = 30;

/// Archived sessions kept on the device.
pub const RECORD_CAPACITY: usize = 100;

const WEEK_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Fixed-capacity deque that evicts the oldest entry on overflow.
///
/// "Oldest" is the back for buffers filled with [`push_front`] and the front
/// for buffers filled with [`push_back`].
///
/// [`push_front`]: BoundedBuffer::push_front
/// [`push_back`]: BoundedBuffer::push_back
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting from the front when full.
    pub fn push_back(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Prepend, evicting from the back when full.
    pub fn push_front(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_back()
        } else {
            None
        };
        self.items.push_front(item);
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> BoundedBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// One climate sample for the trend chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Local wall-clock label, `HH:MM:SS`
    pub time: String,
    pub temperature: f64,
    pub humidity: f64,
}

impl HistoryPoint {
    pub fn from_reading(reading: &SensorReading, tz: Tz) -> Self {
        Self {
            time: local_time(reading.timestamp_ms, tz)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default(),
            temperature: reading.temperature,
            humidity: reading.humidity,
        }
    }
}

/// Seconds spent in each seated posture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PostureBreakdown {
    pub normal: f64,
    pub lean_left: f64,
    pub lean_right: f64,
    pub cross_leg_left: f64,
    pub cross_leg_right: f64,
    pub lean_forward: f64,
}

impl PostureBreakdown {
    pub fn from_session(session: &OccupancySession) -> Self {
        let secs = |label| session.posture_ms(label) as f64 / 1000.0;
        Self {
            normal: secs(PostureLabel::Normal),
            lean_left: secs(PostureLabel::LeanLeft),
            lean_right: secs(PostureLabel::LeanRight),
            cross_leg_left: secs(PostureLabel::CrossLegLeft),
            cross_leg_right: secs(PostureLabel::CrossLegRight),
            lean_forward: secs(PostureLabel::LeanForward),
        }
    }

    pub fn get(&self, label: PostureLabel) -> f64 {
        match label {
            PostureLabel::Unseated => 0.0,
            PostureLabel::Normal => self.normal,
            PostureLabel::LeanLeft => self.lean_left,
            PostureLabel::LeanRight => self.lean_right,
            PostureLabel::CrossLegLeft => self.cross_leg_left,
            PostureLabel::CrossLegRight => self.cross_leg_right,
            PostureLabel::LeanForward => self.lean_forward,
        }
    }

    pub fn total(&self) -> f64 {
        PostureLabel::SEATED.iter().map(|&l| self.get(l)).sum()
    }

    fn add(&mut self, other: &PostureBreakdown) {
        self.normal += other.normal;
        self.lean_left += other.lean_left;
        self.lean_right += other.lean_right;
        self.cross_leg_left += other.cross_leg_left;
        self.cross_leg_right += other.cross_leg_right;
        self.lean_forward += other.lean_forward;
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            normal: self.normal * factor,
            lean_left: self.lean_left * factor,
            lean_right: self.lean_right * factor,
            cross_leg_left: self.cross_leg_left * factor,
            cross_leg_right: self.cross_leg_right * factor,
            lean_forward: self.lean_forward * factor,
        }
    }
}

/// A closed session in its persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    /// Local date of the session start, `YYYY-MM-DD`
    pub date: String,
    /// Milliseconds
    pub start_time: u64,
    /// Milliseconds
    pub end_time: u64,
    /// Seated seconds
    pub duration: u64,
    pub posture_breakdown: PostureBreakdown,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    pub alert_count: u32,
}

impl HistoryRecord {
    pub fn from_session(session: &OccupancySession, tz: Tz) -> Self {
        Self {
            id: session.id.to_string(),
            date: local_date(session.start_ms, tz),
            start_time: session.start_ms,
            end_time: session.end_ms.unwrap_or(session.start_ms + session.duration_ms),
            duration: session.duration_ms / 1000,
            posture_breakdown: PostureBreakdown::from_session(session),
            avg_temperature: session.avg_temperature(),
            avg_humidity: session.avg_humidity(),
            alert_count: session.alert_count,
        }
    }
}

fn local_time(ms: u64, tz: Tz) -> Option<DateTime<Tz>> {
    tz.timestamp_millis_opt(ms as i64).single()
}

/// `YYYY-MM-DD` for a millisecond timestamp in `tz`.
pub fn local_date(ms: u64, tz: Tz) -> String {
    local_time(ms, tz)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Roll-up over the most recent sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub sessions: usize,
    pub total_sitting_minutes: u64,
    pub total_alerts: u32,
    pub mean_duration_secs: f64,
    pub std_dev_duration_secs: f64,
    /// Share of seated time per posture (0-1)
    pub posture_share: PostureBreakdown,
}

/// Persistence errors.
#[derive(Debug)]
pub enum StoreError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "IO error: {e}"),
            StoreError::ParseError(e) => write!(f, "Parse error: {e}"),
            StoreError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Load/save hooks for archived sessions.
pub trait HistoryStore: Send {
    /// Records newest-first.
    fn load(&self) -> Result<Vec<HistoryRecord>, StoreError>;
    fn save(&self, records: &[HistoryRecord]) -> Result<(), StoreError>;
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedHistory {
    records: Vec<HistoryRecord>,
    last_updated: DateTime<Utc>,
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| StoreError::IoError(e.to_string()))?;
        let persisted: PersistedHistory =
            serde_json::from_str(&content).map_err(|e| StoreError::ParseError(e.to_string()))?;
        Ok(persisted.records)
    }

    fn save(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
        }
        let persisted = PersistedHistory {
            records: records.to_vec(),
            last_updated: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| StoreError::IoError(e.to_string()))
    }
}

/// In-memory store; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<HistoryRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<HistoryRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        self.records
            .lock()
            .map(|r| r.clone())
            .map_err(|e| StoreError::IoError(e.to_string()))
    }

    fn save(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        let mut stored = self
            .records
            .lock()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        *stored = records.to_vec();
        Ok(())
    }
}

/// Owner of the two history buffers.
pub struct HistoryAggregator {
    /// Oldest-first
    telemetry: BoundedBuffer<HistoryPoint>,
    /// Newest-first
    records: BoundedBuffer<HistoryRecord>,
    store: Option<Box<dyn HistoryStore>>,
}

impl Default for HistoryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryAggregator {
    pub fn new() -> Self {
        Self {
            telemetry: BoundedBuffer::new(TELEMETRY_CAPACITY),
            records: BoundedBuffer::new(RECORD_CAPACITY),
            store: None,
        }
    }

    /// Create an aggregator backed by `store`, loading what it holds.
    pub fn with_store(store: Box<dyn HistoryStore>) -> Result<Self, StoreError> {
        let mut aggregator = Self::new();
        let loaded = store.load()?;
        // Loaded newest-first; rebuild from the oldest kept record forward.
        for record in loaded.into_iter().take(RECORD_CAPACITY).rev() {
            aggregator.records.push_front(record);
        }
        aggregator.store = Some(store);
        Ok(aggregator)
    }

    pub fn add_telemetry_point(&mut self, point: HistoryPoint) {
        self.telemetry.push_back(point);
    }

    /// Archive a closed session and persist the record list.
    ///
    /// The record is kept in memory even if persisting fails.
    pub fn archive_session(&mut self, record: HistoryRecord) -> Result<(), StoreError> {
        self.records.push_front(record);
        self.persist()
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.save(&self.records.to_vec()),
            None => Ok(()),
        }
    }

    /// Telemetry points, oldest first.
    pub fn telemetry(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.telemetry.iter()
    }

    /// Archived records, newest first.
    pub fn records(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn telemetry_len(&self) -> usize {
        self.telemetry.len()
    }

    pub fn record_len(&self) -> usize {
        self.records.len()
    }

    pub fn telemetry_snapshot(&self) -> Vec<HistoryPoint> {
        self.telemetry.to_vec()
    }

    pub fn records_snapshot(&self) -> Vec<HistoryRecord> {
        self.records.to_vec()
    }

    /// Records whose local start date is the same day as `now_ms`.
    pub fn today_records(&self, now_ms: u64, tz: Tz) -> Vec<&HistoryRecord> {
        let today = local_date(now_ms, tz);
        self.records.iter().filter(|r| r.date == today).collect()
    }

    /// Records started within the last seven days.
    pub fn week_records(&self, now_ms: u64) -> Vec<&HistoryRecord> {
        let cutoff = now_ms.saturating_sub(WEEK_MS);
        self.records
            .iter()
            .filter(|r| r.start_time >= cutoff)
            .collect()
    }

    /// Summarise the `recent` newest records.
    pub fn summary(&self, recent: usize) -> HistorySummary {
        summarize(self.records.iter().take(recent))
    }
}

/// Summarise a set of records.
pub fn summarize<'a>(records: impl Iterator<Item = &'a HistoryRecord>) -> HistorySummary {
    let records: Vec<&HistoryRecord> = records.collect();
    if records.is_empty() {
        return HistorySummary::default();
    }

    let durations: Vec<f64> = records.iter().map(|r| r.duration as f64).collect();
    let mean_duration_secs = durations.iter().mean();
    let std_dev_duration_secs = if durations.len() > 1 {
        durations.iter().std_dev()
    } else {
        0.0
    };

    let mut posture_time = PostureBreakdown::default();
    for record in &records {
        posture_time.add(&record.posture_breakdown);
    }
    let seated = posture_time.total();
    let posture_share = if seated > 0.0 {
        posture_time.scaled(1.0 / seated)
    } else {
        PostureBreakdown::default()
    };

    HistorySummary {
        sessions: records.len(),
        total_sitting_minutes: records.iter().map(|r| r.duration / 60).sum(),
        total_alerts: records.iter().map(|r| r.alert_count).sum(),
        mean_duration_secs,
        std_dev_duration_secs,
        posture_share,
    }
}
