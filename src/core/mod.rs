//! Posture and occupancy engine.
//!
//! This module contains:
//! - Posture classification from the four pressure channels
//! - Occupancy session tracking with alert debouncing
//! - Heating/fan advice with hysteresis and manual override
//! - Bounded telemetry and session history
//! - The engine that owns all of the above and publishes snapshots

pub mod actuator;
pub mod engine;
pub mod history;
pub mod posture;
pub mod session;

pub use actuator::{advise, ActuatorAdvice, ActuatorControl, ActuatorMode};
pub use engine::{CushionEngine, EngineEvent, EngineOptions, EngineSnapshot, SnapshotHandle};
pub use history::{
    BoundedBuffer, HistoryAggregator, HistoryPoint, HistoryRecord, HistoryStore, HistorySummary,
    JsonFileStore, MemoryStore, PostureBreakdown, StoreError,
};
pub use posture::{classify, PostureClassification, PostureLabel, PostureSeverity};
pub use session::{OccupancySession, SessionEvent, SessionTracker};
