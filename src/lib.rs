//! Cushion Link - wire protocol and posture engine for the smart cushion.
//!
//! This library talks to a cushion sensor unit that reports four pressure
//! channels plus temperature and humidity, and turns that stream into a
//! classified posture, occupancy sessions, alerts and rolling history.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cushion Engine                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│ Frame Codec │──▶│   Posture   │       │
//! │  │(mock/stream)│   │ (deframer)  │   │ Classifier  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         ▲                 │                  │              │
//! │         │                 ▼                  ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Actuator   │   │  Link Log   │   │   Session   │       │
//! │  │   Policy    │   │ (counters)  │   │   Tracker   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                              │              │
//! │                                              ▼              │
//! │                                      ┌─────────────┐       │
//! │                                      │   History   │       │
//! │                                      └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cushion_link::core::{CushionEngine, EngineOptions, HistoryAggregator};
//! use cushion_link::diagnostics::create_shared_log;
//! use cushion_link::source::MockSource;
//!
//! let mut engine = CushionEngine::new(
//!     EngineOptions::default(),
//!     HistoryAggregator::new(),
//!     create_shared_log(),
//! );
//! let mut source = MockSource::new(Some(42));
//!
//! for tick in 0..10u64 {
//!     let events = engine.pump(&mut source, tick * 500);
//!     println!("{events:?}");
//! }
//! println!("{:?}", engine.snapshot().classification.label);
//! ```

pub mod clock;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod protocol;
pub mod source;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, DisconnectPolicy, SourceKind, ThresholdConfig, ThresholdUpdate};
pub use core::{
    classify, CushionEngine, EngineEvent, EngineOptions, EngineSnapshot, PostureLabel,
    SnapshotHandle,
};
pub use diagnostics::{LinkLog, LinkStats, SharedLinkLog};
pub use protocol::{decode_frame, decode_reading, encode, DecodeError, EncodeError, SensorReading};
pub use source::{LinkEvent, MockSource, ReadingSource, SourceError, StreamSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
