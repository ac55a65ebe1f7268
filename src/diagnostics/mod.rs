//! Runtime counters for the link and engine.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, LinkLog, LinkStats, SharedLinkLog,
};
