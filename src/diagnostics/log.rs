//! Link statistics log.
//!
//! Counts what crossed the link and what the engine did with it. Nothing
//! here records sensor values, only event counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Link and engine counters for the current run.
#[derive(Debug)]
pub struct LinkLog {
    /// Frames that decoded cleanly
    frames_decoded: AtomicU64,
    /// Frames rejected by the decoder
    frames_dropped: AtomicU64,
    /// Garbage bytes skipped while resynchronising
    bytes_discarded: AtomicU64,
    /// Sensor readings fed to the classifier
    readings_processed: AtomicU64,
    /// Device status frames received
    status_frames: AtomicU64,
    /// Posture alerts raised by the firmware
    device_alerts: AtomicU64,
    /// Sessions closed and archived
    sessions_archived: AtomicU64,
    /// Posture alerts raised
    posture_alerts: AtomicU64,
    /// Command frames queued for the device
    commands_sent: AtomicU64,
    /// Transport disconnects
    disconnects: AtomicU64,
    /// Run start time
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl LinkLog {
    pub fn new() -> Self {
        Self {
            frames_decoded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
            readings_processed: AtomicU64::new(0),
            status_frames: AtomicU64::new(0),
            device_alerts: AtomicU64::new(0),
            sessions_archived: AtomicU64::new(0),
            posture_alerts: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that resumes from and saves to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous link stats");
        }

        log
    }

    pub fn record_frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_discarded(&self, count: u64) {
        self.bytes_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reading(&self) {
        self.readings_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_frame(&self) {
        self.status_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_alert(&self) {
        self.device_alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_archived(&self) {
        self.sessions_archived.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_posture_alert(&self) {
        self.posture_alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commands_sent(&self, count: u64) {
        self.commands_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            readings_processed: self.readings_processed.load(Ordering::Relaxed),
            status_frames: self.status_frames.load(Ordering::Relaxed),
            device_alerts: self.device_alerts.load(Ordering::Relaxed),
            sessions_archived: self.sessions_archived.load(Ordering::Relaxed),
            posture_alerts: self.posture_alerts.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary for the `status` command.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Link Statistics:\n\
             - Frames decoded: {}\n\
             - Frames dropped: {}\n\
             - Bytes discarded: {}\n\
             - Readings processed: {}\n\
             - Status frames: {}\n\
             - Device alerts: {}\n\
             - Sessions archived: {}\n\
             - Posture alerts: {}\n\
             - Commands sent: {}\n\
             - Disconnects: {}\n\
             - Uptime: {} seconds",
            stats.frames_decoded,
            stats.frames_dropped,
            stats.bytes_discarded,
            stats.readings_processed,
            stats.status_frames,
            stats.device_alerts,
            stats.sessions_archived,
            stats.posture_alerts,
            stats.commands_sent,
            stats.disconnects,
            stats.uptime_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_decoded: stats.frames_decoded,
                frames_dropped: stats.frames_dropped,
                bytes_discarded: stats.bytes_discarded,
                readings_processed: stats.readings_processed,
                status_frames: stats.status_frames,
                device_alerts: stats.device_alerts,
                sessions_archived: stats.sessions_archived,
                posture_alerts: stats.posture_alerts,
                commands_sent: stats.commands_sent,
                disconnects: stats.disconnects,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_decoded
                    .store(persisted.frames_decoded, Ordering::Relaxed);
                self.frames_dropped
                    .store(persisted.frames_dropped, Ordering::Relaxed);
                self.bytes_discarded
                    .store(persisted.bytes_discarded, Ordering::Relaxed);
                self.readings_processed
                    .store(persisted.readings_processed, Ordering::Relaxed);
                self.status_frames
                    .store(persisted.status_frames, Ordering::Relaxed);
                self.device_alerts
                    .store(persisted.device_alerts, Ordering::Relaxed);
                self.sessions_archived
                    .store(persisted.sessions_archived, Ordering::Relaxed);
                self.posture_alerts
                    .store(persisted.posture_alerts, Ordering::Relaxed);
                self.commands_sent
                    .store(persisted.commands_sent, Ordering::Relaxed);
                self.disconnects
                    .store(persisted.disconnects, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.frames_decoded,
            &self.frames_dropped,
            &self.bytes_discarded,
            &self.readings_processed,
            &self.status_frames,
            &self.device_alerts,
            &self.sessions_archived,
            &self.posture_alerts,
            &self.commands_sent,
            &self.disconnects,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for LinkLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of link statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub bytes_discarded: u64,
    pub readings_processed: u64,
    pub status_frames: u64,
    pub device_alerts: u64,
    pub sessions_archived: u64,
    pub posture_alerts: u64,
    pub commands_sent: u64,
    pub disconnects: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    frames_decoded: u64,
    frames_dropped: u64,
    bytes_discarded: u64,
    readings_processed: u64,
    status_frames: u64,
    device_alerts: u64,
    sessions_archived: u64,
    posture_alerts: u64,
    commands_sent: u64,
    disconnects: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared link log.
pub type SharedLinkLog = Arc<LinkLog>;

pub fn create_shared_log() -> SharedLinkLog {
    Arc::new(LinkLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedLinkLog {
    Arc::new(LinkLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_log_counting() {
        let log = LinkLog::new();

        log.record_frame_decoded();
        log.record_frame_decoded();
        log.record_frame_dropped();
        log.record_bytes_discarded(7);
        log.record_commands_sent(2);

        let stats = log.stats();
        assert_eq!(stats.frames_decoded, 2);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.bytes_discarded, 7);
        assert_eq!(stats.commands_sent, 2);
        assert_eq!(stats.readings_processed, 0);
    }

    #[test]
    fn test_link_log_reset() {
        let log = LinkLog::new();
        log.record_reading();
        log.record_disconnect();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.readings_processed, 0);
        assert_eq!(stats.disconnects, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("cushion-link-log-{}", uuid::Uuid::new_v4()))
            .join("link_stats.json");

        let log = LinkLog::with_persistence(path.clone());
        log.record_session_archived();
        log.record_posture_alert();
        log.record_posture_alert();
        log.record_status_frame();
        log.record_device_alert();
        log.save().unwrap();

        let resumed = LinkLog::with_persistence(path.clone());
        let stats = resumed.stats();
        assert_eq!(stats.sessions_archived, 1);
        assert_eq!(stats.posture_alerts, 2);
        assert_eq!(stats.status_frames, 1);
        assert_eq!(stats.device_alerts, 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_incomplete_stats_file_is_ignored() {
        let dir = std::env::temp_dir().join(format!("cushion-link-log-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("link_stats.json");
        std::fs::write(
            &path,
            r#"{"frames_decoded": 9, "readings_processed": 4, "last_updated": "2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let log = LinkLog::with_persistence(path);
        let stats = log.stats();
        assert_eq!(stats.frames_decoded, 0);
        assert_eq!(stats.readings_processed, 0);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_summary_format() {
        let log = LinkLog::new();
        let summary = log.summary();

        assert!(summary.contains("Frames decoded"));
        assert!(summary.contains("Sessions archived"));
        assert!(summary.contains("Uptime"));
    }
}
