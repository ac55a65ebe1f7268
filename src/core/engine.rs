//! The cushion engine: single owner of all link and session state.
//!
//! Link events are ingested as they arrive. Readings are queued in arrival
//! order and the next external tick runs each of them through the session
//! tracker, timed by the reading's own timestamp. A tick with nothing queued
//! leaves the session untouched. After each change an immutable
//! [`EngineSnapshot`] is published for readers on other threads.

use crate::config::{Config, ConfigError, DisconnectPolicy, ThresholdConfig, ThresholdUpdate};
use crate::core::actuator::{ActuatorAdvice, ActuatorControl, ActuatorMode};
use crate::core::history::{HistoryAggregator, HistoryPoint, HistoryRecord};
use crate::core::posture::{classify, PostureClassification, PostureLabel};
use crate::core::session::{OccupancySession, SessionEvent, SessionTracker};
use crate::diagnostics::{LinkStats, SharedLinkLog};
use crate::protocol::codec::{query_status_command, threshold_command};
use crate::protocol::types::{DeviceStatus, SensorReading};
use crate::source::{LinkEvent, ReadingSource, SourceError};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Engine settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub thresholds: ThresholdConfig,
    pub disconnect_policy: DisconnectPolicy,
    pub telemetry_interval_secs: u64,
    pub tz: Tz,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            disconnect_policy: DisconnectPolicy::default(),
            telemetry_interval_secs: 60,
            tz: chrono_tz::UTC,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.thresholds.validate()?;
        Ok(Self {
            thresholds: config.thresholds,
            disconnect_policy: config.disconnect_policy,
            telemetry_interval_secs: config.telemetry_interval_secs,
            tz: config.tz()?,
        })
    }
}

/// Something the host may want to surface to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SessionOpened {
        session_id: Uuid,
        start_ms: u64,
    },
    SessionClosed(HistoryRecord),
    PostureChanged {
        from: PostureLabel,
        to: PostureLabel,
    },
    PostureAlert {
        session_id: Uuid,
        label: PostureLabel,
        streak_ms: u64,
    },
    SedentaryReminder {
        session_id: Uuid,
        seated_ms: u64,
    },
    /// Posture alert raised by the firmware
    DeviceAlert { payload: Vec<u8> },
    /// The source reported that its transport has gone away
    LinkLost,
}

/// Read-only view of the engine at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub taken_at_ms: u64,
    pub connected: bool,
    pub reading: Option<SensorReading>,
    pub classification: PostureClassification,
    pub advice: ActuatorAdvice,
    pub effective: ActuatorAdvice,
    pub heating_mode: ActuatorMode,
    pub fan_mode: ActuatorMode,
    pub occupied: bool,
    pub session_id: Option<Uuid>,
    pub elapsed_secs: u64,
    pub today_alert_count: u32,
    pub device_status: Option<DeviceStatus>,
    pub thresholds: ThresholdConfig,
    /// Oldest first
    pub telemetry: Vec<HistoryPoint>,
    /// Newest first
    pub records: Vec<HistoryRecord>,
    pub link: LinkStats,
}

/// Shared slot holding the latest published snapshot.
///
/// Readers get an `Arc` to an immutable snapshot and never block the engine
/// for longer than a pointer swap.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Arc<EngineSnapshot>>>,
}

impl SnapshotHandle {
    fn new(snapshot: EngineSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// The most recently published snapshot.
    pub fn load(&self) -> Arc<EngineSnapshot> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn store(&self, snapshot: EngineSnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.inner.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

/// Owner of the tracker, history, actuator control and link state.
pub struct CushionEngine {
    options: EngineOptions,
    tracker: SessionTracker,
    history: HistoryAggregator,
    actuators: ActuatorControl,
    latest_reading: Option<SensorReading>,
    classification: PostureClassification,
    /// Readings not yet seen by the tracker, oldest first
    pending: VecDeque<(SensorReading, PostureClassification)>,
    device_status: Option<DeviceStatus>,
    /// A reading has arrived since the last disconnect
    connected: bool,
    last_telemetry_ms: Option<u64>,
    now_ms: u64,
    outbound: Vec<Vec<u8>>,
    log: SharedLinkLog,
    snapshots: SnapshotHandle,
}

impl CushionEngine {
    /// Create an engine. A status query and the current thresholds are
    /// queued for the device straight away.
    pub fn new(options: EngineOptions, history: HistoryAggregator, log: SharedLinkLog) -> Self {
        let classification = classify(&SensorReading::new([0; 4], 0.0, 0.0, 0));
        let actuators = ActuatorControl::new();
        let snapshot = EngineSnapshot {
            taken_at_ms: 0,
            connected: false,
            reading: None,
            classification,
            advice: actuators.advice(),
            effective: actuators.effective(),
            heating_mode: actuators.heating_mode,
            fan_mode: actuators.fan_mode,
            occupied: false,
            session_id: None,
            elapsed_secs: 0,
            today_alert_count: 0,
            device_status: None,
            thresholds: options.thresholds,
            telemetry: history.telemetry_snapshot(),
            records: history.records_snapshot(),
            link: log.stats(),
        };

        let mut engine = Self {
            options,
            tracker: SessionTracker::new(),
            history,
            actuators,
            latest_reading: None,
            classification,
            pending: VecDeque::new(),
            device_status: None,
            connected: false,
            last_telemetry_ms: None,
            now_ms: 0,
            outbound: Vec::new(),
            log,
            snapshots: SnapshotHandle::new(snapshot),
        };
        engine.handshake();
        engine
    }

    /// Apply one link event.
    pub fn ingest(&mut self, event: LinkEvent) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        match event {
            LinkEvent::Reading(reading) => {
                self.log.record_frame_decoded();
                self.log.record_reading();
                self.connected = true;

                let classification = classify(&reading);
                if classification.label != self.classification.label {
                    tracing::debug!(
                        from = %self.classification.label,
                        to = %classification.label,
                        "posture changed"
                    );
                    events.push(EngineEvent::PostureChanged {
                        from: self.classification.label,
                        to: classification.label,
                    });
                }
                self.classification = classification;
                self.latest_reading = Some(reading);
                self.pending.push_back((reading, classification));

                let frames = self.actuators.update(&reading, &self.options.thresholds);
                self.queue(frames);
            }
            LinkEvent::Status(status) => {
                self.log.record_frame_decoded();
                self.log.record_status_frame();
                tracing::debug!(
                    battery = status.battery_level,
                    signal = status.signal_strength,
                    "device status"
                );
                self.device_status = Some(status);
            }
            LinkEvent::DeviceAlert { payload } => {
                self.log.record_frame_decoded();
                self.log.record_device_alert();
                tracing::info!(payload = %hex::encode(&payload), "device raised a posture alert");
                events.push(EngineEvent::DeviceAlert { payload });
            }
            LinkEvent::Dropped(e) => {
                self.log.record_frame_dropped();
                tracing::debug!(error = %e, "dropped frame");
            }
            LinkEvent::Noise { bytes } => {
                self.log.record_bytes_discarded(bytes);
                tracing::debug!(bytes, "discarded bytes between frames");
            }
        }

        events
    }

    /// Run every reading queued since the last tick through the tracker.
    pub fn tick(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        self.now_ms = self.now_ms.max(now_ms);
        let events = self.drain_pending();
        self.publish();
        events
    }

    /// Drain `source`, apply what it produced, then tick.
    pub fn pump(&mut self, source: &mut dyn ReadingSource, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        match source.poll(now_ms) {
            Ok(link_events) => {
                for event in link_events {
                    events.extend(self.ingest(event));
                }
            }
            Err(SourceError::Disconnected) => {
                if self.connected {
                    events.extend(self.disconnect());
                }
                events.push(EngineEvent::LinkLost);
            }
            Err(e) => {
                tracing::warn!(source = source.name(), error = %e, "source poll failed");
            }
        }
        events.extend(self.tick(now_ms));
        events
    }

    /// Apply a partial threshold change.
    ///
    /// On success the device is sent the new thresholds and the actuator
    /// policy is re-run against the latest reading.
    pub fn update_thresholds(
        &mut self,
        update: &ThresholdUpdate,
    ) -> Result<ThresholdConfig, ConfigError> {
        let next = self.options.thresholds.apply(update)?;
        if next != self.options.thresholds {
            tracing::info!(?next, "thresholds updated");
            self.options.thresholds = next;
            self.queue(vec![threshold_command(&next)]);
            if let Some(reading) = self.latest_reading {
                let frames = self.actuators.update(&reading, &next);
                self.queue(frames);
            }
            self.publish();
        }
        Ok(next)
    }

    pub fn set_heating_mode(&mut self, mode: ActuatorMode) {
        let frames = self.actuators.set_heating_mode(mode);
        self.queue(frames);
        self.publish();
    }

    pub fn set_fan_mode(&mut self, mode: ActuatorMode) {
        let frames = self.actuators.set_fan_mode(mode);
        self.queue(frames);
        self.publish();
    }

    /// Reset the daily alert counter.
    pub fn new_day(&mut self) {
        self.tracker.new_day();
        self.publish();
    }

    /// The transport went away.
    ///
    /// Readings that arrived before the loss are tracked first.
    pub fn disconnect(&mut self) -> Vec<EngineEvent> {
        let mut events = self.drain_pending();
        self.connected = false;
        self.log.record_disconnect();

        match self.options.disconnect_policy {
            DisconnectPolicy::Close => {
                if let Some(session) = self.tracker.force_close() {
                    tracing::info!(session_id = %session.id, "closing session on disconnect");
                    events.push(self.archive(session));
                }
            }
            DisconnectPolicy::Pause => {
                tracing::info!("pausing session until the link returns");
                self.tracker.suspend();
            }
        }

        self.publish();
        events
    }

    /// The transport is back. The full actuator state and thresholds are
    /// re-sent before the next reading is evaluated.
    pub fn reconnect(&mut self) {
        tracing::info!("link reconnected");
        self.actuators.resync();
        self.handshake();
        if let Some(reading) = self.latest_reading {
            let frames = self.actuators.update(&reading, &self.options.thresholds);
            self.queue(frames);
        }
        self.publish();
    }

    /// Close any open session and flush persistent state.
    pub fn shutdown(&mut self) -> Vec<EngineEvent> {
        let mut events = self.drain_pending();
        if let Some(session) = self.tracker.force_close() {
            events.push(self.archive(session));
        }
        if let Err(e) = self.history.persist() {
            tracing::warn!(error = %e, "failed to persist history");
        }
        if let Err(e) = self.log.save() {
            tracing::warn!(error = %e, "failed to save link stats");
        }
        self.publish();
        events
    }

    /// Command frames waiting to be written to the device.
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound)
    }

    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.snapshots.load()
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.options.thresholds
    }

    pub fn history(&self) -> &HistoryAggregator {
        &self.history
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn classification(&self) -> &PostureClassification {
        &self.classification
    }

    pub fn latest_reading(&self) -> Option<&SensorReading> {
        self.latest_reading.as_ref()
    }

    pub fn device_status(&self) -> Option<DeviceStatus> {
        self.device_status
    }

    pub fn actuators(&self) -> &ActuatorControl {
        &self.actuators
    }

    pub fn link_log(&self) -> &SharedLinkLog {
        &self.log
    }

    fn drain_pending(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some((reading, classification)) = self.pending.pop_front() {
            let at = reading.timestamp_ms;
            let session_events =
                self.tracker
                    .tick(&classification, &reading, at, &self.options.thresholds);
            for event in session_events {
                events.push(self.handle_session_event(event));
            }
            self.sample_telemetry(&reading);
        }
        events
    }

    /// At most one point per interval, measured on reading timestamps.
    fn sample_telemetry(&mut self, reading: &SensorReading) {
        let interval_ms = self.options.telemetry_interval_secs.saturating_mul(1000);
        let at = reading.timestamp_ms;
        let due = self
            .last_telemetry_ms
            .map_or(true, |last| at.saturating_sub(last) >= interval_ms);
        if due {
            self.history
                .add_telemetry_point(HistoryPoint::from_reading(reading, self.options.tz));
            self.last_telemetry_ms = Some(at);
        }
    }

    fn handshake(&mut self) {
        let thresholds = threshold_command(&self.options.thresholds);
        self.queue(vec![query_status_command(), thresholds]);
    }

    fn queue(&mut self, frames: Vec<Vec<u8>>) {
        if frames.is_empty() {
            return;
        }
        self.log.record_commands_sent(frames.len() as u64);
        for frame in &frames {
            tracing::debug!(frame = %hex::encode(frame), "queued command");
        }
        self.outbound.extend(frames);
    }

    fn handle_session_event(&mut self, event: SessionEvent) -> EngineEvent {
        match event {
            SessionEvent::Opened {
                session_id,
                start_ms,
            } => {
                tracing::info!(%session_id, "session opened");
                EngineEvent::SessionOpened {
                    session_id,
                    start_ms,
                }
            }
            SessionEvent::Closed(session) => self.archive(session),
            SessionEvent::PostureAlert {
                session_id,
                label,
                streak_ms,
            } => {
                self.log.record_posture_alert();
                tracing::info!(%session_id, posture = %label, streak_ms, "posture alert");
                EngineEvent::PostureAlert {
                    session_id,
                    label,
                    streak_ms,
                }
            }
            SessionEvent::SedentaryReminder {
                session_id,
                seated_ms,
            } => {
                tracing::info!(%session_id, seated_secs = seated_ms / 1000, "sedentary reminder");
                EngineEvent::SedentaryReminder {
                    session_id,
                    seated_ms,
                }
            }
        }
    }

    fn archive(&mut self, session: OccupancySession) -> EngineEvent {
        let record = HistoryRecord::from_session(&session, self.options.tz);
        tracing::info!(
            session_id = %record.id,
            duration_secs = record.duration,
            alerts = record.alert_count,
            "session closed"
        );
        if let Err(e) = self.history.archive_session(record.clone()) {
            tracing::warn!(error = %e, "failed to persist history");
        }
        self.log.record_session_archived();
        EngineEvent::SessionClosed(record)
    }

    fn publish(&self) {
        let active = self.tracker.active();
        self.snapshots.store(EngineSnapshot {
            taken_at_ms: self.now_ms,
            connected: self.connected,
            reading: self.latest_reading,
            classification: self.classification,
            advice: self.actuators.advice(),
            effective: self.actuators.effective(),
            heating_mode: self.actuators.heating_mode,
            fan_mode: self.actuators.fan_mode,
            occupied: active.is_some(),
            session_id: active.map(|s| s.id),
            elapsed_secs: self.tracker.elapsed_secs(),
            today_alert_count: self.tracker.today_alert_count(),
            device_status: self.device_status,
            thresholds: self.options.thresholds,
            telemetry: self.history.telemetry_snapshot(),
            records: self.history.records_snapshot(),
            link: self.log.stats(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::MemoryStore;
    use crate::diagnostics::create_shared_log;
    use crate::protocol::codec::{fan_command, heating_command, DecodeError};

    const NORMAL: [u16; 4] = [200, 200, 220, 220];
    const LEAN_LEFT: [u16; 4] = [330, 170, 350, 150];
    const EMPTY: [u16; 4] = [0; 4];

    fn engine_with(options: EngineOptions) -> (CushionEngine, MemoryStore) {
        let store = MemoryStore::new();
        let history = HistoryAggregator::with_store(Box::new(store.clone())).unwrap();
        (CushionEngine::new(options, history, create_shared_log()), store)
    }

    fn engine() -> CushionEngine {
        engine_with(EngineOptions::default()).0
    }

    fn feed(engine: &mut CushionEngine, secs: u64, pressures: [u16; 4]) -> Vec<EngineEvent> {
        let now = secs * 1000;
        let mut events = engine.ingest(LinkEvent::Reading(SensorReading::new(
            pressures, 25.0, 60.0, now,
        )));
        events.extend(engine.tick(now));
        events
    }

    #[test]
    fn test_handshake_queued_on_start() {
        let mut engine = engine();
        let outbound = engine.take_outbound();
        assert_eq!(outbound.len(), 2);
        assert_eq!(outbound[0], query_status_command());
        assert_eq!(outbound[1], threshold_command(&ThresholdConfig::default()));
        assert!(engine.take_outbound().is_empty());
    }

    #[test]
    fn test_session_lifecycle_is_archived() {
        let (mut engine, store) = engine_with(EngineOptions::default());
        let opened = feed(&mut engine, 0, NORMAL);
        assert!(opened
            .iter()
            .any(|e| matches!(e, EngineEvent::SessionOpened { start_ms: 0, .. })));

        feed(&mut engine, 1, NORMAL);
        feed(&mut engine, 2, NORMAL);
        feed(&mut engine, 3, LEAN_LEFT);
        assert_eq!(engine.snapshot().elapsed_secs, 3);

        let closed = feed(&mut engine, 4, EMPTY);
        let record = closed
            .iter()
            .find_map(|e| match e {
                EngineEvent::SessionClosed(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(record.duration, 3);
        assert_eq!(record.posture_breakdown.normal, 2.0);
        assert_eq!(record.posture_breakdown.lean_left, 1.0);
        assert_eq!(record.date, "1970-01-01");

        assert_eq!(store.records().len(), 1);
        let snapshot = engine.snapshot();
        assert!(!snapshot.occupied);
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.link.sessions_archived, 1);
    }

    #[test]
    fn test_posture_alert_surfaces_once() {
        let mut engine = engine();
        let mut alerts = 0;
        for t in 0..=20 {
            alerts += feed(&mut engine, t, LEAN_LEFT)
                .iter()
                .filter(|e| matches!(e, EngineEvent::PostureAlert { .. }))
                .count();
        }
        assert_eq!(alerts, 1);
        assert_eq!(engine.snapshot().today_alert_count, 1);
        assert_eq!(engine.link_log().stats().posture_alerts, 1);

        engine.new_day();
        assert_eq!(engine.snapshot().today_alert_count, 0);
    }

    #[test]
    fn test_dropped_frames_keep_previous_reading() {
        let mut engine = engine();
        feed(&mut engine, 0, NORMAL);
        feed(&mut engine, 1, NORMAL);
        engine.ingest(LinkEvent::Dropped(DecodeError::BadTail { found: 0 }));
        engine.ingest(LinkEvent::Noise { bytes: 3 });
        assert!(engine.tick(2000).is_empty());
        engine.ingest(LinkEvent::Dropped(DecodeError::TooShort { len: 2 }));
        engine.tick(5000);

        // No new reading, so no seated time is added.
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.reading.unwrap().pressures(), NORMAL);
        assert!(snapshot.connected);
        assert!(snapshot.occupied);
        assert_eq!(snapshot.elapsed_secs, 1);
        assert_eq!(snapshot.link.frames_dropped, 2);
        assert_eq!(snapshot.link.bytes_discarded, 3);

        // The next valid reading credits the time since the previous one.
        feed(&mut engine, 6, NORMAL);
        assert_eq!(engine.snapshot().elapsed_secs, 6);
    }

    #[test]
    fn test_every_queued_reading_reaches_the_tracker() {
        let mut engine = engine();
        feed(&mut engine, 0, NORMAL);
        feed(&mut engine, 1, NORMAL);

        // Stand up and sit back down between two ticks.
        engine.ingest(LinkEvent::Reading(SensorReading::new(EMPTY, 25.0, 60.0, 2000)));
        engine.ingest(LinkEvent::Reading(SensorReading::new(NORMAL, 25.0, 60.0, 2000)));
        let events = engine.tick(2000);

        let closed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::SessionClosed(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].duration, 1);
        assert_eq!(closed[0].end_time, 2000);
        assert!(matches!(
            events.last(),
            Some(EngineEvent::SessionOpened { start_ms: 2000, .. })
        ));

        let snapshot = engine.snapshot();
        assert!(snapshot.occupied);
        assert_eq!(snapshot.elapsed_secs, 0);
        assert_eq!(snapshot.records.len(), 1);
    }

    #[test]
    fn test_readings_are_timed_by_their_timestamp() {
        let mut engine = engine();
        engine.ingest(LinkEvent::Reading(SensorReading::new(NORMAL, 25.0, 60.0, 0)));
        engine.ingest(LinkEvent::Reading(SensorReading::new(NORMAL, 25.0, 60.0, 1000)));
        engine.ingest(LinkEvent::Reading(SensorReading::new(LEAN_LEFT, 25.0, 60.0, 3000)));
        engine.tick(10_000);

        let session = engine.tracker().active().unwrap();
        assert_eq!(session.duration_ms, 3000);
        assert_eq!(session.posture_ms(PostureLabel::Normal), 1000);
        assert_eq!(session.posture_ms(PostureLabel::LeanLeft), 2000);
    }

    #[test]
    fn test_actuator_commands_only_on_change() {
        let mut engine = engine();
        engine.take_outbound();

        let cold = SensorReading::new(NORMAL, 20.0, 60.0, 0);
        engine.ingest(LinkEvent::Reading(cold));
        assert_eq!(
            engine.take_outbound(),
            vec![heating_command(true), fan_command(false)]
        );

        engine.ingest(LinkEvent::Reading(SensorReading::new(NORMAL, 21.0, 60.0, 500)));
        assert!(engine.take_outbound().is_empty());

        engine.set_heating_mode(ActuatorMode::Manual(false));
        assert_eq!(engine.take_outbound(), vec![heating_command(false)]);
        assert!(engine.snapshot().advice.heating_on);
        assert!(!engine.snapshot().effective.heating_on);
    }

    #[test]
    fn test_threshold_update_pushes_frame() {
        let mut engine = engine();
        engine.take_outbound();
        engine.ingest(LinkEvent::Reading(SensorReading::new(NORMAL, 24.0, 60.0, 0)));
        engine.take_outbound();

        let next = engine
            .update_thresholds(&ThresholdUpdate {
                temp_min: Some(25.0),
                ..ThresholdUpdate::default()
            })
            .unwrap();
        assert_eq!(next.temp_min, 25.0);

        let outbound = engine.take_outbound();
        assert_eq!(outbound[0], threshold_command(&next));
        // 24 °C is now below the minimum, so heating switches on.
        assert_eq!(outbound[1], heating_command(true));
        assert_eq!(engine.snapshot().thresholds.temp_min, 25.0);

        let unchanged = engine.update_thresholds(&ThresholdUpdate::default()).unwrap();
        assert_eq!(unchanged, next);
        assert!(engine.take_outbound().is_empty());

        let invalid = ThresholdUpdate {
            humidity_min: Some(90.0),
            ..ThresholdUpdate::default()
        };
        assert!(engine.update_thresholds(&invalid).is_err());
        assert_eq!(engine.thresholds(), next);
    }

    #[test]
    fn test_disconnect_close_archives_at_last_tick() {
        let (mut engine, store) = engine_with(EngineOptions::default());
        feed(&mut engine, 0, NORMAL);
        feed(&mut engine, 1, NORMAL);
        feed(&mut engine, 2, NORMAL);

        let events = engine.disconnect();
        match &events[..] {
            [EngineEvent::SessionClosed(record)] => {
                assert_eq!(record.duration, 2);
                assert_eq!(record.end_time, 2000);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.records().len(), 1);

        // Stale readings never reopen a session.
        assert!(engine.tick(10_000).is_empty());
        assert!(!engine.snapshot().occupied);
        assert!(!engine.snapshot().connected);
    }

    #[test]
    fn test_disconnect_pause_skips_gap() {
        let (mut engine, store) = engine_with(EngineOptions {
            disconnect_policy: DisconnectPolicy::Pause,
            ..EngineOptions::default()
        });
        feed(&mut engine, 0, NORMAL);
        feed(&mut engine, 1, NORMAL);

        assert!(engine.disconnect().is_empty());
        assert!(engine.tick(30_000).is_empty());
        assert!(engine.snapshot().occupied);

        engine.reconnect();
        feed(&mut engine, 60, NORMAL);
        feed(&mut engine, 61, NORMAL);
        assert_eq!(engine.snapshot().elapsed_secs, 2);
        assert!(store.records().is_empty());

        let closed = engine.shutdown();
        assert!(matches!(&closed[..], [EngineEvent::SessionClosed(r)] if r.duration == 2));
    }

    #[test]
    fn test_disconnect_tracks_readings_queued_before_loss() {
        let (mut engine, store) = engine_with(EngineOptions::default());
        feed(&mut engine, 0, NORMAL);
        engine.ingest(LinkEvent::Reading(SensorReading::new(NORMAL, 25.0, 60.0, 4000)));

        let events = engine.disconnect();
        assert!(matches!(&events[..], [EngineEvent::SessionClosed(r)] if r.duration == 4 && r.end_time == 4000));
        assert_eq!(store.records().len(), 1);
    }

    #[test]
    fn test_reconnect_resends_state() {
        let mut engine = engine();
        engine.ingest(LinkEvent::Reading(SensorReading::new(NORMAL, 25.0, 60.0, 0)));
        engine.take_outbound();

        engine.disconnect();
        engine.reconnect();
        let outbound = engine.take_outbound();
        assert_eq!(outbound.len(), 4);
        assert_eq!(outbound[0], query_status_command());
        assert_eq!(outbound[2], heating_command(false));
        assert_eq!(outbound[3], fan_command(false));
    }

    #[test]
    fn test_telemetry_sampled_per_interval() {
        let mut engine = engine_with(EngineOptions {
            telemetry_interval_secs: 10,
            ..EngineOptions::default()
        })
        .0;
        for t in 0..35 {
            feed(&mut engine, t, NORMAL);
        }
        let snapshot = engine.snapshot();
        let telemetry = &snapshot.telemetry;
        assert_eq!(telemetry.len(), 4);
        assert_eq!(telemetry[0].time, "00:00:00");
        assert_eq!(telemetry[1].time, "00:00:10");
    }

    #[test]
    fn test_status_and_device_alert() {
        let mut engine = engine();
        engine.ingest(LinkEvent::Status(DeviceStatus {
            battery_level: 64,
            signal_strength: 2,
        }));
        let events = engine.ingest(LinkEvent::DeviceAlert { payload: vec![3] });
        assert_eq!(events, vec![EngineEvent::DeviceAlert { payload: vec![3] }]);

        engine.tick(0);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.device_status.unwrap().battery_level, 64);
        assert_eq!(snapshot.link.status_frames, 1);
        assert_eq!(snapshot.link.device_alerts, 1);
        assert_eq!(snapshot.today_alert_count, 0);
    }

    #[test]
    fn test_snapshot_handle_sees_updates() {
        let mut engine = engine();
        let handle = engine.snapshot_handle();
        let before = handle.load();
        feed(&mut engine, 0, NORMAL);
        let after = handle.load();

        assert!(!before.occupied);
        assert!(after.occupied);
        assert_eq!(after.classification.label, PostureLabel::Normal);
    }
}
