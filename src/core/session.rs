//! Occupancy session tracking.
//!
//! The tracker is a two-state machine (unoccupied / occupied) driven by an
//! external tick. While occupied it accrues seated time per posture, keeps
//! running climate averages, and debounces posture alerts: a bad posture must
//! persist for the configured delay before one alert is raised, and no
//! further alert is raised until the posture recovers.

use crate::config::ThresholdConfig;
use crate::core::posture::{PostureClassification, PostureLabel};
use crate::protocol::types::SensorReading;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Streaming arithmetic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMean {
    count: u64,
    mean: f64,
}

impl RunningMean {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// One continuous span of occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySession {
    pub id: Uuid,
    pub start_ms: u64,
    /// Set once the session is closed
    pub end_ms: Option<u64>,
    /// Seated time credited so far
    pub duration_ms: u64,
    /// Seated time per label, indexed like [`PostureLabel::SEATED`]
    posture_ms: [u64; 6],
    pub alert_count: u32,
    pub temperature: RunningMean,
    pub humidity: RunningMean,
    sedentary_reminded: bool,
}

impl OccupancySession {
    fn open(start_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_ms,
            end_ms: None,
            duration_ms: 0,
            posture_ms: [0; 6],
            alert_count: 0,
            temperature: RunningMean::default(),
            humidity: RunningMean::default(),
            sedentary_reminded: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_ms.is_some()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Seated time attributed to `label`, in milliseconds.
    pub fn posture_ms(&self, label: PostureLabel) -> u64 {
        posture_index(label).map_or(0, |i| self.posture_ms[i])
    }

    pub fn avg_temperature(&self) -> f64 {
        self.temperature.mean()
    }

    pub fn avg_humidity(&self) -> f64 {
        self.humidity.mean()
    }

    fn accrue(&mut self, label: PostureLabel, elapsed_ms: u64) {
        self.duration_ms = self.duration_ms.saturating_add(elapsed_ms);
        if let Some(i) = posture_index(label) {
            self.posture_ms[i] = self.posture_ms[i].saturating_add(elapsed_ms);
        }
    }

    fn sample(&mut self, reading: &SensorReading) {
        self.temperature.push(reading.temperature);
        self.humidity.push(reading.humidity);
    }
}

fn posture_index(label: PostureLabel) -> Option<usize> {
    PostureLabel::SEATED.iter().position(|&l| l == label)
}

/// Something the tracker wants the outside world to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened {
        session_id: Uuid,
        start_ms: u64,
    },
    Closed(OccupancySession),
    PostureAlert {
        session_id: Uuid,
        label: PostureLabel,
        streak_ms: u64,
    },
    SedentaryReminder {
        session_id: Uuid,
        seated_ms: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct BadStreak {
    since_ms: u64,
    alerted: bool,
}

/// Seated/unseated state machine with alert debouncing.
#[derive(Debug, Default)]
pub struct SessionTracker {
    active: Option<OccupancySession>,
    last_tick_ms: Option<u64>,
    streak: Option<BadStreak>,
    today_alert_count: u32,
    /// Accrual suspended until the next tick re-anchors
    suspended: bool,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the state machine with the latest classification.
    pub fn tick(
        &mut self,
        classification: &PostureClassification,
        reading: &SensorReading,
        now_ms: u64,
        thresholds: &ThresholdConfig,
    ) -> Vec<SessionEvent> {
        let label = classification.label;
        let mut events = Vec::new();

        match (self.active.is_some(), label.is_seated()) {
            (false, false) => {
                self.streak = None;
            }
            (false, true) => {
                let mut session = OccupancySession::open(now_ms);
                session.sample(reading);
                events.push(SessionEvent::Opened {
                    session_id: session.id,
                    start_ms: now_ms,
                });
                self.active = Some(session);
                self.last_tick_ms = Some(now_ms);
                self.suspended = false;
                self.streak = None;
                self.track_streak(label, now_ms, thresholds, &mut events);
            }
            (true, true) => {
                let anchor = self.last_tick_ms.unwrap_or(now_ms);
                let elapsed = if self.suspended {
                    self.suspended = false;
                    0
                } else {
                    now_ms.saturating_sub(anchor)
                };
                self.last_tick_ms = Some(anchor.max(now_ms));

                if let Some(session) = self.active.as_mut() {
                    session.accrue(label, elapsed);
                    session.sample(reading);
                }
                self.track_streak(label, now_ms, thresholds, &mut events);
                self.check_sedentary(thresholds, &mut events);
            }
            (true, false) => {
                self.streak = None;
                if let Some(session) = self.finish(now_ms) {
                    events.push(SessionEvent::Closed(session));
                }
            }
        }

        events
    }

    /// Close the open session with its duration frozen at the last tick.
    pub fn force_close(&mut self) -> Option<OccupancySession> {
        let end = self.last_tick_ms?;
        self.streak = None;
        self.finish(end)
    }

    /// Stop accruing time without closing the session.
    ///
    /// The next tick re-anchors; the gap is never credited.
    pub fn suspend(&mut self) {
        if self.active.is_some() {
            self.suspended = true;
        }
        self.streak = None;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn is_occupied(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&OccupancySession> {
        self.active.as_ref()
    }

    /// Seated seconds in the current session, 0 when unoccupied.
    pub fn elapsed_secs(&self) -> u64 {
        self.active.as_ref().map_or(0, |s| s.duration_ms / 1000)
    }

    pub fn today_alert_count(&self) -> u32 {
        self.today_alert_count
    }

    /// Reset the daily alert counter. Called by an external scheduler.
    pub fn new_day(&mut self) {
        self.today_alert_count = 0;
    }

    fn finish(&mut self, end_ms: u64) -> Option<OccupancySession> {
        let mut session = self.active.take()?;
        session.end_ms = Some(end_ms.max(session.start_ms));
        self.last_tick_ms = None;
        self.suspended = false;
        Some(session)
    }

    fn track_streak(
        &mut self,
        label: PostureLabel,
        now_ms: u64,
        thresholds: &ThresholdConfig,
        events: &mut Vec<SessionEvent>,
    ) {
        if !label.is_bad() {
            self.streak = None;
            return;
        }

        let streak = self.streak.get_or_insert(BadStreak {
            since_ms: now_ms,
            alerted: false,
        });
        let streak_ms = now_ms.saturating_sub(streak.since_ms);
        let delay_ms = thresholds.posture_alert_delay_secs as u64 * 1000;

        if streak.alerted || streak_ms < delay_ms {
            return;
        }
        streak.alerted = true;

        if let Some(session) = self.active.as_mut() {
            session.alert_count += 1;
            self.today_alert_count += 1;
            events.push(SessionEvent::PostureAlert {
                session_id: session.id,
                label,
                streak_ms,
            });
        }
    }

    fn check_sedentary(&mut self, thresholds: &ThresholdConfig, events: &mut Vec<SessionEvent>) {
        let limit_ms = thresholds.sitting_duration_max_minutes as u64 * 60_000;
        if limit_ms == 0 {
            return;
        }
        if let Some(session) = self.active.as_mut() {
            if !session.sedentary_reminded && session.duration_ms >= limit_ms {
                session.sedentary_reminded = true;
                events.push(SessionEvent::SedentaryReminder {
                    session_id: session.id,
                    seated_ms: session.duration_ms,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::posture::classify;

    const NORMAL: [u16; 4] = [200, 200, 220, 220];
    const LEAN_LEFT: [u16; 4] = [330, 170, 350, 150];
    const EMPTY: [u16; 4] = [0, 0, 0, 0];

    struct Harness {
        tracker: SessionTracker,
        thresholds: ThresholdConfig,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                tracker: SessionTracker::new(),
                thresholds: ThresholdConfig::default(),
            }
        }

        fn at(&mut self, secs: u64, pressures: [u16; 4]) -> Vec<SessionEvent> {
            self.at_with(secs, pressures, 25.0, 50.0)
        }

        fn at_with(
            &mut self,
            secs: u64,
            pressures: [u16; 4],
            temperature: f64,
            humidity: f64,
        ) -> Vec<SessionEvent> {
            let now = secs * 1000;
            let reading = SensorReading::new(pressures, temperature, humidity, now);
            let c = classify(&reading);
            self.tracker.tick(&c, &reading, now, &self.thresholds)
        }
    }

    fn alerts(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PostureAlert { .. }))
            .count()
    }

    #[test]
    fn test_session_opens_and_closes() {
        let mut h = Harness::new();
        assert!(h.at(0, EMPTY).is_empty());
        assert!(!h.tracker.is_occupied());

        let events = h.at(1, NORMAL);
        assert!(matches!(events[0], SessionEvent::Opened { start_ms: 1000, .. }));
        assert!(h.tracker.is_occupied());

        h.at(2, NORMAL);
        let events = h.at(3, EMPTY);
        match &events[0] {
            SessionEvent::Closed(session) => {
                assert_eq!(session.start_ms, 1000);
                assert_eq!(session.end_ms, Some(3000));
                assert_eq!(session.duration_ms, 1000);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!h.tracker.is_occupied());
    }

    #[test]
    fn test_session_accounting() {
        let mut h = Harness::new();
        h.at(0, NORMAL);
        h.at(1, NORMAL);
        h.at(2, NORMAL);
        h.at(3, LEAN_LEFT);

        let session = h.tracker.active().unwrap();
        assert_eq!(session.duration_ms, 3000);
        assert_eq!(session.posture_ms(PostureLabel::Normal), 2000);
        assert_eq!(session.posture_ms(PostureLabel::LeanLeft), 1000);
        assert_eq!(session.posture_ms(PostureLabel::Unseated), 0);
        assert_eq!(h.tracker.elapsed_secs(), 3);
    }

    #[test]
    fn test_duration_never_decreases() {
        let mut h = Harness::new();
        h.at(10, NORMAL);
        h.at(12, NORMAL);
        h.at(11, NORMAL);
        assert_eq!(h.tracker.active().unwrap().duration_ms, 2000);
        h.at(13, NORMAL);
        assert_eq!(h.tracker.active().unwrap().duration_ms, 3000);
    }

    #[test]
    fn test_climate_averages() {
        let mut h = Harness::new();
        h.at_with(0, NORMAL, 20.0, 40.0);
        h.at_with(1, NORMAL, 22.0, 50.0);
        h.at_with(2, NORMAL, 27.0, 60.0);

        let session = h.tracker.active().unwrap();
        assert!((session.avg_temperature() - 23.0).abs() < 1e-9);
        assert!((session.avg_humidity() - 50.0).abs() < 1e-9);
        assert_eq!(session.temperature.count(), 3);
    }

    #[test]
    fn test_alert_not_raised_before_delay() {
        let mut h = Harness::new();
        let mut raised = 0;
        for t in 0..=4 {
            raised += alerts(&h.at(t, LEAN_LEFT));
        }
        raised += alerts(&h.at(5, NORMAL));
        assert_eq!(raised, 0);
        assert_eq!(h.tracker.today_alert_count(), 0);
    }

    #[test]
    fn test_alert_raised_once_per_streak() {
        let mut h = Harness::new();
        let mut raised = 0;
        for t in 0..=5 {
            raised += alerts(&h.at(t, LEAN_LEFT));
        }
        assert_eq!(raised, 1);

        for t in 6..=20 {
            raised += alerts(&h.at(t, LEAN_LEFT));
        }
        assert_eq!(raised, 1);

        h.at(21, NORMAL);
        for t in 22..=27 {
            raised += alerts(&h.at(t, LEAN_LEFT));
        }
        assert_eq!(raised, 2);
        assert_eq!(h.tracker.active().unwrap().alert_count, 2);
        assert_eq!(h.tracker.today_alert_count(), 2);
    }

    #[test]
    fn test_bad_to_bad_keeps_streak() {
        let mut h = Harness::new();
        let cross_right = [100, 420, 80, 400];
        h.at(0, LEAN_LEFT);
        h.at(3, cross_right);
        let events = h.at(5, cross_right);
        assert_eq!(alerts(&events), 1);
        assert!(matches!(
            events[0],
            SessionEvent::PostureAlert {
                label: PostureLabel::CrossLegRight,
                streak_ms: 5000,
                ..
            }
        ));
    }

    #[test]
    fn test_today_counter_survives_sessions_until_new_day() {
        let mut h = Harness::new();
        for t in 0..=5 {
            h.at(t, LEAN_LEFT);
        }
        h.at(6, EMPTY);
        for t in 7..=12 {
            h.at(t, LEAN_LEFT);
        }
        assert_eq!(h.tracker.today_alert_count(), 2);
        assert_eq!(h.tracker.active().unwrap().alert_count, 1);

        h.tracker.new_day();
        assert_eq!(h.tracker.today_alert_count(), 0);
    }

    #[test]
    fn test_sedentary_reminder_fires_once() {
        let mut h = Harness::new();
        h.thresholds.sitting_duration_max_minutes = 1;

        let mut reminders = 0;
        for t in (0..=180).step_by(10) {
            reminders += h
                .at(t, NORMAL)
                .iter()
                .filter(|e| matches!(e, SessionEvent::SedentaryReminder { .. }))
                .count();
        }
        assert_eq!(reminders, 1);
    }

    #[test]
    fn test_force_close_freezes_at_last_tick() {
        let mut h = Harness::new();
        h.at(0, NORMAL);
        h.at(1, NORMAL);
        h.at(2, NORMAL);

        let session = h.tracker.force_close().unwrap();
        assert_eq!(session.duration_ms, 2000);
        assert_eq!(session.end_ms, Some(2000));
        assert!(!h.tracker.is_occupied());
        assert!(h.tracker.force_close().is_none());
    }

    #[test]
    fn test_suspend_skips_gap() {
        let mut h = Harness::new();
        h.at(0, NORMAL);
        h.at(1, NORMAL);
        h.tracker.suspend();
        assert!(h.tracker.is_suspended());

        // Reconnected a minute later.
        h.at(61, NORMAL);
        h.at(62, NORMAL);
        let session = h.tracker.active().unwrap();
        assert_eq!(session.duration_ms, 2000);
        assert!(!h.tracker.is_suspended());
    }
}
