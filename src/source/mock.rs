//! Synthetic cushion for running without hardware.
//!
//! The generator walks a 200-step posture cycle: upright, a sideways shift,
//! a crossed right leg, a forward lean, upright again, and a stretch with
//! nobody on the seat. Each sample gets random jitter on every channel.

use crate::protocol::codec::{encode, payload_from_reading};
use crate::protocol::stream::FrameReader;
use crate::protocol::types::{Command, SensorReading};
use crate::source::{route_frame, LinkEvent, ReadingSource, SourceError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CYCLE_LEN: u16 = 200;

/// Phase at which the occupant stands up.
const STAND_UP_PHASE: u16 = 150;

/// The occupant sits back down once the phase passes this.
const SIT_DOWN_AFTER: u16 = 180;

/// Emit a device status frame every this many polls.
const STATUS_EVERY: u64 = 30;

/// Posture cycle state and jitter source.
#[derive(Debug)]
pub struct MockCushion {
    phase: u16,
    seated: bool,
    rng: StdRng,
}

impl MockCushion {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            phase: 0,
            seated: true,
            rng: seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64),
        }
    }

    pub fn phase(&self) -> u16 {
        self.phase
    }

    /// Advance one step and produce a reading stamped `now_ms`.
    pub fn next_reading(&mut self, now_ms: u64) -> SensorReading {
        self.phase = (self.phase + 1) % CYCLE_LEN;

        if !self.seated && self.phase > SIT_DOWN_AFTER {
            self.seated = true;
        }
        if self.seated && self.phase == STAND_UP_PHASE {
            self.seated = false;
        }

        let pressures = if !self.seated {
            [0; 4]
        } else if self.phase < 50 {
            self.jitter([(180, 40), (180, 40), (200, 40), (200, 40)])
        } else if self.phase < 80 {
            self.jitter([(300, 50), (80, 30), (320, 50), (60, 30)])
        } else if self.phase < 110 {
            self.jitter([(100, 30), (400, 60), (80, 20), (350, 60)])
        } else if self.phase < 140 {
            self.jitter([(320, 40), (310, 40), (80, 30), (70, 30)])
        } else {
            self.jitter([(190, 30), (185, 30), (210, 30), (205, 30)])
        };

        let temperature = 24.0 + self.rng.gen_range(0.0..4.0);
        let humidity = 50.0 + self.rng.gen_range(0.0..20.0);
        SensorReading::new(pressures, temperature, humidity, now_ms)
    }

    fn jitter(&mut self, channels: [(u16, u16); 4]) -> [u16; 4] {
        channels.map(|(base, spread)| base + self.rng.gen_range(0..=spread))
    }
}

/// Mock device speaking the real wire format.
///
/// Every poll encodes one reading into a frame and feeds it back through the
/// deframer, so the whole decode path runs even without hardware.
pub struct MockSource {
    cushion: MockCushion,
    reader: FrameReader,
    polls: u64,
    battery: u8,
}

impl MockSource {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            cushion: MockCushion::new(seed),
            reader: FrameReader::new(),
            polls: 0,
            battery: 100,
        }
    }

    fn frames(&mut self, now_ms: u64) -> Vec<u8> {
        let reading = self.cushion.next_reading(now_ms);
        let mut bytes = encode(Command::SensorData, &payload_from_reading(&reading))
            .unwrap_or_default();

        if self.polls % STATUS_EVERY == 0 {
            if let Ok(status) = encode(Command::DeviceStatus, &[self.battery, 4]) {
                bytes.extend_from_slice(&status);
            }
            self.battery = self.battery.saturating_sub(1).max(5);
        }
        bytes
    }
}

impl ReadingSource for MockSource {
    fn poll(&mut self, now_ms: u64) -> Result<Vec<LinkEvent>, SourceError> {
        let bytes = self.frames(now_ms);
        self.polls += 1;

        let mut events = Vec::new();
        for result in self.reader.push(&bytes) {
            match result {
                Ok(frame) => events.extend(route_frame(&frame, now_ms)),
                Err(e) => events.push(LinkEvent::Dropped(e)),
            }
        }
        Ok(events)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
