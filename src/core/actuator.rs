//! Heating and fan advice with hysteresis, plus manual override.
//!
//! The policy only ever recommends a state. Whoever owns the hardware decides
//! whether to follow it; [`ActuatorControl`] models the common case where a
//! user toggle wins until it is handed back to automatic control.

use crate::config::ThresholdConfig;
use crate::protocol::codec::{fan_command, heating_command};
use crate::protocol::types::SensorReading;
use serde::{Deserialize, Serialize};

/// Recommended actuator state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorAdvice {
    pub heating_on: bool,
    pub fan_on: bool,
}

/// Recommend heating/fan state for `reading`.
///
/// Heating turns on below `temp_min` and off at or above `temp_max`; the fan
/// turns on above `humidity_max` and off below `humidity_min`. Inside either
/// band the previous recommendation is kept.
pub fn advise(
    reading: &SensorReading,
    thresholds: &ThresholdConfig,
    previous: ActuatorAdvice,
) -> ActuatorAdvice {
    let heating_on = if reading.temperature < thresholds.temp_min {
        true
    } else if reading.temperature >= thresholds.temp_max {
        false
    } else {
        previous.heating_on
    };

    let fan_on = if reading.humidity > thresholds.humidity_max {
        true
    } else if reading.humidity < thresholds.humidity_min {
        false
    } else {
        previous.fan_on
    };

    ActuatorAdvice { heating_on, fan_on }
}

/// Who decides an actuator's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "on", rename_all = "snake_case")]
pub enum ActuatorMode {
    /// Follow the policy
    #[default]
    Auto,
    /// User override, held until set back to `Auto`
    Manual(bool),
}

impl ActuatorMode {
    fn resolve(self, advised: bool) -> bool {
        match self {
            ActuatorMode::Auto => advised,
            ActuatorMode::Manual(on) => on,
        }
    }
}

/// Advice, override modes and the state last sent to the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActuatorControl {
    pub heating_mode: ActuatorMode,
    pub fan_mode: ActuatorMode,
    advice: ActuatorAdvice,
    /// Last state commanded; `None` until something has been sent
    sent: Option<ActuatorAdvice>,
}

impl ActuatorControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest policy recommendation.
    pub fn advice(&self) -> ActuatorAdvice {
        self.advice
    }

    /// State after applying any manual override.
    pub fn effective(&self) -> ActuatorAdvice {
        ActuatorAdvice {
            heating_on: self.heating_mode.resolve(self.advice.heating_on),
            fan_on: self.fan_mode.resolve(self.advice.fan_on),
        }
    }

    /// Run the policy for a new reading and return frames for any actuator
    /// whose effective state changed.
    pub fn update(&mut self, reading: &SensorReading, thresholds: &ThresholdConfig) -> Vec<Vec<u8>> {
        self.advice = advise(reading, thresholds, self.advice);
        self.pending_commands()
    }

    pub fn set_heating_mode(&mut self, mode: ActuatorMode) -> Vec<Vec<u8>> {
        self.heating_mode = mode;
        self.pending_commands()
    }

    pub fn set_fan_mode(&mut self, mode: ActuatorMode) -> Vec<Vec<u8>> {
        self.fan_mode = mode;
        self.pending_commands()
    }

    /// Forget what was sent so the next update re-sends the full state,
    /// e.g. after the device reconnects.
    pub fn resync(&mut self) {
        self.sent = None;
    }

    fn pending_commands(&mut self) -> Vec<Vec<u8>> {
        let target = self.effective();
        let mut frames = Vec::new();

        let heating_changed = self.sent.map_or(true, |s| s.heating_on != target.heating_on);
        let fan_changed = self.sent.map_or(true, |s| s.fan_on != target.fan_on);
        if heating_changed {
            frames.push(heating_command(target.heating_on));
        }
        if fan_changed {
            frames.push(fan_command(target.fan_on));
        }

        self.sent = Some(target);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Command;

    fn climate(temperature: f64, humidity: f64) -> SensorReading {
        SensorReading::new([0; 4], temperature, humidity, 0)
    }

    #[test]
    fn test_heating_hysteresis() {
        let thresholds = ThresholdConfig::default();
        let temps = [25.0, 20.0, 21.0, 23.0, 29.0, 27.0, 23.0];
        let expected = [false, true, true, true, false, false, false];

        let mut advice = ActuatorAdvice::default();
        for (t, want) in temps.iter().zip(expected) {
            advice = advise(&climate(*t, 60.0), &thresholds, advice);
            assert_eq!(advice.heating_on, want, "temperature {t}");
        }
    }

    #[test]
    fn test_heating_turns_off_exactly_at_max() {
        let thresholds = ThresholdConfig::default();
        let on = ActuatorAdvice {
            heating_on: true,
            fan_on: false,
        };
        assert!(!advise(&climate(28.0, 60.0), &thresholds, on).heating_on);
        assert!(advise(&climate(27.9, 60.0), &thresholds, on).heating_on);
        assert!(!advise(&climate(22.0, 60.0), &thresholds, ActuatorAdvice::default()).heating_on);
    }

    #[test]
    fn test_fan_hysteresis() {
        let thresholds = ThresholdConfig::default();
        let humidity = [60.0, 71.0, 65.0, 55.0, 54.0, 60.0, 70.0];
        let expected = [false, true, true, true, false, false, false];

        let mut advice = ActuatorAdvice::default();
        for (h, want) in humidity.iter().zip(expected) {
            advice = advise(&climate(25.0, *h), &thresholds, advice);
            assert_eq!(advice.fan_on, want, "humidity {h}");
        }
    }

    #[test]
    fn test_manual_override_wins_until_auto() {
        let thresholds = ThresholdConfig::default();
        let mut control = ActuatorControl::new();
        control.update(&climate(18.0, 60.0), &thresholds);
        assert!(control.effective().heating_on);

        control.set_heating_mode(ActuatorMode::Manual(false));
        control.update(&climate(17.0, 60.0), &thresholds);
        assert!(control.advice().heating_on);
        assert!(!control.effective().heating_on);

        control.set_heating_mode(ActuatorMode::Auto);
        assert!(control.effective().heating_on);
    }

    #[test]
    fn test_commands_only_on_change() {
        let thresholds = ThresholdConfig::default();
        let mut control = ActuatorControl::new();

        // First update sends the full state.
        let frames = control.update(&climate(25.0, 60.0), &thresholds);
        assert_eq!(frames, vec![heating_command(false), fan_command(false)]);

        assert!(control.update(&climate(24.0, 62.0), &thresholds).is_empty());

        let frames = control.update(&climate(20.0, 62.0), &thresholds);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][1], Command::HeatingOn.code());

        let frames = control.set_fan_mode(ActuatorMode::Manual(true));
        assert_eq!(frames, vec![fan_command(true)]);
        assert!(control.set_fan_mode(ActuatorMode::Manual(true)).is_empty());

        control.resync();
        assert_eq!(control.update(&climate(20.0, 62.0), &thresholds).len(), 2);
    }
}
