//! Configuration for the cushion link.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the link and engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interval between engine ticks
    #[serde(with = "duration_ms_serde")]
    pub tick_interval: Duration,

    /// Where sensor readings come from
    pub source: SourceKind,

    /// Path for history and link statistics
    pub data_path: PathBuf,

    /// Path for exported history files
    pub export_path: PathBuf,

    /// IANA time zone used for day boundaries and telemetry labels
    pub timezone: String,

    /// What happens to an open session when the transport drops
    pub disconnect_policy: DisconnectPolicy,

    /// Minimum spacing between telemetry history points (in seconds)
    pub telemetry_interval_secs: u64,

    /// User thresholds for actuators and alerts
    pub thresholds: ThresholdConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cushion-link");

        Self {
            tick_interval: Duration::from_millis(500),
            source: SourceKind::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
            timezone: "UTC".to_string(),
            disconnect_policy: DisconnectPolicy::default(),
            telemetry_interval_secs: 60,
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.thresholds.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cushion-link")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Parsed time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_path.join("history.json")
    }

    pub fn link_log_path(&self) -> PathBuf {
        self.data_path.join("link_stats.json")
    }
}

/// Where readings come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Synthetic cushion for running without hardware
    Mock { seed: Option<u64> },
    /// Raw frame bytes piped on standard input
    Stdin,
    /// Raw frame bytes replayed from a capture file
    Replay { path: PathBuf },
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Mock { seed: None }
    }
}

impl SourceKind {
    /// Parse a source name given on the command line.
    pub fn from_arg(name: &str, replay: Option<PathBuf>, seed: Option<u64>) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "mock" => Ok(SourceKind::Mock { seed }),
            "stdin" => Ok(SourceKind::Stdin),
            "replay" => replay
                .map(|path| SourceKind::Replay { path })
                .ok_or_else(|| ConfigError::UnknownSource("replay needs a capture file".into())),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }
}

/// Handling of an open session when the transport goes away.
///
/// `Pause` only pays off for hosts that bring the link back: reattach the
/// stream with `StreamSource::reattach` and call `CushionEngine::reconnect`.
/// The `cushion run` loop exits when its source closes, so there a paused
/// session is closed by the shutdown that follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Close and archive the session, duration frozen at the last tick
    #[default]
    Close,
    /// Keep the session open without accruing time until data resumes
    Pause,
}

/// User thresholds for climate control and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Heating is recommended below this temperature (°C)
    pub temp_min: f64,
    /// Heating is switched off at or above this temperature (°C)
    pub temp_max: f64,
    /// Fan is recommended above this humidity (%)
    pub humidity_max: f64,
    /// Fan is switched off below this humidity (%)
    pub humidity_min: f64,
    /// Continuous sitting before a sedentary reminder (minutes)
    pub sitting_duration_max_minutes: u32,
    /// How long a bad posture must last before an alert (seconds)
    pub posture_alert_delay_secs: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temp_min: 22.0,
            temp_max: 28.0,
            humidity_max: 70.0,
            humidity_min: 55.0,
            sitting_duration_max_minutes: 45,
            posture_alert_delay_secs: 5,
        }
    }
}

impl ThresholdConfig {
    /// Check that each hysteresis band is well formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.temp_min < self.temp_max) {
            return Err(ConfigError::InvalidThresholds(format!(
                "temp_min ({}) must be below temp_max ({})",
                self.temp_min, self.temp_max
            )));
        }
        if !(self.humidity_min < self.humidity_max) {
            return Err(ConfigError::InvalidThresholds(format!(
                "humidity_min ({}) must be below humidity_max ({})",
                self.humidity_min, self.humidity_max
            )));
        }
        if self.posture_alert_delay_secs == 0 {
            return Err(ConfigError::InvalidThresholds(
                "posture_alert_delay_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a partial update, returning the new validated snapshot.
    ///
    /// `self` is left untouched if the result would be invalid.
    pub fn apply(&self, update: &ThresholdUpdate) -> Result<ThresholdConfig, ConfigError> {
        let next = ThresholdConfig {
            temp_min: update.temp_min.unwrap_or(self.temp_min),
            temp_max: update.temp_max.unwrap_or(self.temp_max),
            humidity_max: update.humidity_max.unwrap_or(self.humidity_max),
            humidity_min: update.humidity_min.unwrap_or(self.humidity_min),
            sitting_duration_max_minutes: update
                .sitting_duration_max_minutes
                .unwrap_or(self.sitting_duration_max_minutes),
            posture_alert_delay_secs: update
                .posture_alert_delay_secs
                .unwrap_or(self.posture_alert_delay_secs),
        };
        next.validate()?;
        Ok(next)
    }
}

/// Partial threshold change from a settings surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub humidity_max: Option<f64>,
    pub humidity_min: Option<f64>,
    pub sitting_duration_max_minutes: Option<u32>,
    pub posture_alert_delay_secs: Option<u32>,
}

impl ThresholdUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ThresholdUpdate::default()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidThresholds(String),
    UnknownTimezone(String),
    UnknownSource(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidThresholds(e) => write!(f, "Invalid thresholds: {e}"),
            ConfigError::UnknownTimezone(tz) => write!(f, "Unknown time zone: {tz}"),
            ConfigError::UnknownSource(s) => write!(f, "Unknown source: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
