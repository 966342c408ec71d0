//! Configuration management for fieldnav.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::venue::VenueTable;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "fieldnav";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FIELDNAV_`, sections split on `__`)
/// 2. TOML config file at `~/.config/fieldnav/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Navigation thresholds.
    pub navigation: NavigationConfig,
    /// Dispatch service configuration.
    pub service: ServiceConfig,
    /// Location tracking configuration.
    pub tracking: TrackingConfig,
    /// Voice announcement configuration.
    pub voice: VoiceConfig,
    /// Venue defaults.
    pub venue: VenueConfig,
}

/// Navigation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Radius around the target that counts as arrival, in meters.
    pub arrival_radius_m: f64,
    /// Walking speed used for ETA estimates.
    pub walking_speed_kmh: f64,
    /// Radius around the next step's waypoint that advances the step cursor.
    pub step_advance_radius_m: f64,
}

/// Dispatch service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the dispatch service.
    pub base_url: String,
    /// Timeout for a single request.
    pub request_timeout_secs: u64,
    /// Interval between incident feed refreshes.
    pub incident_poll_interval_secs: u64,
    /// Sender name attached to outgoing messages.
    pub responder_name: String,
}

/// Location tracking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Start tracking as soon as a route is installed.
    pub enabled_on_start: bool,
    /// Ask the sensor for its most accurate fixes.
    pub high_accuracy: bool,
    /// Maximum time to wait for a fix before reporting a timeout.
    pub timeout_ms: u64,
    /// Maximum age of a cached fix the sensor may return.
    pub maximum_age_ms: u64,
    /// Interval between fixes from the route replay sensor.
    pub replay_interval_ms: u64,
    /// Distance the route replay sensor advances per fix, in meters.
    pub replay_step_m: f64,
}

/// Voice announcement configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Enable voice when a route with spoken steps is installed.
    pub enabled_on_start: bool,
    /// Speech rate (1.0 is normal).
    pub rate: f32,
    /// Speech pitch (1.0 is normal).
    pub pitch: f32,
    /// Speech volume between 0 and 1.
    pub volume: f32,
    /// Speaking speed of the bundled speech engine.
    pub words_per_minute: u32,
}

/// Venue defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    /// Where the responder starts.
    pub origin: String,
    /// Locations the route should steer clear of.
    pub avoid: Vec<String>,
    /// Radius of each avoid-zone circle.
    pub avoid_radius_m: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            arrival_radius_m: 20.0,
            walking_speed_kmh: crate::geo::DEFAULT_WALKING_SPEED_KMH,
            step_advance_radius_m: 30.0,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 10,
            incident_poll_interval_secs: 5,
            responder_name: "Responder".to_string(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled_on_start: true,
            high_accuracy: true,
            timeout_ms: 10_000,
            maximum_age_ms: 5_000,
            replay_interval_ms: 1_000,
            replay_step_m: 25.0,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled_on_start: true,
            rate: 0.9, // Slightly slower for clarity
            pitch: 1.0,
            volume: 1.0,
            words_per_minute: 160,
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            origin: crate::venue::DEFAULT_LOCATION.to_string(),
            avoid: vec!["Food Court".to_string()],
            avoid_radius_m: 200.0,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("FIELDNAV_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let nav = &self.navigation;
        for (name, value) in [
            ("arrival_radius_m", nav.arrival_radius_m),
            ("walking_speed_kmh", nav.walking_speed_kmh),
            ("step_advance_radius_m", nav.step_advance_radius_m),
            ("replay_step_m", self.tracking.replay_step_m),
            ("avoid_radius_m", self.venue.avoid_radius_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::config(format!("{name} must be greater than 0")));
            }
        }

        if self.service.base_url.trim().is_empty() {
            return Err(Error::config("base_url cannot be empty"));
        }
        if self.service.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be greater than 0"));
        }
        if self.service.incident_poll_interval_secs == 0 {
            return Err(Error::config(
                "incident_poll_interval_secs must be greater than 0",
            ));
        }
        if self.tracking.replay_interval_ms == 0 {
            return Err(Error::config("replay_interval_ms must be greater than 0"));
        }

        if !(0.1..=2.0).contains(&self.voice.rate) {
            return Err(Error::config(format!(
                "voice rate ({}) must be between 0.1 and 2.0",
                self.voice.rate
            )));
        }
        if !(0.0..=2.0).contains(&self.voice.pitch) {
            return Err(Error::config(format!(
                "voice pitch ({}) must be between 0 and 2",
                self.voice.pitch
            )));
        }
        if !(0.0..=1.0).contains(&self.voice.volume) {
            return Err(Error::config(format!(
                "voice volume ({}) must be between 0 and 1",
                self.voice.volume
            )));
        }
        if self.voice.words_per_minute == 0 {
            return Err(Error::config("words_per_minute must be greater than 0"));
        }

        let venue = VenueTable::builtin()?;
        if venue.get(&self.venue.origin).is_none() {
            return Err(Error::config(format!(
                "unknown origin location: {}",
                self.venue.origin
            )));
        }
        for name in &self.venue.avoid {
            if venue.get(name).is_none() {
                return Err(Error::config(format!("unknown avoid location: {name}")));
            }
        }

        Ok(())
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.service.request_timeout_secs)
    }

    /// Get the incident poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.service.incident_poll_interval_secs)
    }

    /// Get the replay interval as a Duration.
    #[must_use]
    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.tracking.replay_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.navigation.arrival_radius_m, 20.0);
        assert_eq!(config.navigation.walking_speed_kmh, 5.0);
        assert_eq!(config.service.incident_poll_interval_secs, 5);
        assert!(config.tracking.enabled_on_start);
        assert!(config.voice.enabled_on_start);
        assert_eq!(config.venue.origin, "Entrance");
    }

    #[test]
    fn test_default_tracking_config() {
        let tracking = TrackingConfig::default();

        assert!(tracking.high_accuracy);
        assert_eq!(tracking.timeout_ms, 10_000);
        assert_eq!(tracking.maximum_age_ms, 5_000);
    }

    #[test]
    fn test_default_voice_config() {
        let voice = VoiceConfig::default();

        assert!((voice.rate - 0.9).abs() < f32::EPSILON);
        assert!((voice.pitch - 1.0).abs() < f32::EPSILON);
        assert!((voice.volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_arrival_radius() {
        let mut config = Config::default();
        config.navigation.arrival_radius_m = 0.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("arrival_radius_m"));
    }

    #[test]
    fn test_validate_nan_walking_speed() {
        let mut config = Config::default();
        config.navigation.walking_speed_kmh = f64::NAN;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("walking_speed_kmh"));
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.service.incident_poll_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("incident_poll_interval_secs"));
    }

    #[test]
    fn test_validate_empty_base_url() {
        let mut config = Config::default();
        config.service.base_url = "  ".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_volume_range() {
        let mut config = Config::default();
        config.voice.volume = 1.5;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("volume"));
    }

    #[test]
    fn test_validate_unknown_origin() {
        let mut config = Config::default();
        config.venue.origin = "Moon Base".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Moon Base"));
    }

    #[test]
    fn test_validate_unknown_avoid() {
        let mut config = Config::default();
        config.venue.avoid.push("Swamp".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Swamp"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.replay_interval(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("fieldnav"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[navigation]\narrival_radius_m = 15.0\n\n[venue]\norigin = \"Parking\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.navigation.arrival_radius_m, 15.0);
        assert_eq!(config.navigation.walking_speed_kmh, 5.0);
        assert_eq!(config.venue.origin, "Parking");
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[navigation]\nwalking_speed_kmh = -1.0\n").unwrap();

        let result = Config::load_from(Some(path));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("arrival_radius_m"));
        assert!(json.contains("base_url"));
    }

    #[test]
    fn test_navigation_config_deserialize() {
        let json = r#"{"arrival_radius_m": 10.0}"#;
        let nav: NavigationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(nav.arrival_radius_m, 10.0);
        assert_eq!(nav.step_advance_radius_m, 30.0);
    }
}
