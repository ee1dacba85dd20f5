//! # Configuration Management
//!
//! Loads runtime settings from `sky-config.toml`: the fallback observer
//! location for machines without sensors, track generation parameters,
//! sensor timeouts, and chart geometry. A missing or malformed file falls
//! back to built-in defaults so the binary always starts.

use std::fs;
use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::Duration;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::orchestrator::OrchestratorOptions;

/// Application configuration loaded from sky-config.toml
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Observer location used by the fixed sensor gateway
    pub observer: ObserverConfig,
    /// Track generation parameters
    pub track: TrackConfig,
    /// Sensor acquisition tuning
    pub sensors: SensorConfig,
    /// Chart geometry
    pub display: DisplayConfig,
}

/// Fallback observer location and heading
#[derive(Debug, Deserialize, Serialize)]
pub struct ObserverConfig {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Human-readable place name for reference
    pub name: String,
    /// Fixed compass heading reported by the demo gateway
    pub heading_deg: f64,
}

/// Track generation parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct TrackConfig {
    /// Track length in hours
    pub duration_hours: f64,
    /// Sample spacing in minutes
    pub step_minutes: u32,
}

/// Sensor acquisition tuning
#[derive(Debug, Deserialize, Serialize)]
pub struct SensorConfig {
    /// Location acquisition budget in milliseconds
    pub location_timeout_ms: u64,
    /// How long a cached location counts as fresh, in minutes
    pub location_max_age_minutes: i64,
}

/// Chart geometry for pixel render targets
#[derive(Debug, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// Chart width in pixels
    pub width: i32,
    /// Chart height in pixels
    pub height: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            observer: ObserverConfig {
                latitude: 37.7749,
                longitude: -122.4194,
                name: "San Francisco, CA".to_string(),
                heading_deg: 0.0,
            },
            track: TrackConfig {
                duration_hours: 24.0,
                step_minutes: 5,
            },
            sensors: SensorConfig {
                location_timeout_ms: 10_000,
                location_max_age_minutes: 5,
            },
            display: DisplayConfig {
                width: 400,
                height: 300,
            },
        }
    }
}

impl Config {
    /// Load configuration from sky-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path("sky-config.toml")
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!("loaded configuration for observer: {}", config.observer.name);
                    config
                }
                Err(e) => {
                    warn!("invalid config file format: {}", e);
                    warn!("using default configuration (San Francisco, CA)");
                    Self::default()
                }
            },
            Err(_) => {
                info!("no config file found, using default configuration (San Francisco, CA)");
                Self::default()
            }
        }
    }

    /// Save current configuration to sky-config.toml
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write("sky-config.toml", contents)?;
        info!("configuration saved to sky-config.toml");
        Ok(())
    }
}

impl From<&Config> for OrchestratorOptions {
    fn from(config: &Config) -> Self {
        OrchestratorOptions {
            location_timeout: StdDuration::from_millis(config.sensors.location_timeout_ms),
            location_max_age: Duration::minutes(config.sensors.location_max_age_minutes),
            track_duration_hours: config.track.duration_hours,
            track_step_minutes: config.track.step_minutes,
            ..OrchestratorOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.observer.name, "San Francisco, CA");
        assert_eq!(config.observer.latitude, 37.7749);
        assert_eq!(config.track.duration_hours, 24.0);
        assert_eq!(config.track.step_minutes, 5);
        assert_eq!(config.sensors.location_timeout_ms, 10_000);
        assert_eq!(config.sensors.location_max_age_minutes, 5);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.observer.name, parsed.observer.name);
        assert_eq!(config.observer.latitude, parsed.observer.latitude);
        assert_eq!(config.track.step_minutes, parsed.track.step_minutes);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config.observer.name, "San Francisco, CA");
    }

    #[test]
    fn test_load_custom_file() {
        let custom = r#"
[observer]
latitude = 48.8566
longitude = 2.3522
name = "Paris, FR"
heading_deg = 180.0

[track]
duration_hours = 12.0
step_minutes = 10

[sensors]
location_timeout_ms = 5000
location_max_age_minutes = 2

[display]
width = 640
height = 384
"#;
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), custom).unwrap();

        let config = Config::load_from_path(file.path());
        assert_eq!(config.observer.name, "Paris, FR");
        assert_eq!(config.observer.latitude, 48.8566);
        assert_eq!(config.track.step_minutes, 10);
        assert_eq!(config.display.width, 640);
    }

    #[test]
    fn test_malformed_file_falls_back_to_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "not valid toml [").unwrap();

        let config = Config::load_from_path(file.path());
        assert_eq!(config.observer.name, "San Francisco, CA");
    }

    #[test]
    fn test_orchestrator_options_from_config() {
        let config = Config::default();
        let options = OrchestratorOptions::from(&config);
        assert_eq!(options.location_timeout, StdDuration::from_secs(10));
        assert_eq!(options.location_max_age, Duration::minutes(5));
        assert_eq!(options.track_duration_hours, 24.0);
        assert_eq!(options.track_step_minutes, 5);
    }
}
