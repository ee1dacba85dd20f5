//! # Sky Tracker Core Library
//!
//! This library computes apparent sun and moon positions for a place and
//! time, and coordinates sensors, time navigation, and a rendering surface
//! around that computation.
//!
//! ## Architecture
//!
//! - [`ephemeris`]: pure numerical engine mapping (latitude, longitude,
//!   timestamp) to horizontal coordinates, horizon events, and moon
//!   phase/illumination/distance. No shared state, fully deterministic.
//! - [`sensors`]: the `SensorGateway` contract for location, compass
//!   heading, and camera streams, plus an offline implementation for
//!   development machines without device sensors.
//! - [`orchestrator`]: the state machine that sequences sensor acquisition,
//!   invokes the engine, and drives a render target, with time travel and
//!   2D/AR switching.
//! - [`render`]: the `RenderingPort` contract and two concrete renderers
//!   (ASCII terminal, `embedded-graphics` pixel chart).
//! - [`config`]: TOML configuration with built-in defaults.
//!
//! ## Data Flow
//!
//! 1. UI action → orchestrator calls the sensor gateway
//! 2. On success the orchestrator invokes the ephemeris engine
//! 3. Results are pushed to the rendering port
//! 4. An [`orchestrator::AppStatus`] snapshot is broadcast to observers
//!
//! The types in this root module are the vocabulary shared by every layer:
//! immutable, validated at construction, and replaced (never mutated) as
//! the application advances.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Module declarations
pub mod config;
pub mod ephemeris;
pub mod orchestrator;
pub mod render;
pub mod sensors;

/// Errors produced by the validating constructors in this module.
///
/// Everything downstream of these constructors may assume its inputs are
/// in range; there is no re-validation inside the engine or orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Latitude outside [-90, 90] degrees
    #[error("latitude {0} is outside [-90, 90] degrees")]
    Latitude(f64),

    /// Longitude outside [-180, 180] degrees
    #[error("longitude {0} is outside [-180, 180] degrees")]
    Longitude(f64),

    /// Track duration outside (0, 168] hours
    #[error("track duration {0} hours is outside (0, 168]")]
    Duration(f64),

    /// Track step outside [1, 1440] minutes
    #[error("track step {0} minutes is outside [1, 1440]")]
    Step(u32),
}

/// A geographic fix produced by the sensor gateway.
///
/// Instances are immutable once produced: a later acquisition supersedes
/// an earlier one, it never mutates it. The orchestrator caches the most
/// recent fix and considers it fresh for a configurable window (5 minutes
/// by default).
///
/// # Example
/// ```
/// use chrono::Utc;
/// use sky_tracker_lib::LocationCoordinate;
///
/// let here = LocationCoordinate::new(37.7749, -122.4194, Utc::now()).unwrap();
/// assert!(here.is_fresh(Utc::now(), chrono::Duration::minutes(5)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationCoordinate {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, [-180, 180]
    pub longitude: f64,
    /// Altitude above the WGS-84 ellipsoid in meters, if the sensor reported one
    pub altitude_m: Option<f64>,
    /// Horizontal accuracy in meters, if the sensor reported one
    pub accuracy_m: Option<f64>,
    /// When the fix was acquired
    pub acquired_at: DateTime<Utc>,
}

impl LocationCoordinate {
    /// Validate and build a fix without altitude or accuracy metadata.
    pub fn new(
        latitude: f64,
        longitude: f64,
        acquired_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
            altitude_m: None,
            accuracy_m: None,
            acquired_at,
        })
    }

    /// Attach sensor-reported altitude and accuracy to a validated fix.
    pub fn with_metadata(mut self, altitude_m: Option<f64>, accuracy_m: Option<f64>) -> Self {
        self.altitude_m = altitude_m;
        self.accuracy_m = accuracy_m;
        self
    }

    /// Age of this fix relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.acquired_at
    }

    /// True if the fix is younger than `max_age`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) < max_age
    }
}

/// Parameters for generating a sun track: an ordered, time-ascending run
/// of [`SunSample`] values starting at `start`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackParameters {
    /// Observer location
    pub location: LocationCoordinate,
    /// First sample timestamp
    pub start: DateTime<Utc>,
    /// Track length in hours, (0, 168]
    pub duration_hours: f64,
    /// Sample spacing in minutes, [1, 1440]
    pub step_minutes: u32,
}

impl TrackParameters {
    /// Validate and build track parameters.
    pub fn new(
        location: LocationCoordinate,
        start: DateTime<Utc>,
        duration_hours: f64,
        step_minutes: u32,
    ) -> Result<Self, ValidationError> {
        if !duration_hours.is_finite() || duration_hours <= 0.0 || duration_hours > 168.0 {
            return Err(ValidationError::Duration(duration_hours));
        }
        if !(1..=1440).contains(&step_minutes) {
            return Err(ValidationError::Step(step_minutes));
        }
        Ok(Self {
            location,
            start,
            duration_hours,
            step_minutes,
        })
    }

    /// Number of samples the track will contain, both endpoints included.
    pub fn sample_count(&self) -> usize {
        (self.duration_hours * 60.0 / self.step_minutes as f64).floor() as usize + 1
    }
}

/// Apparent sun position at one instant.
///
/// `mass` is a relative visual size scalar derived from the Earth-Sun
/// distance, normalized so the mean distance gives 1.0; renderers use it
/// to enlarge the sun near perihelion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SunSample {
    /// Sample timestamp
    pub time: DateTime<Utc>,
    /// Compass bearing in degrees, [0, 360), 0 = North, clockwise
    pub azimuth_deg: f64,
    /// Angle above (+) or below (-) the local horizon in degrees
    pub elevation_deg: f64,
    /// Relative apparent size, mean Earth-Sun distance => 1.0
    pub mass: f64,
}

/// Apparent moon position, phase, and distance at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoonSample {
    /// Sample timestamp
    pub time: DateTime<Utc>,
    /// Compass bearing in degrees, [0, 360), 0 = North, clockwise
    pub azimuth_deg: f64,
    /// Angle above (+) or below (-) the local horizon in degrees
    pub elevation_deg: f64,
    /// Normalized mean elongation, [0, 1): 0 = new, 0.5 = full
    pub phase: f64,
    /// Illuminated fraction of the disk, [0, 1]
    pub illumination: f64,
    /// Relative apparent size, mean Earth-Moon distance => 1.0
    pub mass: f64,
    /// Geocentric distance in kilometers
    pub distance_km: f64,
}

/// Paired sun and moon samples for one instant: the atomic unit exchanged
/// between the engine and the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CelestialSnapshot {
    /// Snapshot timestamp (shared by both samples)
    pub time: DateTime<Utc>,
    pub sun: SunSample,
    pub moon: MoonSample,
}
