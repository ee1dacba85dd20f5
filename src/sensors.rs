//! # Sensor Gateway Contract
//!
//! This module defines the boundary between the orchestrator and the
//! failure-prone, permission-gated device sensors: geolocation, compass
//! heading, device orientation, and camera streams.
//!
//! The orchestrator never talks to a platform API directly; it is handed
//! a [`SensorGateway`] implementation at construction. That keeps the
//! state machine testable with stub gateways and keeps platform-specific
//! permission flows (such as the iOS device-orientation prompt) behind
//! the capability-negotiation methods instead of special-cased in the
//! orchestrator.
//!
//! ## Failure Model
//!
//! Every acquisition can fail, and the failure kind matters: the UI shows
//! different copy for a declined permission than for a timeout. The
//! [`SensorError`] discriminants carry that distinction through to the
//! orchestrator. Heading lookups are the one exception: they are
//! best-effort, and callers degrade to a default heading rather than
//! failing the whole flow.
//!
//! ## Camera Ownership
//!
//! A [`StreamHandle`] is a single-owner handle: whoever holds it stops
//! it. The orchestrator holds at most one at a time and stops it on every
//! exit path.

use std::time::Duration;

use chrono::Utc;
use log::debug;
use thiserror::Error;

use crate::{LocationCoordinate, ValidationError};

/// Sensor-layer failures, typed so the orchestrator can map each
/// discriminant to specific user-facing copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The user declined access to the capability
    #[error("permission declined")]
    Permission,

    /// The sensor did not respond within the allotted time
    #[error("sensor timed out after {0:?}")]
    Timeout(Duration),

    /// The capability is absent or blocked on this device
    #[error("capability unavailable")]
    Unavailable,
}

/// Which way a camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Front camera, toward the user
    User,
    /// Rear camera, away from the user
    Environment,
}

impl FacingMode {
    /// The other facing direction.
    pub fn opposite(self) -> Self {
        match self {
            Self::User => Self::Environment,
            Self::Environment => Self::User,
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Environment => write!(f, "environment"),
        }
    }
}

/// Heading sources in the order the gateway should try them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingSource {
    /// Absolute orientation events (magnetometer-fused)
    AbsoluteOrientation,
    /// Platform compass heading
    CompassHeading,
    /// Relative orientation events, least trustworthy
    RelativeOrientation,
}

/// Requested camera stream properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            width: 1280,
            height: 720,
        }
    }
}

/// An exclusively-owned, stoppable camera stream.
///
/// Stopping must be idempotent; `is_active` reports false after `stop`.
pub trait StreamHandle {
    /// Which way the stream's camera faces
    fn facing(&self) -> FacingMode;
    /// True until the stream is stopped
    fn is_active(&self) -> bool;
    /// Stop all tracks on the stream; safe to call twice
    fn stop(&mut self);
}

/// The sensor boundary consumed by the orchestrator.
///
/// All acquisitions are async and may suspend; none are retried by the
/// gateway itself. A `get_location` implementation must honor `timeout`
/// and fail with [`SensorError::Timeout`] when it elapses.
///
/// The orchestrator is generic over the gateway and single threaded, so
/// the futures need no auto-trait bounds.
#[allow(async_fn_in_trait)]
pub trait SensorGateway {
    /// Camera stream type produced by this gateway
    type Stream: StreamHandle;

    /// The most recent successful fix, if any, without touching hardware.
    fn cached_location(&self) -> Option<LocationCoordinate>;

    /// Acquire a fresh location fix within `timeout`.
    async fn get_location(&mut self, timeout: Duration)
        -> Result<LocationCoordinate, SensorError>;

    /// Best-effort compass heading in degrees [0, 360), trying `priority`
    /// sources in order; `Unavailable` if none succeeds.
    async fn get_heading(&mut self, priority: &[HeadingSource]) -> Result<f64, SensorError>;

    /// Open a camera stream matching `constraints`.
    async fn start_video_stream(
        &mut self,
        constraints: &VideoConstraints,
    ) -> Result<Self::Stream, SensorError>;

    /// Negotiate permission for device-orientation events (a prompt on
    /// some platforms, a no-op on others).
    async fn request_orientation_events(&mut self) -> Result<(), SensorError>;

    /// Stop delivering orientation events; safe to call when none flow.
    fn stop_orientation_events(&mut self);
}

/// A gateway for machines without device sensors.
///
/// Reports a fixed location (typically from the config file) with a
/// configurable artificial latency, a fixed heading, and no camera. This
/// is the development-mode stand-in that keeps the binary runnable on a
/// desktop, the same role the offline fallback model plays for data
/// sources that need hardware or network.
#[derive(Debug, Clone)]
pub struct FixedSensorGateway {
    latitude: f64,
    longitude: f64,
    heading_deg: f64,
    latency: Duration,
    cached: Option<LocationCoordinate>,
    orientation_active: bool,
}

impl FixedSensorGateway {
    /// Build a gateway reporting the given coordinates and heading.
    pub fn new(latitude: f64, longitude: f64, heading_deg: f64) -> Result<Self, ValidationError> {
        // Range-check once up front so acquisition cannot fail later
        LocationCoordinate::new(latitude, longitude, Utc::now())?;
        Ok(Self {
            latitude,
            longitude,
            heading_deg: heading_deg.rem_euclid(360.0),
            latency: Duration::ZERO,
            cached: None,
            orientation_active: false,
        })
    }

    /// Simulate slow hardware; a latency beyond the caller's timeout
    /// produces a genuine `Timeout` failure.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// True while orientation events have been negotiated and not stopped.
    pub fn orientation_events_active(&self) -> bool {
        self.orientation_active
    }
}

impl SensorGateway for FixedSensorGateway {
    type Stream = NullStream;

    fn cached_location(&self) -> Option<LocationCoordinate> {
        self.cached
    }

    async fn get_location(
        &mut self,
        timeout: Duration,
    ) -> Result<LocationCoordinate, SensorError> {
        if tokio::time::timeout(timeout, tokio::time::sleep(self.latency))
            .await
            .is_err()
        {
            return Err(SensorError::Timeout(timeout));
        }
        let fix = LocationCoordinate::new(self.latitude, self.longitude, Utc::now())
            .map_err(|_| SensorError::Unavailable)?
            .with_metadata(None, Some(50.0));
        self.cached = Some(fix);
        debug!("fixed gateway produced location {:.4}, {:.4}", fix.latitude, fix.longitude);
        Ok(fix)
    }

    async fn get_heading(&mut self, priority: &[HeadingSource]) -> Result<f64, SensorError> {
        if priority.is_empty() {
            return Err(SensorError::Unavailable);
        }
        Ok(self.heading_deg)
    }

    async fn start_video_stream(
        &mut self,
        _constraints: &VideoConstraints,
    ) -> Result<Self::Stream, SensorError> {
        // No camera on a development box
        Err(SensorError::Unavailable)
    }

    async fn request_orientation_events(&mut self) -> Result<(), SensorError> {
        self.orientation_active = true;
        Ok(())
    }

    fn stop_orientation_events(&mut self) {
        self.orientation_active = false;
    }
}

/// Stream type for gateways that never produce one.
#[derive(Debug, Clone, Copy)]
pub struct NullStream;

impl StreamHandle for NullStream {
    fn facing(&self) -> FacingMode {
        FacingMode::Environment
    }

    fn is_active(&self) -> bool {
        false
    }

    fn stop(&mut self) {}
}
