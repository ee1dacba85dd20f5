//! # Orchestration State Machine
//!
//! The orchestrator owns the application lifecycle: it sequences sensor
//! acquisition, invokes the ephemeris engine, pushes results to the
//! rendering port, and broadcasts an immutable [`AppStatus`] snapshot to
//! observers on every transition.
//!
//! ## State Machine
//!
//! `init → permissions → sensing → computing → rendering`, with `error`
//! reachable from any step and `fallback` reserved as an advisory UI hint
//! (never entered automatically). A fresh cached location short-circuits
//! straight from `permissions` to the compute pipeline.
//!
//! ## Resource Rules
//!
//! - The camera stream is the one exclusively-owned mutable resource.
//!   The orchestrator holds at most one [`StreamHandle`] at a time and
//!   stops it on every exit path, including `Drop`.
//! - Sensor responses carry a monotonic sequence number; a slow response
//!   superseded by a later request is dropped, never applied.
//! - No automatic retries: every failure lands in the `error` state and
//!   waits for an explicit new request.
//!
//! ## Time Travel
//!
//! A single displayed-timestamp field, defaulting to wall-clock now,
//! drives every engine query. Time navigation re-derives the celestial
//! snapshot through the engine; it never re-triggers sensor acquisition.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::ephemeris::{self, HorizonEvent};
use crate::render::{RenderMode, RenderingPort};
use crate::sensors::{
    HeadingSource, SensorError, SensorGateway, StreamHandle, VideoConstraints,
};
use crate::{LocationCoordinate, SunSample, TrackParameters, ValidationError};

/// The closed set of application states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Init,
    Permissions,
    Sensing,
    Computing,
    Rendering,
    Error,
    Fallback,
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Permissions => "permissions",
            Self::Sensing => "sensing",
            Self::Computing => "computing",
            Self::Rendering => "rendering",
            Self::Error => "error",
            Self::Fallback => "fallback",
        };
        write!(f, "{}", name)
    }
}

/// Immutable status snapshot broadcast to observers.
///
/// Replaced wholesale on every transition, never mutated in place.
/// `confidence` is a heuristic 0-100 progress indicator with no meaning
/// beyond UI feedback ordering.
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub state: AppState,
    pub confidence: u8,
    pub location: Option<LocationCoordinate>,
    pub samples: Option<Vec<SunSample>>,
    pub error: Option<String>,
}

impl AppStatus {
    fn initial() -> Self {
        Self {
            state: AppState::Init,
            confidence: 0,
            location: None,
            samples: None,
            error: None,
        }
    }
}

/// Advisory fallback surfaces for degraded sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    /// Canned demo data, nothing trustworthy acquired
    Demo,
    /// Manual location entry
    Manual,
    /// Plain 2D view
    TwoD,
}

impl std::fmt::Display for FallbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "demo"),
            Self::Manual => write!(f, "manual"),
            Self::TwoD => write!(f, "2d"),
        }
    }
}

/// Pure advisory mapping from confidence to a fallback surface.
pub fn select_fallback(confidence: u8) -> FallbackKind {
    if confidence < 30 {
        FallbackKind::Demo
    } else if confidence < 70 {
        FallbackKind::Manual
    } else {
        FallbackKind::TwoD
    }
}

/// Failures surfaced by orchestrator operations.
///
/// Sensor failures keep their discriminant so callers can distinguish a
/// declined permission from a timeout; engine/pipeline failures are the
/// compute catch-all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("sensor failure: {0}")]
    Sensor(#[from] SensorError),

    #[error("compute failure: {0}")]
    Compute(#[from] ValidationError),
}

/// Tuning knobs for the orchestrator, normally filled from the config
/// file.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Budget for a location acquisition
    pub location_timeout: StdDuration,
    /// How long a cached location counts as fresh
    pub location_max_age: Duration,
    /// Track length generated after each acquisition
    pub track_duration_hours: f64,
    /// Track sample spacing
    pub track_step_minutes: u32,
    /// Camera constraints for AR mode
    pub video: VideoConstraints,
    /// Heading sources in preference order
    pub heading_priority: Vec<HeadingSource>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            location_timeout: StdDuration::from_secs(10),
            location_max_age: Duration::minutes(5),
            track_duration_hours: 24.0,
            track_step_minutes: 5,
            video: VideoConstraints::default(),
            heading_priority: vec![
                HeadingSource::AbsoluteOrientation,
                HeadingSource::CompassHeading,
                HeadingSource::RelativeOrientation,
            ],
        }
    }
}

/// User-facing copy for location failures, one message per discriminant.
fn location_error_message(err: &SensorError) -> String {
    match err {
        SensorError::Permission => {
            "Location permission was declined. Allow location access and try again.".to_string()
        }
        SensorError::Timeout(_) => {
            "Timed out waiting for a location fix. Check GPS reception and try again.".to_string()
        }
        SensorError::Unavailable => {
            "Location services are unavailable on this device.".to_string()
        }
    }
}

/// User-facing copy for camera and orientation failures.
fn camera_error_message(err: &SensorError) -> String {
    match err {
        SensorError::Permission => {
            "Camera permission was declined. Allow camera access to use AR mode.".to_string()
        }
        SensorError::Timeout(_) => "Timed out waiting for the camera to start.".to_string(),
        SensorError::Unavailable => "No usable camera was found on this device.".to_string(),
    }
}

/// The orchestration state machine.
///
/// Collaborators are injected at construction; there are no hidden
/// globals. All mutating operations take `&mut self`, which makes
/// overlapping operations unrepresentable in safe code; the sequence
/// number on location requests additionally guards against a stale
/// response being applied after a newer request.
pub struct Orchestrator<S: SensorGateway, R: RenderingPort<S::Stream>> {
    sensors: S,
    renderer: R,
    options: OrchestratorOptions,
    status: AppStatus,
    observers: Vec<Box<dyn FnMut(&AppStatus)>>,
    location: Option<LocationCoordinate>,
    displayed_time: Option<DateTime<Utc>>,
    stream: Option<S::Stream>,
    mode: RenderMode,
    location_seq: u64,
    disposed: bool,
}

impl<S: SensorGateway, R: RenderingPort<S::Stream>> Orchestrator<S, R> {
    pub fn new(sensors: S, renderer: R, options: OrchestratorOptions) -> Self {
        Self {
            sensors,
            renderer,
            options,
            status: AppStatus::initial(),
            observers: Vec::new(),
            location: None,
            displayed_time: None,
            stream: None,
            mode: RenderMode::TwoD,
            location_seq: 0,
            disposed: false,
        }
    }

    /// Register a status observer. Observers are notified synchronously,
    /// in registration order, on every transition.
    pub fn on_status_update(&mut self, observer: impl FnMut(&AppStatus) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The current status snapshot.
    pub fn status(&self) -> &AppStatus {
        &self.status
    }

    /// The most recently applied location fix.
    pub fn current_location(&self) -> Option<&LocationCoordinate> {
        self.location.as_ref()
    }

    /// The displayed timestamp: wall-clock now unless time navigation
    /// has moved it.
    pub fn current_timestamp(&self) -> DateTime<Utc> {
        self.displayed_time.unwrap_or_else(Utc::now)
    }

    /// The render mode currently active.
    pub fn render_mode(&self) -> RenderMode {
        self.mode
    }

    /// Enter the permission step; if the gateway already holds a fresh
    /// fix, skip acquisition and run the compute pipeline directly.
    pub async fn initialize(&mut self) -> Result<(), OrchestratorError> {
        self.set_status(AppState::Permissions, 10, None, None);
        if let Some(cached) = self.sensors.cached_location() {
            if cached.is_fresh(Utc::now(), self.options.location_max_age) {
                info!("cached location is fresh, skipping acquisition");
                self.location = Some(cached);
                return self.run_pipeline(cached).await;
            }
            debug!("cached location is stale, waiting for an explicit request");
        }
        Ok(())
    }

    /// Acquire a location fix and run the full compute/render pipeline.
    ///
    /// On failure the machine lands in the `error` state and stays there
    /// until the caller invokes this again; there is no automatic retry.
    pub async fn request_location(&mut self) -> Result<(), OrchestratorError> {
        self.location_seq += 1;
        let seq = self.location_seq;

        self.set_status(AppState::Sensing, 20, None, None);
        let location = match self.sensors.get_location(self.options.location_timeout).await {
            Ok(location) => location,
            Err(err) => {
                self.fail(location_error_message(&err));
                return Err(err.into());
            }
        };

        if seq != self.location_seq {
            // A later request superseded this one while it was in flight
            warn!("dropping superseded location response (seq {})", seq);
            return Ok(());
        }

        self.location = Some(location);
        self.set_status(AppState::Sensing, 60, None, None);
        self.run_pipeline(location).await
    }

    async fn run_pipeline(&mut self, location: LocationCoordinate) -> Result<(), OrchestratorError> {
        self.set_status(AppState::Computing, 70, None, None);
        let displayed = self.current_timestamp();

        let params = match TrackParameters::new(
            location,
            displayed,
            self.options.track_duration_hours,
            self.options.track_step_minutes,
        ) {
            Ok(params) => params,
            Err(err) => {
                self.fail(format!("Internal computation error: {}", err));
                return Err(err.into());
            }
        };

        let track = ephemeris::compute_track(&params);
        let snapshot =
            ephemeris::celestial_snapshot(location.latitude, location.longitude, displayed);
        self.set_status(AppState::Computing, 80, Some(track.clone()), None);

        // Heading is best effort: degrade to North, never fail the flow
        let heading = match self.sensors.get_heading(&self.options.heading_priority).await {
            Ok(heading) => heading,
            Err(err) => {
                warn!("heading lookup failed ({}), defaulting to north", err);
                0.0
            }
        };

        self.renderer.update_data(&track, heading);
        self.renderer
            .update_celestial_positions(&snapshot, location.latitude, location.longitude);
        self.renderer.render_2d(&track, heading);
        self.set_status(AppState::Rendering, 90, Some(track.clone()), None);

        self.renderer.start_animation_loop();
        self.set_status(AppState::Rendering, 100, Some(track), None);
        Ok(())
    }

    /// Switch between 2D and AR views.
    ///
    /// Entering AR negotiates orientation events and acquires the camera
    /// stream; leaving AR stops every track on the held stream and the
    /// orientation subscription. Independent of the app state.
    pub async fn toggle_render_mode(&mut self) -> Result<RenderMode, OrchestratorError> {
        match self.mode {
            RenderMode::TwoD => {
                if let Err(err) = self.sensors.request_orientation_events().await {
                    self.fail(camera_error_message(&err));
                    return Err(err.into());
                }
                let constraints = self.options.video;
                let stream = match self.sensors.start_video_stream(&constraints).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        self.sensors.stop_orientation_events();
                        self.fail(camera_error_message(&err));
                        return Err(err.into());
                    }
                };
                self.adopt_stream(stream);
                let mode = self.renderer.toggle_mode(self.stream.as_ref());
                if mode != RenderMode::Ar {
                    // The target refused AR; do not hold a stream no view uses
                    self.release_stream();
                    self.sensors.stop_orientation_events();
                }
                self.mode = mode;
            }
            RenderMode::Ar => {
                self.release_stream();
                self.sensors.stop_orientation_events();
                self.mode = self.renderer.toggle_mode(None);
            }
        }
        info!("render mode toggled to {}", self.mode);
        Ok(self.mode)
    }

    /// Swap between the front and rear cameras while in AR mode.
    ///
    /// Tries the opposite facing twice, then falls back to the original
    /// facing twice. Outside AR mode this is a logged no-op.
    pub async fn switch_camera(&mut self) -> Result<(), OrchestratorError> {
        if self.mode != RenderMode::Ar {
            warn!("switch_camera is only meaningful in AR mode, ignoring");
            return Ok(());
        }

        let current_facing = self
            .stream
            .as_ref()
            .map(|stream| stream.facing())
            .unwrap_or(self.options.video.facing);
        self.release_stream();

        let opposite = current_facing.opposite();
        let attempts = [opposite, opposite, current_facing, current_facing];
        let mut last_err = SensorError::Unavailable;
        for facing in attempts {
            let constraints = VideoConstraints {
                facing,
                ..self.options.video
            };
            match self.sensors.start_video_stream(&constraints).await {
                Ok(stream) => {
                    info!("camera switched to {} facing", facing);
                    self.adopt_stream(stream);
                    self.renderer.toggle_mode(self.stream.as_ref());
                    return Ok(());
                }
                Err(err) => {
                    warn!("camera acquisition ({} facing) failed: {}", facing, err);
                    last_err = err;
                }
            }
        }

        self.fail(camera_error_message(&last_err));
        Err(last_err.into())
    }

    /// Display an arbitrary timestamp and re-derive the snapshot.
    pub fn set_time(&mut self, t: DateTime<Utc>) {
        self.displayed_time = Some(t);
        self.refresh_snapshot();
    }

    /// Return the display to wall-clock now.
    pub fn return_to_now(&mut self) {
        self.displayed_time = None;
        self.refresh_snapshot();
    }

    /// Jump the display to the next sunrise after the displayed time.
    ///
    /// `None` when no location is known or no crossing occurs in the
    /// engine's 48-hour window (polar regions); both are normal outcomes.
    pub fn jump_to_next_sunrise(&mut self) -> Option<HorizonEvent> {
        let location = self.location?;
        let event = ephemeris::find_next_sunrise(
            location.latitude,
            location.longitude,
            self.current_timestamp(),
        )?;
        self.set_time(event.time);
        Some(event)
    }

    /// Jump the display to the next sunset after the displayed time.
    pub fn jump_to_next_sunset(&mut self) -> Option<HorizonEvent> {
        let location = self.location?;
        let event = ephemeris::find_next_sunset(
            location.latitude,
            location.longitude,
            self.current_timestamp(),
        )?;
        self.set_time(event.time);
        Some(event)
    }

    /// Release every held resource: camera stream, orientation events,
    /// observers, and the render target. Idempotent, and also invoked on
    /// `Drop` so no exit path can leak the stream.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.release_stream();
        self.sensors.stop_orientation_events();
        self.observers.clear();
        self.renderer.dispose();
        info!("orchestrator disposed");
    }

    fn refresh_snapshot(&mut self) {
        if let Some(location) = self.location {
            let snapshot = ephemeris::celestial_snapshot(
                location.latitude,
                location.longitude,
                self.current_timestamp(),
            );
            self.renderer
                .update_celestial_positions(&snapshot, location.latitude, location.longitude);
        }
    }

    /// Take ownership of a new stream, stopping any previous one first
    /// so the single-owner invariant cannot be violated.
    fn adopt_stream(&mut self, stream: S::Stream) {
        self.release_stream();
        self.stream = Some(stream);
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("camera stream stopped");
        }
    }

    fn set_status(
        &mut self,
        state: AppState,
        confidence: u8,
        samples: Option<Vec<SunSample>>,
        error: Option<String>,
    ) {
        debug!("state {} (confidence {})", state, confidence);
        self.status = AppStatus {
            state,
            confidence,
            location: self.location,
            samples,
            error,
        };
        for observer in &mut self.observers {
            observer(&self.status);
        }
    }

    fn fail(&mut self, message: String) {
        warn!("entering error state: {}", message);
        self.set_status(AppState::Error, 0, None, Some(message));
    }
}

impl<S: SensorGateway, R: RenderingPort<S::Stream>> Drop for Orchestrator<S, R> {
    fn drop(&mut self) {
        self.dispose();
    }
}
