//! # Orchestrator Flow Tests
//!
//! End-to-end state machine tests with a scripted sensor gateway and a
//! recording render port. These verify the transition sequences, the
//! error-state mapping, camera stream ownership, and time navigation
//! without touching real hardware.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use sky_tracker_lib::orchestrator::{AppState, Orchestrator, OrchestratorOptions};
use sky_tracker_lib::render::{RenderMode, RenderingPort};
use sky_tracker_lib::sensors::{
    FacingMode, SensorError, SensorGateway, StreamHandle, VideoConstraints,
};
use sky_tracker_lib::{CelestialSnapshot, LocationCoordinate, SunSample};

fn sf_location() -> LocationCoordinate {
    LocationCoordinate::new(37.7749, -122.4194, Utc::now()).unwrap()
}

/// Camera stream whose active flag outlives the handle, so tests can
/// observe stops after ownership moved into the orchestrator.
struct TestStream {
    facing: FacingMode,
    active: Rc<Cell<bool>>,
}

impl StreamHandle for TestStream {
    fn facing(&self) -> FacingMode {
        self.facing
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn stop(&mut self) {
        self.active.set(false);
    }
}

/// Gateway returning scripted results, with shared counters the test
/// keeps after the gateway moves into the orchestrator.
struct ScriptedGateway {
    cached: Option<LocationCoordinate>,
    location_results: VecDeque<Result<LocationCoordinate, SensorError>>,
    location_calls: Rc<Cell<usize>>,
    heading: Result<f64, SensorError>,
    environment_failures: usize,
    user_failures: usize,
    camera_attempts: Rc<RefCell<Vec<FacingMode>>>,
    streams: Rc<RefCell<Vec<Rc<Cell<bool>>>>>,
}

impl ScriptedGateway {
    fn new() -> Self {
        Self {
            cached: None,
            location_results: VecDeque::new(),
            location_calls: Rc::new(Cell::new(0)),
            heading: Ok(90.0),
            environment_failures: 0,
            user_failures: 0,
            camera_attempts: Rc::new(RefCell::new(Vec::new())),
            streams: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn with_location(mut self, result: Result<LocationCoordinate, SensorError>) -> Self {
        self.location_results.push_back(result);
        self
    }
}

impl SensorGateway for ScriptedGateway {
    type Stream = TestStream;

    fn cached_location(&self) -> Option<LocationCoordinate> {
        self.cached
    }

    async fn get_location(
        &mut self,
        _timeout: StdDuration,
    ) -> Result<LocationCoordinate, SensorError> {
        self.location_calls.set(self.location_calls.get() + 1);
        self.location_results
            .pop_front()
            .unwrap_or(Err(SensorError::Unavailable))
    }

    async fn get_heading(
        &mut self,
        _priority: &[sky_tracker_lib::sensors::HeadingSource],
    ) -> Result<f64, SensorError> {
        self.heading.clone()
    }

    async fn start_video_stream(
        &mut self,
        constraints: &VideoConstraints,
    ) -> Result<Self::Stream, SensorError> {
        self.camera_attempts.borrow_mut().push(constraints.facing);
        let failures = match constraints.facing {
            FacingMode::Environment => &mut self.environment_failures,
            FacingMode::User => &mut self.user_failures,
        };
        if *failures > 0 {
            *failures -= 1;
            return Err(SensorError::Unavailable);
        }
        let active = Rc::new(Cell::new(true));
        self.streams.borrow_mut().push(active.clone());
        Ok(TestStream {
            facing: constraints.facing,
            active,
        })
    }

    async fn request_orientation_events(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn stop_orientation_events(&mut self) {}
}

/// Render port that records every call for later inspection.
struct RecordingRenderer {
    calls: Rc<RefCell<Vec<String>>>,
    snapshots: Rc<RefCell<Vec<CelestialSnapshot>>>,
}

impl RecordingRenderer {
    fn new() -> Self {
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            snapshots: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl RenderingPort<TestStream> for RecordingRenderer {
    fn update_data(&mut self, samples: &[SunSample], _heading_deg: f64) {
        self.calls
            .borrow_mut()
            .push(format!("update_data({})", samples.len()));
    }

    fn render_2d(&mut self, _samples: &[SunSample], _heading_deg: f64) {
        self.calls.borrow_mut().push("render_2d".to_string());
    }

    fn update_celestial_positions(&mut self, snapshot: &CelestialSnapshot, _lat: f64, _lon: f64) {
        self.snapshots.borrow_mut().push(*snapshot);
        self.calls
            .borrow_mut()
            .push("update_celestial_positions".to_string());
    }

    fn start_animation_loop(&mut self) {
        self.calls.borrow_mut().push("start_animation_loop".to_string());
    }

    fn toggle_mode(&mut self, stream: Option<&TestStream>) -> RenderMode {
        let mode = if stream.is_some() {
            RenderMode::Ar
        } else {
            RenderMode::TwoD
        };
        self.calls.borrow_mut().push(format!("toggle_mode({})", mode));
        mode
    }

    fn dispose(&mut self) {
        self.calls.borrow_mut().push("dispose".to_string());
    }
}

fn orchestrator_with(
    gateway: ScriptedGateway,
    options: OrchestratorOptions,
) -> (
    Orchestrator<ScriptedGateway, RecordingRenderer>,
    Rc<RefCell<Vec<String>>>,
    Rc<RefCell<Vec<CelestialSnapshot>>>,
) {
    let renderer = RecordingRenderer::new();
    let calls = renderer.calls.clone();
    let snapshots = renderer.snapshots.clone();
    (Orchestrator::new(gateway, renderer, options), calls, snapshots)
}

fn active_count(streams: &Rc<RefCell<Vec<Rc<Cell<bool>>>>>) -> usize {
    streams.borrow().iter().filter(|s| s.get()).count()
}

#[tokio::test]
async fn successful_flow_reaches_rendering_with_full_confidence() {
    let gateway = ScriptedGateway::new().with_location(Ok(sf_location()));
    let (mut orchestrator, calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    let observed = Rc::new(RefCell::new(Vec::new()));
    let observed_in_test = observed.clone();
    orchestrator.on_status_update(move |status| {
        observed.borrow_mut().push((status.state, status.confidence));
    });

    orchestrator.request_location().await.unwrap();

    let status = orchestrator.status();
    assert_eq!(status.state, AppState::Rendering);
    assert_eq!(status.confidence, 100);
    assert!(status.location.is_some());
    assert!(status.error.is_none());
    // 24h at 5-minute steps, both endpoints included
    assert_eq!(status.samples.as_ref().map(Vec::len), Some(289));

    // Every state was observed in sequence with monotonic confidence
    let observed = observed_in_test.borrow();
    let states: Vec<AppState> = observed.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        states,
        vec![
            AppState::Sensing,
            AppState::Sensing,
            AppState::Computing,
            AppState::Computing,
            AppState::Rendering,
            AppState::Rendering,
        ]
    );
    for pair in observed.windows(2) {
        assert!(
            pair[0].1 <= pair[1].1,
            "confidence regressed: {} -> {}",
            pair[0].1,
            pair[1].1
        );
    }

    // The render port saw data before the animation loop started
    let calls = calls.borrow();
    let update = calls.iter().position(|c| c.starts_with("update_data"));
    let animate = calls.iter().position(|c| c == "start_animation_loop");
    assert!(update.unwrap() < animate.unwrap());
}

#[tokio::test]
async fn permission_failure_lands_in_error_state_with_specific_copy() {
    let gateway = ScriptedGateway::new().with_location(Err(SensorError::Permission));
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    let result = orchestrator.request_location().await;
    assert!(result.is_err());

    let status = orchestrator.status();
    assert_eq!(status.state, AppState::Error);
    assert_eq!(status.confidence, 0);
    let message = status.error.as_ref().expect("error state carries a message");
    assert!(
        message.contains("permission"),
        "permission failure needs permission-specific copy, got: {}",
        message
    );
}

#[tokio::test]
async fn timeout_and_permission_copy_differ() {
    let gateway = ScriptedGateway::new()
        .with_location(Err(SensorError::Timeout(StdDuration::from_secs(10))));
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    orchestrator.request_location().await.unwrap_err();
    let timeout_message = orchestrator.status().error.clone().unwrap();
    assert!(timeout_message.contains("Timed out"));
    assert!(!timeout_message.contains("permission"));
}

#[tokio::test]
async fn initialize_short_circuits_on_fresh_cached_location() {
    let mut gateway = ScriptedGateway::new();
    gateway.cached = Some(sf_location());
    let location_calls = gateway.location_calls.clone();
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    orchestrator.initialize().await.unwrap();

    // Pipeline ran without any fresh acquisition
    assert_eq!(orchestrator.status().state, AppState::Rendering);
    assert_eq!(orchestrator.status().confidence, 100);
    assert_eq!(location_calls.get(), 0);
}

#[tokio::test]
async fn initialize_waits_when_cache_is_stale() {
    let mut gateway = ScriptedGateway::new();
    let stale = LocationCoordinate::new(37.7749, -122.4194, Utc::now() - Duration::minutes(10))
        .unwrap();
    gateway.cached = Some(stale);
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    orchestrator.initialize().await.unwrap();

    // Stale cache: stay in permissions until an explicit request
    assert_eq!(orchestrator.status().state, AppState::Permissions);
    assert_eq!(orchestrator.status().confidence, 10);
}

#[tokio::test]
async fn toggle_render_mode_holds_at_most_one_stream() {
    let gateway = ScriptedGateway::new();
    let streams = gateway.streams.clone();
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    assert_eq!(orchestrator.render_mode(), RenderMode::TwoD);

    let mode = orchestrator.toggle_render_mode().await.unwrap();
    assert_eq!(mode, RenderMode::Ar);
    assert_eq!(active_count(&streams), 1);

    let mode = orchestrator.toggle_render_mode().await.unwrap();
    assert_eq!(mode, RenderMode::TwoD);
    assert_eq!(active_count(&streams), 0, "leaving AR must stop the stream");

    // Repeated toggling never accumulates streams
    for _ in 0..3 {
        orchestrator.toggle_render_mode().await.unwrap();
        assert!(active_count(&streams) <= 1);
    }
}

#[tokio::test]
async fn switch_camera_falls_back_to_original_facing() {
    let mut gateway = ScriptedGateway::new();
    // The opposite (environment) camera is broken
    gateway.environment_failures = 2;
    let attempts = gateway.camera_attempts.clone();
    let streams = gateway.streams.clone();

    let options = OrchestratorOptions {
        video: VideoConstraints {
            facing: FacingMode::User,
            ..VideoConstraints::default()
        },
        ..OrchestratorOptions::default()
    };
    let (mut orchestrator, _calls, _snapshots) = orchestrator_with(gateway, options);

    orchestrator.toggle_render_mode().await.unwrap();
    assert_eq!(orchestrator.render_mode(), RenderMode::Ar);

    orchestrator.switch_camera().await.unwrap();

    // Two tries at the opposite facing, then the original succeeded
    assert_eq!(
        *attempts.borrow(),
        vec![
            FacingMode::User,
            FacingMode::Environment,
            FacingMode::Environment,
            FacingMode::User,
        ]
    );
    assert_eq!(active_count(&streams), 1);
    // The original stream was stopped before the replacement opened
    assert!(!streams.borrow()[0].get());
}

#[tokio::test]
async fn switch_camera_outside_ar_is_a_no_op() {
    let gateway = ScriptedGateway::new();
    let attempts = gateway.camera_attempts.clone();
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    orchestrator.switch_camera().await.unwrap();
    assert!(attempts.borrow().is_empty());
    assert_eq!(orchestrator.render_mode(), RenderMode::TwoD);
}

#[tokio::test]
async fn jump_to_next_sunrise_requires_a_location() {
    let gateway = ScriptedGateway::new();
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    assert!(orchestrator.jump_to_next_sunrise().is_none());
    assert!(orchestrator.jump_to_next_sunset().is_none());
}

#[tokio::test]
async fn jump_to_next_sunrise_moves_the_displayed_time() {
    let gateway = ScriptedGateway::new().with_location(Ok(sf_location()));
    let (mut orchestrator, _calls, snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());
    orchestrator.request_location().await.unwrap();

    let before = Utc::now();
    let event = orchestrator.jump_to_next_sunrise().expect("sunrise within 48h");
    assert!(event.time > before);
    assert!(event.time <= before + Duration::hours(48));
    assert!((0.0..360.0).contains(&event.azimuth_deg));
    assert_eq!(orchestrator.current_timestamp(), event.time);

    // The engine re-derived a snapshot for the jumped-to instant
    let last = *snapshots.borrow().last().unwrap();
    assert_eq!(last.time, event.time);

    orchestrator.return_to_now();
    let drift = orchestrator.current_timestamp() - Utc::now();
    assert!(drift.num_seconds().abs() < 2);
}

#[tokio::test]
async fn set_time_rederives_without_sensor_calls() {
    let gateway = ScriptedGateway::new().with_location(Ok(sf_location()));
    let location_calls = gateway.location_calls.clone();
    let (mut orchestrator, _calls, snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());
    orchestrator.request_location().await.unwrap();
    assert_eq!(location_calls.get(), 1);

    let target = Utc::now() + Duration::days(30);
    orchestrator.set_time(target);

    assert_eq!(orchestrator.current_timestamp(), target);
    assert_eq!(snapshots.borrow().last().unwrap().time, target);
    // Time travel never re-triggers acquisition
    assert_eq!(location_calls.get(), 1);
}

#[tokio::test]
async fn dispose_stops_the_stream_and_is_idempotent() {
    let gateway = ScriptedGateway::new();
    let streams = gateway.streams.clone();
    let (mut orchestrator, calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    orchestrator.toggle_render_mode().await.unwrap();
    assert_eq!(active_count(&streams), 1);

    orchestrator.dispose();
    orchestrator.dispose();

    assert_eq!(active_count(&streams), 0);
    let dispose_calls = calls.borrow().iter().filter(|c| *c == "dispose").count();
    assert_eq!(dispose_calls, 1);
}

#[tokio::test]
async fn observers_are_notified_in_registration_order() {
    let gateway = ScriptedGateway::new().with_location(Ok(sf_location()));
    let (mut orchestrator, _calls, _snapshots) =
        orchestrator_with(gateway, OrchestratorOptions::default());

    let log = Rc::new(RefCell::new(Vec::new()));
    let first = log.clone();
    let second = log.clone();
    orchestrator.on_status_update(move |status| first.borrow_mut().push((1, status.state)));
    orchestrator.on_status_update(move |status| second.borrow_mut().push((2, status.state)));

    orchestrator.request_location().await.unwrap();

    let log = log.borrow();
    assert!(!log.is_empty());
    for chunk in log.chunks(2) {
        assert_eq!(chunk.len(), 2, "observers must both see every status");
        assert_eq!(chunk[0].0, 1);
        assert_eq!(chunk[1].0, 2);
        assert_eq!(chunk[0].1, chunk[1].1, "observers must see the same status");
    }
}
