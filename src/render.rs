//! # Sky Chart Rendering
//!
//! This module defines the [`RenderingPort`] the orchestrator drives, and
//! two concrete render targets: an ASCII terminal chart for development
//! mode and an `embedded-graphics` routine that draws the same curve into
//! any `DrawTarget`.
//!
//! The port owns no computation: it receives finished samples and
//! snapshots from the orchestrator and draws them. Mode switching between
//! the flat 2D chart and the camera-backed AR view is driven through
//! [`RenderingPort::toggle_mode`]; the camera stream stays owned by the
//! orchestrator and is only borrowed for the duration of the call.

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle},
    text::Text,
};
use log::{debug, info};

use crate::{CelestialSnapshot, SunSample};

/// The two display modes a render target can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Flat chart view
    TwoD,
    /// Camera-backed augmented-reality view
    Ar,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TwoD => write!(f, "2D"),
            Self::Ar => write!(f, "AR"),
        }
    }
}

/// The rendering surface driven by the orchestrator.
///
/// `H` is the camera stream handle type of the paired sensor gateway; the
/// port receives a borrow of it when AR mode begins and `None` when the
/// view returns to 2D.
pub trait RenderingPort<H> {
    /// Replace the track data backing the scene.
    fn update_data(&mut self, samples: &[SunSample], heading_deg: f64);

    /// Draw the flat chart view.
    fn render_2d(&mut self, samples: &[SunSample], heading_deg: f64);

    /// Position the sun and moon for one instant.
    fn update_celestial_positions(&mut self, snapshot: &CelestialSnapshot, lat: f64, lon: f64);

    /// Begin the continuous redraw loop.
    fn start_animation_loop(&mut self);

    /// Switch view modes; returns the mode now active.
    ///
    /// `Some(stream)` requests the AR view backed by that camera stream
    /// (re-sent when the stream is replaced mid-AR), `None` requests the
    /// 2D view. A target that cannot honor AR reports `TwoD` and the
    /// orchestrator releases the stream.
    fn toggle_mode(&mut self, stream: Option<&H>) -> RenderMode;

    /// Release every resource the target holds.
    fn dispose(&mut self);
}

/// Human-readable name for a phase value in [0, 1).
///
/// Buckets the cycle into the traditional eight names using round-to-
/// nearest-eighth, so 0.49 and 0.51 both read "full".
pub fn phase_name(phase: f64) -> &'static str {
    let index = ((phase * 8.0) + 0.5).floor() as u8 & 7;
    match index {
        0 => "new",
        1 => "waxing crescent",
        2 => "first quarter",
        3 => "waxing gibbous",
        4 => "full",
        5 => "waning gibbous",
        6 => "last quarter",
        _ => "waning crescent",
    }
}

/// Min and max elevation across a track, for chart scaling.
fn elevation_bounds(samples: &[SunSample]) -> (f64, f64) {
    samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), sample| {
            (min.min(sample.elevation_deg), max.max(sample.elevation_deg))
        })
}

/// Render a sun track to an ASCII terminal.
///
/// The first sample is the displayed instant and carries the `X` marker;
/// samples below the horizon are drawn dimmer. The heading line at the
/// top mirrors what an AR view would use to orient the camera.
pub fn draw_ascii(samples: &[SunSample], heading_deg: f64) {
    const ROWS: usize = 20;
    const Y_AXIS_WIDTH: usize = 5;

    if samples.len() < 2 {
        println!("(not enough samples to draw)");
        return;
    }

    let (min_elev, max_elev) = elevation_bounds(samples);
    let span = (max_elev - min_elev).max(1.0);

    let elevation_to_row =
        |elev: f64| (((max_elev - elev) / span) * (ROWS as f64 - 1.0)).round() as usize;

    let mut grid = vec![vec![' '; samples.len() + Y_AXIS_WIDTH]; ROWS];

    // Y-axis labels every 15 or 30 degrees depending on the span
    let label_step = if span > 60.0 { 30.0 } else { 15.0 };
    let mut current = (min_elev / label_step).floor() * label_step;
    while current <= max_elev {
        if current >= min_elev {
            let row = elevation_to_row(current);
            let label = format!("{:>4}", format!("{:.0}", current));
            for (i, ch) in label.chars().enumerate() {
                grid[row][i] = ch;
            }
            grid[row][Y_AXIS_WIDTH - 1] = '│';
        }
        current += label_step;
    }

    // Horizon line where the chart range straddles zero
    if min_elev < 0.0 && max_elev > 0.0 {
        let horizon_row = elevation_to_row(0.0);
        for cell in grid[horizon_row].iter_mut().skip(Y_AXIS_WIDTH) {
            if *cell == ' ' {
                *cell = '─';
            }
        }
    }

    for (column, sample) in samples.iter().enumerate() {
        let row = elevation_to_row(sample.elevation_deg);
        let cell = &mut grid[row][column + Y_AXIS_WIDTH];
        *cell = if column == 0 {
            'X'
        } else if sample.elevation_deg >= 0.0 {
            '•'
        } else {
            '·'
        };
    }

    println!("heading {:.0}°", heading_deg);
    for row in grid {
        println!("{}", row.into_iter().collect::<String>());
    }

    // Time markers below the chart; the track starts at the displayed
    // instant so the left edge is "Now"
    let padding = " ".repeat(Y_AXIS_WIDTH);
    let markers: String = (0..samples.len())
        .map(|i| if i % 12 == 0 { '|' } else { ' ' })
        .collect();
    println!("{}{}", padding, markers);

    let span_hours = (samples[samples.len() - 1].time - samples[0].time).num_hours();
    let end_label = format!("+{}h", span_hours);
    let width = samples.len().saturating_sub(end_label.len()).max(3);
    println!("{}{:<width$}{}", padding, "Now", end_label, width = width);
}

/// Draw a sun track into an `embedded-graphics` target.
///
/// The same chart as [`draw_ascii`] in pixels: elevation curve, horizon
/// line, axis labels, and a filled marker on the displayed instant.
pub fn draw_chart<D: DrawTarget<Color = BinaryColor>>(
    samples: &[SunSample],
    display: &mut D,
    width: i32,
    height: i32,
) {
    if samples.len() < 2 {
        return;
    }

    let text_style = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
    let (min_elev, max_elev) = elevation_bounds(samples);
    let span = (max_elev - min_elev).max(1.0);

    // Reserve space on the left for elevation labels
    let chart_left = 40;
    let chart_width = width - chart_left;

    let elevation_to_y = |elev: f64| {
        let normalized = (elev - min_elev) / span;
        let available = height as f64 - 40.0;
        height - 20 - (normalized * available) as i32
    };

    // Horizon line
    if min_elev < 0.0 && max_elev > 0.0 {
        let y = elevation_to_y(0.0);
        Line::new(Point::new(chart_left, y), Point::new(width - 1, y))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(display)
            .ok();
        Text::new("0", Point::new(2, y + 6), text_style)
            .draw(display)
            .ok();
    }

    // Elevation curve with a marker on the displayed instant
    let mut previous_point = None;
    for (index, sample) in samples.iter().enumerate() {
        let x = chart_left + (index as i32 * (chart_width - 1) / (samples.len() as i32 - 1));
        let y = elevation_to_y(sample.elevation_deg);
        let current_point = Point::new(x, y);

        if let Some(prev_point) = previous_point {
            Line::new(prev_point, current_point)
                .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 2))
                .draw(display)
                .ok();
        }
        previous_point = Some(current_point);

        if index == 0 {
            Circle::new(current_point, 5)
                .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
                .draw(display)
                .ok();
        }
    }

    // Time labels
    Text::new("Now", Point::new(chart_left, height - 1), text_style)
        .draw(display)
        .ok();
    Text::new("+24h", Point::new(width - 46, height - 1), text_style)
        .draw(display)
        .ok();
}

/// Terminal render target for development mode.
///
/// Holds the latest track and heading so the animation-loop and
/// mode-toggle calls have something to act on, and prints the chart on
/// `render_2d`. AR mode degrades to a log line: a terminal has no camera
/// surface, but the mode bookkeeping still runs so the orchestrator's
/// stream handling can be exercised end to end.
#[derive(Debug, Default)]
pub struct AsciiSkyRenderer {
    mode: Option<RenderMode>,
    samples: Vec<SunSample>,
    heading_deg: f64,
    animating: bool,
}

impl AsciiSkyRenderer {
    pub fn new() -> Self {
        Self {
            mode: Some(RenderMode::TwoD),
            samples: Vec::new(),
            heading_deg: 0.0,
            animating: false,
        }
    }

    /// The mode the renderer is currently in.
    pub fn mode(&self) -> RenderMode {
        self.mode.unwrap_or(RenderMode::TwoD)
    }

    /// True once the animation loop has been requested.
    pub fn is_animating(&self) -> bool {
        self.animating
    }
}

impl<H> RenderingPort<H> for AsciiSkyRenderer {
    fn update_data(&mut self, samples: &[SunSample], heading_deg: f64) {
        self.samples = samples.to_vec();
        self.heading_deg = heading_deg;
        debug!("renderer received {} samples", samples.len());
    }

    fn render_2d(&mut self, samples: &[SunSample], heading_deg: f64) {
        draw_ascii(samples, heading_deg);
    }

    fn update_celestial_positions(&mut self, snapshot: &CelestialSnapshot, lat: f64, lon: f64) {
        println!(
            "{} @ {:.4},{:.4}  sun az {:.1}° el {:.1}°  moon az {:.1}° el {:.1}° ({}, {:.0}% lit, {:.0} km)",
            snapshot.time.format("%Y-%m-%d %H:%M UTC"),
            lat,
            lon,
            snapshot.sun.azimuth_deg,
            snapshot.sun.elevation_deg,
            snapshot.moon.azimuth_deg,
            snapshot.moon.elevation_deg,
            phase_name(snapshot.moon.phase),
            snapshot.moon.illumination * 100.0,
            snapshot.moon.distance_km,
        );
    }

    fn start_animation_loop(&mut self) {
        // A terminal chart has no frame loop; remember the request so
        // mode toggles can report a consistent state
        self.animating = true;
        debug!("animation loop requested");
    }

    fn toggle_mode(&mut self, stream: Option<&H>) -> RenderMode {
        // A terminal has no camera surface, but the mode bookkeeping
        // still runs so stream handling can be exercised end to end
        let next = if stream.is_some() {
            RenderMode::Ar
        } else {
            RenderMode::TwoD
        };
        self.mode = Some(next);
        info!("render mode is now {}", next);
        next
    }

    fn dispose(&mut self) {
        self.samples.clear();
        self.animating = false;
        self.mode = None;
        debug!("renderer disposed");
    }
}
