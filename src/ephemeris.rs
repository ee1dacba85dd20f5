//! Sun & moon ephemeris (NOAA solar equations + truncated lunar series)
//!
//! Pure functions mapping (latitude, longitude, timestamp) to horizontal
//! coordinates, horizon-crossing events, and moon phase/illumination/
//! distance. Accuracy: a fraction of a degree for the sun, a few tenths
//! of a degree for the moon (dominant perturbation terms only, not full
//! ELP2000), ~0.5 % for lunar distance.
//!
//! Conventions used throughout:
//! - degrees at the API boundary, radians internally
//! - azimuth normalized to [0, 360), 0 = North, measured clockwise,
//!   computed with the 180 = South reference of the NOAA equations
//! - angle differences reduced modulo 360 before interpretation
//!
//! Every function is deterministic given its inputs; querying the past is
//! as valid as querying the future.

use chrono::{DateTime, Duration, Utc};

use crate::{CelestialSnapshot, MoonSample, SunSample, TrackParameters};

/// Elevation at which the sun's disk visually touches the horizon,
/// accounting for atmospheric refraction and the solar radius.
pub const CIVIL_HORIZON_DEG: f64 = -0.833;

/// Mean geocentric Earth-Moon distance in kilometers.
pub const MEAN_LUNAR_DISTANCE_KM: f64 = 385_000.56;

/// Mean Earth-Sun distance in astronomical units (radius-vector scale).
const MEAN_SOLAR_DISTANCE_AU: f64 = 1.000_001_018;

/// Forward-scan window for next-sunrise/next-sunset searches, in minutes.
const SCAN_WINDOW_MIN: i64 = 48 * 60;

const J2000_JD: f64 = 2_451_545.0;

/// Apparent horizontal coordinates of the sun at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    /// Compass bearing in degrees, [0, 360), 0 = North, clockwise
    pub azimuth_deg: f64,
    /// Angle above (+) or below (-) the local horizon in degrees
    pub elevation_deg: f64,
}

/// Sunrise and sunset for one calendar day.
///
/// `None` means the event does not occur within the day (polar day or
/// polar night), which is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaySolarEvents {
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
}

/// A horizon crossing found by the forward scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizonEvent {
    /// When the sun crosses the civil horizon
    pub time: DateTime<Utc>,
    /// Compass bearing of the sun at the crossing, [0, 360)
    pub azimuth_deg: f64,
}

/// Continuous Julian day count for a UTC timestamp.
fn julian_day(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 86_400_000.0 + 2_440_587.5
}

/// Julian centuries since J2000.0.
fn julian_century(jd: f64) -> f64 {
    (jd - J2000_JD) / 36_525.0
}

/// Reduce an angle to [0, 360) degrees.
fn normalize_deg(x: f64) -> f64 {
    let mut x = x % 360.0;
    if x < 0.0 {
        x += 360.0;
    }
    // x % 360 can round to exactly 360.0 for tiny negative inputs
    if x >= 360.0 {
        x = 0.0;
    }
    x
}

/// Mean obliquity of the ecliptic in degrees (Meeus 22.2).
fn mean_obliquity_deg(c: f64) -> f64 {
    23.439_291_11 - c * (0.013_004_2 + c * (0.000_000_16 - 0.000_000_504 * c))
}

/// Greenwich mean sidereal time in degrees.
fn gmst_deg(jd: f64) -> f64 {
    let d = jd - J2000_JD;
    let c = julian_century(jd);
    normalize_deg(280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * c * c
        - c * c * c / 38_710_000.0)
}

/// Convert equatorial coordinates to horizontal coordinates for an
/// observer, via GMST and the local hour angle. Shared by the sun and
/// moon paths so the two can never disagree on sidereal time.
fn equatorial_to_horizontal(
    ra_deg: f64,
    dec_deg: f64,
    lat_deg: f64,
    lon_deg: f64,
    jd: f64,
) -> (f64, f64) {
    let lst = normalize_deg(gmst_deg(jd) + lon_deg);
    let hour_angle = normalize_deg(lst - ra_deg).to_radians();
    let lat = lat_deg.to_radians();
    let dec = dec_deg.to_radians();

    let elevation = (lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos()).asin();

    // Measured from South, then rotated so 0 = North, clockwise
    let az_south = hour_angle
        .sin()
        .atan2(hour_angle.cos() * lat.sin() - dec.tan() * lat.cos());
    let azimuth = normalize_deg(az_south.to_degrees() + 180.0);

    (azimuth, elevation.to_degrees())
}

/// Solar ecliptic state at a given Julian century: apparent longitude,
/// corrected obliquity, and the radius vector (Earth-Sun distance).
struct SunEcliptic {
    apparent_lon_deg: f64,
    obliquity_deg: f64,
    radius_au: f64,
}

fn sun_ecliptic(c: f64) -> SunEcliptic {
    // Geometric mean longitude and mean anomaly
    let mean_lon = normalize_deg(280.466_46 + c * (36_000.769_83 + 0.000_303_2 * c));
    let mean_anomaly = 357.529_11 + c * (35_999.050_29 - 0.000_153_7 * c);
    let ma = mean_anomaly.to_radians();

    // Equation of center
    let center = (1.914_602 - c * (0.004_817 + 0.000_014 * c)) * ma.sin()
        + (0.019_993 - 0.000_101 * c) * (2.0 * ma).sin()
        + 0.000_289 * (3.0 * ma).sin();

    let true_lon = mean_lon + center;

    // Nutation via the lunar ascending-node term
    let omega = (125.04 - 1_934.136 * c).to_radians();
    let apparent_lon_deg = true_lon - 0.005_69 - 0.004_78 * omega.sin();
    let obliquity_deg = mean_obliquity_deg(c) + 0.002_56 * omega.cos();

    // Radius vector from the orbital eccentricity approximation
    let eccentricity = 0.016_708_634 - c * (0.000_042_037 + 0.000_000_126_7 * c);
    let true_anomaly = (mean_anomaly + center).to_radians();
    let radius_au = MEAN_SOLAR_DISTANCE_AU * (1.0 - eccentricity * eccentricity)
        / (1.0 + eccentricity * true_anomaly.cos());

    SunEcliptic {
        apparent_lon_deg,
        obliquity_deg,
        radius_au,
    }
}

/// Apparent sun position in horizontal coordinates.
pub fn sun_position(lat_deg: f64, lon_deg: f64, t: DateTime<Utc>) -> SunPosition {
    let jd = julian_day(t);
    let ecl = sun_ecliptic(julian_century(jd));

    let lam = ecl.apparent_lon_deg.to_radians();
    let eps = ecl.obliquity_deg.to_radians();
    let ra_deg = normalize_deg((eps.cos() * lam.sin()).atan2(lam.cos()).to_degrees());
    let dec_deg = (eps.sin() * lam.sin()).asin().to_degrees();

    let (azimuth_deg, elevation_deg) = equatorial_to_horizontal(ra_deg, dec_deg, lat_deg, lon_deg, jd);
    SunPosition {
        azimuth_deg,
        elevation_deg,
    }
}

/// Sun position plus the relative visual mass (mean distance => 1.0).
pub fn sun_sample(lat_deg: f64, lon_deg: f64, t: DateTime<Utc>) -> SunSample {
    let pos = sun_position(lat_deg, lon_deg, t);
    let radius_au = sun_ecliptic(julian_century(julian_day(t))).radius_au;
    SunSample {
        time: t,
        azimuth_deg: pos.azimuth_deg,
        elevation_deg: pos.elevation_deg,
        mass: MEAN_SOLAR_DISTANCE_AU / radius_au,
    }
}

/// Apparent moon position, phase, illumination, distance, and mass.
///
/// Dominant perturbation terms only; phase is the normalized mean
/// elongation (0 = new, 0.5 = full) and illumination follows from the
/// phase angle, so new => 0.0 and full => 1.0.
pub fn moon_sample(lat_deg: f64, lon_deg: f64, t: DateTime<Utc>) -> MoonSample {
    let jd = julian_day(t);
    let c = julian_century(jd);

    // Fundamental arguments (mean longitude, mean elongation, solar and
    // lunar mean anomalies, argument of latitude)
    let mean_lon = normalize_deg(218.316_447_7 + 481_267.881_234_21 * c);
    let elongation = normalize_deg(297.850_192_1 + 445_267.111_403_4 * c);
    let sun_anomaly = normalize_deg(357.529_109_2 + 35_999.050_290_9 * c);
    let moon_anomaly = normalize_deg(134.963_396_4 + 477_198.867_505_5 * c);
    let lat_arg = normalize_deg(93.272_095 + 483_202.017_523_3 * c);

    let d = elongation.to_radians();
    let ms = sun_anomaly.to_radians();
    let mp = moon_anomaly.to_radians();
    let f = lat_arg.to_radians();

    // Ecliptic longitude and latitude from the dominant series terms
    let ecl_lon = normalize_deg(
        mean_lon
            + 6.288_774 * mp.sin()
            + 1.274_027 * (2.0 * d - mp).sin()
            + 0.658_314 * (2.0 * d).sin()
            + 0.213_618 * (2.0 * mp).sin()
            - 0.185_116 * ms.sin()
            - 0.114_332 * (2.0 * f).sin(),
    );
    let ecl_lat = 5.128_122 * f.sin()
        + 0.280_602 * (mp + f).sin()
        + 0.277_693 * (mp - f).sin()
        + 0.173_237 * (2.0 * d - f).sin();

    // Geocentric distance from the dominant anomaly terms
    let distance_km = MEAN_LUNAR_DISTANCE_KM
        - 20_905.355 * mp.cos()
        - 3_699.111 * (2.0 * d - mp).cos()
        - 2_955.968 * (2.0 * d).cos();

    // Ecliptic to equatorial; mean obliquity is enough at this precision
    let eps = mean_obliquity_deg(c).to_radians();
    let lam = ecl_lon.to_radians();
    let bet = ecl_lat.to_radians();
    let ra_deg = normalize_deg(
        (lam.sin() * eps.cos() - bet.tan() * eps.sin())
            .atan2(lam.cos())
            .to_degrees(),
    );
    let dec_deg = (bet.sin() * eps.cos() + bet.cos() * eps.sin() * lam.sin())
        .asin()
        .to_degrees();

    let (azimuth_deg, elevation_deg) = equatorial_to_horizontal(ra_deg, dec_deg, lat_deg, lon_deg, jd);

    MoonSample {
        time: t,
        azimuth_deg,
        elevation_deg,
        phase: elongation / 360.0,
        illumination: (1.0 - d.cos()) / 2.0,
        mass: MEAN_LUNAR_DISTANCE_KM / distance_km,
        distance_km,
    }
}

/// Generate a sun track: `start` to `start + duration` at `step_minutes`
/// intervals, both endpoints included, timestamps strictly increasing.
pub fn compute_track(params: &TrackParameters) -> Vec<SunSample> {
    let steps = (params.duration_hours * 60.0 / params.step_minutes as f64).floor() as i64;
    let mut samples = Vec::with_capacity(steps as usize + 1);
    for i in 0..=steps {
        let t = params.start + Duration::minutes(i * params.step_minutes as i64);
        samples.push(sun_sample(
            params.location.latitude,
            params.location.longitude,
            t,
        ));
    }
    samples
}

/// Sunrise and sunset for the UTC calendar day containing `date`.
///
/// Samples at 30-minute resolution: the first upward crossing of the
/// civil horizon is sunrise, the first subsequent downward crossing is
/// sunset. Events absent within the day (polar day/night, or a day that
/// starts with the sun already up) are `None`.
pub fn solve_sunrise_sunset(lat_deg: f64, lon_deg: f64, date: DateTime<Utc>) -> DaySolarEvents {
    let day_start = date
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();

    let mut sunrise = None;
    let mut sunset = None;
    let mut prev = sun_position(lat_deg, lon_deg, day_start).elevation_deg;

    for step in 1..48 {
        let t = day_start + Duration::minutes(step * 30);
        let cur = sun_position(lat_deg, lon_deg, t).elevation_deg;
        if sunrise.is_none() && prev < CIVIL_HORIZON_DEG && cur >= CIVIL_HORIZON_DEG {
            sunrise = Some(t);
        } else if sunrise.is_some()
            && sunset.is_none()
            && prev >= CIVIL_HORIZON_DEG
            && cur < CIVIL_HORIZON_DEG
        {
            sunset = Some(t);
        }
        prev = cur;
    }

    DaySolarEvents { sunrise, sunset }
}

/// Next upward crossing of the civil horizon after `from`, minute
/// resolution, 48-hour window. `None` when no crossing occurs in the
/// window (polar regions).
pub fn find_next_sunrise(lat_deg: f64, lon_deg: f64, from: DateTime<Utc>) -> Option<HorizonEvent> {
    scan_horizon(lat_deg, lon_deg, from, true)
}

/// Next downward crossing of the civil horizon after `from`, minute
/// resolution, 48-hour window.
pub fn find_next_sunset(lat_deg: f64, lon_deg: f64, from: DateTime<Utc>) -> Option<HorizonEvent> {
    scan_horizon(lat_deg, lon_deg, from, false)
}

fn scan_horizon(lat_deg: f64, lon_deg: f64, from: DateTime<Utc>, rising: bool) -> Option<HorizonEvent> {
    let mut prev = sun_position(lat_deg, lon_deg, from).elevation_deg;
    for minute in 1..=SCAN_WINDOW_MIN {
        let t = from + Duration::minutes(minute);
        let pos = sun_position(lat_deg, lon_deg, t);
        let crossed = if rising {
            prev < CIVIL_HORIZON_DEG && pos.elevation_deg >= CIVIL_HORIZON_DEG
        } else {
            prev >= CIVIL_HORIZON_DEG && pos.elevation_deg < CIVIL_HORIZON_DEG
        };
        if crossed {
            return Some(HorizonEvent {
                time: t,
                azimuth_deg: pos.azimuth_deg,
            });
        }
        prev = pos.elevation_deg;
    }
    None
}

/// Paired sun and moon samples for one instant.
pub fn celestial_snapshot(lat_deg: f64, lon_deg: f64, t: DateTime<Utc>) -> CelestialSnapshot {
    CelestialSnapshot {
        time: t,
        sun: sun_sample(lat_deg, lon_deg, t),
        moon: moon_sample(lat_deg, lon_deg, t),
    }
}
