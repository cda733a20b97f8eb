//! motion.rs — Procedural motion model
//!
//! Wanders the receiver around a configured origin:
//! - Speed and course jitter around the *configured* values, in four tiers
//! - Great-circle displacement from speed × elapsed time
//! - Stationary jitter, so a parked receiver still shows position noise
//! - Wander-radius enforcement: bounce (high jitter) or clamp (low/medium)
//! - Altitude random walk inside a band around the starting altitude
//!
//! Pure math over `NavState`; the caller supplies the elapsed time and the RNG.

use rand::Rng;

use crate::config::Config;
use crate::geo::{self, KNOTS_TO_MPS};

/// Bounced positions may overshoot the radius by this fraction before they
/// are clamped back onto the boundary.
pub const BOUNCE_TOLERANCE: f64 = 0.05;

/// Stationary-jitter ceiling when no wander radius is set, meters.
const UNBOUNDED_NOISE_CEILING_M: f64 = 10.0;
/// Stationary-jitter ceiling as a fraction of the wander radius.
const RADIUS_NOISE_FRACTION: f64 = 0.1;

// ── Navigation state ──────────────────────────────────────────────────────────

/// The mutable kinematic state shared by the motion model and the replay engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavState {
    pub lat: f64,
    pub lon: f64,
    /// Meters
    pub alt: f64,
    /// Knots, never negative
    pub speed: f64,
    /// Degrees true, [0, 360)
    pub course: f64,
}

impl NavState {
    /// Receiver parked at the configured origin with the commanded speed/course.
    pub fn at_origin(cfg: &Config) -> Self {
        Self {
            lat: cfg.latitude,
            lon: cfg.longitude,
            alt: cfg.altitude,
            speed: cfg.speed,
            course: cfg.course,
        }
    }
}

/// What radius enforcement did on one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Δt was not positive; nothing moved
    Skipped,
    Inside,
    /// Course perturbed and displacement recomputed
    Bounced,
    /// Placed on the radius circle
    Clamped,
}

/// Speed fraction and course half-width (degrees) for a jitter factor.
pub fn jitter_bounds(jitter: f64) -> (f64, f64) {
    if jitter <= 0.0 {
        (0.0, 0.0)
    } else if jitter < 0.2 {
        (0.05, 2.0)
    } else if jitter < 0.7 {
        (0.10 + (jitter - 0.2) * 0.40, 5.0 + (jitter - 0.2) * 20.0)
    } else {
        (0.30 + (jitter - 0.7) * 0.67, 15.0 + (jitter - 0.7) * 50.0)
    }
}

// ── Motion model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MotionModel {
    origin_lat: f64,
    origin_lon: f64,
    radius: f64,
    base_altitude: f64,
    jitter: f64,
    altitude_jitter: f64,
    speed: f64,
    course: f64,
    bounce_threshold: f64,
}

impl MotionModel {
    pub fn new(cfg: &Config) -> Self {
        Self {
            origin_lat: cfg.latitude,
            origin_lon: cfg.longitude,
            radius: cfg.radius,
            base_altitude: cfg.altitude,
            jitter: cfg.jitter,
            altitude_jitter: cfg.altitude_jitter,
            speed: cfg.speed,
            course: cfg.course,
            bounce_threshold: cfg.bounce_jitter_threshold,
        }
    }

    /// Full tick: speed/course jitter, displacement, altitude drift.
    pub fn step<R: Rng + ?Sized>(&self, nav: &mut NavState, dt: f64, rng: &mut R) -> Boundary {
        self.jitter_speed_and_course(nav, rng);
        let boundary = self.advance_position(nav, dt, rng);
        self.drift_altitude(nav, rng);
        boundary
    }

    /// Redraw speed and course around the configured values.
    pub fn jitter_speed_and_course<R: Rng + ?Sized>(&self, nav: &mut NavState, rng: &mut R) {
        let (speed_frac, course_width) = jitter_bounds(self.jitter);
        if speed_frac == 0.0 && course_width == 0.0 {
            nav.speed = self.speed;
            nav.course = self.course;
            return;
        }

        let speed_delta = rng.gen_range(-1.0..=1.0) * self.speed * speed_frac;
        nav.speed = (self.speed + speed_delta).max(0.0);

        let course_delta = rng.gen_range(-1.0..=1.0) * course_width;
        nav.course = geo::normalize_course(self.course + course_delta);
    }

    /// Move along the current course for `dt` seconds, then enforce the radius.
    pub fn advance_position<R: Rng + ?Sized>(&self, nav: &mut NavState, dt: f64, rng: &mut R) -> Boundary {
        if !(dt > 0.0) || !dt.is_finite() {
            return Boundary::Skipped;
        }

        let travel_m = nav.speed * KNOTS_TO_MPS * dt;
        let noise = self.stationary_offset(rng);
        let (mut lat, mut lon) = project(nav.lat, nav.lon, travel_m, nav.course, noise);
        let mut boundary = Boundary::Inside;

        if self.radius > 0.0 && self.distance_from_origin(lat, lon) > self.radius {
            if self.jitter > self.bounce_threshold {
                let turn = rng.gen_range(30.0..=45.0);
                let turn = if rng.gen_bool(0.5) { turn } else { -turn };
                nav.course = geo::normalize_course(nav.course + turn);
                (lat, lon) = project(nav.lat, nav.lon, travel_m, nav.course, noise);
                boundary = Boundary::Bounced;

                if self.distance_from_origin(lat, lon) > self.radius * (1.0 + BOUNCE_TOLERANCE) {
                    (lat, lon) = self.onto_boundary(lat, lon);
                    boundary = Boundary::Clamped;
                }
            } else {
                (lat, lon) = self.onto_boundary(lat, lon);
                boundary = Boundary::Clamped;
            }
        }

        nav.lat = lat;
        nav.lon = lon;
        boundary
    }

    /// Random walk on altitude. Zero altitude jitter leaves it untouched.
    pub fn drift_altitude<R: Rng + ?Sized>(&self, nav: &mut NavState, rng: &mut R) {
        if self.altitude_jitter <= 0.0 {
            return;
        }

        let max_change = 1.0 + self.altitude_jitter * 20.0;
        let next = nav.alt + rng.gen_range(-max_change..=max_change);

        let (floor, ceiling) = self.altitude_band();
        nav.alt = if next < floor {
            floor
        } else if next > ceiling {
            ceiling
        } else {
            next
        };
    }

    pub fn altitude_band(&self) -> (f64, f64) {
        ((self.base_altitude - 100.0).max(-50.0), self.base_altitude + 500.0)
    }

    pub fn distance_from_origin(&self, lat: f64, lon: f64) -> f64 {
        geo::distance_m(self.origin_lat, self.origin_lon, lat, lon)
    }

    fn onto_boundary(&self, lat: f64, lon: f64) -> (f64, f64) {
        let bearing = geo::bearing_deg(self.origin_lat, self.origin_lon, lat, lon);
        geo::destination(self.origin_lat, self.origin_lon, self.radius, bearing)
    }

    /// (distance, bearing) of this tick's position noise, if any.
    fn stationary_offset<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(f64, f64)> {
        if self.jitter <= 0.0 {
            return None;
        }
        let ceiling = if self.radius > 0.0 {
            self.radius * RADIUS_NOISE_FRACTION
        } else {
            UNBOUNDED_NOISE_CEILING_M
        };
        let distance = rng.gen_range(0.0..=self.jitter * ceiling);
        let bearing = rng.gen_range(0.0..360.0);
        Some((distance, bearing))
    }
}

/// Travel then apply noise. Zero-length legs leave coordinates bit-identical.
fn project(lat: f64, lon: f64, travel_m: f64, course: f64, noise: Option<(f64, f64)>) -> (f64, f64) {
    let (mut lat, mut lon) = (lat, lon);
    if travel_m > 0.0 {
        (lat, lon) = geo::destination(lat, lon, travel_m, course);
    }
    if let Some((distance, bearing)) = noise {
        if distance > 0.0 {
            (lat, lon) = geo::destination(lat, lon, distance, bearing);
        }
    }
    (lat, lon)
}
