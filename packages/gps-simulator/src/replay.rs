//! replay.rs — Track replay engine
//!
//! Drives `NavState` from a loaded track instead of procedural motion.
//!
//! States: NotStarted → Playing → { Completed | Looping → Playing }
//!
//! Two progression modes, picked once by inspecting the track:
//! - Timestamped: elapsed × speed is mapped onto the track's own clock; the
//!   cursor is the last point whose timestamp is ≤ the target time
//! - Indexed: one point per 1/speed seconds, for tracks without usable times
//!
//! The cursor index lives in [0, len]; `len` only once a non-looping replay
//! has completed.

use std::time::{Duration, Instant};

use gps_types::{ReplayProgress, TrackPoint};
use tracing::{debug, info, warn};

use crate::geo::{self, MPS_TO_KNOTS};
use crate::motion::NavState;

// ── Classification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progression {
    Timestamped,
    Indexed,
}

/// Timestamped when there are at least two points, every point has a time, and
/// the times never go backwards. Anything else replays by index.
pub fn classify(points: &[TrackPoint]) -> Progression {
    if points.len() < 2 {
        return Progression::Indexed;
    }
    let sequential = points.windows(2).all(|w| match (w[0].time, w[1].time) {
        (Some(a), Some(b)) => b >= a,
        _ => false,
    });
    if sequential { Progression::Timestamped } else { Progression::Indexed }
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    NotStarted,
    Playing,
    Completed,
}

/// Outcome of one replay tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayTick {
    /// Empty track; nothing to do
    Idle,
    Advanced { index: usize },
    /// End reached with looping on; cursor and clock reset
    Looped,
    /// End reached without looping; position held at the last point
    Completed,
}

#[derive(Debug, Clone)]
pub struct ReplayEngine {
    points: Vec<TrackPoint>,
    progression: Progression,
    /// Seconds from the first timestamp, only for timestamped tracks
    offsets: Vec<f64>,
    state: ReplayState,
    index: usize,
    started_at: Option<Instant>,
    loops: u32,
}

impl ReplayEngine {
    pub fn new(points: Vec<TrackPoint>) -> Self {
        let progression = classify(&points);
        let offsets = match (progression, points.first().and_then(|p| p.time)) {
            (Progression::Timestamped, Some(first)) => points
                .iter()
                .map(|p| {
                    p.time
                        .and_then(|t| (t - first).to_std().ok())
                        .map(|d| d.as_secs_f64())
                        .unwrap_or(0.0)
                })
                .collect(),
            _ => Vec::new(),
        };
        info!(
            "Replay track loaded: {} points, {:?} progression",
            points.len(),
            progression
        );
        Self {
            points,
            progression,
            offsets,
            state: ReplayState::NotStarted,
            index: 0,
            started_at: None,
            loops: 0,
        }
    }

    pub fn progression(&self) -> Progression {
        self.progression
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    pub fn progress(&self) -> ReplayProgress {
        ReplayProgress {
            index: self.index,
            total: self.points.len(),
            completed: self.state == ReplayState::Completed,
        }
    }

    /// Back to NotStarted; the clock restarts on the next tick.
    pub fn reset(&mut self) {
        self.state = ReplayState::NotStarted;
        self.index = 0;
        self.started_at = None;
        self.loops = 0;
    }

    /// Place the receiver on the first point, e.g. before lock is acquired.
    pub fn seed(&self, nav: &mut NavState) {
        if let Some(first) = self.points.first() {
            nav.lat = first.lat;
            nav.lon = first.lon;
            nav.alt = first.elevation;
        }
    }

    /// Cursor for a given elapsed time. Returns `len` once past the end of a
    /// non-looping (or timestamped) track.
    pub fn cursor_for(&self, elapsed: Duration, speed: f64, looping: bool) -> usize {
        let len = self.points.len();
        if len == 0 {
            return 0;
        }
        let played = elapsed.as_secs_f64() * speed;

        match self.progression {
            Progression::Timestamped => {
                let last = self.offsets.last().copied().unwrap_or(0.0);
                if played > last {
                    return len;
                }
                // offsets[0] == 0 ≤ played, so at least one point qualifies
                self.offsets.partition_point(|&o| o <= played).saturating_sub(1)
            }
            Progression::Indexed => {
                let n = played.floor() as usize;
                if looping { n % len } else { n.min(len) }
            }
        }
    }

    /// Advance the cursor to `now` and write the cursor point into `nav`.
    pub fn tick(&mut self, now: Instant, speed: f64, looping: bool, nav: &mut NavState) -> ReplayTick {
        if self.points.is_empty() {
            return ReplayTick::Idle;
        }
        if self.state == ReplayState::Completed {
            return ReplayTick::Completed;
        }

        let speed = if speed > 0.0 && speed.is_finite() {
            speed
        } else {
            warn!("Replay speed {speed} is not positive, using 1.0");
            1.0
        };

        let started = *self.started_at.get_or_insert(now);
        self.state = ReplayState::Playing;

        let elapsed = now.saturating_duration_since(started);
        let cursor = self.cursor_for(elapsed, speed, looping);
        let len = self.points.len();

        if cursor >= len {
            if looping {
                self.loops += 1;
                self.index = 0;
                self.started_at = Some(now);
                self.apply(0, nav);
                info!("Replay looped (pass {})", self.loops + 1);
                return ReplayTick::Looped;
            }
            self.state = ReplayState::Completed;
            self.index = len;
            self.apply(len - 1, nav);
            info!("Replay completed after {len} points");
            return ReplayTick::Completed;
        }

        self.index = cursor;
        self.apply(cursor, nav);
        debug!("Replay cursor {cursor}/{len}");
        ReplayTick::Advanced { index: cursor }
    }

    /// Position from point `i`; speed and course from the leg to `i + 1`.
    fn apply(&self, i: usize, nav: &mut NavState) {
        let current = &self.points[i];
        nav.lat = current.lat;
        nav.lon = current.lon;
        nav.alt = current.elevation;

        let Some(next) = self.points.get(i + 1) else {
            return;
        };
        let distance = geo::distance_m(current.lat, current.lon, next.lat, next.lon);
        let leg_secs = match (self.progression, current.time, next.time) {
            (Progression::Timestamped, Some(a), Some(b)) => {
                (b - a).num_milliseconds() as f64 / 1000.0
            }
            _ => 1.0,
        };
        if leg_secs > 0.0 {
            nav.speed = distance / leg_secs * MPS_TO_KNOTS;
            nav.course = geo::bearing_deg(current.lat, current.lon, next.lat, next.lon);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(secs: i64) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs))
    }

    /// Points 0.001° of latitude apart (~111 m), heading north.
    fn track(times: &[Option<DateTime<Utc>>]) -> Vec<TrackPoint> {
        times
            .iter()
            .enumerate()
            .map(|(i, &time)| TrackPoint::new(40.0 + i as f64 * 0.001, -75.0, 10.0 + i as f64, time))
            .collect()
    }

    fn nav() -> NavState {
        NavState { lat: 0.0, lon: 0.0, alt: 0.0, speed: 0.0, course: 0.0 }
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&[]), Progression::Indexed);
        assert_eq!(classify(&track(&[t(0)])), Progression::Indexed);
        assert_eq!(classify(&track(&[t(0), t(5), t(5), t(9)])), Progression::Timestamped);
        assert_eq!(classify(&track(&[t(0), t(10), t(5)])), Progression::Indexed);
        assert_eq!(classify(&track(&[t(0), None, t(5)])), Progression::Indexed);
        assert_eq!(classify(&track(&[None, None])), Progression::Indexed);
    }

    #[test]
    fn timestamped_cursor_is_last_point_not_after_target() {
        let engine = ReplayEngine::new(track(&[t(0), t(10), t(20), t(30)]));
        let at = |s: f64| engine.cursor_for(Duration::from_secs_f64(s), 1.0, false);
        assert_eq!(at(0.0), 0);
        assert_eq!(at(9.9), 0);
        assert_eq!(at(10.0), 1);
        assert_eq!(at(25.0), 2);
        assert_eq!(at(30.0), 3);
        assert_eq!(at(30.1), 4);
    }

    #[test]
    fn replay_speed_scales_track_clock() {
        let engine = ReplayEngine::new(track(&[t(0), t(10), t(20), t(30)]));
        assert_eq!(engine.cursor_for(Duration::from_secs(5), 2.0, false), 1);
        assert_eq!(engine.cursor_for(Duration::from_secs(20), 0.5, false), 1);
    }

    #[test]
    fn indexed_cursor_wraps_only_when_looping() {
        let engine = ReplayEngine::new(track(&[t(10), t(0), t(20)]));
        assert_eq!(engine.progression(), Progression::Indexed);
        assert_eq!(engine.cursor_for(Duration::from_millis(2500), 1.0, false), 2);
        assert_eq!(engine.cursor_for(Duration::from_secs(7), 1.0, false), 3);
        assert_eq!(engine.cursor_for(Duration::from_secs(7), 1.0, true), 1);
        assert_eq!(engine.cursor_for(Duration::from_secs(1), 4.0, true), 1);
    }

    #[test]
    fn tick_moves_through_states_and_completes() {
        let mut engine = ReplayEngine::new(track(&[t(0), t(1), t(2)]));
        let mut nav = nav();
        assert_eq!(engine.state(), ReplayState::NotStarted);

        let t0 = Instant::now();
        assert_eq!(engine.tick(t0, 1.0, false, &mut nav), ReplayTick::Advanced { index: 0 });
        assert_eq!(engine.state(), ReplayState::Playing);
        assert_eq!(nav.lat, 40.0);

        let out = engine.tick(t0 + Duration::from_millis(1500), 1.0, false, &mut nav);
        assert_eq!(out, ReplayTick::Advanced { index: 1 });

        let out = engine.tick(t0 + Duration::from_secs(5), 1.0, false, &mut nav);
        assert_eq!(out, ReplayTick::Completed);
        assert_eq!(engine.state(), ReplayState::Completed);
        assert_eq!(engine.progress(), ReplayProgress { index: 3, total: 3, completed: true });
        assert!((nav.lat - 40.002).abs() < 1e-12);

        // Completed is terminal; position is held
        let out = engine.tick(t0 + Duration::from_secs(50), 1.0, false, &mut nav);
        assert_eq!(out, ReplayTick::Completed);
        assert!((nav.lat - 40.002).abs() < 1e-12);
    }

    #[test]
    fn looping_resets_cursor_and_clock() {
        let mut engine = ReplayEngine::new(track(&[t(0), t(1), t(2)]));
        let mut nav = nav();
        let t0 = Instant::now();
        engine.tick(t0, 1.0, true, &mut nav);

        let wrap = t0 + Duration::from_secs(3);
        assert_eq!(engine.tick(wrap, 1.0, true, &mut nav), ReplayTick::Looped);
        assert_eq!(engine.index(), 0);
        assert_eq!(engine.loops(), 1);
        assert!(!engine.progress().completed);

        // elapsed is measured from the wrap, not from t0
        let out = engine.tick(wrap + Duration::from_millis(1200), 1.0, true, &mut nav);
        assert_eq!(out, ReplayTick::Advanced { index: 1 });
    }

    #[test]
    fn non_positive_speed_is_coerced() {
        let mut engine = ReplayEngine::new(track(&[t(0), t(1), t(2)]));
        let mut nav = nav();
        let t0 = Instant::now();
        engine.tick(t0, 0.0, false, &mut nav);
        let out = engine.tick(t0 + Duration::from_millis(1100), -4.0, false, &mut nav);
        assert_eq!(out, ReplayTick::Advanced { index: 1 });
    }

    #[test]
    fn speed_and_course_come_from_next_leg() {
        let mut engine = ReplayEngine::new(track(&[t(0), t(10), t(20)]));
        let mut nav = nav();
        engine.tick(Instant::now(), 1.0, false, &mut nav);
        let leg = geo::distance_m(40.0, -75.0, 40.001, -75.0);
        assert!((nav.speed - leg / 10.0 * MPS_TO_KNOTS).abs() < 1e-9);
        assert!(nav.course.abs() < 1e-9);
        assert_eq!(nav.alt, 10.0);
    }

    #[test]
    fn indexed_tracks_assume_one_second_legs() {
        let mut engine = ReplayEngine::new(track(&[None, None, None]));
        let mut nav = nav();
        engine.tick(Instant::now(), 1.0, false, &mut nav);
        let leg = geo::distance_m(40.0, -75.0, 40.001, -75.0);
        assert!((nav.speed - leg * MPS_TO_KNOTS).abs() < 1e-9);
    }

    #[test]
    fn reset_returns_to_not_started() {
        let mut engine = ReplayEngine::new(track(&[t(0), t(1)]));
        let mut nav = nav();
        let t0 = Instant::now();
        engine.tick(t0, 1.0, false, &mut nav);
        engine.tick(t0 + Duration::from_secs(9), 1.0, false, &mut nav);
        assert_eq!(engine.state(), ReplayState::Completed);
        engine.reset();
        assert_eq!(engine.state(), ReplayState::NotStarted);
        assert_eq!(engine.progress().index, 0);
    }

    #[test]
    fn empty_track_is_idle() {
        let mut engine = ReplayEngine::new(Vec::new());
        let mut nav = nav();
        assert_eq!(engine.tick(Instant::now(), 1.0, false, &mut nav), ReplayTick::Idle);
    }
}
