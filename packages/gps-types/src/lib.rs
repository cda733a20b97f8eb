//! # gps-types
//!
//! Shared snapshot structures for the NMEA GPS simulator.
//!
//! These types are used by:
//! - `gps-simulator`: the engine produces them every tick
//! - the control plane: serializes them as JSON for HTTP/WebSocket clients
//! - observers registered on a running simulator
//!
//! ## Conventions
//!
//! - Latitude/longitude in decimal degrees (WGS84, north/east positive)
//! - Altitude and elevation in meters above mean sea level
//! - Speed in knots, course in degrees true (0 = north, clockwise)
//! - All timestamps are UTC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Satellites ────────────────────────────────────────────────────────────────

/// One simulated satellite in view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Satellite {
    /// PRN, stable for the lifetime of a simulator instance
    pub id: u32,
    /// Degrees above the horizon
    pub elevation: i32,
    /// Degrees from true north
    pub azimuth: i32,
    /// Signal-to-noise ratio, dB-Hz
    pub snr: i32,
}

// ── Track points ──────────────────────────────────────────────────────────────

/// One point of a recorded or replayed track.
/// Sequences of these are ordered but not assumed sorted by time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
    /// `None` when the source file carried no `<time>` for this point
    pub time: Option<DateTime<Utc>>,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64, elevation: f64, time: Option<DateTime<Utc>>) -> Self {
        Self { lat, lon, elevation, time }
    }
}

// ── Position snapshot ─────────────────────────────────────────────────────────

/// Read-only snapshot of the simulated receiver at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Knots, never negative
    pub speed: f64,
    /// Degrees true, always in [0, 360)
    pub course: f64,
    pub is_locked: bool,
    pub satellites: Vec<Satellite>,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn satellite_count(&self) -> usize {
        self.satellites.len()
    }
}

/// Everything produced by one simulator tick, handed to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NmeaData {
    /// Complete sentences, each `$...*XX\r\n`
    pub sentences: Vec<String>,
    pub position: Position,
    pub timestamp: DateTime<Utc>,
}

// ── Replay progress ───────────────────────────────────────────────────────────

/// Cursor state of a track replay.
/// `index == total` only once a non-looping replay has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayProgress {
    pub index: usize,
    pub total: usize,
    pub completed: bool,
}

impl ReplayProgress {
    /// Fraction of the track played, 0.0–1.0
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.index.min(self.total) as f64 / self.total as f64
    }
}
