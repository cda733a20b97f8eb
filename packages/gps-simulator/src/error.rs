//! error.rs — Error taxonomy for the simulator
//!
//! Configuration errors surface synchronously from `Simulator::new` and
//! `Simulator::update_config`; resource errors (track files, sinks) surface from
//! construction. Runtime anomalies inside the tick are never errors: they are
//! neutralised and logged so a long run does not die on a transient glitch.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("number of satellites must be between 4 and 12 (got {0})")]
    SatelliteCount(usize),
    #[error("radius must be non-negative (got {0})")]
    Radius(f64),
    #[error("jitter must be between 0.0 and 1.0 (got {0})")]
    Jitter(f64),
    #[error("altitude jitter must be between 0.0 and 1.0 (got {0})")]
    AltitudeJitter(f64),
    #[error("baud rate must be positive")]
    BaudRate,
    #[error("output rate must be positive")]
    OutputRate,
    #[error("{field} must be at most ten years (got {secs} s)")]
    SpanTooLong { field: &'static str, secs: f64 },
    #[error("speed must be non-negative (got {0})")]
    Speed(f64),
    #[error("course must be between 0.0 and 359.9 degrees (got {0})")]
    Course(f64),
    #[error("replay speed must be positive (got {0})")]
    ReplaySpeed(f64),
    #[error("bounce jitter threshold must be between 0.0 and 1.0 (got {0})")]
    BounceThreshold(f64),
    #[error("{0} cannot be changed on a live simulator")]
    ImmutableField(&'static str),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Error)]
pub enum GpxError {
    #[error("failed to access GPX file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse GPX file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("no track points or route points found in GPX file {0}")]
    NoPoints(PathBuf),
    #[error("failed to encode GPX data: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("track file error: {0}")]
    Track(#[from] GpxError),
    #[error("simulator is already running")]
    AlreadyRunning,
    #[error("simulator is not running")]
    NotRunning,
    #[error("failed to open output sink: {0}")]
    Sink(#[source] std::io::Error),
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
