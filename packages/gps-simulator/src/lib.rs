//! # gps-simulator
//!
//! Simulated GPS receiver emitting NMEA 0183 sentences.
//!
//! A `Simulator` either wanders around an origin (procedural motion with
//! configurable jitter, speed and course) or replays a GPX track, and after a
//! simulated time-to-lock emits GGA/RMC/GLL/VTG/GSA/GSV/ZDA at a fixed output
//! rate. Sentences go to a `SentenceSink` (stdout, file, serial, UDP) and to
//! any registered observers.
//!
//! ```no_run
//! use gps_simulator::{Config, SentenceSink, Simulator};
//!
//! # async fn demo() -> gps_simulator::Result<()> {
//! let sim = Simulator::new(Config { jitter: 0.3, ..Default::default() }, SentenceSink::stdout())?;
//! sim.add_observer(|data| eprintln!("{} sentences", data.sentences.len())).await;
//! sim.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod geo;
pub mod gpx;
pub mod motion;
pub mod nmea;
pub mod replay;
pub mod satellites;
pub mod simulator;
pub mod sink;

pub use config::Config;
pub use error::{ConfigError, GpxError, Result, SimError};
pub use gps_types::{NmeaData, Position, ReplayProgress, Satellite, TrackPoint};
pub use simulator::{Simulator, Status};
pub use sink::SentenceSink;
