//! config.rs — Simulation parameters and validation
//!
//! A `Config` is immutable once validated. A running simulator may receive a
//! replacement through `Simulator::update_config`, which re-validates it and
//! refuses changes to the fields that size the instance (satellite count,
//! replay track).
//!
//! Every field is defaulted, so partial TOML files and partial JSON bodies from
//! the control plane both deserialize. Durations are seconds as floats.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const MIN_SATELLITES: usize = 4;
pub const MAX_SATELLITES: usize = 12;
/// Longest lock time, output period or run duration accepted.
pub const MAX_SPAN: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin latitude, decimal degrees
    pub latitude: f64,
    /// Origin longitude, decimal degrees
    pub longitude: f64,
    /// Wander radius around the origin, meters (0 = unbounded)
    pub radius: f64,
    /// Starting altitude, meters
    pub altitude: f64,
    /// Position/speed/course jitter factor, 0.0–1.0
    pub jitter: f64,
    /// Altitude jitter factor, 0.0–1.0
    pub altitude_jitter: f64,
    /// Commanded speed, knots
    pub speed: f64,
    /// Commanded course, degrees true in [0, 360)
    pub course: f64,
    pub satellites: usize,
    #[serde(with = "secs")]
    pub time_to_lock: Duration,
    #[serde(with = "secs")]
    pub output_rate: Duration,
    /// Serial device for NMEA output (e.g. /dev/ttyUSB0, COM1)
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    /// Record the simulated track to this GPX file
    pub track_output: Option<PathBuf>,
    /// GPX file to replay instead of simulating
    pub replay_file: Option<PathBuf>,
    /// Replay speed multiplier (1.0 = real time)
    pub replay_speed: f64,
    pub replay_loop: bool,
    /// Stop automatically after this long (`None` = run until stopped)
    #[serde(with = "opt_secs")]
    pub duration: Option<Duration>,
    /// Above this jitter the wander boundary bounces instead of clamping
    pub bounce_jitter_threshold: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latitude: 37.7749, // San Francisco
            longitude: -122.4194,
            radius: 100.0,
            altitude: 45.0,
            jitter: 0.0,
            altitude_jitter: 0.0,
            speed: 0.0,
            course: 0.0,
            satellites: 8,
            time_to_lock: Duration::from_secs(2),
            output_rate: Duration::from_secs(1),
            serial_port: None,
            baud_rate: 9600,
            track_output: None,
            replay_file: None,
            replay_speed: 1.0,
            replay_loop: false,
            duration: None,
            bounce_jitter_threshold: 0.5,
            seed: None,
        }
    }
}

impl Config {
    /// Reject out-of-range values. Never corrects them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SATELLITES..=MAX_SATELLITES).contains(&self.satellites) {
            return Err(ConfigError::SatelliteCount(self.satellites));
        }
        if !(self.radius >= 0.0) {
            return Err(ConfigError::Radius(self.radius));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Jitter(self.jitter));
        }
        if !(0.0..=1.0).contains(&self.altitude_jitter) {
            return Err(ConfigError::AltitudeJitter(self.altitude_jitter));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::BaudRate);
        }
        if self.output_rate.is_zero() {
            return Err(ConfigError::OutputRate);
        }
        let spans = [
            ("time_to_lock", Some(self.time_to_lock)),
            ("output_rate", Some(self.output_rate)),
            ("duration", self.duration),
        ];
        for (field, span) in spans {
            if let Some(span) = span.filter(|s| *s > MAX_SPAN) {
                return Err(ConfigError::SpanTooLong { field, secs: span.as_secs_f64() });
            }
        }
        if !(self.speed >= 0.0) {
            return Err(ConfigError::Speed(self.speed));
        }
        if !(0.0..360.0).contains(&self.course) {
            return Err(ConfigError::Course(self.course));
        }
        if !(self.replay_speed > 0.0) {
            return Err(ConfigError::ReplaySpeed(self.replay_speed));
        }
        if !(0.0..=1.0).contains(&self.bounce_jitter_threshold) {
            return Err(ConfigError::BounceThreshold(self.bounce_jitter_threshold));
        }
        Ok(())
    }

    /// Validate `next` as a hot-swap replacement for `self`.
    pub fn validate_replacement(&self, next: &Config) -> Result<(), ConfigError> {
        next.validate()?;
        if next.satellites != self.satellites {
            return Err(ConfigError::ImmutableField("satellite count"));
        }
        if next.replay_file != self.replay_file {
            return Err(ConfigError::ImmutableField("replay file"));
        }
        Ok(())
    }

    pub fn is_replay(&self) -> bool {
        self.replay_file.is_some()
    }

    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }
}

// ── Duration (de)serialization as float seconds ───────────────────────────────

mod secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = f64::deserialize(d)?;
        Duration::try_from_secs_f64(raw).map_err(D::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    /// `0` and absent both mean "run indefinitely".
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<f64>::deserialize(d)? {
            None => Ok(None),
            Some(raw) => {
                let dur = Duration::try_from_secs_f64(raw).map_err(D::Error::custom)?;
                Ok((!dur.is_zero()).then_some(dur))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_each_out_of_range_field() {
        let cases: Vec<(Config, &str)> = vec![
            (Config { satellites: 3, ..Default::default() }, "satellites"),
            (Config { satellites: 13, ..Default::default() }, "satellites"),
            (Config { radius: -1.0, ..Default::default() }, "radius"),
            (Config { jitter: 1.1, ..Default::default() }, "jitter"),
            (Config { jitter: -0.1, ..Default::default() }, "jitter"),
            (Config { altitude_jitter: 2.0, ..Default::default() }, "altitude jitter"),
            (Config { baud_rate: 0, ..Default::default() }, "baud"),
            (Config { output_rate: Duration::ZERO, ..Default::default() }, "output rate"),
            (Config { speed: -0.5, ..Default::default() }, "speed"),
            (Config { course: 360.0, ..Default::default() }, "course"),
            (Config { course: -1.0, ..Default::default() }, "course"),
            (Config { replay_speed: 0.0, ..Default::default() }, "replay speed"),
            (Config { bounce_jitter_threshold: 1.5, ..Default::default() }, "bounce"),
        ];
        for (cfg, what) in cases {
            let err = cfg.validate().expect_err(what);
            assert!(err.to_string().contains(what), "{what}: {err}");
        }
    }

    #[test]
    fn nan_values_are_rejected() {
        assert!(Config { radius: f64::NAN, ..Default::default() }.validate().is_err());
        assert!(Config { speed: f64::NAN, ..Default::default() }.validate().is_err());
        assert!(Config { replay_speed: f64::NAN, ..Default::default() }.validate().is_err());
    }

    #[test]
    fn boundary_values_are_accepted() {
        let cfg = Config {
            satellites: 12,
            radius: 0.0,
            jitter: 1.0,
            altitude_jitter: 1.0,
            course: 359.9,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn spans_beyond_ten_years_are_rejected() {
        for body in [r#"{"time_to_lock": 1e19}"#, r#"{"duration": 1e19}"#, r#"{"output_rate": 4e8}"#] {
            let cfg: Config = serde_json::from_str(body).unwrap();
            assert!(
                matches!(cfg.validate(), Err(ConfigError::SpanTooLong { .. })),
                "{body} should be rejected"
            );
        }
        let longest = Config { time_to_lock: MAX_SPAN, duration: Some(MAX_SPAN), ..Default::default() };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn replacement_cannot_resize_instance() {
        let live = Config::default();
        let more_sats = Config { satellites: 10, ..Default::default() };
        assert!(matches!(
            live.validate_replacement(&more_sats),
            Err(ConfigError::ImmutableField(_))
        ));
        let other_track = Config { replay_file: Some("x.gpx".into()), ..Default::default() };
        assert!(live.validate_replacement(&other_track).is_err());
        let faster = Config { speed: 12.0, output_rate: Duration::from_millis(200), ..Default::default() };
        assert!(live.validate_replacement(&faster).is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = Config::from_toml_str(
            "latitude = 51.5\nradius = 250.0\ntime_to_lock = 0.5\nduration = 30\n",
            Path::new("inline.toml"),
        )
        .unwrap();
        assert_eq!(cfg.latitude, 51.5);
        assert_eq!(cfg.radius, 250.0);
        assert_eq!(cfg.time_to_lock, Duration::from_millis(500));
        assert_eq!(cfg.duration, Some(Duration::from_secs(30)));
        assert_eq!(cfg.satellites, 8);
        assert_eq!(cfg.longitude, -122.4194);
    }

    #[test]
    fn zero_duration_means_indefinite() {
        let cfg = Config::from_toml_str("duration = 0\n", Path::new("inline.toml")).unwrap();
        assert_eq!(cfg.duration, None);
    }

    #[test]
    fn negative_duration_fails_to_parse() {
        let err = Config::from_toml_str("output_rate = -1.0\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn json_body_uses_same_field_names() {
        let cfg: Config =
            serde_json::from_str(r#"{"latitude": 48.85, "speed": 5.0, "replay_loop": true}"#).unwrap();
        assert_eq!(cfg.latitude, 48.85);
        assert_eq!(cfg.speed, 5.0);
        assert!(cfg.replay_loop);
        assert_eq!(cfg.output_rate, Duration::from_secs(1));
    }
}
