//! main.rs — gps-sim entry point
//!
//! Two modes:
//!   1. Direct: build one simulator from flags (and an optional TOML file),
//!      stream NMEA to stdout / file / serial / UDP until Ctrl+C, the run
//!      duration, or the end of a replayed track
//!   2. `--serve <port>`: HTTP/WebSocket control plane; simulators are started
//!      and stopped by clients
//!
//! NMEA goes to the sink; every log line goes to stderr.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use gps_simulator::control::{self, ControlState, SinkFactory};
use gps_simulator::{Config, SentenceSink, SimError, Simulator};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "gps-sim", version, about = "GPS NMEA0183 simulator")]
struct Args {
    /// TOML config file; explicit flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial latitude (decimal degrees)
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,
    /// Initial longitude (decimal degrees)
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,
    /// Wandering radius in meters (0 = unbounded)
    #[arg(long)]
    radius: Option<f64>,
    /// Starting altitude in meters
    #[arg(long, allow_hyphen_values = true)]
    altitude: Option<f64>,
    /// Position jitter factor (0.0 = stable, 1.0 = high jitter)
    #[arg(long)]
    jitter: Option<f64>,
    /// Altitude jitter factor (0.0 = stable, 1.0 = high variation)
    #[arg(long)]
    altitude_jitter: Option<f64>,
    /// Static speed in knots
    #[arg(long)]
    speed: Option<f64>,
    /// Static course in degrees (0-359.9)
    #[arg(long)]
    course: Option<f64>,
    /// Number of satellites (4-12)
    #[arg(long)]
    satellites: Option<usize>,
    /// Time to GPS lock (e.g. 2s, 500ms)
    #[arg(long, value_parser = parse_duration)]
    lock_time: Option<Duration>,
    /// NMEA output period (e.g. 1s, 200ms)
    #[arg(long, value_parser = parse_duration)]
    rate: Option<Duration>,
    /// Serial port for NMEA output (e.g. /dev/ttyUSB0, COM1)
    #[arg(long)]
    serial: Option<String>,
    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,
    /// Send NMEA as UDP datagrams to host:port
    #[arg(long, conflicts_with_all = ["serial", "output"])]
    udp: Option<String>,
    /// Write NMEA to a file instead of stdout
    #[arg(long, conflicts_with = "serial")]
    output: Option<PathBuf>,
    /// Record a GPX track to a timestamp-named file (requires --duration)
    #[arg(long)]
    gpx: bool,
    /// Stop after this long (e.g. 30s, 5m, 1h; 0 = indefinitely)
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,
    /// GPX file to replay instead of simulating
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Replay speed multiplier (2.0 = twice real time)
    #[arg(long)]
    replay_speed: Option<f64>,
    /// Loop the replay instead of stopping after one pass
    #[arg(long)]
    replay_loop: bool,
    /// Fixed RNG seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
    /// Only warnings and errors on stderr
    #[arg(long, short)]
    quiet: bool,
    /// Run the HTTP/WebSocket control plane on this port instead
    #[arg(long)]
    serve: Option<u16>,
}

/// `500ms`, `2s`, `5m`, `1h`, or bare seconds (`1.5`).
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let parse = |n: &str| n.trim().parse::<f64>().map_err(|_| format!("invalid duration: {raw}"));
    let secs = if let Some(n) = raw.strip_suffix("ms") {
        parse(n)? / 1000.0
    } else if let Some(n) = raw.strip_suffix('s') {
        parse(n)?
    } else if let Some(n) = raw.strip_suffix('m') {
        parse(n)? * 60.0
    } else if let Some(n) = raw.strip_suffix('h') {
        parse(n)? * 3600.0
    } else {
        parse(raw)?
    };
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {raw}: {e}"))
}

impl Args {
    /// Layer explicit flags over `base`.
    fn apply(&self, mut cfg: Config) -> Config {
        if let Some(v) = self.lat { cfg.latitude = v; }
        if let Some(v) = self.lon { cfg.longitude = v; }
        if let Some(v) = self.radius { cfg.radius = v; }
        if let Some(v) = self.altitude { cfg.altitude = v; }
        if let Some(v) = self.jitter { cfg.jitter = v; }
        if let Some(v) = self.altitude_jitter { cfg.altitude_jitter = v; }
        if let Some(v) = self.speed { cfg.speed = v; }
        if let Some(v) = self.course { cfg.course = v; }
        if let Some(v) = self.satellites { cfg.satellites = v; }
        if let Some(v) = self.lock_time { cfg.time_to_lock = v; }
        if let Some(v) = self.rate { cfg.output_rate = v; }
        if let Some(v) = &self.serial { cfg.serial_port = Some(v.clone()); }
        if let Some(v) = self.baud { cfg.baud_rate = v; }
        if let Some(v) = self.duration { cfg.duration = (!v.is_zero()).then_some(v); }
        if let Some(v) = &self.replay { cfg.replay_file = Some(v.clone()); }
        if let Some(v) = self.replay_speed { cfg.replay_speed = v; }
        if self.replay_loop { cfg.replay_loop = true; }
        if let Some(v) = self.seed { cfg.seed = Some(v); }
        cfg
    }

    fn sink(&self, cfg: &Config) -> Result<SentenceSink> {
        let sink = match (&self.udp, &self.output) {
            (Some(target), _) => SentenceSink::udp(target)?,
            (None, Some(path)) => SentenceSink::file(path)?,
            (None, None) => SentenceSink::for_config(cfg)?,
        };
        Ok(sink)
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.quiet { "gps_simulator=warn" } else { "gps_simulator=info,gps_sim=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let base = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    let mut config = args.apply(base);

    if args.gpx {
        if config.duration.is_none() {
            bail!("--gpx requires a --duration greater than 0 (e.g. --duration 30s)");
        }
        let name = format!("{}.gpx", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        info!("GPX output: {name}");
        config.track_output = Some(PathBuf::from(name));
    }

    config.validate().context("invalid configuration")?;

    match args.serve {
        Some(port) => serve(port, config, args.quiet).await,
        None => run_direct(&args, config).await,
    }
}

async fn run_direct(args: &Args, config: Config) -> Result<()> {
    match &config.replay_file {
        Some(path) => info!(
            "Replaying {} at {:.1}x{}",
            path.display(),
            config.replay_speed,
            if config.replay_loop { ", looping" } else { "" }
        ),
        None => info!(
            "Origin {:.6}, {:.6} @ {:.1} m | radius {:.1} m | jitter {:.2} | alt jitter {:.2} | {:.1} kn @ {:.1}°",
            config.latitude,
            config.longitude,
            config.altitude,
            config.radius,
            config.jitter,
            config.altitude_jitter,
            config.speed,
            config.course
        ),
    }

    let sink = args.sink(&config)?;
    let sim = Simulator::new(config, sink).context("failed to create simulator")?;
    sim.start().await?;
    info!("Press Ctrl+C to stop");

    tokio::select! {
        _ = sim.stopped() => {}
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            info!("Interrupted");
            if sim.is_running().await {
                sim.stop().await?;
            }
        }
    }
    Ok(())
}

async fn serve(port: u16, config: Config, quiet: bool) -> Result<()> {
    let make_sink: SinkFactory = if quiet {
        Arc::new(|_: &Config| Ok::<_, SimError>(SentenceSink::discard()))
    } else {
        Arc::new(SentenceSink::for_config)
    };
    let state = ControlState::new(config, make_sink);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tokio::select! {
        res = control::serve(addr, state) => res.context("control plane failed")?,
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            info!("Shutting down control plane");
        }
    }
    Ok(())
}
