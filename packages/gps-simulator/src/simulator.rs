//! simulator.rs — Orchestrator
//!
//! Owns the instance state behind one `RwLock` and runs one tick task per run:
//!
//!   tick → lock check → driver (motion or replay, once locked) → satellites
//!        → encode → sink → track recorder → observers
//!
//! The tick task is a `select!` over the output-rate ticker, a control channel
//! (`Stop`, `SetRate`) and the optional run-duration deadline. A run ends on
//! `stop()`, on the deadline, or when a non-looping replay completes; all three
//! go through `Engine::shutdown`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gps_types::{NmeaData, Position, ReplayProgress, TrackPoint};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, SimError};
use crate::gpx::{self, TrackRecorder};
use crate::motion::{MotionModel, NavState};
use crate::nmea;
use crate::replay::{ReplayEngine, ReplayTick};
use crate::satellites::Constellation;
use crate::sink::SentenceSink;

// ── Public snapshot ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub running: bool,
    pub start_time: Option<DateTime<Utc>>,
    /// Seconds since the current (or last) run started
    pub elapsed_secs: f64,
    pub position: Position,
    pub config: Config,
    /// Present only when replaying a track
    pub replay: Option<ReplayProgress>,
}

// ── Internals ─────────────────────────────────────────────────────────────────

/// Position source, picked once from the config.
enum Driver {
    Procedural(MotionModel),
    Replay(ReplayEngine),
}

enum Control {
    Stop,
    SetRate(Duration),
}

struct Engine {
    config: Config,
    nav: NavState,
    driver: Driver,
    constellation: Constellation,
    rng: StdRng,
    sink: SentenceSink,
    recorder: Option<TrackRecorder>,
    observers: Vec<mpsc::UnboundedSender<NmeaData>>,

    running: bool,
    /// Bumped on every start so a stale tick task can tell it has been replaced
    run_id: u64,
    start_time: Option<DateTime<Utc>>,
    started: Option<Instant>,
    lock_due: Option<Instant>,
    is_locked: bool,
    last_update: Option<Instant>,
    control: Option<mpsc::UnboundedSender<Control>>,
    run_state: watch::Sender<bool>,
}

impl Engine {
    fn is_current(&self, run_id: u64) -> bool {
        self.running && self.run_id == run_id
    }

    fn snapshot(&self, timestamp: DateTime<Utc>) -> Position {
        Position {
            latitude: self.nav.lat,
            longitude: self.nav.lon,
            altitude: self.nav.alt,
            speed: self.nav.speed,
            course: self.nav.course,
            is_locked: self.is_locked,
            satellites: self.constellation.satellites().to_vec(),
            timestamp,
        }
    }

    fn replay_progress(&self) -> Option<ReplayProgress> {
        match &self.driver {
            Driver::Replay(replay) => Some(replay.progress()),
            Driver::Procedural(_) => None,
        }
    }

    /// One output cycle. Returns true once a non-looping replay has completed.
    fn tick(&mut self, now: Instant, wall: DateTime<Utc>) -> bool {
        if !self.is_locked && self.lock_due.is_some_and(|due| now >= due) {
            self.is_locked = true;
            info!("GPS lock acquired with {} satellites", self.constellation.satellites().len());
        }

        let dt = self
            .last_update
            .map(|prev| now.saturating_duration_since(prev).as_secs_f64())
            .unwrap_or(0.0);
        self.last_update = Some(now);

        let mut replay_done = false;
        if self.is_locked {
            match &mut self.driver {
                Driver::Procedural(model) => {
                    model.step(&mut self.nav, dt, &mut self.rng);
                }
                Driver::Replay(replay) => {
                    let outcome = replay.tick(
                        now.into_std(),
                        self.config.replay_speed,
                        self.config.replay_loop,
                        &mut self.nav,
                    );
                    replay_done = outcome == ReplayTick::Completed;
                }
            }
        }

        self.constellation.drift(&mut self.rng);

        let position = self.snapshot(wall);
        let sentences = nmea::encode(&position);
        self.sink.write_sentences(&sentences);

        if self.is_locked {
            if let Some(recorder) = self.recorder.as_mut() {
                let point = TrackPoint::new(position.latitude, position.longitude, position.altitude, Some(wall));
                if let Err(e) = recorder.record(point) {
                    warn!("Track recording failed: {e}");
                }
            }
        }

        debug!(
            "tick lat={:.6} lon={:.6} spd={:.1}kn crs={:.1}° locked={}",
            position.latitude, position.longitude, position.speed, position.course, position.is_locked
        );

        let data = NmeaData { sentences, position, timestamp: wall };
        self.observers.retain(|tx| tx.send(data.clone()).is_ok());

        replay_done
    }

    /// End the current run: stop the tick task and flush the recorder.
    fn shutdown(&mut self) {
        self.running = false;
        self.run_state.send_replace(false);
        if let Some(control) = self.control.take() {
            let _ = control.send(Control::Stop);
        }
        if let Some(recorder) = self.recorder.as_mut() {
            match recorder.flush() {
                Ok(()) => info!("Track saved: {} points → {}", recorder.point_count(), recorder.path().display()),
                Err(e) => warn!("Track flush failed: {e}"),
            }
        }
        info!("Simulator stopped");
    }
}

// ── Simulator handle ──────────────────────────────────────────────────────────

/// Cheap to clone; all clones drive the same instance.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<RwLock<Engine>>,
    run_state: watch::Receiver<bool>,
}

impl Simulator {
    /// Validate `config`, load the replay track if any, open the track
    /// recorder if any and spawn the satellites. Output goes to `sink`.
    pub fn new(config: Config, sink: SentenceSink) -> Result<Self> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut nav = NavState::at_origin(&config);
        let driver = match &config.replay_file {
            Some(path) => {
                let replay = ReplayEngine::new(gpx::read_track(path)?);
                replay.seed(&mut nav);
                Driver::Replay(replay)
            }
            None => Driver::Procedural(MotionModel::new(&config)),
        };

        let recorder = config.track_output.as_deref().map(TrackRecorder::create).transpose()?;
        let constellation = Constellation::spawn(config.satellites, &mut rng);

        info!(
            "Simulator ready: {} satellites, {} output, {}",
            constellation.satellites().len(),
            sink.name(),
            if config.is_replay() { "replay" } else { "procedural" }
        );

        let (run_state, run_rx) = watch::channel(false);
        let engine = Engine {
            config,
            nav,
            driver,
            constellation,
            rng,
            sink,
            recorder,
            observers: Vec::new(),
            running: false,
            run_id: 0,
            start_time: None,
            started: None,
            lock_due: None,
            is_locked: false,
            last_update: None,
            control: None,
            run_state,
        };
        Ok(Self { inner: Arc::new(RwLock::new(engine)), run_state: run_rx })
    }

    /// Begin emitting. The first tick fires one output period from now.
    pub async fn start(&self) -> Result<()> {
        let mut eng = self.inner.write().await;
        if eng.running {
            return Err(SimError::AlreadyRunning);
        }

        let now = Instant::now();
        let lock_due = now.checked_add(eng.config.time_to_lock);
        if lock_due.is_none() {
            warn!("Time to lock is beyond the clock range; the fix will never be acquired");
        }
        let deadline = eng.config.duration.and_then(|d| {
            let at = now.checked_add(d);
            if at.is_none() {
                warn!("Run duration is beyond the clock range; running until stopped");
            }
            at
        });

        eng.running = true;
        eng.run_state.send_replace(true);
        eng.run_id += 1;
        eng.start_time = Some(Utc::now());
        eng.started = Some(now);
        eng.lock_due = lock_due;
        eng.is_locked = false;
        eng.last_update = Some(now);

        let engine = &mut *eng;
        if let Driver::Replay(replay) = &mut engine.driver {
            replay.reset();
            replay.seed(&mut engine.nav);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        eng.control = Some(tx);

        let rate = eng.config.output_rate;
        let run_id = eng.run_id;
        info!(
            "Simulator started: lock in {:.1}s, output every {:.3}s{}",
            eng.config.time_to_lock.as_secs_f64(),
            rate.as_secs_f64(),
            eng.config.duration.map(|d| format!(", stopping after {:.0}s", d.as_secs_f64())).unwrap_or_default()
        );
        drop(eng);

        tokio::spawn(run(self.inner.clone(), rx, run_id, rate, deadline));
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let mut eng = self.inner.write().await;
        if !eng.running {
            return Err(SimError::NotRunning);
        }
        eng.shutdown();
        Ok(())
    }

    /// Hot-swap the configuration. The satellite count and replay file are
    /// fixed for the instance; a changed output rate takes effect immediately.
    pub async fn update_config(&self, next: Config) -> Result<()> {
        let mut eng = self.inner.write().await;
        eng.config.validate_replacement(&next)?;

        let rate_changed = next.output_rate != eng.config.output_rate;
        if let Driver::Procedural(model) = &mut eng.driver {
            *model = MotionModel::new(&next);
        }
        eng.config = next;

        if rate_changed {
            if let Some(control) = &eng.control {
                let _ = control.send(Control::SetRate(eng.config.output_rate));
            }
        }
        info!("Configuration updated");
        Ok(())
    }

    pub async fn status(&self) -> Status {
        let eng = self.inner.read().await;
        Status {
            running: eng.running,
            start_time: eng.start_time,
            elapsed_secs: eng
                .started
                .filter(|_| eng.running)
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            position: eng.snapshot(Utc::now()),
            config: eng.config.clone(),
            replay: eng.replay_progress(),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.running
    }

    /// Resolves once the current run has ended, however it ended. Returns
    /// immediately when not running.
    pub async fn stopped(&self) {
        let mut run_state = self.run_state.clone();
        let _ = run_state.wait_for(|running| !*running).await;
    }

    /// Channel-based observer: every tick's output, in order.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<NmeaData> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.observers.push(tx);
        rx
    }

    /// Callback observer. Each call runs on the blocking pool, awaited by a
    /// per-observer delivery task, so calls to one observer stay in order and
    /// a callback that blocks or sleeps never holds a runtime worker the tick
    /// task needs.
    pub async fn add_observer<F>(&self, observer: F)
    where
        F: Fn(NmeaData) + Send + Sync + 'static,
    {
        let observer = Arc::new(observer);
        let mut rx = self.subscribe().await;
        tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                let observer = observer.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || (*observer)(data)).await {
                    warn!("Observer callback failed: {e}");
                }
            }
        });
    }
}

// ── Tick task ─────────────────────────────────────────────────────────────────

async fn run(
    inner: Arc<RwLock<Engine>>,
    mut control: mpsc::UnboundedReceiver<Control>,
    run_id: u64,
    rate: Duration,
    deadline: Option<Instant>,
) {
    let mut ticker = interval_at(Instant::now() + rate, rate);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let expiry = async move {
        match deadline {
            Some(at) => sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut eng = inner.write().await;
                if !eng.is_current(run_id) {
                    break;
                }
                if eng.tick(Instant::now(), Utc::now()) {
                    info!("Replay complete, stopping");
                    eng.shutdown();
                    break;
                }
            }
            msg = control.recv() => match msg {
                Some(Control::SetRate(next)) => {
                    ticker = interval_at(Instant::now() + next, next);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    debug!("Output rate changed to {:.3}s", next.as_secs_f64());
                }
                Some(Control::Stop) | None => break,
            },
            _ = &mut expiry => {
                let mut eng = inner.write().await;
                if eng.is_current(run_id) {
                    info!("Run duration reached");
                    eng.shutdown();
                }
                break;
            }
        }
    }
    debug!("Tick task {run_id} exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_SPAN;
    use crate::error::ConfigError;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn quick_config() -> Config {
        Config {
            time_to_lock: Duration::from_millis(500),
            output_rate: Duration::from_millis(100),
            seed: Some(9),
            ..Default::default()
        }
    }

    fn simulator(config: Config) -> Simulator {
        Simulator::new(config, SentenceSink::discard()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_misuse_is_reported() {
        let sim = simulator(quick_config());
        assert!(matches!(sim.stop().await, Err(SimError::NotRunning)));
        sim.start().await.unwrap();
        assert!(matches!(sim.start().await, Err(SimError::AlreadyRunning)));
        sim.stop().await.unwrap();
        assert!(!sim.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_is_rejected_at_construction() {
        let err = Simulator::new(Config { satellites: 2, ..quick_config() }, SentenceSink::discard());
        assert!(matches!(err, Err(SimError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_replay_file_is_a_track_error() {
        let config = Config { replay_file: Some("/nonexistent/track.gpx".into()), ..quick_config() };
        let err = Simulator::new(config, SentenceSink::discard());
        assert!(matches!(err, Err(SimError::Track(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_is_acquired_after_time_to_lock() {
        let sim = simulator(quick_config());
        let mut rx = sim.subscribe().await;
        sim.start().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(!first.position.is_locked);
        assert_eq!(first.sentences.len(), 4);

        let mut locked = None;
        for _ in 0..10 {
            let data = rx.recv().await.unwrap();
            if data.position.is_locked {
                locked = Some(data);
                break;
            }
        }
        let locked = locked.expect("lock within a second");
        assert_eq!(locked.position.satellite_count(), 8);
        assert_eq!(locked.sentences.len(), 8);
        sim.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn duration_bounded_run_stops_by_itself() {
        let sim = simulator(Config { duration: Some(Duration::from_secs(2)), ..quick_config() });
        sim.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!sim.is_running().await);
        assert!(matches!(sim.stop().await, Err(SimError::NotRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_resolves_when_run_ends() {
        let sim = simulator(Config { duration: Some(Duration::from_secs(1)), ..quick_config() });
        sim.stopped().await;
        sim.start().await.unwrap();
        let begin = Instant::now();
        sim.stopped().await;
        assert!(begin.elapsed() >= Duration::from_secs(1));
        assert!(!sim.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn update_config_rejects_resizing_and_changes_rate() {
        let sim = simulator(quick_config());
        let err = sim.update_config(Config { satellites: 12, ..quick_config() }).await;
        assert!(matches!(err, Err(SimError::Config(_))));

        let mut rx = sim.subscribe().await;
        sim.start().await.unwrap();
        rx.recv().await.unwrap();

        sim.update_config(Config { output_rate: Duration::from_secs(1), speed: 3.0, ..quick_config() })
            .await
            .unwrap();
        let before = Instant::now();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert!(before.elapsed() >= Duration::from_secs(1));

        let status = sim.status().await;
        assert_eq!(status.config.speed, 3.0);
        sim.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_run_state() {
        let sim = simulator(quick_config());
        let idle = sim.status().await;
        assert!(!idle.running);
        assert!(idle.start_time.is_none());
        assert!(idle.replay.is_none());
        assert_eq!(idle.position.latitude, 37.7749);

        sim.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(750)).await;
        let live = sim.status().await;
        assert!(live.running);
        assert!(live.start_time.is_some());
        assert!(live.elapsed_secs >= 0.7);
        sim.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_spans_never_reach_the_clock() {
        let huge: Config = serde_json::from_str(r#"{"duration": 1e19}"#).unwrap();
        let err = Simulator::new(huge, SentenceSink::discard());
        assert!(matches!(err, Err(SimError::Config(ConfigError::SpanTooLong { .. }))));

        let sim = simulator(quick_config());
        let err = sim.update_config(Config { time_to_lock: Duration::from_secs_f64(1e19), ..quick_config() }).await;
        assert!(matches!(err, Err(SimError::Config(ConfigError::SpanTooLong { .. }))));

        sim.update_config(Config { time_to_lock: MAX_SPAN, duration: Some(MAX_SPAN), ..quick_config() })
            .await
            .unwrap();
        let mut rx = sim.subscribe().await;
        sim.start().await.unwrap();
        assert!(!rx.recv().await.unwrap().position.is_locked);
        sim.stop().await.unwrap();
        sim.start().await.unwrap();
        assert!(sim.is_running().await);
        sim.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sleeping_observers_do_not_stall_ticks() {
        let sim = simulator(Config {
            time_to_lock: Duration::ZERO,
            output_rate: Duration::from_millis(50),
            ..quick_config()
        });
        for _ in 0..2 {
            let first = AtomicBool::new(true);
            sim.add_observer(move |_| {
                if first.swap(false, Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1500));
                }
            })
            .await;
        }
        let mut rx = sim.subscribe().await;

        sim.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        sim.stop().await.unwrap();

        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert!(ticks >= 12, "only {ticks} ticks in one second at 50 ms");
    }

    #[tokio::test(start_paused = true)]
    async fn closed_observers_are_dropped() {
        let sim = simulator(quick_config());
        let rx = sim.subscribe().await;
        drop(rx);
        let mut live = sim.subscribe().await;
        sim.start().await.unwrap();
        live.recv().await.unwrap();
        assert_eq!(sim.inner.read().await.observers.len(), 1);
        sim.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_resumes_ticking() {
        let sim = simulator(quick_config());
        let mut rx = sim.subscribe().await;
        sim.start().await.unwrap();
        rx.recv().await.unwrap();
        sim.stop().await.unwrap();
        sim.start().await.unwrap();
        let data = rx.recv().await.unwrap();
        assert!(!data.position.is_locked);
        sim.stop().await.unwrap();
    }
}
