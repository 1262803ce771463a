//! Transport driver contract.
//!
//! The external media player (mpv, a renderer process, ...) is wrapped
//! behind [`TransportDriver`]. The controller is the only issuer of
//! transport commands and the single consumer of the telemetry channel;
//! drivers must tag every telemetry report with the generation passed to
//! the `load` that produced it, so the controller can discard reports from
//! a superseded load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// One telemetry report from the external player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Load generation this report belongs to.
    pub generation: u64,
    pub position_secs: f64,
    pub duration_secs: Option<f64>,
    /// End of file. Only meaningful while the player is actively playing.
    pub eof: bool,
}

/// Control surface of the external player.
///
/// `load` resolves when the player acknowledges the media; the controller
/// enforces the ack timeout around it. All methods are backend-neutral,
/// backends map them onto whatever their protocol offers.
#[async_trait]
pub trait TransportDriver: Send + Sync {
    async fn load(&self, path: &Path, generation: u64) -> Result<()>;
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn seek(&self, position_secs: f64) -> Result<()>;
    async fn set_volume(&self, volume: u16) -> Result<()>;
    async fn set_mute(&self, mute: bool) -> Result<()>;
}

/// Default media-seconds advanced per telemetry tick of the simulator.
const SIM_STEP_SECS: f64 = 1.0;

/// Latency simulated for a load acknowledgement.
const SIM_LOAD_LATENCY: Duration = Duration::from_millis(10);

struct SimState {
    generation: u64,
    position: f64,
    duration: f64,
    playing: bool,
    volume: u16,
    muted: bool,
}

/// In-process player simulation.
///
/// Plays media on a virtual clock: while "playing", a ticker task advances
/// the position by [`SIM_STEP_SECS`] every `tick` and pushes a telemetry
/// report, ending with a single EOF report. Used by the demo binary and by
/// integration tests (pair it with `start_paused` tokio tests for instant
/// virtual time).
pub struct SimulatedTransport {
    telemetry: mpsc::Sender<Telemetry>,
    tick: Duration,
    durations: Mutex<HashMap<PathBuf, f64>>,
    default_duration: f64,
    state: Arc<Mutex<SimState>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedTransport {
    /// Create the simulator and the telemetry channel consumed by the
    /// controller.
    pub fn new(tick: Duration) -> (Arc<Self>, mpsc::Receiver<Telemetry>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            telemetry: tx,
            tick,
            durations: Mutex::new(HashMap::new()),
            default_duration: 3.0,
            state: Arc::new(Mutex::new(SimState {
                generation: 0,
                position: 0.0,
                duration: 0.0,
                playing: false,
                volume: 100,
                muted: false,
            })),
            ticker: Mutex::new(None),
        });
        (transport, rx)
    }

    /// Declare the duration the simulator should report for a path.
    pub fn set_media_duration(&self, path: impl Into<PathBuf>, secs: f64) {
        self.durations.lock().unwrap().insert(path.into(), secs);
    }

    pub fn volume(&self) -> u16 {
        self.state.lock().unwrap().volume
    }

    pub fn muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    fn abort_ticker(&self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn spawn_ticker(&self) {
        let state = Arc::clone(&self.state);
        let telemetry = self.telemetry.clone();
        let tick = self.tick;

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;

                let report = {
                    let mut s = state.lock().unwrap();
                    if !s.playing {
                        continue;
                    }
                    s.position = (s.position + SIM_STEP_SECS).min(s.duration);
                    let eof = s.position >= s.duration;
                    if eof {
                        s.playing = false;
                    }
                    Telemetry {
                        generation: s.generation,
                        position_secs: s.position,
                        duration_secs: Some(s.duration),
                        eof,
                    }
                };

                let stop = report.eof;
                if telemetry.send(report).await.is_err() {
                    break;
                }
                if stop {
                    break;
                }
            }
        });

        *self.ticker.lock().unwrap() = Some(handle);
    }
}

#[async_trait]
impl TransportDriver for SimulatedTransport {
    async fn load(&self, path: &Path, generation: u64) -> Result<()> {
        self.abort_ticker();

        let duration = self
            .durations
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(self.default_duration);

        {
            let mut s = self.state.lock().unwrap();
            s.generation = generation;
            s.position = 0.0;
            s.duration = duration;
            s.playing = false;
        }

        tokio::time::sleep(SIM_LOAD_LATENCY).await;
        debug!(path = %path.display(), generation, duration, "Simulated load acknowledged");
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        self.abort_ticker();
        self.state.lock().unwrap().playing = true;
        self.spawn_ticker();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.state.lock().unwrap().playing = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.abort_ticker();
        let mut s = self.state.lock().unwrap();
        s.playing = false;
        s.position = 0.0;
        Ok(())
    }

    async fn seek(&self, position_secs: f64) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.position = position_secs.clamp(0.0, s.duration);
        Ok(())
    }

    async fn set_volume(&self, volume: u16) -> Result<()> {
        self.state.lock().unwrap().volume = volume.min(100);
        Ok(())
    }

    async fn set_mute(&self, mute: bool) -> Result<()> {
        self.state.lock().unwrap().muted = mute;
        Ok(())
    }
}
