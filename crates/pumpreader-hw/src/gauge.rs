//! Text-protocol pressure gauge poller.
//!
//! Covers the turbo, tank, and ion pump gauges: devices that answer an
//! ASCII command with an ASCII line carrying the pressure at a fixed
//! offset. The poller owns its serial port, samples every five seconds,
//! and keeps the latest reading available through [`Gauge::read`] and
//! [`Gauge::snapshot`].

use crate::link::{self, SerialLink};
use crate::{Result, POLL_INTERVAL, POLL_STARTUP_DELAY, READ_MAX, READ_TIMEOUT};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Pause between the primary command and the follow-up command or read.
/// Required by device firmware latency.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Descriptor for one text-protocol gauge.
#[derive(Debug, Clone)]
pub struct GaugeConfig {
    /// Device name used in logs and status reports.
    pub name: String,
    /// Serial port path, e.g. `/dev/ttyUSB0`.
    pub port: String,
    /// Baud rate.
    pub baud: u32,
    /// Primary command bytes sent each cycle.
    pub command: Vec<u8>,
    /// Optional follow-up bytes for addressed multi-drop devices,
    /// written after the settle delay.
    pub follow_up: Option<Vec<u8>>,
    /// Start offset of the reading within the decoded reply.
    pub start: usize,
    /// End offset (exclusive) of the reading within the decoded reply.
    pub length: usize,
}

/// One consistent view of a gauge's state.
///
/// `raw` is `None` when the last cycle failed or never ran (the
/// disconnected sentinel) and `Some("")` when the device answered with
/// nothing before the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeSnapshot {
    /// Whether the port opened at startup. Never reverts to true.
    pub ready: bool,
    /// Substring extracted from the last reply.
    pub raw: Option<String>,
}

struct Shared {
    name: String,
    state: Mutex<GaugeSnapshot>,
}

/// Handle to a running gauge poller.
pub struct Gauge {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Gauge {
    /// Opens the configured port and starts polling.
    ///
    /// The port is opened exactly once; on failure the gauge is returned
    /// permanently not-ready and no task is spawned. There is no
    /// reconnect path.
    pub fn connect(config: GaugeConfig, stop: watch::Receiver<bool>) -> Self {
        info!("Initialising {} on port {}", config.name, config.port);
        match link::open_port(&config.name, &config.port, config.baud) {
            Ok(port) => {
                info!("{} port {} ok", config.name, config.port);
                Self::start(config, Box::new(port), stop)
            }
            Err(e) => {
                error!("{}", e);
                Self {
                    shared: Arc::new(Shared {
                        name: config.name,
                        state: Mutex::new(GaugeSnapshot {
                            ready: false,
                            raw: None,
                        }),
                    }),
                    task: Mutex::new(None),
                }
            }
        }
    }

    /// Starts polling over an already-open link. The link is owned
    /// exclusively by the polling task.
    pub fn start(
        config: GaugeConfig,
        link: Box<dyn SerialLink>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            state: Mutex::new(GaugeSnapshot {
                ready: true,
                raw: None,
            }),
        });
        let task = tokio::spawn(Self::run(config, link, shared.clone(), stop));
        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(
        config: GaugeConfig,
        mut link: Box<dyn SerialLink>,
        shared: Arc<Shared>,
        mut stop: watch::Receiver<bool>,
    ) {
        tokio::select! {
            _ = sleep(POLL_STARTUP_DELAY) => {}
            _ = stop.changed() => return,
        }
        loop {
            Self::run_once(link.as_mut(), &config, &shared).await;
            // Reschedule relative to cycle completion; slow I/O stretches
            // the period rather than piling up cycles.
            tokio::select! {
                _ = sleep(POLL_INTERVAL) => {}
                _ = stop.changed() => return,
            }
        }
    }

    /// One polling cycle, with the failure policy applied: any transport
    /// or decode error resets the reading to the disconnected sentinel
    /// and the next cycle still runs.
    async fn run_once(link: &mut dyn SerialLink, config: &GaugeConfig, shared: &Shared) {
        if let Err(e) = Self::poll_cycle(link, config, shared).await {
            warn!("Poll cycle failed on {}: {}", shared.name, e);
            shared.state.lock().unwrap().raw = None;
        }
    }

    async fn poll_cycle(
        link: &mut dyn SerialLink,
        config: &GaugeConfig,
        shared: &Shared,
    ) -> Result<()> {
        link.write(&config.command).await?;
        sleep(SETTLE_DELAY).await;
        if let Some(follow_up) = &config.follow_up {
            link.write(follow_up).await?;
        }
        let reply = link.read(READ_MAX, READ_TIMEOUT).await?;
        let text = String::from_utf8(reply)?;

        let end = config.length.min(text.len());
        let start = config.start.min(end);
        let raw = text.get(start..end).unwrap_or("").to_string();

        debug!("Gauge return {:?} from {}", raw, shared.name);
        shared.state.lock().unwrap().raw = Some(raw);
        Ok(())
    }

    /// Returns the gauge pressure. Never fails: a disconnected device,
    /// an empty reply, or an unparseable reading all read as `0`.
    pub fn read(&self) -> f64 {
        match &self.shared.state.lock().unwrap().raw {
            Some(raw) => parse_reading(raw),
            None => 0.0,
        }
    }

    /// Returns ready flag and raw reading as one consistent snapshot.
    pub fn snapshot(&self) -> GaugeSnapshot {
        self.shared.state.lock().unwrap().clone()
    }

    /// Device name from the descriptor.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Waits for the polling task to observe the stop signal and exit.
    pub async fn stopped(&self) {
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Parses the leading numeric token of a reading.
///
/// Gauge replies carry trailing unit text (`"1.00E-3 mbar"`); only the
/// first whitespace-separated token is parsed.
fn parse_reading(raw: &str) -> f64 {
    raw.split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
        .unwrap_or(0.0)
}
