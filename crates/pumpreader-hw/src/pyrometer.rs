//! Binary-protocol pyrometer poller with rangefinder laser control.
//!
//! The pyrometer answers single-byte queries with fixed-field binary
//! replies. Temperature is polled on the usual five second cadence; the
//! laser is switched through explicit on/off calls, with an automatic
//! switch-off sixty seconds after each switch-on.

use crate::link::{self, SerialLink};
use crate::{Result, POLL_INTERVAL, POLL_STARTUP_DELAY, READ_MAX, READ_TIMEOUT};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Temperature query command.
const READ_TEMPERATURE: [u8; 1] = [0x01];

/// Laser status query command.
const READ_LASER: [u8; 1] = [0x25];

/// Laser switch-on command.
const LASER_ON: [u8; 3] = [0xA5, 0x01, 0xA4];

/// Laser switch-off command.
const LASER_OFF: [u8; 3] = [0xA5, 0x00, 0xA5];

/// The laser is switched off this long after each `laser_on` call.
const LASER_AUTO_OFF: Duration = Duration::from_secs(60);

/// Device counts are offset by 100.0 degrees in 0.1 degree steps.
const COUNT_OFFSET: f64 = 1000.0;

/// Descriptor for the pyrometer.
#[derive(Debug, Clone)]
pub struct PyrometerConfig {
    /// Device name used in logs and status reports.
    pub name: String,
    /// Serial port path, e.g. `/dev/ttyUSB3`.
    pub port: String,
    /// Baud rate.
    pub baud: u32,
}

/// One consistent view of the pyrometer's state.
#[derive(Debug, Clone, PartialEq)]
pub struct PyrometerSnapshot {
    /// Whether the port opened at startup. Never reverts to true.
    pub ready: bool,
    /// Last temperature reading; `0` when the device is not answering.
    pub temperature: f64,
    /// Last observed laser state.
    pub laser_on: bool,
    /// Running maximum temperature since the last reset.
    pub max_temperature: f64,
}

struct Inner {
    name: String,
    // The port is shared between the polling task, the control calls,
    // and the auto-off task; each holds it for a full exchange.
    link: tokio::sync::Mutex<Option<Box<dyn SerialLink>>>,
    state: Mutex<PyrometerSnapshot>,
}

/// Handle to a running pyrometer poller.
pub struct Pyrometer {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Pyrometer {
    /// Opens the configured port and starts polling. Open-once, no
    /// reconnect, same policy as the text gauges.
    pub fn connect(config: PyrometerConfig, stop: watch::Receiver<bool>) -> Self {
        info!("Initialising {} on port {}", config.name, config.port);
        match link::open_port(&config.name, &config.port, config.baud) {
            Ok(port) => {
                info!("{} port {} ok", config.name, config.port);
                Self::start(config, Box::new(port), stop)
            }
            Err(e) => {
                error!("{}", e);
                Self {
                    inner: Arc::new(Inner::new(config.name, None, false)),
                    task: Mutex::new(None),
                }
            }
        }
    }

    /// Starts polling over an already-open link.
    pub fn start(
        config: PyrometerConfig,
        link: Box<dyn SerialLink>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let inner = Arc::new(Inner::new(config.name, Some(link), true));
        let task = tokio::spawn(Self::run(inner.clone(), stop));
        Self {
            inner,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(inner: Arc<Inner>, mut stop: watch::Receiver<bool>) {
        tokio::select! {
            _ = sleep(POLL_STARTUP_DELAY) => {}
            _ = stop.changed() => return,
        }
        loop {
            inner.run_once().await;
            tokio::select! {
                _ = sleep(POLL_INTERVAL) => {}
                _ = stop.changed() => return,
            }
        }
    }

    /// Last temperature reading; `0` when disconnected or silent.
    pub fn read(&self) -> f64 {
        self.inner.state.lock().unwrap().temperature
    }

    /// Running maximum temperature since the last [`reset_max`].
    ///
    /// [`reset_max`]: Self::reset_max
    pub fn read_max(&self) -> f64 {
        self.inner.state.lock().unwrap().max_temperature
    }

    /// Zeroes the running maximum. Temperature and laser state are
    /// untouched; the maximum may rise again on the next sample.
    pub fn reset_max(&self) {
        self.inner.state.lock().unwrap().max_temperature = 0.0;
    }

    /// Switches the rangefinder laser on and arms a one-shot switch-off
    /// sixty seconds from now.
    ///
    /// The auto-off task is detached and is not cancelled by a manual
    /// `laser_off`. Overlapping `laser_on` calls arm independent timers;
    /// the earliest one wins. This mirrors the device's historical
    /// behavior and is deliberately not deduplicated.
    pub async fn laser_on(&self) -> Result<()> {
        self.inner.set_laser(true).await?;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            sleep(LASER_AUTO_OFF).await;
            debug!("Laser auto-off elapsed on {}", inner.name);
            if let Err(e) = inner.set_laser(false).await {
                warn!("Laser auto-off failed on {}: {}", inner.name, e);
            }
        });
        Ok(())
    }

    /// Switches the rangefinder laser off.
    pub async fn laser_off(&self) -> Result<()> {
        self.inner.set_laser(false).await
    }

    /// Returns all pyrometer fields as one consistent snapshot.
    pub fn snapshot(&self) -> PyrometerSnapshot {
        self.inner.state.lock().unwrap().clone()
    }

    /// Device name from the descriptor.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Waits for the polling task to observe the stop signal and exit.
    pub async fn stopped(&self) {
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Inner {
    fn new(name: String, link: Option<Box<dyn SerialLink>>, ready: bool) -> Self {
        Self {
            name,
            link: tokio::sync::Mutex::new(link),
            state: Mutex::new(PyrometerSnapshot {
                ready,
                temperature: 0.0,
                laser_on: false,
                max_temperature: 0.0,
            }),
        }
    }

    /// One polling cycle with the failure policy applied.
    async fn run_once(&self) {
        if let Err(e) = self.poll_cycle().await {
            warn!("Poll cycle failed on {}: {}", self.name, e);
            let mut state = self.state.lock().unwrap();
            state.temperature = 0.0;
            state.laser_on = false;
        }
    }

    async fn poll_cycle(&self) -> Result<()> {
        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            return Ok(());
        };

        link.write(&READ_TEMPERATURE).await?;
        let reply = link.read(READ_MAX, READ_TIMEOUT).await?;
        if reply.len() < 2 {
            // Device not answering. Not fatal; keep polling.
            let mut state = self.state.lock().unwrap();
            state.temperature = 0.0;
            state.laser_on = false;
            return Ok(());
        }

        let count = u16::from_be_bytes([reply[0], reply[1]]);
        let temperature = (f64::from(count) - COUNT_OFFSET) / 10.0;
        debug!("{} temperature {:.1}", self.name, temperature);

        link.write(&READ_LASER).await?;
        let laser_reply = link.read(READ_MAX, READ_TIMEOUT).await?;

        let mut state = self.state.lock().unwrap();
        state.temperature = temperature;
        state.max_temperature = state.max_temperature.max(temperature);
        if let Some(&flag) = laser_reply.first() {
            state.laser_on = flag == 1;
        }
        Ok(())
    }

    async fn set_laser(&self, on: bool) -> Result<()> {
        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            debug!("Laser command ignored, {} not ready", self.name);
            return Ok(());
        };
        let command = if on { LASER_ON } else { LASER_OFF };
        link.write(&command).await?;
        let _ack = link.read(READ_MAX, READ_TIMEOUT).await?;
        self.state.lock().unwrap().laser_on = on;
        info!("{} laser {}", self.name, if on { "on" } else { "off" });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockLink;
    use std::io::ErrorKind;

    fn test_inner(link: MockLink) -> Inner {
        Inner::new("Pyrometer".to_string(), Some(Box::new(link)), true)
    }

    fn test_config() -> PyrometerConfig {
        PyrometerConfig {
            name: "Pyrometer".to_string(),
            port: "/dev/null".to_string(),
            baud: 115200,
        }
    }

    /// Builds a pyrometer whose polling task has already exited, so
    /// scripted replies are consumed only by control calls.
    async fn idle_pyrometer(link: MockLink) -> Pyrometer {
        let (stop_tx, stop_rx) = watch::channel(false);
        let pyro = Pyrometer::start(test_config(), Box::new(link), stop_rx);
        stop_tx.send(true).unwrap();
        pyro.stopped().await;
        pyro
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_decodes_big_endian_count() {
        // 1100 counts -> (1100 - 1000) / 10 = 10.0 degrees.
        let inner = test_inner(
            MockLink::new()
                .push_reply(&1100u16.to_be_bytes())
                .push_reply(&[0x01]),
        );

        inner.run_once().await;

        let state = inner.state.lock().unwrap().clone();
        assert_eq!(state.temperature, 10.0);
        assert_eq!(state.max_temperature, 10.0);
        assert!(state.laser_on);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_reads_as_zero() {
        let inner = test_inner(MockLink::new());
        inner.state.lock().unwrap().laser_on = true;

        inner.run_once().await;

        let state = inner.state.lock().unwrap().clone();
        assert!(state.ready);
        assert_eq!(state.temperature, 0.0);
        assert!(!state.laser_on);
    }

    #[tokio::test(start_paused = true)]
    async fn io_error_resets_value_and_keeps_polling_state() {
        let inner = test_inner(MockLink::new().push_read_error(ErrorKind::BrokenPipe));
        inner.state.lock().unwrap().temperature = 42.0;

        inner.run_once().await;

        let state = inner.state.lock().unwrap().clone();
        assert!(state.ready);
        assert_eq!(state.temperature, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn max_temperature_is_monotonic_until_reset() {
        let inner = test_inner(
            MockLink::new()
                .push_reply(&1500u16.to_be_bytes()) // 50.0
                .push_reply(&[0x00])
                .push_reply(&1200u16.to_be_bytes()) // 20.0
                .push_reply(&[0x00])
                .push_reply(&1300u16.to_be_bytes()) // 30.0
                .push_reply(&[0x00]),
        );

        inner.run_once().await;
        inner.run_once().await;
        {
            let state = inner.state.lock().unwrap();
            assert_eq!(state.temperature, 20.0);
            assert_eq!(state.max_temperature, 50.0);
        }

        inner.state.lock().unwrap().max_temperature = 0.0;
        inner.run_once().await;
        let state = inner.state.lock().unwrap().clone();
        assert_eq!(state.max_temperature, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn laser_on_arms_sixty_second_auto_off() {
        let link = MockLink::new()
            .push_reply(&[0x00]) // laser-on ack
            .push_reply(&[0x00]); // auto-off ack
        let pyro = idle_pyrometer(link).await;

        pyro.laser_on().await.unwrap();
        assert!(pyro.snapshot().laser_on);

        sleep(Duration::from_secs(59)).await;
        assert!(pyro.snapshot().laser_on);

        sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(!pyro.snapshot().laser_on);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_laser_off_before_expiry() {
        let link = MockLink::new()
            .push_reply(&[0x00]) // laser-on ack
            .push_reply(&[0x00]) // manual off ack
            .push_reply(&[0x00]); // auto-off ack, harmless repeat
        let pyro = idle_pyrometer(link).await;

        pyro.laser_on().await.unwrap();
        sleep(Duration::from_secs(10)).await;
        pyro.laser_off().await.unwrap();
        assert!(!pyro.snapshot().laser_on);

        sleep(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert!(!pyro.snapshot().laser_on);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_max_only_touches_maximum() {
        let inner = test_inner(
            MockLink::new()
                .push_reply(&2000u16.to_be_bytes()) // 100.0
                .push_reply(&[0x01]),
        );
        inner.run_once().await;

        let pyro = Pyrometer {
            inner: Arc::new(inner),
            task: Mutex::new(None),
        };
        pyro.reset_max();

        let state = pyro.snapshot();
        assert_eq!(state.max_temperature, 0.0);
        assert_eq!(state.temperature, 100.0);
        assert!(state.laser_on);
    }
}
