//! Analog gas pressure reader over an MCP2221 USB-to-ADC bridge.
//!
//! The transducer outputs a voltage proportional to pressure; the
//! MCP2221 samples it on ADC channel 1. The controller is enumerated
//! once at startup. When absent, the reader holds the sentinel value
//! for the process lifetime and no sampling task runs.

use crate::{Error, Result, POLL_INTERVAL, POLL_STARTUP_DELAY};
use hidapi::{HidApi, HidDevice};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// USB VID:PID for the MCP2221 ADC bridge.
pub const MCP2221_VID: u16 = 0x04D8;
pub const MCP2221_PID: u16 = 0x00DD;

/// Reading reported while the controller is absent or sampling fails.
/// Outside any realistic calibrated pressure range.
pub const GAS_SENTINEL: f64 = 1000.0;

/// ADC reference voltage over the full 16-bit span.
const VOLT_REFERENCE: f64 = 5.174;

/// MCP2221 Status/Set Parameters command code.
const STATUS_SET_PARAMETERS: u8 = 0x10;

/// Offset of the ADC channel 1 value in the status reply.
const ADC_CHANNEL_OFFSET: usize = 50;

/// A raw analog sample source in ADC counts.
pub trait AdcSource: Send {
    /// Returns one sample scaled to the 16-bit range.
    fn sample(&mut self) -> Result<u16>;
}

/// MCP2221 HID bridge sampling its ADC channel 1.
pub struct Mcp2221 {
    device: HidDevice,
}

impl Mcp2221 {
    /// Enumerates the bridge by VID:PID and opens it. Attempted exactly
    /// once at startup; an absent controller disables the reader.
    pub fn open(vid: u16, pid: u16) -> Result<Self> {
        let api = HidApi::new()?;
        let present = api
            .device_list()
            .any(|d| d.vendor_id() == vid && d.product_id() == pid);
        if !present {
            return Err(Error::DeviceAbsent { vid, pid });
        }
        let device = api.open(vid, pid)?;
        info!("ADC bridge opened (VID:{:04X} PID:{:04X})", vid, pid);
        Ok(Self { device })
    }
}

impl AdcSource for Mcp2221 {
    fn sample(&mut self) -> Result<u16> {
        // Report id 0, then the command byte.
        let mut report = [0u8; 65];
        report[1] = STATUS_SET_PARAMETERS;
        self.device.write(&report)?;

        let mut reply = [0u8; 64];
        self.device.read(&mut reply)?;
        let raw = u16::from_le_bytes([reply[ADC_CHANNEL_OFFSET], reply[ADC_CHANNEL_OFFSET + 1]]);

        // The ADC is 10-bit; scale to the 16-bit range the calibration
        // constants assume.
        Ok(raw << 6)
    }
}

/// Calibration constants mapping transducer voltage to pressure units.
#[derive(Debug, Clone, Copy)]
pub struct GasCalibration {
    pub min_volt: f64,
    pub max_volt: f64,
    pub min_units: f64,
    pub max_units: f64,
}

/// Handle to the gas pressure sampling task.
pub struct GasPressure {
    value: Arc<Mutex<f64>>,
    connected: bool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GasPressure {
    /// Enumerates the MCP2221 bridge and starts sampling, or returns a
    /// permanently-absent reader if the controller is not on the bus.
    pub fn detect(
        vid: u16,
        pid: u16,
        calibration: GasCalibration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        match Mcp2221::open(vid, pid) {
            Ok(bridge) => Self::start(Box::new(bridge), calibration, stop),
            Err(e) => {
                error!("Gas pressure reader not connected: {}", e);
                Self::absent()
            }
        }
    }

    /// Starts the sampling task over an already-open source.
    pub fn start(
        mut source: Box<dyn AdcSource>,
        calibration: GasCalibration,
        mut stop: watch::Receiver<bool>,
    ) -> Self {
        let value = Arc::new(Mutex::new(GAS_SENTINEL));
        let shared = value.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = sleep(POLL_STARTUP_DELAY) => {}
                _ = stop.changed() => return,
            }
            loop {
                match source.sample() {
                    Ok(raw) => {
                        let pressure = scale_pressure(raw, &calibration);
                        debug!("Gas pressure {:.2} from {} counts", pressure, raw);
                        *shared.lock().unwrap() = pressure;
                    }
                    Err(e) => {
                        warn!("Gas pressure sample failed: {}", e);
                        *shared.lock().unwrap() = GAS_SENTINEL;
                    }
                }
                tokio::select! {
                    _ = sleep(POLL_INTERVAL) => {}
                    _ = stop.changed() => return,
                }
            }
        });
        Self {
            value,
            connected: true,
            task: Mutex::new(Some(task)),
        }
    }

    /// A reader whose controller was not detected: holds the sentinel
    /// forever, no task.
    pub fn absent() -> Self {
        Self {
            value: Arc::new(Mutex::new(GAS_SENTINEL)),
            connected: false,
            task: Mutex::new(None),
        }
    }

    /// Latest calibrated pressure, or [`GAS_SENTINEL`] when the
    /// controller is absent or not yet sampled.
    pub fn read(&self) -> f64 {
        *self.value.lock().unwrap()
    }

    /// Whether the controller was detected at startup.
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Waits for the sampling task to observe the stop signal and exit.
    pub async fn stopped(&self) {
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Converts a raw 16-bit sample to calibrated pressure units.
///
/// Voltage at or beyond the calibrated window clamps to the exact
/// endpoint unit; in-window values map linearly and are rounded to the
/// nearest quarter unit, matching the physical gauge's display
/// granularity.
pub fn scale_pressure(raw: u16, cal: &GasCalibration) -> f64 {
    let volts = f64::from(raw) * VOLT_REFERENCE / 65536.0;
    if volts <= cal.min_volt {
        return cal.min_units;
    }
    if volts >= cal.max_volt {
        return cal.max_units;
    }
    let scaler = (cal.max_units - cal.min_units) / (cal.max_volt - cal.min_volt);
    let pressure = (volts - cal.min_volt) * scaler + cal.min_units;
    (pressure * 4.0).round() / 4.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_calibration() -> GasCalibration {
        GasCalibration {
            min_volt: 0.5,
            max_volt: 4.5,
            min_units: 1.0,
            max_units: 13.8,
        }
    }

    /// Raw count producing approximately the given voltage.
    fn raw_for_volts(volts: f64) -> u16 {
        (volts * 65536.0 / VOLT_REFERENCE).round() as u16
    }

    #[test]
    fn midpoint_maps_linearly_and_rounds_to_quarter() {
        // 2.5 V -> ((2.5 - 0.5) / 4.0) * 12.8 + 1.0 = 7.4 -> 7.5
        let pressure = scale_pressure(raw_for_volts(2.5), &test_calibration());
        assert_eq!(pressure, 7.5);
    }

    #[test]
    fn low_voltage_clamps_to_min_units() {
        let cal = test_calibration();
        assert_eq!(scale_pressure(0, &cal), 1.0);
        assert_eq!(scale_pressure(raw_for_volts(0.2), &cal), 1.0);
        assert_eq!(scale_pressure(raw_for_volts(0.5), &cal), 1.0);
    }

    #[test]
    fn high_voltage_clamps_to_max_units() {
        let cal = test_calibration();
        assert_eq!(scale_pressure(u16::MAX, &cal), 13.8);
        assert_eq!(scale_pressure(raw_for_volts(4.9), &cal), 13.8);
    }

    #[test]
    fn quarter_rounding() {
        let cal = GasCalibration {
            min_volt: 0.0,
            max_volt: 5.174,
            min_units: 0.0,
            max_units: 5.174,
        };
        // Identity map; raw 20000 -> 1.578... V -> 1.5
        assert_eq!(scale_pressure(20000, &cal), 1.5);
        // raw 25000 -> 1.973... V -> 2.0
        assert_eq!(scale_pressure(25000, &cal), 2.0);
    }

    struct FakeAdc(Vec<u16>);

    impl AdcSource for FakeAdc {
        fn sample(&mut self) -> Result<u16> {
            if self.0.is_empty() {
                Err(Error::DeviceAbsent {
                    vid: MCP2221_VID,
                    pid: MCP2221_PID,
                })
            } else {
                Ok(self.0.remove(0))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absent_reader_always_reads_sentinel() {
        let reader = GasPressure::absent();
        assert!(!reader.connected());
        assert_eq!(reader.read(), GAS_SENTINEL);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.read(), GAS_SENTINEL);
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_task_updates_value_and_degrades_on_error() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let source = FakeAdc(vec![raw_for_volts(2.5)]);
        let reader = GasPressure::start(Box::new(source), test_calibration(), stop_rx);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(reader.read(), 7.5);

        // Source exhausted: the next cycle fails and the value degrades.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(reader.read(), GAS_SENTINEL);

        stop_tx.send(true).unwrap();
        reader.stopped().await;
    }
}
