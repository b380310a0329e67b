//! Sensor registry and status aggregation.
//!
//! Owns one poller per configured device and presents their current
//! state to the API layer. All accessors read already-materialized
//! state under each poller's snapshot lock; nothing here blocks on
//! hardware I/O, and no poller error ever crosses this boundary.

use anyhow::Result;
use pumpreader_hw::{Gauge, GasPressure, Pyrometer, GAS_SENTINEL};
use serde::Serialize;
use tokio::sync::watch;
use tracing::warn;

use crate::config::Config;

/// A reading that degrades to explanatory text when the device cannot
/// supply a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Value(f64),
    Text(String),
}

/// One entry of the pressures list.
#[derive(Debug, Clone, Serialize)]
pub struct PressureReading {
    pub pump: String,
    pub pressure: f64,
    pub units: String,
}

/// One entry of the device status list.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub status: String,
    pub units: String,
}

/// Pyrometer snapshot for the temperature endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TemperatureStatus {
    pub temperature: Reading,
    pub laser: bool,
    pub max_temperature: f64,
}

struct GaugeSlot {
    key: &'static str,
    units: String,
    gauge: Gauge,
}

/// Owns all sensor instances for the process lifetime.
///
/// Constructed once at startup; construction opens every configured
/// port and starts every polling task. A device that fails to open
/// stays in the registry permanently not-ready.
pub struct Registry {
    gauges: Vec<GaugeSlot>,
    gas: Option<(GasPressure, String)>,
    pyrometer: Option<Pyrometer>,
    stop: watch::Sender<bool>,
}

impl Registry {
    /// Builds descriptors from the validated configuration and starts
    /// every poller. Device order is fixed: turbo, tank, ion, gas.
    pub fn new(config: &Config) -> Result<Self> {
        let (stop, stop_rx) = watch::channel(false);

        let mut gauges = Vec::new();
        let sections = [
            ("turbo", "Turbo Pump", &config.turbo),
            ("tank", "Tank Pump", &config.tank),
            ("ion", "Ion Pump", &config.ion),
        ];
        for (key, display, section) in sections {
            if let Some(section) = section {
                let descriptor = section.descriptor(display)?;
                gauges.push(GaugeSlot {
                    key,
                    units: section.units.clone(),
                    gauge: Gauge::connect(descriptor, stop_rx.clone()),
                });
            }
        }

        let pyrometer = config
            .pyrometer
            .as_ref()
            .map(|section| Pyrometer::connect(section.descriptor("Pyrometer"), stop_rx.clone()));

        let gas = match &config.gas {
            Some(section) => {
                let reader = GasPressure::detect(
                    section.vendor_id,
                    section.product_id,
                    section.calibration()?,
                    stop_rx,
                );
                Some((reader, section.units.clone()))
            }
            None => None,
        };

        Ok(Self {
            gauges,
            gas,
            pyrometer,
            stop,
        })
    }

    /// Current pressure of every configured gauge, in device order.
    pub fn pressures(&self) -> Vec<PressureReading> {
        let mut list: Vec<PressureReading> = self
            .gauges
            .iter()
            .map(|slot| PressureReading {
                pump: slot.key.to_string(),
                pressure: slot.gauge.read(),
                units: slot.units.clone(),
            })
            .collect();
        if let Some((reader, units)) = &self.gas {
            list.push(PressureReading {
                pump: "gas".to_string(),
                pressure: reader.read(),
                units: units.clone(),
            });
        }
        list
    }

    /// Human-readable status of every configured device.
    pub fn status(&self) -> Vec<DeviceStatus> {
        let mut list: Vec<DeviceStatus> = self
            .gauges
            .iter()
            .map(|slot| {
                let snapshot = slot.gauge.snapshot();
                let status = if !snapshot.ready {
                    "Port not available".to_string()
                } else {
                    match snapshot.raw {
                        Some(raw) if raw.is_empty() => "Pump not connected".to_string(),
                        Some(raw) => raw,
                        None => "0".to_string(),
                    }
                };
                DeviceStatus {
                    name: slot.key.to_string(),
                    status,
                    units: slot.units.clone(),
                }
            })
            .collect();
        if let Some((reader, units)) = &self.gas {
            let pressure = reader.read();
            let status = if pressure == GAS_SENTINEL {
                "Reader not connected".to_string()
            } else {
                format!("{pressure:.2}")
            };
            list.push(DeviceStatus {
                name: "gas".to_string(),
                status,
                units: units.clone(),
            });
        }
        list
    }

    /// Pyrometer snapshot, if one is configured.
    pub fn temperature(&self) -> Option<TemperatureStatus> {
        let pyrometer = self.pyrometer.as_ref()?;
        let snapshot = pyrometer.snapshot();
        let temperature = if !snapshot.ready {
            Reading::Text("Port not available".to_string())
        } else if snapshot.temperature == 0.0 {
            Reading::Text("Pyrometer not connected".to_string())
        } else {
            Reading::Value(snapshot.temperature)
        };
        Some(TemperatureStatus {
            temperature,
            laser: snapshot.laser_on,
            max_temperature: snapshot.max_temperature,
        })
    }

    /// Whether a pyrometer is configured at all.
    pub fn has_pyrometer(&self) -> bool {
        self.pyrometer.is_some()
    }

    /// Zeroes the pyrometer's running maximum. Returns false when no
    /// pyrometer is configured.
    pub fn reset_max(&self) -> bool {
        match &self.pyrometer {
            Some(pyrometer) => {
                pyrometer.reset_max();
                true
            }
            None => false,
        }
    }

    /// Switches the rangefinder laser on. Device errors are logged and
    /// swallowed; the caller only learns whether a pyrometer exists.
    pub async fn laser_on(&self) -> bool {
        match &self.pyrometer {
            Some(pyrometer) => {
                if let Err(e) = pyrometer.laser_on().await {
                    warn!("Laser on failed on {}: {}", pyrometer.name(), e);
                }
                true
            }
            None => false,
        }
    }

    /// Switches the rangefinder laser off.
    pub async fn laser_off(&self) -> bool {
        match &self.pyrometer {
            Some(pyrometer) => {
                if let Err(e) = pyrometer.laser_off().await {
                    warn!("Laser off failed on {}: {}", pyrometer.name(), e);
                }
                true
            }
            None => false,
        }
    }

    /// Signals every polling task to stop and waits for them to exit.
    pub async fn shutdown(&self) {
        let _ = self.stop.send(true);
        for slot in &self.gauges {
            slot.gauge.stopped().await;
        }
        if let Some((reader, _)) = &self.gas {
            reader.stopped().await;
        }
        if let Some(pyrometer) = &self.pyrometer {
            pyrometer.stopped().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumpreader_hw::link::mock::MockLink;
    use pumpreader_hw::{GaugeConfig, PyrometerConfig, SerialLink};
    use std::time::Duration;
    use tokio::time::sleep;

    fn gauge_config(name: &str) -> GaugeConfig {
        GaugeConfig {
            name: name.to_string(),
            port: "/dev/pumpreader-test-missing".to_string(),
            baud: 9600,
            command: b"PR1\r".to_vec(),
            follow_up: None,
            start: 5,
            length: 16,
        }
    }

    fn mock_registry(links: Vec<(&'static str, Box<dyn SerialLink>)>) -> Registry {
        let (stop, stop_rx) = watch::channel(false);
        let gauges = links
            .into_iter()
            .map(|(key, link)| GaugeSlot {
                key,
                units: "mbar".to_string(),
                gauge: Gauge::start(gauge_config(key), link, stop_rx.clone()),
            })
            .collect();
        Registry {
            gauges,
            gas: None,
            pyrometer: None,
            stop,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_reading_and_not_connected() {
        let registry = mock_registry(vec![
            (
                "turbo",
                Box::new(MockLink::new().push_reply(b"0000,1.00E-3 mbar\r\n")),
            ),
            // Silent device: replies are always empty.
            ("tank", Box::new(MockLink::new())),
        ]);

        // Past the startup delay and the first cycle.
        sleep(Duration::from_secs(3)).await;

        let status = registry.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].name, "turbo");
        assert_eq!(status[0].status, "1.00E-3 mba");
        assert_eq!(status[1].name, "tank");
        assert_eq!(status[1].status, "Pump not connected");

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_port_not_available() {
        let (stop, stop_rx) = watch::channel(false);
        let registry = Registry {
            gauges: vec![GaugeSlot {
                key: "ion",
                units: "mbar".to_string(),
                // The port path does not exist, so this stays not-ready.
                gauge: Gauge::connect(gauge_config("Ion Pump"), stop_rx),
            }],
            gas: None,
            pyrometer: None,
            stop,
        };

        let status = registry.status();
        assert_eq!(status[0].status, "Port not available");
        assert_eq!(registry.pressures()[0].pressure, 0.0);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn pressures_keep_device_order_and_include_gas() {
        let (stop, stop_rx) = watch::channel(false);
        let registry = Registry {
            gauges: vec![GaugeSlot {
                key: "turbo",
                units: "mbar".to_string(),
                gauge: Gauge::start(
                    gauge_config("Turbo Pump"),
                    Box::new(MockLink::new().push_reply(b"0000,7.50E-8 mbar\r\n")),
                    stop_rx,
                ),
            }],
            gas: Some((GasPressure::absent(), "bar".to_string())),
            pyrometer: None,
            stop,
        };

        sleep(Duration::from_secs(3)).await;

        let pressures = registry.pressures();
        assert_eq!(pressures.len(), 2);
        assert_eq!(pressures[0].pump, "turbo");
        assert_eq!(pressures[0].pressure, 7.50e-8);
        assert_eq!(pressures[1].pump, "gas");
        assert_eq!(pressures[1].pressure, GAS_SENTINEL);

        let status = registry.status();
        assert_eq!(status[1].status, "Reader not connected");

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn temperature_substitutes_text_until_device_answers() {
        let (stop, stop_rx) = watch::channel(false);
        let pyrometer = Pyrometer::start(
            PyrometerConfig {
                name: "Pyrometer".to_string(),
                port: "/dev/pumpreader-test-missing".to_string(),
                baud: 115200,
            },
            Box::new(
                MockLink::new()
                    .push_reply(&1235u16.to_be_bytes()) // 23.5 degrees
                    .push_reply(&[0x00]),
            ),
            stop_rx,
        );
        let registry = Registry {
            gauges: Vec::new(),
            gas: None,
            pyrometer: Some(pyrometer),
            stop,
        };

        // Before the first cycle the value is still zero.
        let before = registry.temperature().unwrap();
        assert_eq!(
            before.temperature,
            Reading::Text("Pyrometer not connected".to_string())
        );

        sleep(Duration::from_secs(3)).await;

        let after = registry.temperature().unwrap();
        assert_eq!(after.temperature, Reading::Value(23.5));
        assert_eq!(after.max_temperature, 23.5);
        assert!(!after.laser);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn controls_report_missing_pyrometer() {
        let registry = mock_registry(Vec::new());
        assert!(registry.temperature().is_none());
        assert!(!registry.has_pyrometer());
        assert!(!registry.reset_max());
        assert!(!registry.laser_on().await);
        assert!(!registry.laser_off().await);
        registry.shutdown().await;
    }

    #[test]
    fn readings_serialize_untagged() {
        let value = serde_json::to_value(Reading::Value(1.5)).unwrap();
        assert_eq!(value, serde_json::json!(1.5));
        let text = serde_json::to_value(Reading::Text("Port not available".into())).unwrap();
        assert_eq!(text, serde_json::json!("Port not available"));
    }
}
