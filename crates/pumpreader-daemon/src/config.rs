//! Configuration management.
//!
//! All device descriptors are validated once at load time: undecodable
//! commands, inverted offsets, or inverted calibration windows reject
//! startup before any poller runs.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pumpreader_hw::{GasCalibration, GaugeConfig, PyrometerConfig};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Web API configuration
    #[serde(default)]
    pub web: WebConfig,

    /// Turbo pump gauge
    pub turbo: Option<GaugeSection>,

    /// Tank pump gauge
    pub tank: Option<GaugeSection>,

    /// Ion pump gauge
    pub ion: Option<GaugeSection>,

    /// Pyrometer with rangefinder laser
    pub pyrometer: Option<PyrometerSection>,

    /// Analog gas pressure transducer
    pub gas: Option<GasSection>,

    /// Ready-indicator pin
    #[serde(default)]
    pub gpio: GpioConfig,
}

/// Web API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Server listen address (e.g., "0.0.0.0:8686")
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// One text-protocol gauge section.
#[derive(Debug, Clone, Deserialize)]
pub struct GaugeSection {
    /// Serial port path
    pub port: String,

    /// Baud rate
    #[serde(default = "default_gauge_speed")]
    pub speed: u32,

    /// Primary command, base64 encoded
    pub command: String,

    /// Follow-up command for addressed devices, base64 encoded
    pub follow_up: Option<String>,

    /// Start offset of the reading in the reply
    pub start: usize,

    /// End offset (exclusive) of the reading in the reply
    pub length: usize,

    /// Display units
    #[serde(default = "default_gauge_units")]
    pub units: String,
}

impl GaugeSection {
    /// Builds the validated poller descriptor.
    pub fn descriptor(&self, name: &str) -> Result<GaugeConfig> {
        let command = BASE64
            .decode(&self.command)
            .with_context(|| format!("{name}: command is not valid base64"))?;
        if command.is_empty() {
            bail!("{name}: command must not be empty");
        }
        let follow_up = self
            .follow_up
            .as_deref()
            .map(|s| BASE64.decode(s))
            .transpose()
            .with_context(|| format!("{name}: follow_up is not valid base64"))?;
        if self.start >= self.length {
            bail!(
                "{name}: start ({}) must be below length ({})",
                self.start,
                self.length
            );
        }
        Ok(GaugeConfig {
            name: name.to_string(),
            port: self.port.clone(),
            baud: self.speed,
            command,
            follow_up,
            start: self.start,
            length: self.length,
        })
    }
}

/// Pyrometer section.
#[derive(Debug, Clone, Deserialize)]
pub struct PyrometerSection {
    /// Serial port path
    pub port: String,

    /// Baud rate
    #[serde(default = "default_pyrometer_speed")]
    pub speed: u32,
}

impl PyrometerSection {
    pub fn descriptor(&self, name: &str) -> PyrometerConfig {
        PyrometerConfig {
            name: name.to_string(),
            port: self.port.clone(),
            baud: self.speed,
        }
    }
}

/// Analog gas pressure section.
#[derive(Debug, Clone, Deserialize)]
pub struct GasSection {
    /// ADC bridge USB vendor id
    #[serde(default = "default_gas_vid")]
    pub vendor_id: u16,

    /// ADC bridge USB product id
    #[serde(default = "default_gas_pid")]
    pub product_id: u16,

    /// Transducer voltage at minimum pressure
    pub min_volt: f64,

    /// Transducer voltage at maximum pressure
    pub max_volt: f64,

    /// Pressure at `min_volt`
    pub min_units: f64,

    /// Pressure at `max_volt`
    pub max_units: f64,

    /// Display units
    #[serde(default = "default_gas_units")]
    pub units: String,
}

impl GasSection {
    /// Builds the validated calibration constants.
    pub fn calibration(&self) -> Result<GasCalibration> {
        if self.min_volt >= self.max_volt {
            bail!(
                "gas: min_volt ({}) must be below max_volt ({})",
                self.min_volt,
                self.max_volt
            );
        }
        if self.min_units >= self.max_units {
            bail!(
                "gas: min_units ({}) must be below max_units ({})",
                self.min_units,
                self.max_units
            );
        }
        Ok(GasCalibration {
            min_volt: self.min_volt,
            max_volt: self.max_volt,
            min_units: self.min_units,
            max_units: self.max_units,
        })
    }
}

/// Ready-indicator pin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GpioConfig {
    /// BCM pin held low while initialising and high once all pollers
    /// have started. Unset disables the indicator.
    pub ready_pin: Option<u8>,
}

// Default value functions
fn default_listen() -> String {
    "0.0.0.0:8686".to_string()
}

fn default_gauge_speed() -> u32 {
    9600
}

fn default_gauge_units() -> String {
    "mbar".to_string()
}

fn default_pyrometer_speed() -> u32 {
    115200
}

fn default_gas_vid() -> u16 {
    0x04D8
}

fn default_gas_pid() -> u16 {
    0x00DD
}

fn default_gas_units() -> String {
    "bar".to_string()
}

impl Config {
    /// Loads configuration from a TOML file and validates every device
    /// section.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every configured section, rejecting startup on the first
    /// invalid field.
    fn validate(&self) -> Result<()> {
        for (name, section) in [
            ("turbo", &self.turbo),
            ("tank", &self.tank),
            ("ion", &self.ion),
        ] {
            if let Some(section) = section {
                section.descriptor(name)?;
            }
        }
        if let Some(gas) = &self.gas {
            gas.calibration()?;
        }
        Ok(())
    }
}
