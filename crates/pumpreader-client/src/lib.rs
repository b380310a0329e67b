//! HTTP client library for communicating with the Pump Reader daemon.
//!
//! Typed wrappers over the daemon's JSON API for CLI and scripting use.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// One entry of the pressures list.
#[derive(Debug, Clone, Deserialize)]
pub struct PressureReading {
    pub pump: String,
    pub pressure: f64,
    pub units: String,
}

/// One entry of the device status list.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatus {
    pub name: String,
    pub status: String,
    pub units: String,
}

/// A reading that degrades to explanatory text when the device cannot
/// supply a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Value(f64),
    Text(String),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(value) => write!(f, "{value}"),
            Reading::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Pyrometer snapshot from the temperature endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TemperatureStatus {
    pub temperature: Reading,
    pub laser: bool,
    pub max_temperature: f64,
}

/// Client for one Pump Reader daemon.
pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    /// Creates a client against a base URL such as
    /// `http://127.0.0.1:8686`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Current reading of every configured gauge.
    pub async fn pressures(&self) -> Result<Vec<PressureReading>> {
        self.get_json("/api/pressures").await
    }

    /// Display string per configured device.
    pub async fn status(&self) -> Result<Vec<DeviceStatus>> {
        self.get_json("/api/status").await
    }

    /// Pyrometer snapshot. Fails when no pyrometer is configured.
    pub async fn temperature(&self) -> Result<TemperatureStatus> {
        self.get_json("/api/temperature").await
    }

    /// Zeroes the pyrometer's running maximum.
    pub async fn reset_max(&self) -> Result<()> {
        self.post("/api/temperature/reset").await
    }

    /// Switches the rangefinder laser on.
    pub async fn laser_on(&self) -> Result<()> {
        self.post("/api/laser/on").await
    }

    /// Switches the rangefinder laser off.
    pub async fn laser_off(&self) -> Result<()> {
        self.post("/api/laser/off").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {url}"))?
            .error_for_status()
            .with_context(|| format!("Daemon rejected GET {path}"))?;
        response
            .json()
            .await
            .with_context(|| format!("Unexpected response body from {path}"))
    }

    async fn post(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        self.http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach daemon at {url}"))?
            .error_for_status()
            .with_context(|| format!("Daemon rejected POST {path}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressures_deserialize() {
        let list: Vec<PressureReading> = serde_json::from_str(
            r#"[{"pump":"turbo","pressure":1.0e-3,"units":"mbar"},
                {"pump":"gas","pressure":1000.0,"units":"bar"}]"#,
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].pump, "turbo");
        assert_eq!(list[0].pressure, 1.0e-3);
    }

    #[test]
    fn temperature_accepts_number_or_text() {
        let numeric: TemperatureStatus = serde_json::from_str(
            r#"{"temperature":23.5,"laser":false,"max_temperature":80.0}"#,
        )
        .unwrap();
        assert_eq!(numeric.temperature, Reading::Value(23.5));

        let text: TemperatureStatus = serde_json::from_str(
            r#"{"temperature":"Port not available","laser":false,"max_temperature":0.0}"#,
        )
        .unwrap();
        assert_eq!(
            text.temperature,
            Reading::Text("Port not available".to_string())
        );
        assert_eq!(text.temperature.to_string(), "Port not available");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = DaemonClient::new("http://127.0.0.1:8686/");
        assert_eq!(client.base_url, "http://127.0.0.1:8686");
    }
}
