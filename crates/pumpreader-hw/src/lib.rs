//! Pump Reader Hardware Library
//!
//! Provides hardware abstraction for the vacuum system sensors: RS232
//! pressure gauges (turbo/tank/ion pumps), a binary-protocol pyrometer
//! with a rangefinder laser, and an MCP2221-attached analog gas
//! pressure transducer.
//!
//! Each poller owns its transport exclusively and samples on its own
//! periodic task. Failures never propagate to readers: a device that is
//! absent, disconnected, or returning garbage degrades to a sentinel
//! value and a status flag, and the task keeps running.

pub mod adc;
pub mod error;
pub mod gauge;
pub mod link;
pub mod pyrometer;

pub use adc::{AdcSource, GasCalibration, GasPressure, Mcp2221, GAS_SENTINEL};
pub use error::{Error, Result};
pub use gauge::{Gauge, GaugeConfig, GaugeSnapshot};
pub use link::SerialLink;
pub use pyrometer::{Pyrometer, PyrometerConfig, PyrometerSnapshot};

use std::time::Duration;

/// Delay before the first polling cycle of every sensor task.
pub const POLL_STARTUP_DELAY: Duration = Duration::from_secs(1);

/// Delay between polling cycles, counted from cycle completion.
/// Cadence is completion-relative, not wall-clock corrected.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum bytes accepted in a single device reply.
pub const READ_MAX: usize = 100;

/// Deadline for a device reply. An expired deadline yields an empty
/// reply, not an error.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);
