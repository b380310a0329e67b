//! Raspberry Pi ready-indicator pin.
//!
//! A single digital output held low while the daemon initialises and
//! driven high once all pollers have started. Liveness signal for
//! external supervision only; not part of the sensing logic.

use anyhow::{Context, Result};
use rppal::gpio::{Gpio, OutputPin};
use tracing::info;

pub struct ReadyPin {
    pin: OutputPin,
}

impl ReadyPin {
    /// Claims the BCM pin and drives it low.
    pub fn new(bcm: u8) -> Result<Self> {
        let mut pin = Gpio::new()
            .context("GPIO not available")?
            .get(bcm)
            .with_context(|| format!("BCM pin {bcm} not available"))?
            .into_output();
        pin.set_low();
        Ok(Self { pin })
    }

    /// Drives the pin high: all pollers are up.
    pub fn set_ready(&mut self) {
        self.pin.set_high();
        info!("Ready pin set");
    }
}
