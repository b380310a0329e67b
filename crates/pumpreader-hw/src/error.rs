//! Error types for the Pump Reader hardware library.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with the hardware.
///
/// None of these ever reach the consumer layer: open failures leave a
/// device permanently not-ready, cycle failures reset its value to the
/// disconnected sentinel, and both are logged by the owning poller.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial port could not be opened at startup.
    #[error("could not open port {port} for {device}: {source}")]
    PortOpen {
        device: String,
        port: String,
        source: tokio_serial::Error,
    },

    /// ADC controller not found on the USB bus at startup.
    #[error("ADC controller not found (VID:PID {vid:04X}:{pid:04X})")]
    DeviceAbsent { vid: u16, pid: u16 },

    /// USB HID communication error.
    #[error("USB HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Serial port communication error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Serial I/O error during a polling cycle.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device reply was not valid UTF-8 text.
    #[error("reply is not valid text: {0}")]
    BadReply(#[from] std::string::FromUtf8Error),
}
