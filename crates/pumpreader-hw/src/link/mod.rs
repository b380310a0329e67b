//! Byte-oriented serial transport.
//!
//! Pollers talk to their device through the [`SerialLink`] trait so tests
//! can substitute a scripted link (see [`mock`]). The real implementation
//! is a [`SerialStream`] opened 8N1 via [`open_port`].

pub mod mock;

use crate::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

/// A byte channel to one serial device.
///
/// `read` returns up to `max` bytes; an expired deadline yields whatever
/// arrived so far, possibly nothing. An empty reply means the device did
/// not answer, which is never an error at this layer.
#[async_trait]
pub trait SerialLink: Send {
    /// Writes all bytes to the device.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Reads up to `max` bytes, giving the device `deadline` to answer.
    async fn read(&mut self, max: usize, deadline: Duration) -> io::Result<Vec<u8>>;
}

/// Opens a serial port in 8N1 framing at the given baud rate.
///
/// This is attempted exactly once per device at startup; a failure here
/// leaves the device permanently not-ready (no reconnect policy).
pub fn open_port(device: &str, path: &str, baud: u32) -> Result<SerialStream> {
    let port = tokio_serial::new(path, baud)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .map_err(|source| Error::PortOpen {
            device: device.to_string(),
            port: path.to_string(),
            source,
        })?;
    debug!("Opened {} at {} baud for {}", path, baud, device);
    Ok(port)
}

#[async_trait]
impl SerialLink for SerialStream {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data).await?;
        self.flush().await
    }

    async fn read(&mut self, max: usize, deadline: Duration) -> io::Result<Vec<u8>> {
        read_with_deadline(self, max, deadline).await
    }
}

/// Accumulates up to `max` bytes until the deadline expires.
///
/// Replies can arrive split across chunks; keep reading until the
/// buffer is full or the deadline expires, and return whatever arrived.
async fn read_with_deadline<R>(reader: &mut R, max: usize, deadline: Duration) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; max];
    let mut filled = 0;
    let start = Instant::now();

    while filled < max {
        let Some(remaining) = deadline.checked_sub(start.elapsed()) else {
            break;
        };
        match timeout(remaining, reader.read(&mut buf[filled..])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => filled += n,
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn read_accumulates_chunked_replies() {
        let (mut device, mut host) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            device.write_all(b"1.00").await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            device.write_all(b"E-3 mbar").await.unwrap();
            device
        });

        let reply = read_with_deadline(&mut host, 12, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"1.00E-3 mbar");
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_yields_partial_reply() {
        let (mut device, mut host) = tokio::io::duplex(64);
        device.write_all(b"1.0").await.unwrap();

        let reply = read_with_deadline(&mut host, 100, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"1.0");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_yields_empty_reply() {
        let (_device, mut host) = tokio::io::duplex(64);

        let reply = read_with_deadline(&mut host, 100, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(reply.is_empty());
    }
}
