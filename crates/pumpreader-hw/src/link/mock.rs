//! Scripted serial link for tests.
//!
//! Public (not test-gated) so downstream crates can drive pollers
//! against canned device behavior.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use super::SerialLink;

/// A [`SerialLink`] that replays scripted replies and records writes.
///
/// Each `read` pops the next scripted item; an exhausted script reads as
/// an empty reply, matching a silent device.
#[derive(Default)]
pub struct MockLink {
    replies: VecDeque<io::Result<Vec<u8>>>,
    writes: Vec<Vec<u8>>,
    write_error: Option<io::ErrorKind>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next unanswered `read`.
    pub fn push_reply(mut self, data: &[u8]) -> Self {
        self.replies.push_back(Ok(data.to_vec()));
        self
    }

    /// Queues an I/O error for the next unanswered `read`.
    pub fn push_read_error(mut self, kind: io::ErrorKind) -> Self {
        self.replies.push_back(Err(io::Error::from(kind)));
        self
    }

    /// Makes every subsequent `write` fail with `kind`.
    pub fn fail_writes(mut self, kind: io::ErrorKind) -> Self {
        self.write_error = Some(kind);
        self
    }

    /// All payloads written so far, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }
}

#[async_trait]
impl SerialLink for MockLink {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(kind) = self.write_error {
            return Err(io::Error::from(kind));
        }
        self.writes.push(data.to_vec());
        Ok(())
    }

    async fn read(&mut self, max: usize, _deadline: Duration) -> io::Result<Vec<u8>> {
        match self.replies.pop_front() {
            Some(Ok(mut data)) => {
                data.truncate(max);
                Ok(data)
            }
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}
