//! In-memory [`Transport`] used by tests (and available to downstream
//! crates under the `mocks` feature) so the protocol engine can be
//! exercised without a real board attached.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::errors::Error;
use crate::transport::Transport;

#[derive(Clone, Default)]
pub struct MockTransport {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    pub outbound: Arc<Mutex<Vec<u8>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for the next reads to return, as if the board had sent
    /// them.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.inbound.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.outbound.lock().unwrap())
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.outbound.lock().unwrap().extend_from_slice(buf);
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(byte) = self.inbound.lock().unwrap().pop_front() {
                return Ok(byte);
            }
            if Instant::now() >= deadline {
                return Err(Error::from(io::Error::from(io::ErrorKind::TimedOut)));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, Error> {
        Ok(Box::new(self.clone()))
    }
}
