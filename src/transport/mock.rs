//! Scripted transport and connector for testing
//!
//! Tests script the peer's behavior as a sequence of read outcomes and
//! connect outcomes. Clones share state, so a test can keep a handle for
//! assertions while the subscriber owns the transport.

use super::{Connector, Transport};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// One scripted outcome of a `Transport::read` call
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Bytes delivered by the peer
    Data(Vec<u8>),
    /// No data within the read timeout
    Timeout,
    /// Orderly close: the read returns zero bytes
    Closed,
    /// Socket-level failure of the given kind
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct MockState {
    reads: VecDeque<ReadStep>,
    written: Vec<u8>,
    write_failures: VecDeque<io::ErrorKind>,
}

/// Mock transport driven by a script of read outcomes.
///
/// An exhausted script reads as a timeout, matching an idle peer.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one read outcome to the script
    pub fn push_read(&self, step: ReadStep) {
        self.state.lock().reads.push_back(step);
    }

    /// Make the next write fail with `kind`
    pub fn push_write_failure(&self, kind: io::ErrorKind) {
        self.state.lock().write_failures.push_back(kind);
    }

    /// Everything written so far, as UTF-8
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().written).into_owned()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let step = self.state.lock().reads.pop_front();
        match step {
            Some(ReadStep::Data(bytes)) => {
                let n = bytes.len().min(buffer.len());
                buffer[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(ReadStep::Closed) => Ok(0),
            Some(ReadStep::Fail(kind)) => Err(Error::Io(io::Error::new(kind, "scripted failure"))),
            Some(ReadStep::Timeout) | None => Err(Error::Io(io::Error::new(
                io::ErrorKind::WouldBlock,
                "read timed out",
            ))),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(kind) = state.write_failures.pop_front() {
            return Err(Error::Io(io::Error::new(kind, "scripted write failure")));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// One scripted outcome of a `Connector::connect` call
pub enum ConnectStep {
    /// Endpoint refused the connection
    Refused,
    /// Connect failed with the given kind
    Fail(io::ErrorKind),
    /// Connect succeeded with this transport
    Ok(MockTransport),
}

#[derive(Default)]
struct ConnectorState {
    script: VecDeque<ConnectStep>,
    attempts: u32,
}

/// Mock connector driven by a script of connect outcomes.
///
/// An exhausted script refuses every further attempt, matching a server
/// that never comes back.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one connect outcome to the script
    pub fn push(&self, step: ConnectStep) {
        self.state.lock().script.push_back(step);
    }

    /// Total connect attempts made so far
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }
}

impl Connector for MockConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>> {
        let mut state = self.state.lock();
        state.attempts += 1;
        match state.script.pop_front() {
            Some(ConnectStep::Ok(transport)) => Ok(Box::new(transport)),
            Some(ConnectStep::Fail(kind)) => Err(Error::Io(io::Error::new(
                kind,
                "scripted connect failure",
            ))),
            Some(ConnectStep::Refused) | None => Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}
