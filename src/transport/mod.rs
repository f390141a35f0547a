//! Transport layer for the encrypted upstream connection.
//!
//! The subscriber state machine only ever sees the [`Transport`] and
//! [`Connector`] traits plus the structured [`ErrorClass`] derived here from
//! `io::ErrorKind`. Failure handling never inspects error message text.

use crate::error::Error;
use crate::error::Result;
use std::io;
use std::time::Duration;

pub mod mock;
mod tls;
pub use tls::TlsEndpoint;

/// Byte transport for one established connection
pub trait Transport: Send {
    /// Read into `buffer`, returning the number of bytes read. `Ok(0)`
    /// means the peer closed the stream without an error.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole of `data`
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Adjust the read timeout for subsequent reads
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;
}

/// Factory for transports. Every call opens a fresh socket and performs the
/// full handshake, so a reconnect never reuses a possibly unusable
/// descriptor.
pub trait Connector: Send {
    fn connect(&mut self) -> Result<Box<dyn Transport>>;
}

/// Failure classes recognized by the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Endpoint refused the connection; retried indefinitely at first
    /// connect
    Refused,
    /// Broken pipe or reset by peer; bounded reconnect, disconnect budget
    Broken,
    /// Socket no longer connected; bounded reconnect, generic budget
    NotConnected,
    /// Read or write timed out; not a failure, routes to liveness probing
    WouldBlock,
    /// Unrecognized condition; deliberately not retried
    Fatal,
}

/// Classify an error once, at the transport boundary
pub fn classify(err: &Error) -> ErrorClass {
    match err {
        Error::Io(e) => match e.kind() {
            io::ErrorKind::ConnectionRefused => ErrorClass::Refused,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => ErrorClass::Broken,
            io::ErrorKind::NotConnected => ErrorClass::NotConnected,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ErrorClass::WouldBlock,
            _ => ErrorClass::Fatal,
        },
        _ => ErrorClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err(kind: io::ErrorKind) -> Error {
        Error::Io(io::Error::new(kind, "test"))
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            classify(&io_err(io::ErrorKind::ConnectionRefused)),
            ErrorClass::Refused
        );
        assert_eq!(
            classify(&io_err(io::ErrorKind::BrokenPipe)),
            ErrorClass::Broken
        );
        assert_eq!(
            classify(&io_err(io::ErrorKind::ConnectionReset)),
            ErrorClass::Broken
        );
        assert_eq!(
            classify(&io_err(io::ErrorKind::NotConnected)),
            ErrorClass::NotConnected
        );
        assert_eq!(
            classify(&io_err(io::ErrorKind::WouldBlock)),
            ErrorClass::WouldBlock
        );
        assert_eq!(
            classify(&io_err(io::ErrorKind::TimedOut)),
            ErrorClass::WouldBlock
        );
        assert_eq!(
            classify(&io_err(io::ErrorKind::PermissionDenied)),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_non_io_errors_are_fatal() {
        assert_eq!(
            classify(&Error::Other("unexpected".to_string())),
            ErrorClass::Fatal
        );
    }
}
