//! Connection manager: the subscriber state machine.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Streaming
//!                     ^                           |
//!                     +------ reconnect ----------+
//!                     |        (bounded)          |
//!                     v                           v
//!                  Stopped <----------------- Degraded
//! ```
//!
//! The first connect retries indefinitely while the server is absent: in
//! this deployment the server is expected to start after the client, so
//! first connect never gives up. Once streaming, failures fall into bounded
//! reconnect classes:
//!
//! | Trigger                              | Budget |
//! |--------------------------------------|--------|
//! | Zero-byte read (orderly disconnect)  | 5      |
//! | Broken pipe / reset by peer          | 5      |
//! | Socket not connected, framing corruption | 11 |
//!
//! Every reconnect opens a fresh socket, resets the frame assembler and
//! re-sends the subscription. Budget exhaustion is terminal: the sink's
//! stopped condition is raised and the loop exits. Unrecognized socket
//! errors do not retry at all; the error is returned so the supervisor can
//! fail fast.

mod liveness;
pub use liveness::LivenessProber;

use crate::error::{Error, Result};
use crate::framing::FrameAssembler;
use crate::protocol::{self, Decoded, SubscriptionRequest};
use crate::signals::SignalName;
use crate::sink::SignalHub;
use crate::transport::{classify, Connector, ErrorClass, Transport};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Reconnect attempts after an orderly disconnect or a broken connection
const DISCONNECT_ATTEMPTS: u32 = 5;
/// Reconnect attempts after a generic socket error or framing corruption
const GENERIC_ATTEMPTS: u32 = 11;
/// Steady-state read buffer size
const READ_CHUNK: usize = 2048;

/// Connection lifecycle states. Exactly one instance exists, owned by the
/// subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Degraded,
    Stopped,
}

/// Timing knobs, separated from the state machine so tests can run it at
/// full speed.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Pause between (re)connect attempts
    pub retry_delay: Duration,
    /// Timeout for the one catalogue read after subscribing
    pub catalogue_timeout: Duration,
    /// Steady-state read timeout; expiry triggers a liveness probe
    pub read_timeout: Duration,
    /// Idle pause after an acknowledged probe round
    pub probe_idle: Duration,
    /// Quiet period after which a stalled stream forces a window flush
    pub quiet_window: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            catalogue_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(1),
            probe_idle: Duration::from_secs(5),
            quiet_window: Duration::from_secs(30),
        }
    }
}

enum ProbeOutcome {
    /// Probe round complete, stay in the read loop
    Idle,
    /// Connection gone, reconnect with the given budget
    Reconnect(u32),
    /// Unclassified failure, fail fast
    Fatal(Error),
}

/// The network unit: owns the transport, frame assembler, decoder state and
/// retry budgets. The dispatch sink is the only state shared with the
/// consumer.
pub struct Subscriber {
    connector: Box<dyn Connector>,
    hub: Arc<SignalHub>,
    subscription: SubscriptionRequest,
    timing: Timing,
    state: ConnectionState,
    assembler: FrameAssembler,
    prober: LivenessProber,
}

impl Subscriber {
    pub fn new(connector: Box<dyn Connector>, hub: Arc<SignalHub>, timing: Timing) -> Self {
        let prober = LivenessProber::new(timing.quiet_window);
        Self {
            connector,
            hub,
            subscription: SubscriptionRequest::new(&SignalName::ALL),
            timing,
            state: ConnectionState::Disconnected,
            assembler: FrameAssembler::new(),
            prober,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run until the upstream is terminally gone (`Ok`) or an unclassified
    /// socket error demands a fail-fast exit (`Err`). On the `Ok` path the
    /// sink's stopped condition has been raised and every decoded update
    /// was dispatched before returning.
    pub fn run(&mut self) -> Result<()> {
        let Some(mut transport) = self.initial_connect() else {
            return Ok(());
        };
        self.read_catalogue(&mut transport);
        if let Err(e) = transport.set_read_timeout(self.timing.read_timeout) {
            log::warn!("Failed to set read timeout: {}", e);
        }
        self.set_state(ConnectionState::Streaming);

        let mut buffer = vec![0u8; READ_CHUNK];
        while !self.hub.is_stopped() {
            match transport.read(&mut buffer) {
                Ok(0) => {
                    // A zero-length read on the timeout-driven socket means
                    // the peer closed the stream without an error.
                    log::warn!("Server closed the stream, reconnecting");
                    if !self.reconnect(&mut transport, DISCONNECT_ATTEMPTS) {
                        return Ok(());
                    }
                }
                Ok(n) => {
                    if let Err(e) = self.handle_bytes(&buffer[..n]) {
                        log::error!("{}", e);
                        self.set_state(ConnectionState::Degraded);
                        if !self.reconnect(&mut transport, GENERIC_ATTEMPTS) {
                            return Ok(());
                        }
                    }
                }
                Err(e) => match classify(&e) {
                    ErrorClass::WouldBlock => match self.probe(&mut transport) {
                        ProbeOutcome::Idle => {}
                        ProbeOutcome::Reconnect(budget) => {
                            if !self.reconnect(&mut transport, budget) {
                                return Ok(());
                            }
                        }
                        ProbeOutcome::Fatal(e) => {
                            self.set_state(ConnectionState::Stopped);
                            return Err(e);
                        }
                    },
                    ErrorClass::Broken => {
                        log::warn!("Connection broken ({}), reconnecting", e);
                        if !self.reconnect(&mut transport, DISCONNECT_ATTEMPTS) {
                            return Ok(());
                        }
                    }
                    ErrorClass::NotConnected | ErrorClass::Refused => {
                        log::warn!("Socket unusable ({}), re-creating connection", e);
                        self.set_state(ConnectionState::Degraded);
                        if !self.reconnect(&mut transport, GENERIC_ATTEMPTS) {
                            return Ok(());
                        }
                    }
                    ErrorClass::Fatal => {
                        self.set_state(ConnectionState::Stopped);
                        return Err(e);
                    }
                },
            }
        }
        Ok(())
    }

    /// First connect: retry indefinitely until the server appears or
    /// shutdown is requested (returns None).
    fn initial_connect(&mut self) -> Option<Box<dyn Transport>> {
        self.set_state(ConnectionState::Connecting);
        loop {
            if self.hub.is_stopped() {
                return None;
            }
            match self.try_connect() {
                Ok(transport) => return Some(transport),
                Err(e) => {
                    match classify(&e) {
                        ErrorClass::Refused => log::info!("Waiting for server to (re-)start"),
                        _ => log::warn!("Connect attempt failed: {}", e),
                    }
                    thread::sleep(self.timing.retry_delay);
                }
            }
        }
    }

    /// Open a fresh socket, authenticate and send the subscription
    fn try_connect(&mut self) -> Result<Box<dyn Transport>> {
        let mut transport = self.connector.connect()?;
        transport.write(&self.subscription.to_wire()?)?;
        self.set_state(ConnectionState::Subscribed);
        Ok(transport)
    }

    /// One longer-timeout read for the catalogue reply. Display only: any
    /// failure here is logged and streaming proceeds without a catalogue.
    fn read_catalogue(&mut self, transport: &mut Box<dyn Transport>) {
        if let Err(e) = transport.set_read_timeout(self.timing.catalogue_timeout) {
            log::warn!("Failed to set catalogue read timeout: {}", e);
            return;
        }
        let mut buffer = vec![0u8; 4096];
        match transport.read(&mut buffer) {
            Ok(0) => log::warn!("Server closed before sending the signal catalogue"),
            Ok(n) => {
                if let Err(e) = self.handle_bytes(&buffer[..n]) {
                    log::warn!("Unreadable catalogue reply: {}", e);
                }
            }
            Err(e) => log::warn!("No catalogue reply: {}", e),
        }
    }

    /// Bounded re-connection with a fresh socket per attempt. Returns true
    /// on success; false when the budget is exhausted (terminal Stopped)
    /// or shutdown was requested.
    fn reconnect(&mut self, transport: &mut Box<dyn Transport>, max_attempts: u32) -> bool {
        self.set_state(ConnectionState::Connecting);
        // A partial frame cannot span a reconnect boundary.
        self.assembler.reset();

        for attempt in 1..=max_attempts {
            if self.hub.is_stopped() {
                return false;
            }
            match self.try_connect() {
                Ok(mut fresh) => match fresh.set_read_timeout(self.timing.read_timeout) {
                    Ok(()) => {
                        log::info!("Re-connected on attempt {}/{}", attempt, max_attempts);
                        *transport = fresh;
                        self.set_state(ConnectionState::Streaming);
                        return true;
                    }
                    Err(e) => log::warn!("Re-connected socket unusable: {}", e),
                },
                Err(e) => {
                    log::debug!(
                        "Re-connect attempt {}/{} failed: {}",
                        attempt,
                        max_attempts,
                        e
                    );
                }
            }
            thread::sleep(self.timing.retry_delay);
        }

        log::error!("Re-connection to server failed after {} attempts", max_attempts);
        self.set_state(ConnectionState::Stopped);
        self.hub.mark_stopped();
        false
    }

    /// Feed received bytes through the assembler and act on every decoded
    /// record. An error means framing corruption and aborts the connection.
    fn handle_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(bytes);
        for record in self.assembler.feed(&text) {
            match protocol::decode(&record)? {
                Decoded::Catalogue { kind, names } => {
                    log::info!("{}:", kind.heading());
                    for name in names {
                        log::info!("  {}", name);
                    }
                }
                Decoded::SyncAck => {
                    log::debug!("Sync reply from server received");
                    self.prober.note_sync_ack(&self.hub);
                }
                Decoded::Update(update) => {
                    self.prober.note_update();
                    self.hub.dispatch(update);
                }
                Decoded::UnknownSignal(name) => {
                    log::trace!("Dropping update for unsubscribed signal {}", name);
                }
                Decoded::OtherReply(tag) => log::debug!("Ignoring reply {}", tag),
                Decoded::Ignored => log::trace!("Ignoring record with unknown shape"),
            }
        }
        Ok(())
    }

    /// Liveness probe: one sync round trip. Bytes received during the probe
    /// flow through the normal assembler/decode path, so data records
    /// arriving instead of (or alongside) the ack are never lost.
    fn probe(&mut self, transport: &mut Box<dyn Transport>) -> ProbeOutcome {
        let request = match protocol::sync_request() {
            Ok(request) => request,
            Err(e) => return ProbeOutcome::Fatal(e),
        };

        if let Err(e) = transport.write(&request) {
            return match classify(&e) {
                ErrorClass::Broken => {
                    log::warn!("Sync request failed ({}), reconnecting", e);
                    ProbeOutcome::Reconnect(DISCONNECT_ATTEMPTS)
                }
                ErrorClass::NotConnected => {
                    log::warn!("Sync request failed ({}), re-creating connection", e);
                    ProbeOutcome::Reconnect(GENERIC_ATTEMPTS)
                }
                ErrorClass::WouldBlock => ProbeOutcome::Idle,
                _ => ProbeOutcome::Fatal(e),
            };
        }

        let mut buffer = vec![0u8; READ_CHUNK];
        match transport.read(&mut buffer) {
            Ok(0) => ProbeOutcome::Reconnect(DISCONNECT_ATTEMPTS),
            Ok(n) => {
                if let Err(e) = self.handle_bytes(&buffer[..n]) {
                    log::error!("{}", e);
                    return ProbeOutcome::Reconnect(GENERIC_ATTEMPTS);
                }
                if self.prober.take_ack() {
                    thread::sleep(self.timing.probe_idle);
                }
                ProbeOutcome::Idle
            }
            Err(e) => match classify(&e) {
                ErrorClass::WouldBlock => ProbeOutcome::Idle,
                ErrorClass::Broken => ProbeOutcome::Reconnect(DISCONNECT_ATTEMPTS),
                ErrorClass::NotConnected | ErrorClass::Refused => {
                    ProbeOutcome::Reconnect(GENERIC_ATTEMPTS)
                }
                ErrorClass::Fatal => ProbeOutcome::Fatal(e),
            },
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            log::debug!("Connection state: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalValue;
    use crate::transport::mock::{ConnectStep, MockConnector, MockTransport, ReadStep};

    fn fast_timing() -> Timing {
        Timing {
            retry_delay: Duration::from_millis(0),
            catalogue_timeout: Duration::from_millis(1),
            read_timeout: Duration::from_millis(1),
            probe_idle: Duration::from_millis(0),
            quiet_window: Duration::from_millis(50),
        }
    }

    fn subscriber_with(connector: MockConnector) -> (Subscriber, Arc<SignalHub>) {
        let hub = Arc::new(SignalHub::new());
        let subscriber = Subscriber::new(Box::new(connector), Arc::clone(&hub), fast_timing());
        (subscriber, hub)
    }

    #[test]
    fn test_handle_bytes_dispatches_updates_and_consumes_replies() {
        let (mut subscriber, hub) = subscriber_with(MockConnector::new());

        subscriber
            .handle_bytes(b"{\"REP\":\"sync\"}\n{\"N\":\"Vehicle.Speed\",\"V\":10.5}\n")
            .unwrap();

        assert_eq!(hub.pop(SignalName::Speed), Some(SignalValue::Numeric(10.5)));
        // The sync reply was consumed by the prober, not dispatched.
        for signal in SignalName::ALL {
            assert_eq!(hub.queued(signal), 0);
        }
    }

    #[test]
    fn test_handle_bytes_rejects_corrupt_records() {
        let (mut subscriber, _hub) = subscriber_with(MockConnector::new());
        let err = subscriber.handle_bytes(b"garbage\n").unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_probe_sends_sync_and_accepts_ack() {
        let (mut subscriber, _hub) = subscriber_with(MockConnector::new());
        let mock = MockTransport::new();
        mock.push_read(ReadStep::Data(b"{\"REP\":\"sync\"}\n".to_vec()));
        let mut transport: Box<dyn Transport> = Box::new(mock.clone());

        assert!(matches!(
            subscriber.probe(&mut transport),
            ProbeOutcome::Idle
        ));
        assert_eq!(mock.written(), "{\"CMD\":\"sync\"}");
    }

    #[test]
    fn test_probe_write_failure_routes_to_reconnect() {
        let (mut subscriber, _hub) = subscriber_with(MockConnector::new());
        let mock = MockTransport::new();
        mock.push_write_failure(std::io::ErrorKind::BrokenPipe);
        let mut transport: Box<dyn Transport> = Box::new(mock);

        assert!(matches!(
            subscriber.probe(&mut transport),
            ProbeOutcome::Reconnect(DISCONNECT_ATTEMPTS)
        ));
    }

    #[test]
    fn test_probe_keeps_data_that_arrives_instead_of_ack() {
        let (mut subscriber, hub) = subscriber_with(MockConnector::new());
        let mock = MockTransport::new();
        mock.push_read(ReadStep::Data(
            b"{\"N\":\"Vehicle.Speed\",\"V\":42.0}\n".to_vec(),
        ));
        let mut transport: Box<dyn Transport> = Box::new(mock);

        assert!(matches!(
            subscriber.probe(&mut transport),
            ProbeOutcome::Idle
        ));
        assert_eq!(hub.pop(SignalName::Speed), Some(SignalValue::Numeric(42.0)));
    }

    #[test]
    fn test_reconnect_resets_assembler() {
        let connector = MockConnector::new();
        let replacement = MockTransport::new();
        connector.push(ConnectStep::Ok(replacement.clone()));
        let (mut subscriber, _hub) = subscriber_with(connector);

        // A partial record is pending when the connection drops.
        subscriber
            .handle_bytes(b"{\"N\":\"Vehicle.Spe")
            .unwrap();

        let mut transport: Box<dyn Transport> = Box::new(MockTransport::new());
        assert!(subscriber.reconnect(&mut transport, DISCONNECT_ATTEMPTS));
        assert_eq!(subscriber.state(), ConnectionState::Streaming);
        // The new connection re-sent the subscription.
        assert!(replacement.written().contains("\"CMD\":\"vss\""));

        // The stale fragment is gone: a fresh record decodes cleanly.
        subscriber
            .handle_bytes(b"{\"N\":\"Vehicle.Speed\",\"V\":10.5}\n")
            .unwrap();
    }
}
