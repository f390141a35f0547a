//! Liveness probe bookkeeping.
//!
//! When no data arrives within the read timeout, the subscriber sends a
//! sync request and expects `{"REP":"sync"}` back. A healthy ack while no
//! updates are flowing is ambiguous: either the vehicle simply has nothing
//! to report yet, or a previously active stream has stalled. The prober
//! distinguishes the two with an explicit data-seen flag and a quiet-period
//! timer, and forces the consumer's sampling window out once the stream has
//! been quiet for too long.

use crate::sink::SignalHub;
use std::time::{Duration, Instant};

pub struct LivenessProber {
    /// Quiet period after which a stalled stream forces a window flush
    quiet_window: Duration,
    /// Whether any signal update has been dispatched this process lifetime
    data_seen: bool,
    /// Start of the current quiet period: the first sync ack after updates
    /// stopped flowing. None while data flows.
    quiet_since: Option<Instant>,
    /// Set on every ack, consumed by the probe round via `take_ack`
    acked: bool,
}

impl LivenessProber {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            data_seen: false,
            quiet_since: None,
            acked: false,
        }
    }

    /// A signal update was dispatched: the stream is alive and any quiet
    /// period ends.
    pub fn note_update(&mut self) {
        self.data_seen = true;
        self.quiet_since = None;
    }

    /// A sync acknowledgment arrived. Before the first update this is the
    /// whole outcome. After updates have flowed, the first ack of a silence
    /// starts the quiet period; once it exceeds the window, the consumer's
    /// flush condition is raised (the connection is NOT marked stopped).
    pub fn note_sync_ack(&mut self, hub: &SignalHub) {
        self.acked = true;
        if !self.data_seen {
            return;
        }
        match self.quiet_since {
            None => self.quiet_since = Some(Instant::now()),
            Some(started) if started.elapsed() > self.quiet_window => {
                log::info!(
                    "No updates for {:.1?} despite healthy sync replies, forcing window flush",
                    started.elapsed()
                );
                hub.raise_update();
            }
            Some(_) => {}
        }
    }

    /// Whether an ack arrived since the last call
    pub fn take_ack(&mut self) -> bool {
        std::mem::take(&mut self.acked)
    }

    pub fn data_seen(&self) -> bool {
        self.data_seen
    }
}
