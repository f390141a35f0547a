//! Dispatch sink shared between the subscriber and consumer threads.
//!
//! The subscriber thread is the sole producer, the consumer thread the sole
//! drainer. Each signal gets its own unbounded single-writer queue; a shared
//! level-triggered condition wakes the consumer when new data arrives, and a
//! terminal stopped condition reports that the upstream connection is gone
//! for good.

use crate::protocol::SignalUpdate;
use crate::signals::{SignalName, SignalValue, SIGNAL_COUNT};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Per-signal queues plus the wake and stopped conditions.
///
/// Shared as an `Arc` between the subscriber and the consumer; no other
/// state crosses the thread boundary.
pub struct SignalHub {
    queues: [SegQueue<SignalValue>; SIGNAL_COUNT],
    update_flag: Mutex<bool>,
    update_cv: Condvar,
    stopped: AtomicBool,
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| SegQueue::new()),
            update_flag: Mutex::new(false),
            update_cv: Condvar::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Enqueue one decoded update and, for waking signals, raise the shared
    /// update condition. Values within one signal's queue keep wire order.
    pub fn dispatch(&self, update: SignalUpdate) {
        self.queues[update.name.index()].push(update.value);
        if update.name.wakes_consumer() {
            self.raise_update();
        }
    }

    /// Raise the level-triggered "update available" condition. Multiple
    /// raises between consumer wake-ups coalesce; the queues carry the
    /// backlog, not the condition.
    pub fn raise_update(&self) {
        let mut flag = self.update_flag.lock();
        *flag = true;
        self.update_cv.notify_all();
    }

    /// Clear the condition. The consumer calls this after each drain cycle.
    pub fn clear_update(&self) {
        *self.update_flag.lock() = false;
    }

    /// Wait until the update condition is raised or `timeout` elapses.
    /// Returns the state of the condition on return.
    pub fn wait_update(&self, timeout: Duration) -> bool {
        let mut flag = self.update_flag.lock();
        if !*flag {
            self.update_cv.wait_for(&mut flag, timeout);
        }
        *flag
    }

    /// Pop the oldest queued value for `signal`, if any
    pub fn pop(&self, signal: SignalName) -> Option<SignalValue> {
        self.queues[signal.index()].pop()
    }

    /// Drain `signal`'s queue and return only the most recent value.
    ///
    /// Once the consumer wakes, older enqueued values for the same signal
    /// are stale and are discarded.
    pub fn take_latest(&self, signal: SignalName) -> Option<SignalValue> {
        let mut latest = None;
        while let Some(value) = self.queues[signal.index()].pop() {
            latest = Some(value);
        }
        latest
    }

    /// Number of values currently queued for `signal`
    pub fn queued(&self, signal: SignalName) -> usize {
        self.queues[signal.index()].len()
    }

    /// Terminal condition: the upstream is gone for good. Also raises the
    /// update condition so a waiting consumer flushes and exits.
    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.raise_update();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}
