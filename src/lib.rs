//! shravan - vehicle telemetry subscriber
//!
//! Maintains a persistent, authenticated TLS stream to a signal-producing
//! server, subscribes to a fixed set of vehicle signals, and forwards
//! decoded updates to a consumer through per-signal queues.
//!
//! The network unit (subscriber thread) owns the connection lifecycle:
//! reconnection with bounded retry budgets, newline-delimited JSON frame
//! reassembly across arbitrary chunk boundaries, and liveness probing when
//! the stream goes quiet. The consumer unit drains the [`sink::SignalHub`]
//! and only ever observes data, the stopped condition, or silence.

pub mod app;
pub mod config;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod signals;
pub mod sink;
pub mod subscriber;
pub mod transport;

pub use config::AppConfig;
pub use error::{Error, Result};
