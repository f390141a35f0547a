//! Wire protocol: request encoding and record decoding.
//!
//! Everything on the wire is a JSON object. Outbound there are exactly two
//! requests: the subscription sent once per (re)connect and the sync probe
//! sent when the stream goes quiet. Inbound records are either replies
//! (`REP` field: catalogue listings, sync acknowledgment) or signal updates
//! (`N` and `V` fields). Replies are consumed by the subscriber and never
//! reach the dispatch sink.

use crate::error::{Error, Result};
use crate::signals::{SignalName, SignalValue, ValueKind};
use serde::Serialize;
use serde_json::Value;

/// Command tag requesting a VSS signal subscription
const CMD_SUBSCRIBE: &str = "vss";
/// Command tag for the liveness probe
const CMD_SYNC: &str = "sync";

/// The one subscription request, built at startup and re-sent on every
/// successful reconnect.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "CMD")]
    cmd: &'static str,
    #[serde(rename = "D")]
    signals: String,
}

impl SubscriptionRequest {
    pub fn new(signals: &[SignalName]) -> Self {
        let joined = signals
            .iter()
            .map(|signal| signal.wire_name())
            .collect::<Vec<_>>()
            .join(",");
        Self {
            cmd: CMD_SUBSCRIBE,
            signals: joined,
        }
    }

    /// Serialized request bytes
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, Serialize)]
struct SyncRequest {
    #[serde(rename = "CMD")]
    cmd: &'static str,
}

/// Serialized sync probe request
pub fn sync_request() -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&SyncRequest { cmd: CMD_SYNC })?)
}

/// Which catalogue a reply describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogueKind {
    /// Streamed VSS signals
    Vss,
    /// Static vehicle information
    Vsi,
}

impl CatalogueKind {
    /// Heading for the operator display
    pub fn heading(self) -> &'static str {
        match self {
            CatalogueKind::Vss => "Supported VSS signals",
            CatalogueKind::Vsi => "Supported static vehicle information",
        }
    }
}

/// A decoded signal update
#[derive(Debug, Clone, PartialEq)]
pub struct SignalUpdate {
    pub name: SignalName,
    pub value: SignalValue,
}

/// Classification of one decoded record
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Signal catalogue reply, consumed for operator display only
    Catalogue {
        kind: CatalogueKind,
        names: Vec<String>,
    },
    /// Acknowledgment of a liveness probe
    SyncAck,
    /// Reply of a kind this client does not consume
    OtherReply(String),
    /// An update for a subscribed signal
    Update(SignalUpdate),
    /// An update for a signal outside the subscribed set
    UnknownSignal(String),
    /// Valid JSON with neither reply nor update shape
    Ignored,
}

/// Decode one complete record.
///
/// A record that fails JSON parsing is a protocol violation: the byte
/// stream is assumed desynchronized and the error aborts the connection
/// (the caller reconnects rather than skipping the record). A numeric
/// signal carrying a non-numeric value is treated the same way, so no
/// garbage value ever reaches the consumer.
pub fn decode(record: &str) -> Result<Decoded> {
    let parsed: Value = serde_json::from_str(record)
        .map_err(|e| Error::MalformedRecord(format!("{}: {:?}", e, record)))?;

    if let Some(rep) = parsed.get("REP").and_then(Value::as_str) {
        return Ok(match rep {
            "sync" => Decoded::SyncAck,
            "VSS_catalogue" => Decoded::Catalogue {
                kind: CatalogueKind::Vss,
                names: flatten_names(parsed.get("D")),
            },
            "VSI_catalogue" => Decoded::Catalogue {
                kind: CatalogueKind::Vsi,
                names: flatten_names(parsed.get("D")),
            },
            other => Decoded::OtherReply(other.to_string()),
        });
    }

    let (name, raw) = match (parsed.get("N").and_then(Value::as_str), parsed.get("V")) {
        (Some(name), Some(raw)) => (name, raw),
        _ => return Ok(Decoded::Ignored),
    };

    let signal = match SignalName::from_wire(name) {
        Some(signal) => signal,
        None => return Ok(Decoded::UnknownSignal(name.to_string())),
    };

    let value = coerce(signal.kind(), raw).ok_or_else(|| {
        Error::MalformedRecord(format!("signal {} carries unusable value {}", name, raw))
    })?;

    Ok(Decoded::Update(SignalUpdate {
        name: signal,
        value,
    }))
}

fn coerce(kind: ValueKind, raw: &Value) -> Option<SignalValue> {
    match kind {
        ValueKind::Numeric => match raw {
            Value::Number(n) => n.as_f64().map(SignalValue::Numeric),
            Value::String(s) => s.trim().parse().ok().map(SignalValue::Numeric),
            _ => None,
        },
        ValueKind::Text => match raw {
            Value::String(s) => Some(SignalValue::Text(s.clone())),
            Value::Bool(b) => Some(SignalValue::Text(b.to_string())),
            Value::Number(n) => Some(SignalValue::Text(n.to_string())),
            _ => None,
        },
    }
}

/// Catalogue `D` fields nest name lists one level deep; collect every
/// string in order.
fn flatten_names(field: Option<&Value>) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(value) = field {
        collect_names(value, &mut names);
    }
    names
}

fn collect_names(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_names(item, out);
            }
        }
        _ => {}
    }
}
