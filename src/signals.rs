//! Static catalogue of the subscribed vehicle signals.
//!
//! The subscription set is fixed for the process lifetime. Every signal the
//! client understands is a variant of [`SignalName`]; updates for wire names
//! outside this set are classified explicitly and dropped by the subscriber
//! (servers may offer more signals than we request).

/// Value coercion applied to the wire `V` field, per signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Double-precision numeric value
    Numeric,
    /// Enumerated state string
    Text,
}

/// A decoded signal value
#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    Numeric(f64),
    Text(String),
}

impl SignalValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            SignalValue::Numeric(v) => Some(*v),
            SignalValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SignalValue::Text(s) => Some(s),
            SignalValue::Numeric(_) => None,
        }
    }
}

/// Number of subscribed signals
pub const SIGNAL_COUNT: usize = 7;

/// The subscribed signal set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalName {
    /// Vehicle power state (drive, park, ...)
    PowerState = 0,
    /// Displayed traction battery state of charge (%)
    StateOfCharge,
    /// Predicted remaining range (m)
    Range,
    /// Vehicle clock, seconds since the Unix epoch
    ClockSeconds,
    /// Vehicle speed (km/h)
    Speed,
    /// Travelled distance from the odometer (km)
    Odometer,
    /// Air conditioning active flag
    HvacActive,
}

impl SignalName {
    /// All subscribed signals, in subscription-request order
    pub const ALL: [SignalName; SIGNAL_COUNT] = [
        SignalName::PowerState,
        SignalName::StateOfCharge,
        SignalName::Range,
        SignalName::ClockSeconds,
        SignalName::Speed,
        SignalName::Odometer,
        SignalName::HvacActive,
    ];

    /// VSS path carried in the wire `N` field
    pub fn wire_name(self) -> &'static str {
        match self {
            SignalName::PowerState => "Vehicle.Private.PowerState",
            SignalName::StateOfCharge => {
                "Vehicle.Powertrain.TractionBattery.StateOfCharge.Displayed"
            }
            SignalName::Range => "Vehicle.Powertrain.Range",
            SignalName::ClockSeconds => "Vehicle.Private.UnixTime.Seconds",
            SignalName::Speed => "Vehicle.Speed",
            SignalName::Odometer => "Vehicle.Powertrain.Transmission.TravelledDistance",
            SignalName::HvacActive => "Vehicle.Cabin.HVAC.IsAirConditioningActive",
        }
    }

    /// Resolve a wire name against the subscribed set
    pub fn from_wire(name: &str) -> Option<SignalName> {
        SignalName::ALL
            .iter()
            .copied()
            .find(|signal| signal.wire_name() == name)
    }

    /// Value coercion for this signal
    pub fn kind(self) -> ValueKind {
        match self {
            SignalName::PowerState | SignalName::HvacActive => ValueKind::Text,
            _ => ValueKind::Numeric,
        }
    }

    /// Whether a dispatched update raises the consumer wake condition.
    ///
    /// Power and climate state are forwarded as context, not as data
    /// triggers: the consumer reads them alongside the next clock or speed
    /// sample rather than being woken for them.
    pub fn wakes_consumer(self) -> bool {
        !matches!(self, SignalName::PowerState | SignalName::HvacActive)
    }

    /// Queue index in the dispatch sink
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_round_trip() {
        for signal in SignalName::ALL {
            assert_eq!(SignalName::from_wire(signal.wire_name()), Some(signal));
        }
    }

    #[test]
    fn test_unknown_wire_name() {
        assert_eq!(SignalName::from_wire("Vehicle.Unknown.Path"), None);
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(SignalName::Speed.kind(), ValueKind::Numeric);
        assert_eq!(SignalName::Range.kind(), ValueKind::Numeric);
        assert_eq!(SignalName::PowerState.kind(), ValueKind::Text);
        assert_eq!(SignalName::HvacActive.kind(), ValueKind::Text);
    }

    #[test]
    fn test_context_signals_do_not_wake() {
        assert!(!SignalName::PowerState.wakes_consumer());
        assert!(!SignalName::HvacActive.wakes_consumer());
        assert!(SignalName::Speed.wakes_consumer());
        assert!(SignalName::ClockSeconds.wakes_consumer());
    }

    #[test]
    fn test_indices_are_dense() {
        for (expected, signal) in SignalName::ALL.iter().enumerate() {
            assert_eq!(signal.index(), expected);
        }
    }
}
