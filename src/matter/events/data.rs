//! Event data structures for Matter events.
//!
//! Field layout follows Matter Core Specification 1.4, Section 10.6.9.

use super::super::ids::EventNumber;
use super::super::status::Status;
use super::super::value::Value;
use super::path::ConcreteEventPath;
use serde::{Deserialize, Serialize};

/// Event priority levels as defined in Matter spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Debug events - low priority, may be dropped
    Debug = 0,
    /// Info events - normal priority
    Info = 1,
    /// Critical events - high priority, should not be dropped
    Critical = 2,
}

impl EventPriority {
    /// Get the priority value as u8.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Timestamp type for events.
/// Named to match Matter specification terminology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::enum_variant_names)]
pub enum EventTimestamp {
    /// System time in milliseconds since boot
    SystemTime(u64),
    /// Microseconds since Unix epoch
    EpochTime(u64),
    /// Delta system time from previous event (milliseconds)
    DeltaSystemTime(u64),
    /// Delta epoch time from previous event (microseconds)
    DeltaEpochTime(u64),
}

impl EventTimestamp {
    /// Wall-clock timestamp for the current instant.
    pub fn epoch_now() -> Self {
        let micros = chrono::Utc::now().timestamp_micros();
        EventTimestamp::EpochTime(u64::try_from(micros).unwrap_or(0))
    }

    /// Get the timestamp value.
    pub fn value(&self) -> u64 {
        match self {
            EventTimestamp::SystemTime(v)
            | EventTimestamp::EpochTime(v)
            | EventTimestamp::DeltaSystemTime(v)
            | EventTimestamp::DeltaEpochTime(v) => *v,
        }
    }
}

/// Metadata of one recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub path: ConcreteEventPath,
    /// Sequential event number (never resets, unique per node)
    pub event_number: EventNumber,
    pub priority: EventPriority,
    pub timestamp: EventTimestamp,
}

/// EventDataIB represents a single event report.
///
/// ```text
/// EventDataIB ::= STRUCTURE {
///     path [0]: EventPath,
///     event_number [1]: unsigned 64-bit,
///     priority [2]: unsigned 8-bit,
///     system_timestamp / epoch_timestamp / delta timestamps [3..6]
///     data [7, opt]: any,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDataIB {
    pub header: EventHeader,
    /// Event data payload (cluster-specific)
    pub data: Value,
}

impl EventDataIB {
    pub fn new(header: EventHeader, data: Value) -> Self {
        Self { header, data }
    }

    pub fn event_number(&self) -> EventNumber {
        self.header.event_number
    }
}

/// Per-path failure for an event request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStatusIB {
    pub path: ConcreteEventPath,
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(EventPriority::Critical > EventPriority::Info);
        assert!(EventPriority::Info > EventPriority::Debug);
        assert_eq!(EventPriority::Critical.as_u8(), 2);
    }

    #[test]
    fn test_epoch_now_is_recent() {
        let ts = EventTimestamp::epoch_now();
        assert!(matches!(ts, EventTimestamp::EpochTime(_)));
        // 2020-01-01 in microseconds
        assert!(ts.value() > 1_577_836_800_000_000);
    }
}
