//! Matter events.
//!
//! Events in Matter are different from attributes:
//! - Events have sequential event numbers that never reset
//! - Events have timestamps and priorities
//! - Events are reported in EventReportIB structures alongside AttributeReportIBs
//!
//! The server keeps recent events in an [`EventLog`]; clients keep what they
//! received in the cluster state cache.

pub mod data;
pub mod event_log;
mod path;

pub use data::{EventDataIB, EventHeader, EventPriority, EventStatusIB, EventTimestamp};
pub use event_log::EventLog;
pub use path::{ConcreteEventPath, EventPathParams};
