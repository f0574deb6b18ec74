//! Interaction Model status codes.

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr};

/// Status codes carried in StatusResponse messages and per-path status
/// elements.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromRepr, Display, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    Failure = 0x01,
    InvalidSubscription = 0x7D,
    UnsupportedAccess = 0x7E,
    UnsupportedEndpoint = 0x7F,
    InvalidAction = 0x80,
    UnsupportedCommand = 0x81,
    InvalidCommand = 0x85,
    UnsupportedAttribute = 0x86,
    ConstraintError = 0x87,
    UnsupportedWrite = 0x88,
    ResourceExhausted = 0x89,
    NotFound = 0x8B,
    UnreportableAttribute = 0x8C,
    InvalidDataType = 0x8D,
    UnsupportedRead = 0x8F,
    DataVersionMismatch = 0x92,
    Timeout = 0x94,
    Busy = 0x9C,
    UnsupportedCluster = 0xC3,
    UnsupportedEvent = 0xC7,
    PathsExhausted = 0xC8,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::InvalidSubscription.code(), 0x7D);
        assert_eq!(Status::from_repr(0xC3), Some(Status::UnsupportedCluster));
        assert!(Status::Success.is_success());
        assert!(!Status::Busy.is_success());
        assert_eq!(Status::ResourceExhausted.to_string(), "ResourceExhausted");
    }
}
