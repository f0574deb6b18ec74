//! ICD Management cluster (0x0046).
//!
//! Exposes the idle/active timing that subscription max-interval
//! negotiation is based on. An always-on device reports the minimum
//! IdleModeDuration of one second.

use super::super::metadata::ClusterDescriptor;
use strum::FromRepr;

/// Matter Cluster ID for ICD Management
pub const CLUSTER_ID: u32 = 0x0046;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 3;

/// Attribute IDs for the ICD Management cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum IcdMgmtAttribute {
    /// Idle mode duration in seconds
    IdleModeDuration = 0x0000,
    /// Active mode duration in milliseconds
    ActiveModeDuration = 0x0001,
    /// Active mode threshold in milliseconds
    ActiveModeThreshold = 0x0002,
}

/// Defaults for an always-on device.
pub const ALWAYS_ON_IDLE_MODE_DURATION_SECS: u32 = 1;
pub const ALWAYS_ON_ACTIVE_MODE_DURATION_MS: u32 = 10_000;
pub const ALWAYS_ON_ACTIVE_MODE_THRESHOLD_MS: u32 = 5_000;

pub fn descriptor() -> ClusterDescriptor {
    ClusterDescriptor::new(CLUSTER_ID, CLUSTER_REVISION).attributes(&[
        IcdMgmtAttribute::IdleModeDuration as u32,
        IcdMgmtAttribute::ActiveModeDuration as u32,
        IcdMgmtAttribute::ActiveModeThreshold as u32,
    ])
}
