//! BooleanState cluster (0x0045).
//!
//! Represents a simple binary sensor such as a contact sensor.

use super::super::metadata::ClusterDescriptor;
use super::super::value::Value;
use strum::FromRepr;

/// Matter Cluster ID for BooleanState
pub const CLUSTER_ID: u32 = 0x0045;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 1;

/// Attribute IDs for the BooleanState cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum BooleanStateAttribute {
    /// The current state value (true/false)
    StateValue = 0x00,
}

/// Event IDs for the BooleanState cluster
pub mod events {
    /// StateValue changed
    pub const STATE_CHANGE: u32 = 0x00;
}

pub fn descriptor() -> ClusterDescriptor {
    ClusterDescriptor::new(CLUSTER_ID, CLUSTER_REVISION)
        .attribute(BooleanStateAttribute::StateValue as u32)
        .events(&[events::STATE_CHANGE])
}

/// StateChange event payload.
pub fn state_change(state_value: bool) -> Value {
    Value::Struct(vec![(0, Value::Bool(state_value))])
}
