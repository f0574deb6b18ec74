//! Identifier types of the Matter data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::FromRepr;

pub type EndpointId = u16;
pub type ClusterId = u32;
pub type AttributeId = u32;
pub type EventId = u32;
pub type CommandId = u32;
pub type DataVersion = u32;
pub type EventNumber = u64;
pub type SubscriptionId = u32;
pub type FabricIndex = u8;
pub type NodeId = u64;
pub type ListIndex = u16;

/// Attributes every cluster carries, whether or not its table lists them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromRepr)]
#[repr(u32)]
pub enum GlobalAttribute {
    GeneratedCommandList = 0xFFF8,
    AcceptedCommandList = 0xFFF9,
    EventList = 0xFFFA,
    AttributeList = 0xFFFB,
    FeatureMap = 0xFFFC,
    ClusterRevision = 0xFFFD,
}

impl GlobalAttribute {
    /// Order in which missing globals are appended after a cluster's table.
    pub const EXPANSION_ORDER: [GlobalAttribute; 6] = [
        GlobalAttribute::ClusterRevision,
        GlobalAttribute::FeatureMap,
        GlobalAttribute::GeneratedCommandList,
        GlobalAttribute::AcceptedCommandList,
        GlobalAttribute::EventList,
        GlobalAttribute::AttributeList,
    ];

    pub fn id(self) -> AttributeId {
        self as AttributeId
    }

    pub fn is_global(attribute_id: AttributeId) -> bool {
        Self::from_repr(attribute_id).is_some()
    }
}

/// A node as seen from within one fabric.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ScopedNodeId {
    pub node_id: NodeId,
    pub fabric_index: FabricIndex,
}

impl ScopedNodeId {
    pub fn new(node_id: NodeId, fabric_index: FabricIndex) -> Self {
        Self {
            node_id,
            fabric_index,
        }
    }
}

impl fmt::Display for ScopedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:016x}", self.fabric_index, self.node_id)
    }
}
