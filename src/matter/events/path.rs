//! Event paths.
//!
//! Identifies an event in the Matter data model, either concretely or as a
//! wildcard pattern in a read or subscribe request.

use super::super::ids::{ClusterId, EndpointId, EventId};
use super::super::path::{dimension_covers, dimension_overlaps};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully resolved event path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConcreteEventPath {
    pub endpoint_id: EndpointId,
    pub cluster_id: ClusterId,
    pub event_id: EventId,
}

impl ConcreteEventPath {
    pub const fn new(endpoint_id: EndpointId, cluster_id: ClusterId, event_id: EventId) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            event_id,
        }
    }
}

impl fmt::Display for ConcreteEventPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:04x}/e0x{:02x}",
            self.endpoint_id, self.cluster_id, self.event_id
        )
    }
}

/// Event path pattern as carried in requests.
///
/// `None` fields are wildcards. An urgent path makes a matching event
/// trigger a report as soon as the subscription's min interval allows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPathParams {
    /// Endpoint ID (optional for wildcard)
    pub endpoint_id: Option<EndpointId>,
    /// Cluster ID (optional for wildcard)
    pub cluster_id: Option<ClusterId>,
    /// Event ID (optional for wildcard)
    pub event_id: Option<EventId>,
    /// Whether this event should be reported urgently
    #[serde(default)]
    pub is_urgent: bool,
}

impl EventPathParams {
    /// Create an EventPathParams with specific endpoint, cluster, and event.
    pub const fn new(endpoint_id: EndpointId, cluster_id: ClusterId, event_id: EventId) -> Self {
        Self {
            endpoint_id: Some(endpoint_id),
            cluster_id: Some(cluster_id),
            event_id: Some(event_id),
            is_urgent: false,
        }
    }

    pub const fn wildcard() -> Self {
        Self {
            endpoint_id: None,
            cluster_id: None,
            event_id: None,
            is_urgent: false,
        }
    }

    /// Pattern for every event of one cluster on one endpoint.
    pub const fn cluster(endpoint_id: EndpointId, cluster_id: ClusterId) -> Self {
        Self {
            endpoint_id: Some(endpoint_id),
            cluster_id: Some(cluster_id),
            event_id: None,
            is_urgent: false,
        }
    }

    /// Create an urgent event path.
    pub fn urgent(mut self) -> Self {
        self.is_urgent = true;
        self
    }

    pub fn is_wildcard_path(&self) -> bool {
        self.endpoint_id.is_none() || self.cluster_id.is_none() || self.event_id.is_none()
    }

    /// Same endpoint, cluster and event, regardless of urgency.
    pub fn is_same_path(&self, other: &EventPathParams) -> bool {
        self.endpoint_id == other.endpoint_id
            && self.cluster_id == other.cluster_id
            && self.event_id == other.event_id
    }

    pub fn intersects(&self, other: &EventPathParams) -> bool {
        dimension_overlaps(self.endpoint_id, other.endpoint_id)
            && dimension_overlaps(self.cluster_id, other.cluster_id)
            && dimension_overlaps(self.event_id, other.event_id)
    }

    pub fn is_superset_of(&self, other: &EventPathParams) -> bool {
        dimension_covers(self.endpoint_id, other.endpoint_id)
            && dimension_covers(self.cluster_id, other.cluster_id)
            && dimension_covers(self.event_id, other.event_id)
    }

    pub fn matches(&self, path: &ConcreteEventPath) -> bool {
        self.endpoint_id.is_none_or(|e| e == path.endpoint_id)
            && self.cluster_id.is_none_or(|c| c == path.cluster_id)
            && self.event_id.is_none_or(|e| e == path.event_id)
    }
}

impl From<ConcreteEventPath> for EventPathParams {
    fn from(path: ConcreteEventPath) -> Self {
        Self::new(path.endpoint_id, path.cluster_id, path.event_id)
    }
}
