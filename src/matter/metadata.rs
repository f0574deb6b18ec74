//! Cluster metadata: what endpoints, clusters and attributes a node exposes.
//!
//! Path expansion only needs indexed enumeration, so providers can expose
//! tables however they store them.

use super::ids::{
    AttributeId, ClusterId, CommandId, DataVersion, EndpointId, EventId, GlobalAttribute,
};
use super::path::ConcreteAttributePath;

/// Read-only view of a node's data model layout.
///
/// Enumeration order is the provider's order; path expansion preserves it.
pub trait ClusterMetadata {
    fn endpoint_count(&self) -> usize;
    fn endpoint_at(&self, index: usize) -> Option<EndpointId>;

    /// Number of clusters on `endpoint`, 0 if the endpoint does not exist.
    fn cluster_count(&self, endpoint: EndpointId) -> usize;
    fn cluster_at(&self, endpoint: EndpointId, index: usize) -> Option<ClusterId>;

    /// Size of the cluster's attribute table. Globals missing from the table
    /// are synthesized by the expander.
    fn attribute_count(&self, endpoint: EndpointId, cluster: ClusterId) -> usize;
    fn attribute_at(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        index: usize,
    ) -> Option<AttributeId>;

    fn data_version(&self, endpoint: EndpointId, cluster: ClusterId) -> Option<DataVersion>;

    fn has_endpoint(&self, endpoint: EndpointId) -> bool {
        (0..self.endpoint_count()).any(|i| self.endpoint_at(i) == Some(endpoint))
    }

    fn has_cluster(&self, endpoint: EndpointId, cluster: ClusterId) -> bool {
        (0..self.cluster_count(endpoint)).any(|i| self.cluster_at(endpoint, i) == Some(cluster))
    }

    fn has_table_attribute(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        attribute: AttributeId,
    ) -> bool {
        (0..self.attribute_count(endpoint, cluster))
            .any(|i| self.attribute_at(endpoint, cluster, i) == Some(attribute))
    }

    /// The attribute exists, either in the table or as a global.
    fn has_attribute(&self, path: &ConcreteAttributePath) -> bool {
        self.has_cluster(path.endpoint_id, path.cluster_id)
            && (GlobalAttribute::is_global(path.attribute_id)
                || self.has_table_attribute(path.endpoint_id, path.cluster_id, path.attribute_id))
    }
}

/// Globals a cluster reports beyond its own attribute table, in expansion
/// order.
pub fn synthesized_globals<M: ClusterMetadata + ?Sized>(
    metadata: &M,
    endpoint: EndpointId,
    cluster: ClusterId,
    event_list_enabled: bool,
) -> impl Iterator<Item = AttributeId> + '_ {
    GlobalAttribute::EXPANSION_ORDER
        .into_iter()
        .filter(move |g| event_list_enabled || *g != GlobalAttribute::EventList)
        .map(GlobalAttribute::id)
        .filter(move |id| !metadata.has_table_attribute(endpoint, cluster, *id))
}

/// Static description of one cluster instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterDescriptor {
    pub id: ClusterId,
    pub revision: u16,
    pub feature_map: u32,
    /// Attribute table in reporting order.
    pub attributes: Vec<AttributeId>,
    pub accepted_commands: Vec<CommandId>,
    pub generated_commands: Vec<CommandId>,
    pub events: Vec<EventId>,
}

impl ClusterDescriptor {
    /// A cluster whose table starts with ClusterRevision and FeatureMap.
    pub fn new(id: ClusterId, revision: u16) -> Self {
        Self {
            id,
            revision,
            feature_map: 0,
            attributes: vec![
                GlobalAttribute::ClusterRevision.id(),
                GlobalAttribute::FeatureMap.id(),
            ],
            accepted_commands: Vec::new(),
            generated_commands: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn feature_map(mut self, feature_map: u32) -> Self {
        self.feature_map = feature_map;
        self
    }

    pub fn attribute(mut self, id: AttributeId) -> Self {
        if !self.attributes.contains(&id) {
            self.attributes.push(id);
        }
        self
    }

    pub fn attributes(self, ids: &[AttributeId]) -> Self {
        ids.iter().fold(self, |cluster, id| cluster.attribute(*id))
    }

    pub fn accepted_commands(mut self, ids: &[CommandId]) -> Self {
        self.accepted_commands = ids.to_vec();
        self
    }

    pub fn generated_commands(mut self, ids: &[CommandId]) -> Self {
        self.generated_commands = ids.to_vec();
        self
    }

    pub fn events(mut self, ids: &[EventId]) -> Self {
        self.events = ids.to_vec();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub id: EndpointId,
    pub clusters: Vec<ClusterDescriptor>,
}

impl EndpointDescriptor {
    pub fn new(id: EndpointId) -> Self {
        Self {
            id,
            clusters: Vec::new(),
        }
    }

    pub fn cluster(mut self, cluster: ClusterDescriptor) -> Self {
        self.clusters.push(cluster);
        self.clusters.sort_by_key(|c| c.id);
        self
    }
}

/// Endpoint/cluster/attribute layout of a node, endpoints and clusters kept
/// in ascending id order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeDescriptor {
    endpoints: Vec<EndpointDescriptor>,
}

impl NodeDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        self.endpoints.retain(|e| e.id != endpoint.id);
        self.endpoints.push(endpoint);
        self.endpoints.sort_by_key(|e| e.id);
        self
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn find_endpoint(&self, endpoint: EndpointId) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.id == endpoint)
    }

    pub fn find_cluster(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
    ) -> Option<&ClusterDescriptor> {
        self.find_endpoint(endpoint)?
            .clusters
            .iter()
            .find(|c| c.id == cluster)
    }
}

impl ClusterMetadata for NodeDescriptor {
    fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    fn endpoint_at(&self, index: usize) -> Option<EndpointId> {
        self.endpoints.get(index).map(|e| e.id)
    }

    fn cluster_count(&self, endpoint: EndpointId) -> usize {
        self.find_endpoint(endpoint).map_or(0, |e| e.clusters.len())
    }

    fn cluster_at(&self, endpoint: EndpointId, index: usize) -> Option<ClusterId> {
        self.find_endpoint(endpoint)?.clusters.get(index).map(|c| c.id)
    }

    fn attribute_count(&self, endpoint: EndpointId, cluster: ClusterId) -> usize {
        self.find_cluster(endpoint, cluster)
            .map_or(0, |c| c.attributes.len())
    }

    fn attribute_at(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        index: usize,
    ) -> Option<AttributeId> {
        self.find_cluster(endpoint, cluster)?
            .attributes
            .get(index)
            .copied()
    }

    fn data_version(&self, _endpoint: EndpointId, _cluster: ClusterId) -> Option<DataVersion> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeDescriptor {
        NodeDescriptor::new()
            .endpoint(
                EndpointDescriptor::new(2)
                    .cluster(ClusterDescriptor::new(0x0006, 4).attributes(&[0x0000]))
                    .cluster(ClusterDescriptor::new(0x0003, 4)),
            )
            .endpoint(EndpointDescriptor::new(1))
    }

    #[test]
    fn test_endpoints_and_clusters_sorted() {
        let node = node();
        assert_eq!(node.endpoint_at(0), Some(1));
        assert_eq!(node.endpoint_at(1), Some(2));
        assert_eq!(node.cluster_at(2, 0), Some(0x0003));
        assert_eq!(node.cluster_at(2, 1), Some(0x0006));
        assert_eq!(node.cluster_count(7), 0);
    }

    #[test]
    fn test_table_starts_with_revision_and_feature_map() {
        let node = node();
        assert_eq!(node.attribute_count(2, 0x0006), 3);
        assert_eq!(node.attribute_at(2, 0x0006, 0), Some(0xFFFD));
        assert_eq!(node.attribute_at(2, 0x0006, 1), Some(0xFFFC));
        assert_eq!(node.attribute_at(2, 0x0006, 2), Some(0x0000));
    }

    #[test]
    fn test_has_attribute_includes_globals() {
        let node = node();
        assert!(node.has_attribute(&ConcreteAttributePath::new(2, 0x0006, 0x0000)));
        assert!(node.has_attribute(&ConcreteAttributePath::new(2, 0x0006, 0xFFFB)));
        assert!(!node.has_attribute(&ConcreteAttributePath::new(2, 0x0006, 0x0001)));
        assert!(!node.has_attribute(&ConcreteAttributePath::new(1, 0x0006, 0x0000)));
    }
}
