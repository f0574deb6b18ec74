//! Attribute storage behind the reporting engine.
//!
//! [`DataModel`] is what report generation reads from. [`MemoryDataModel`]
//! keeps values in memory and bumps the owning cluster's data version on
//! every change, the way a bridged device mirrors its sensors.

use std::collections::HashMap;

use log::debug;

use super::events::ConcreteEventPath;
use super::ids::{AttributeId, ClusterId, DataVersion, EndpointId, GlobalAttribute};
use super::metadata::{ClusterMetadata, NodeDescriptor, synthesized_globals};
use super::path::ConcreteAttributePath;
use super::status::Status;
use super::value::Value;

/// Cluster business logic as seen by report generation.
pub trait DataModel: ClusterMetadata {
    /// Current value of an attribute, or the per-path status to report.
    fn read_attribute(&self, path: &ConcreteAttributePath) -> Result<Value, Status>;

    /// Status to report for a concrete event path the node cannot serve.
    fn check_event_path(&self, path: &ConcreteEventPath) -> Result<(), Status> {
        if !self.has_endpoint(path.endpoint_id) {
            return Err(Status::UnsupportedEndpoint);
        }
        if !self.has_cluster(path.endpoint_id, path.cluster_id) {
            return Err(Status::UnsupportedCluster);
        }
        Ok(())
    }
}

pub struct MemoryDataModel {
    node: NodeDescriptor,
    values: HashMap<ConcreteAttributePath, Value>,
    versions: HashMap<(EndpointId, ClusterId), DataVersion>,
    event_list_enabled: bool,
}

impl MemoryDataModel {
    /// Create a data model with random initial data versions.
    pub fn new(node: NodeDescriptor) -> Self {
        let versions = node
            .endpoints()
            .iter()
            .flat_map(|e| e.clusters.iter().map(move |c| (e.id, c.id)))
            .map(|key| (key, rand::random::<DataVersion>()))
            .collect();
        Self {
            node,
            values: HashMap::new(),
            versions,
            event_list_enabled: true,
        }
    }

    pub fn with_event_list(mut self, enabled: bool) -> Self {
        self.event_list_enabled = enabled;
        self
    }

    pub fn node(&self) -> &NodeDescriptor {
        &self.node
    }

    pub fn set_data_version(
        &mut self,
        endpoint: EndpointId,
        cluster: ClusterId,
        version: DataVersion,
    ) {
        if self.node.find_cluster(endpoint, cluster).is_some() {
            self.versions.insert((endpoint, cluster), version);
        }
    }

    pub fn bump_data_version(
        &mut self,
        endpoint: EndpointId,
        cluster: ClusterId,
    ) -> Option<DataVersion> {
        let version = self.versions.get_mut(&(endpoint, cluster))?;
        *version = version.wrapping_add(1);
        Some(*version)
    }

    /// Store a value. Returns whether it changed; a change bumps the cluster's
    /// data version.
    pub fn set_attribute(
        &mut self,
        path: ConcreteAttributePath,
        value: impl Into<Value>,
    ) -> Result<bool, Status> {
        self.check_cluster(&path)?;
        if GlobalAttribute::is_global(path.attribute_id) {
            return Err(Status::UnsupportedWrite);
        }
        if !self
            .node
            .has_table_attribute(path.endpoint_id, path.cluster_id, path.attribute_id)
        {
            return Err(Status::UnsupportedAttribute);
        }

        let value = value.into();
        if self.values.get(&path) == Some(&value) {
            return Ok(false);
        }
        self.values.insert(path, value);
        let version = self.bump_data_version(path.endpoint_id, path.cluster_id);
        debug!("Attribute {} changed, data version {:?}", path, version);
        Ok(true)
    }

    pub fn attribute(&self, path: &ConcreteAttributePath) -> Option<&Value> {
        self.values.get(path)
    }

    fn check_cluster(&self, path: &ConcreteAttributePath) -> Result<(), Status> {
        if !self.node.has_endpoint(path.endpoint_id) {
            return Err(Status::UnsupportedEndpoint);
        }
        if !self.node.has_cluster(path.endpoint_id, path.cluster_id) {
            return Err(Status::UnsupportedCluster);
        }
        Ok(())
    }

    fn attribute_list(&self, endpoint: EndpointId, cluster: ClusterId) -> Value {
        let table = (0..self.node.attribute_count(endpoint, cluster))
            .filter_map(|i| self.node.attribute_at(endpoint, cluster, i));
        let globals = synthesized_globals(&self.node, endpoint, cluster, self.event_list_enabled);
        Value::List(table.chain(globals).map(Value::from).collect())
    }
}

fn id_list(ids: &[AttributeId]) -> Value {
    Value::List(ids.iter().copied().map(Value::from).collect())
}

impl ClusterMetadata for MemoryDataModel {
    fn endpoint_count(&self) -> usize {
        self.node.endpoint_count()
    }

    fn endpoint_at(&self, index: usize) -> Option<EndpointId> {
        self.node.endpoint_at(index)
    }

    fn cluster_count(&self, endpoint: EndpointId) -> usize {
        self.node.cluster_count(endpoint)
    }

    fn cluster_at(&self, endpoint: EndpointId, index: usize) -> Option<ClusterId> {
        self.node.cluster_at(endpoint, index)
    }

    fn attribute_count(&self, endpoint: EndpointId, cluster: ClusterId) -> usize {
        self.node.attribute_count(endpoint, cluster)
    }

    fn attribute_at(
        &self,
        endpoint: EndpointId,
        cluster: ClusterId,
        index: usize,
    ) -> Option<AttributeId> {
        self.node.attribute_at(endpoint, cluster, index)
    }

    fn data_version(&self, endpoint: EndpointId, cluster: ClusterId) -> Option<DataVersion> {
        self.versions.get(&(endpoint, cluster)).copied()
    }
}

impl DataModel for MemoryDataModel {
    fn read_attribute(&self, path: &ConcreteAttributePath) -> Result<Value, Status> {
        self.check_cluster(path)?;
        let cluster = self
            .node
            .find_cluster(path.endpoint_id, path.cluster_id)
            .ok_or(Status::UnsupportedCluster)?;

        match GlobalAttribute::from_repr(path.attribute_id) {
            Some(GlobalAttribute::ClusterRevision) => Ok(cluster.revision.into()),
            Some(GlobalAttribute::FeatureMap) => Ok(cluster.feature_map.into()),
            Some(GlobalAttribute::GeneratedCommandList) => Ok(id_list(&cluster.generated_commands)),
            Some(GlobalAttribute::AcceptedCommandList) => Ok(id_list(&cluster.accepted_commands)),
            Some(GlobalAttribute::EventList) => {
                if self.event_list_enabled || cluster.attributes.contains(&path.attribute_id) {
                    Ok(id_list(&cluster.events))
                } else {
                    Err(Status::UnsupportedAttribute)
                }
            }
            Some(GlobalAttribute::AttributeList) => {
                Ok(self.attribute_list(path.endpoint_id, path.cluster_id))
            }
            None if cluster.attributes.contains(&path.attribute_id) => {
                Ok(self.values.get(path).cloned().unwrap_or(Value::Null))
            }
            None => Err(Status::UnsupportedAttribute),
        }
    }

    fn check_event_path(&self, path: &ConcreteEventPath) -> Result<(), Status> {
        if !self.node.has_endpoint(path.endpoint_id) {
            return Err(Status::UnsupportedEndpoint);
        }
        match self.node.find_cluster(path.endpoint_id, path.cluster_id) {
            Some(cluster) if cluster.events.contains(&path.event_id) => Ok(()),
            Some(_) => Err(Status::UnsupportedEvent),
            None => Err(Status::UnsupportedCluster),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::metadata::{ClusterDescriptor, EndpointDescriptor};

    fn model() -> MemoryDataModel {
        MemoryDataModel::new(
            NodeDescriptor::new().endpoint(
                EndpointDescriptor::new(1).cluster(
                    ClusterDescriptor::new(0x0045, 1)
                        .attributes(&[0x0000])
                        .events(&[0x00]),
                ),
            ),
        )
    }

    #[test]
    fn test_set_attribute_bumps_version() {
        let mut model = model();
        let path = ConcreteAttributePath::new(1, 0x0045, 0x0000);
        let before = model.data_version(1, 0x0045).unwrap();

        assert_eq!(model.set_attribute(path, true), Ok(true));
        assert_eq!(model.data_version(1, 0x0045), Some(before.wrapping_add(1)));

        // Same value is not a change
        assert_eq!(model.set_attribute(path, true), Ok(false));
        assert_eq!(model.data_version(1, 0x0045), Some(before.wrapping_add(1)));
        assert_eq!(model.read_attribute(&path), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_read_statuses() {
        let model = model();
        assert_eq!(
            model.read_attribute(&ConcreteAttributePath::new(9, 0x0045, 0)),
            Err(Status::UnsupportedEndpoint)
        );
        assert_eq!(
            model.read_attribute(&ConcreteAttributePath::new(1, 0x0006, 0)),
            Err(Status::UnsupportedCluster)
        );
        assert_eq!(
            model.read_attribute(&ConcreteAttributePath::new(1, 0x0045, 7)),
            Err(Status::UnsupportedAttribute)
        );
    }

    #[test]
    fn test_attribute_list_includes_synthesized_globals() {
        let model = model();
        let list = model
            .read_attribute(&ConcreteAttributePath::new(1, 0x0045, 0xFFFB))
            .unwrap();
        let ids: Vec<u64> = list
            .as_list()
            .unwrap()
            .iter()
            .filter_map(Value::as_u64)
            .collect();
        assert_eq!(ids, vec![0xFFFD, 0xFFFC, 0x0000, 0xFFF8, 0xFFF9, 0xFFFA, 0xFFFB]);

        let without_events = MemoryDataModel::new(model.node().clone()).with_event_list(false);
        let list = without_events
            .read_attribute(&ConcreteAttributePath::new(1, 0x0045, 0xFFFB))
            .unwrap();
        assert_eq!(list.as_list().unwrap().len(), 6);
    }

    #[test]
    fn test_globals_are_read_only() {
        let mut model = model();
        assert_eq!(
            model.set_attribute(ConcreteAttributePath::new(1, 0x0045, 0xFFFD), 2u16),
            Err(Status::UnsupportedWrite)
        );
    }

    #[test]
    fn test_event_path_check() {
        let model = model();
        assert_eq!(model.check_event_path(&ConcreteEventPath::new(1, 0x0045, 0)), Ok(()));
        assert_eq!(
            model.check_event_path(&ConcreteEventPath::new(1, 0x0045, 5)),
            Err(Status::UnsupportedEvent)
        );
        assert_eq!(
            model.check_event_path(&ConcreteEventPath::new(2, 0x0045, 0)),
            Err(Status::UnsupportedEndpoint)
        );
    }
}
