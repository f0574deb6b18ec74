//! Wildcard attribute path expansion.
//!
//! [`AttributePathExpander`] walks an ordered list of patterns against live
//! metadata and yields concrete paths lazily:
//! patterns in list order, endpoints and clusters in provider order, then
//! the cluster's attribute table followed by the globals missing from it.
//!
//! A pattern without any wildcard is yielded once as-is, existing or not, so
//! the report can carry a status for it. Wildcard patterns only yield paths
//! that exist.

use std::sync::Arc;

use super::super::ids::{AttributeId, ClusterId, EndpointId, GlobalAttribute, ListIndex};
use super::super::metadata::{ClusterMetadata, synthesized_globals};
use super::super::path::{AttributePathParams, ConcreteAttributePath};

#[derive(Debug, Clone)]
pub struct AttributePathExpander {
    paths: Arc<[AttributePathParams]>,
    event_list_enabled: bool,
    pattern_index: usize,
    endpoint_index: usize,
    cluster_index: usize,
    attribute_index: usize,
    current: Option<ConcreteAttributePath>,
}

impl AttributePathExpander {
    pub fn new(
        paths: Arc<[AttributePathParams]>,
        metadata: &dyn ClusterMetadata,
        event_list_enabled: bool,
    ) -> Self {
        let mut expander = Self {
            paths,
            event_list_enabled,
            pattern_index: 0,
            endpoint_index: 0,
            cluster_index: 0,
            attribute_index: 0,
            current: None,
        };
        expander.settle(metadata);
        expander
    }

    /// Path at the current position, `None` once exhausted.
    pub fn get(&self) -> Option<ConcreteAttributePath> {
        self.current
    }

    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// List index requested by the pattern that produced the current path.
    pub fn current_list_index(&self) -> Option<ListIndex> {
        self.current?;
        self.paths.get(self.pattern_index)?.list_index
    }

    pub fn advance(&mut self, metadata: &dyn ClusterMetadata) {
        if self.current.is_none() {
            return;
        }
        self.attribute_index += 1;
        self.settle(metadata);
    }

    /// Rewind to the first attribute of the cluster currently being walked.
    pub fn reset_current_cluster(&mut self, metadata: &dyn ClusterMetadata) {
        if self.current.is_none() {
            return;
        }
        self.attribute_index = 0;
        self.settle(metadata);
    }

    fn next_pattern(&mut self) {
        self.pattern_index += 1;
        self.endpoint_index = 0;
        self.cluster_index = 0;
        self.attribute_index = 0;
    }

    fn next_endpoint(&mut self) {
        self.endpoint_index += 1;
        self.cluster_index = 0;
        self.attribute_index = 0;
    }

    fn next_cluster(&mut self) {
        self.cluster_index += 1;
        self.attribute_index = 0;
    }

    /// Move forward from the current indices to the first valid path.
    fn settle(&mut self, metadata: &dyn ClusterMetadata) {
        loop {
            let Some(pattern) = self.paths.get(self.pattern_index).copied() else {
                self.current = None;
                return;
            };

            if !pattern.has_wildcard() {
                if self.endpoint_index == 0 && self.cluster_index == 0 && self.attribute_index == 0
                {
                    self.current = pattern_as_concrete(&pattern);
                    return;
                }
                self.next_pattern();
                continue;
            }

            let Some(endpoint) = self.endpoint_candidate(metadata, &pattern) else {
                self.next_pattern();
                continue;
            };
            if pattern.endpoint_id.is_some() && !metadata.has_endpoint(endpoint) {
                self.next_pattern();
                continue;
            }

            let Some(cluster) = self.cluster_candidate(metadata, &pattern, endpoint) else {
                self.next_endpoint();
                continue;
            };
            if pattern.cluster_id.is_some() && !metadata.has_cluster(endpoint, cluster) {
                self.next_endpoint();
                continue;
            }

            let Some(attribute) = self.attribute_candidate(metadata, &pattern, endpoint, cluster)
            else {
                self.next_cluster();
                continue;
            };
            let path = ConcreteAttributePath::new(endpoint, cluster, attribute);
            if pattern.attribute_id.is_some() && !self.attribute_exists(metadata, &path) {
                self.next_cluster();
                continue;
            }

            self.current = Some(path);
            return;
        }
    }

    fn endpoint_candidate(
        &self,
        metadata: &dyn ClusterMetadata,
        pattern: &AttributePathParams,
    ) -> Option<EndpointId> {
        match pattern.endpoint_id {
            Some(endpoint) => (self.endpoint_index == 0).then_some(endpoint),
            None => metadata.endpoint_at(self.endpoint_index),
        }
    }

    fn cluster_candidate(
        &self,
        metadata: &dyn ClusterMetadata,
        pattern: &AttributePathParams,
        endpoint: EndpointId,
    ) -> Option<ClusterId> {
        match pattern.cluster_id {
            Some(cluster) => (self.cluster_index == 0).then_some(cluster),
            None => metadata.cluster_at(endpoint, self.cluster_index),
        }
    }

    fn attribute_candidate(
        &self,
        metadata: &dyn ClusterMetadata,
        pattern: &AttributePathParams,
        endpoint: EndpointId,
        cluster: ClusterId,
    ) -> Option<AttributeId> {
        if let Some(attribute) = pattern.attribute_id {
            return (self.attribute_index == 0).then_some(attribute);
        }

        let table_len = metadata.attribute_count(endpoint, cluster);
        if self.attribute_index < table_len {
            return metadata.attribute_at(endpoint, cluster, self.attribute_index);
        }
        synthesized_globals(metadata, endpoint, cluster, self.event_list_enabled)
            .nth(self.attribute_index - table_len)
    }

    fn attribute_exists(&self, metadata: &dyn ClusterMetadata, path: &ConcreteAttributePath) -> bool {
        if !self.event_list_enabled
            && path.attribute_id == GlobalAttribute::EventList.id()
            && !metadata.has_table_attribute(path.endpoint_id, path.cluster_id, path.attribute_id)
        {
            return false;
        }
        metadata.has_attribute(path)
    }
}

fn pattern_as_concrete(pattern: &AttributePathParams) -> Option<ConcreteAttributePath> {
    Some(ConcreteAttributePath::new(
        pattern.endpoint_id?,
        pattern.cluster_id?,
        pattern.attribute_id?,
    ))
}

/// Expand every pattern eagerly.
pub fn expand_all(
    paths: &[AttributePathParams],
    metadata: &dyn ClusterMetadata,
    event_list_enabled: bool,
) -> Vec<ConcreteAttributePath> {
    let mut expander = AttributePathExpander::new(paths.into(), metadata, event_list_enabled);
    let mut expanded = Vec::new();
    while let Some(path) = expander.get() {
        expanded.push(path);
        expander.advance(metadata);
    }
    expanded
}

/// Drop concrete paths already covered by a wildcard pattern of the same
/// request.
///
/// Only existing concrete paths are dropped: a path to a missing attribute
/// still has to produce its status. Wildcards are never removed.
pub fn remove_duplicate_concrete_paths(
    paths: &mut Vec<AttributePathParams>,
    metadata: &dyn ClusterMetadata,
) {
    let wildcards: Vec<AttributePathParams> =
        paths.iter().filter(|p| p.has_wildcard()).copied().collect();
    paths.retain(|path| {
        let Some(concrete) = pattern_as_concrete(path) else {
            return true;
        };
        if !metadata.has_attribute(&concrete) {
            return true;
        }
        !wildcards.iter().any(|w| w.is_superset_of(path))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::metadata::{ClusterDescriptor, EndpointDescriptor, NodeDescriptor};

    const GLOBAL_TAIL: [u32; 4] = [0xFFF8, 0xFFF9, 0xFFFA, 0xFFFB];

    // Endpoint 1: cluster 2 (attr 1, 2), cluster 3 (attr 1)
    // Endpoint 2: cluster 2 (attr 1), cluster 3 (attr 1, 2, 3), cluster 4 (attr 1)
    // Endpoint 3: cluster 1 (attr 1)
    fn node() -> NodeDescriptor {
        NodeDescriptor::new()
            .endpoint(
                EndpointDescriptor::new(1)
                    .cluster(ClusterDescriptor::new(2, 1).attributes(&[1, 2]))
                    .cluster(ClusterDescriptor::new(3, 1).attributes(&[1])),
            )
            .endpoint(
                EndpointDescriptor::new(2)
                    .cluster(ClusterDescriptor::new(2, 1).attributes(&[1]))
                    .cluster(ClusterDescriptor::new(3, 1).attributes(&[1, 2, 3]))
                    .cluster(ClusterDescriptor::new(4, 1).attributes(&[1])),
            )
            .endpoint(
                EndpointDescriptor::new(3).cluster(ClusterDescriptor::new(1, 1).attributes(&[1])),
            )
    }

    fn cluster_paths(endpoint: u16, cluster: u32, attrs: &[u32]) -> Vec<ConcreteAttributePath> {
        [0xFFFD, 0xFFFC]
            .iter()
            .chain(attrs)
            .chain(GLOBAL_TAIL.iter())
            .map(|a| ConcreteAttributePath::new(endpoint, cluster, *a))
            .collect()
    }

    #[test]
    fn test_wildcard_endpoint_concrete_cluster_attribute() {
        let paths = [AttributePathParams::new(None, Some(3), Some(1))];
        let expanded = expand_all(&paths, &node(), true);
        assert_eq!(
            expanded,
            vec![
                ConcreteAttributePath::new(1, 3, 1),
                ConcreteAttributePath::new(2, 3, 1),
            ]
        );
    }

    #[test]
    fn test_wildcard_attribute_appends_global_tail() {
        let paths = [AttributePathParams::new(Some(2), Some(3), None)];
        let expanded = expand_all(&paths, &node(), true);
        assert_eq!(expanded, cluster_paths(2, 3, &[1, 2, 3]));
    }

    #[test]
    fn test_event_list_disabled() {
        let paths = [AttributePathParams::new(Some(3), Some(1), None)];
        let expanded = expand_all(&paths, &node(), false);
        assert_eq!(expanded.len(), 2 + 1 + 3);
        assert!(expanded.iter().all(|p| p.attribute_id != 0xFFFA));

        let concrete = [AttributePathParams::new(None, Some(1), Some(0xFFFA))];
        assert!(expand_all(&concrete, &node(), false).is_empty());
    }

    #[test]
    fn test_full_wildcard_visits_in_order() {
        let node = node();
        let expanded = expand_all(&[AttributePathParams::wildcard()], &node, true);

        let mut expected = Vec::new();
        expected.extend(cluster_paths(1, 2, &[1, 2]));
        expected.extend(cluster_paths(1, 3, &[1]));
        expected.extend(cluster_paths(2, 2, &[1]));
        expected.extend(cluster_paths(2, 3, &[1, 2, 3]));
        expected.extend(cluster_paths(2, 4, &[1]));
        expected.extend(cluster_paths(3, 1, &[1]));
        assert_eq!(expanded, expected);
    }

    #[test]
    fn test_multiple_patterns_in_list_order() {
        let paths = [
            AttributePathParams::concrete(2, 4, 1),
            AttributePathParams::new(Some(1), None, Some(2)),
            AttributePathParams::concrete(9, 9, 9),
        ];
        let expanded = expand_all(&paths, &node(), true);
        assert_eq!(
            expanded,
            vec![
                ConcreteAttributePath::new(2, 4, 1),
                ConcreteAttributePath::new(1, 2, 2),
                // Non-wildcard paths are emitted even when missing
                ConcreteAttributePath::new(9, 9, 9),
            ]
        );
    }

    #[test]
    fn test_missing_endpoint_or_cluster_yields_nothing() {
        let node = node();
        assert!(expand_all(&[AttributePathParams::new(Some(7), None, None)], &node, true).is_empty());
        assert!(expand_all(&[AttributePathParams::new(Some(1), Some(9), None)], &node, true).is_empty());
        assert!(expand_all(&[AttributePathParams::new(None, Some(9), Some(1))], &node, true).is_empty());
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let node = node();
        let paths = [
            AttributePathParams::new(None, Some(3), None),
            AttributePathParams::new(Some(2), None, Some(1)),
        ];
        assert_eq!(expand_all(&paths, &node, true), expand_all(&paths, &node, true));
    }

    #[test]
    fn test_reset_current_cluster() {
        let node = node();
        let paths: Arc<[AttributePathParams]> =
            vec![AttributePathParams::new(Some(2), None, None)].into();
        let mut expander = AttributePathExpander::new(paths, &node, true);

        // Walk into the second cluster (2/3)
        while expander.get().map(|p| p.cluster_id) != Some(3) {
            expander.advance(&node);
        }
        expander.advance(&node);
        expander.advance(&node);
        assert_eq!(expander.get(), Some(ConcreteAttributePath::new(2, 3, 1)));

        expander.reset_current_cluster(&node);
        assert_eq!(expander.get(), Some(ConcreteAttributePath::new(2, 3, 0xFFFD)));
    }

    #[test]
    fn test_list_index_carried_through() {
        let node = node();
        let paths: Arc<[AttributePathParams]> =
            vec![AttributePathParams::concrete(1, 2, 1).with_list_index(3)].into();
        let expander = AttributePathExpander::new(paths, &node, true);
        assert_eq!(expander.current_list_index(), Some(3));
    }

    #[test]
    fn test_remove_duplicate_concrete_paths() {
        let node = node();
        let mut paths = vec![
            AttributePathParams::concrete(2, 3, 1),
            AttributePathParams::new(None, Some(3), None),
            AttributePathParams::concrete(2, 3, 9),
            AttributePathParams::concrete(3, 1, 1),
            AttributePathParams::new(Some(2), Some(3), None),
        ];
        remove_duplicate_concrete_paths(&mut paths, &node);
        assert_eq!(
            paths,
            vec![
                AttributePathParams::new(None, Some(3), None),
                // Missing attribute keeps its own status
                AttributePathParams::concrete(2, 3, 9),
                AttributePathParams::concrete(3, 1, 1),
                AttributePathParams::new(Some(2), Some(3), None),
            ]
        );
    }
}
