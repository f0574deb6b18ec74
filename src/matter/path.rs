//! Attribute paths: concrete paths, wildcard patterns and data-version
//! filters.

use super::ids::{AttributeId, ClusterId, DataVersion, EndpointId, ListIndex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully resolved attribute path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConcreteAttributePath {
    pub endpoint_id: EndpointId,
    pub cluster_id: ClusterId,
    pub attribute_id: AttributeId,
}

impl ConcreteAttributePath {
    pub const fn new(
        endpoint_id: EndpointId,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
    ) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            attribute_id,
        }
    }

    pub fn cluster(&self) -> (EndpointId, ClusterId) {
        (self.endpoint_id, self.cluster_id)
    }
}

impl fmt::Display for ConcreteAttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:04x}/0x{:04x}",
            self.endpoint_id, self.cluster_id, self.attribute_id
        )
    }
}

/// How a data element applies to a list attribute.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ListOperation {
    /// The element carries the whole attribute value.
    #[default]
    NotList,
    /// The element replaces the whole list.
    ReplaceAll,
    /// The element is one item appended to the list.
    AppendItem,
    /// The element replaces the item at the given index.
    ReplaceItem(ListIndex),
}

/// Path of one attribute data element inside a report.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ConcreteDataAttributePath {
    pub path: ConcreteAttributePath,
    #[serde(default)]
    pub list_op: ListOperation,
    #[serde(default)]
    pub data_version: Option<DataVersion>,
}

impl ConcreteDataAttributePath {
    pub fn new(path: ConcreteAttributePath, data_version: Option<DataVersion>) -> Self {
        Self {
            path,
            list_op: ListOperation::NotList,
            data_version,
        }
    }

    pub fn with_list_op(mut self, list_op: ListOperation) -> Self {
        self.list_op = list_op;
        self
    }

    /// Element addresses a single list item rather than the whole attribute.
    pub fn is_list_item(&self) -> bool {
        matches!(
            self.list_op,
            ListOperation::AppendItem | ListOperation::ReplaceItem(_)
        )
    }
}

/// Attribute path pattern. `None` in any position is a wildcard.
///
/// A list index is only meaningful together with a concrete attribute id.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AttributePathParams {
    pub endpoint_id: Option<EndpointId>,
    pub cluster_id: Option<ClusterId>,
    pub attribute_id: Option<AttributeId>,
    #[serde(default)]
    pub list_index: Option<ListIndex>,
}

impl AttributePathParams {
    pub const fn new(
        endpoint_id: Option<EndpointId>,
        cluster_id: Option<ClusterId>,
        attribute_id: Option<AttributeId>,
    ) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            attribute_id,
            list_index: None,
        }
    }

    /// Matches every attribute of every cluster on every endpoint.
    pub const fn wildcard() -> Self {
        Self::new(None, None, None)
    }

    pub const fn concrete(
        endpoint_id: EndpointId,
        cluster_id: ClusterId,
        attribute_id: AttributeId,
    ) -> Self {
        Self::new(Some(endpoint_id), Some(cluster_id), Some(attribute_id))
    }

    pub fn with_list_index(mut self, list_index: ListIndex) -> Self {
        self.list_index = Some(list_index);
        self
    }

    pub fn has_wildcard_endpoint(&self) -> bool {
        self.endpoint_id.is_none()
    }

    pub fn has_wildcard_cluster(&self) -> bool {
        self.cluster_id.is_none()
    }

    pub fn has_wildcard_attribute(&self) -> bool {
        self.attribute_id.is_none()
    }

    /// Any of endpoint, cluster or attribute is a wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.has_wildcard_endpoint() || self.has_wildcard_cluster() || self.has_wildcard_attribute()
    }

    pub fn is_valid(&self) -> bool {
        self.list_index.is_none() || !self.has_wildcard_attribute()
    }

    /// Some concrete path is matched by both patterns.
    pub fn intersects(&self, other: &AttributePathParams) -> bool {
        dimension_overlaps(self.endpoint_id, other.endpoint_id)
            && dimension_overlaps(self.cluster_id, other.cluster_id)
            && dimension_overlaps(self.attribute_id, other.attribute_id)
    }

    /// Every path matched by `other` is also matched by `self`.
    pub fn is_superset_of(&self, other: &AttributePathParams) -> bool {
        dimension_covers(self.endpoint_id, other.endpoint_id)
            && dimension_covers(self.cluster_id, other.cluster_id)
            && dimension_covers(self.attribute_id, other.attribute_id)
            && dimension_covers(self.list_index, other.list_index)
    }

    pub fn matches(&self, path: &ConcreteAttributePath) -> bool {
        self.matches_cluster(path.endpoint_id, path.cluster_id)
            && self.attribute_id.is_none_or(|a| a == path.attribute_id)
    }

    pub fn matches_cluster(&self, endpoint_id: EndpointId, cluster_id: ClusterId) -> bool {
        self.endpoint_id.is_none_or(|e| e == endpoint_id)
            && self.cluster_id.is_none_or(|c| c == cluster_id)
    }
}

impl From<ConcreteAttributePath> for AttributePathParams {
    fn from(path: ConcreteAttributePath) -> Self {
        Self::concrete(path.endpoint_id, path.cluster_id, path.attribute_id)
    }
}

impl fmt::Display for AttributePathParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.endpoint_id {
            Some(e) => write!(f, "{}", e)?,
            None => write!(f, "*")?,
        }
        match self.cluster_id {
            Some(c) => write!(f, "/0x{:04x}", c)?,
            None => write!(f, "/*")?,
        }
        match self.attribute_id {
            Some(a) => write!(f, "/0x{:04x}", a)?,
            None => write!(f, "/*")?,
        }
        if let Some(index) = self.list_index {
            write!(f, "[{}]", index)?;
        }
        Ok(())
    }
}

pub(crate) fn dimension_overlaps<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

pub(crate) fn dimension_covers<T: PartialEq>(outer: Option<T>, inner: Option<T>) -> bool {
    match (outer, inner) {
        (None, _) => true,
        (Some(o), Some(i)) => o == i,
        (Some(_), None) => false,
    }
}

/// Cluster version the client already holds; the server skips the cluster
/// in the priming report when it is unchanged.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DataVersionFilter {
    pub endpoint_id: EndpointId,
    pub cluster_id: ClusterId,
    pub data_version: DataVersion,
}

impl DataVersionFilter {
    pub fn new(endpoint_id: EndpointId, cluster_id: ClusterId, data_version: DataVersion) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            data_version,
        }
    }
}
