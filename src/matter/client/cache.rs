//! Client-side snapshot of everything a read client received.
//!
//! [`ClusterStateCache`] consumes reassembled records: the latest value or
//! status per concrete attribute path, the data version of each cluster
//! received whole, and events keyed by event number. Wrap an application callback in
//! [`CachedCallback`] to get both.

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::time::Duration;

use log::{debug, trace};

use super::super::events::{EventDataIB, EventPathParams, EventStatusIB};
use super::super::ids::{ClusterId, DataVersion, EndpointId, EventNumber, SubscriptionId};
use super::super::path::{
    AttributePathParams, ConcreteAttributePath, ConcreteDataAttributePath, DataVersionFilter,
    ListOperation,
};
use super::super::status::Status;
use super::super::value::Value;
use super::callback::ReadClientCallback;
use crate::error::ImError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeState {
    pub value: Result<Value, Status>,
    pub data_version: Option<DataVersion>,
}

#[derive(Debug, Default)]
pub struct ClusterStateCache {
    attributes: BTreeMap<ConcreteAttributePath, AttributeState>,
    cluster_versions: HashMap<(EndpointId, ClusterId), DataVersion>,
    /// Versions seen in the open report, committed when it ends.
    pending_versions: HashMap<(EndpointId, ClusterId), DataVersion>,
    /// Attribute patterns of the request in progress.
    request_paths: Vec<AttributePathParams>,
    events: BTreeMap<EventNumber, EventDataIB>,
    event_statuses: Vec<EventStatusIB>,
    highest_event_number: Option<EventNumber>,
}

impl ClusterStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_attribute(&self, path: &ConcreteAttributePath) -> Option<Result<&Value, Status>> {
        self.attributes
            .get(path)
            .map(|state| state.value.as_ref().map_err(|s| *s))
    }

    pub fn attribute_state(&self, path: &ConcreteAttributePath) -> Option<&AttributeState> {
        self.attributes.get(path)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&ConcreteAttributePath, &AttributeState)> {
        self.attributes.iter()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Version of a cluster whose attributes were all received at that
    /// version.
    pub fn cluster_version(&self, endpoint: EndpointId, cluster: ClusterId) -> Option<DataVersion> {
        self.cluster_versions.get(&(endpoint, cluster)).copied()
    }

    pub fn get_event(&self, event_number: EventNumber) -> Option<&EventDataIB> {
        self.events.get(&event_number)
    }

    /// Cached events numbered at or above `min`, in event number order.
    pub fn events<'a>(
        &'a self,
        filter: Option<&'a EventPathParams>,
        min: EventNumber,
    ) -> impl Iterator<Item = &'a EventDataIB> + 'a {
        self.events
            .range(min..)
            .map(|(_, event)| event)
            .filter(move |event| filter.is_none_or(|f| f.matches(&event.header.path)))
    }

    /// Visit cached events until the visitor breaks.
    pub fn for_each_event_data<F>(&self, mut visitor: F, filter: Option<&EventPathParams>, min: EventNumber)
    where
        F: FnMut(&EventDataIB) -> ControlFlow<()>,
    {
        for event in self.events(filter, min) {
            if visitor(event).is_break() {
                break;
            }
        }
    }

    pub fn event_statuses(&self) -> &[EventStatusIB] {
        &self.event_statuses
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn highest_received_event_number(&self) -> Option<EventNumber> {
        self.highest_event_number
    }

    /// Drop cached events. With `retain_high_water_mark` the next request
    /// still starts after the highest event seen.
    pub fn clear_event_cache(&mut self, retain_high_water_mark: bool) {
        self.events.clear();
        self.event_statuses.clear();
        if !retain_high_water_mark {
            self.highest_event_number = None;
        }
    }

    /// Filters for every cached cluster a wildcard-attribute pattern in
    /// `paths` covers.
    pub fn data_version_filters(&self, paths: &[AttributePathParams]) -> Vec<DataVersionFilter> {
        let mut filters: Vec<DataVersionFilter> = self
            .cluster_versions
            .iter()
            .filter(|((endpoint, cluster), _)| {
                paths
                    .iter()
                    .any(|p| p.has_wildcard_attribute() && p.matches_cluster(*endpoint, *cluster))
            })
            .map(|(&(endpoint, cluster), &version)| DataVersionFilter::new(endpoint, cluster, version))
            .collect();
        filters.sort_by_key(|f| (f.endpoint_id, f.cluster_id));
        filters
    }

    fn store_attribute(&mut self, path: &ConcreteDataAttributePath, data: Result<&Value, Status>) {
        let data = match data {
            Ok(value) => value,
            Err(status) => {
                self.attributes.insert(
                    path.path,
                    AttributeState {
                        value: Err(status),
                        data_version: None,
                    },
                );
                return;
            }
        };

        if let Some(version) = path.data_version {
            self.track_version(path.path.endpoint_id, path.path.cluster_id, version);
        }

        match path.list_op {
            ListOperation::NotList | ListOperation::ReplaceAll => {
                self.attributes.insert(
                    path.path,
                    AttributeState {
                        value: Ok(data.clone()),
                        data_version: path.data_version,
                    },
                );
            }
            ListOperation::AppendItem => {
                let state = self.attributes.entry(path.path).or_insert(AttributeState {
                    value: Ok(Value::List(Vec::new())),
                    data_version: path.data_version,
                });
                match &mut state.value {
                    Ok(Value::List(items)) => items.push(data.clone()),
                    other => *other = Ok(Value::List(vec![data.clone()])),
                }
                state.data_version = path.data_version;
            }
            ListOperation::ReplaceItem(index) => {
                if let Some(AttributeState {
                    value: Ok(Value::List(items)),
                    data_version,
                }) = self.attributes.get_mut(&path.path)
                    && let Some(item) = items.get_mut(usize::from(index))
                {
                    *item = data.clone();
                    *data_version = path.data_version;
                } else {
                    debug!("Dropping item {} of {}, list not cached", index, path.path);
                }
            }
        }
    }

    /// Only a wildcard-attribute request delivers a whole cluster. A record
    /// from a concrete request at another version leaves the rest of the
    /// cluster unconfirmed.
    fn track_version(&mut self, endpoint: EndpointId, cluster: ClusterId, version: DataVersion) {
        let whole_cluster = self
            .request_paths
            .iter()
            .any(|p| p.has_wildcard_attribute() && p.matches_cluster(endpoint, cluster));
        if whole_cluster {
            self.pending_versions.insert((endpoint, cluster), version);
        } else if self.cluster_versions.get(&(endpoint, cluster)) != Some(&version) {
            if self.cluster_versions.remove(&(endpoint, cluster)).is_some() {
                debug!(
                    "Cluster {}/0x{:04x} moved to version {}, dropping its filter",
                    endpoint, cluster, version
                );
            }
            self.pending_versions.remove(&(endpoint, cluster));
        }
    }

    fn begin_report(&mut self) {
        self.pending_versions.clear();
    }

    fn end_report(&mut self) {
        self.cluster_versions.extend(self.pending_versions.drain());
    }

    fn store_event(&mut self, event: &EventDataIB) {
        let number = event.event_number();
        if self.events.contains_key(&number) {
            trace!("Event #{} already cached", number);
            return;
        }
        self.events.insert(number, event.clone());
        self.highest_event_number = Some(self.highest_event_number.map_or(number, |h| h.max(number)));
    }
}

impl ReadClientCallback for ClusterStateCache {
    fn on_attribute_data(&mut self, path: &ConcreteDataAttributePath, data: Result<&Value, Status>) {
        self.store_attribute(path, data);
    }

    fn on_event_data(&mut self, event: &EventDataIB) {
        self.store_event(event);
    }

    fn on_event_status(&mut self, status: &EventStatusIB) {
        self.event_statuses.push(*status);
    }

    fn on_error(&mut self, _error: &ImError) {}

    fn on_done(&mut self) {}

    fn on_report_begin(&mut self) {
        self.begin_report();
    }

    fn on_report_end(&mut self) {
        self.end_report();
    }

    fn on_request_prepared(&mut self, attribute_paths: &[AttributePathParams]) {
        self.request_paths = attribute_paths.to_vec();
    }

    fn highest_received_event_number(&self) -> Option<EventNumber> {
        self.highest_event_number
    }

    fn data_version_filters(&self, paths: &[AttributePathParams]) -> Vec<DataVersionFilter> {
        ClusterStateCache::data_version_filters(self, paths)
    }
}

/// Feeds a [`ClusterStateCache`] and forwards every notification to the
/// wrapped callback.
#[derive(Debug, Default)]
pub struct CachedCallback<C> {
    pub cache: ClusterStateCache,
    pub inner: C,
}

impl<C: ReadClientCallback> CachedCallback<C> {
    pub fn new(inner: C) -> Self {
        Self {
            cache: ClusterStateCache::new(),
            inner,
        }
    }
}

impl<C: ReadClientCallback> ReadClientCallback for CachedCallback<C> {
    fn on_attribute_data(&mut self, path: &ConcreteDataAttributePath, data: Result<&Value, Status>) {
        self.cache.store_attribute(path, data);
        self.inner.on_attribute_data(path, data);
    }

    fn on_event_data(&mut self, event: &EventDataIB) {
        self.cache.store_event(event);
        self.inner.on_event_data(event);
    }

    fn on_event_status(&mut self, status: &EventStatusIB) {
        self.cache.on_event_status(status);
        self.inner.on_event_status(status);
    }

    fn on_error(&mut self, error: &ImError) {
        self.inner.on_error(error);
    }

    fn on_done(&mut self) {
        self.inner.on_done();
    }

    fn on_report_begin(&mut self) {
        self.cache.begin_report();
        self.inner.on_report_begin();
    }

    fn on_report_end(&mut self) {
        self.cache.end_report();
        self.inner.on_report_end();
    }

    fn on_request_prepared(&mut self, attribute_paths: &[AttributePathParams]) {
        self.cache.on_request_prepared(attribute_paths);
        self.inner.on_request_prepared(attribute_paths);
    }

    fn on_subscription_established(&mut self, subscription_id: SubscriptionId) {
        self.inner.on_subscription_established(subscription_id);
    }

    fn on_resubscription_scheduled(&mut self, attempt: u32, wait: Duration) {
        self.inner.on_resubscription_scheduled(attempt, wait);
    }

    fn highest_received_event_number(&self) -> Option<EventNumber> {
        self.cache.highest_received_event_number()
    }

    fn data_version_filters(&self, paths: &[AttributePathParams]) -> Vec<DataVersionFilter> {
        self.cache.data_version_filters(paths)
    }
}
