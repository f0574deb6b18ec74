//! Server-side event log.
//!
//! Assigns event numbers and keeps a bounded window of recent events for
//! read and subscribe reports. When full, the oldest event of the lowest
//! priority present is evicted first.

use std::collections::VecDeque;

use log::{debug, trace};

use super::super::ids::EventNumber;
use super::super::value::Value;
use super::data::{EventDataIB, EventHeader, EventPriority, EventTimestamp};
use super::path::{ConcreteEventPath, EventPathParams};

pub struct EventLog {
    records: VecDeque<EventDataIB>,
    capacity: usize,
    next_event_number: EventNumber,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self::starting_at(capacity, 0)
    }

    /// Continue numbering from a previously persisted counter.
    pub fn starting_at(capacity: usize, next_event_number: EventNumber) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_event_number,
        }
    }

    /// Record an event and return its number.
    pub fn log(
        &mut self,
        path: ConcreteEventPath,
        priority: EventPriority,
        timestamp: EventTimestamp,
        data: Value,
    ) -> EventNumber {
        let event_number = self.next_event_number;
        self.next_event_number += 1;

        if self.records.len() >= self.capacity {
            self.evict();
        }

        debug!(
            "Logged event #{} on {} ({:?})",
            event_number, path, priority
        );
        self.records.push_back(EventDataIB::new(
            EventHeader {
                path,
                event_number,
                priority,
                timestamp,
            },
            data,
        ));
        event_number
    }

    fn evict(&mut self) {
        let lowest = self.records.iter().map(|r| r.header.priority).min();
        let Some(lowest) = lowest else { return };
        if let Some(index) = self
            .records
            .iter()
            .position(|r| r.header.priority == lowest)
            && let Some(dropped) = self.records.remove(index)
        {
            trace!("Evicted event #{}", dropped.event_number());
        }
    }

    /// Number the next logged event will receive.
    pub fn next_event_number(&self) -> EventNumber {
        self.next_event_number
    }

    pub fn last_event_number(&self) -> Option<EventNumber> {
        self.next_event_number.checked_sub(1)
    }

    /// Retained events numbered `min` or higher, ascending.
    pub fn events_since(&self, min: EventNumber) -> impl Iterator<Item = &EventDataIB> {
        let start = self.records.partition_point(|r| r.event_number() < min);
        self.records.range(start..)
    }

    /// A retained event at or after `min` matches any of `paths`.
    pub fn has_matching_since(&self, paths: &[EventPathParams], min: EventNumber) -> bool {
        self.events_since(min)
            .any(|r| paths.iter().any(|p| p.matches(&r.header.path)))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
