//! Application-facing side of a read client.

use std::time::Duration;

use super::super::events::{EventDataIB, EventStatusIB};
use super::super::ids::{EventNumber, SubscriptionId};
use super::super::path::{AttributePathParams, ConcreteDataAttributePath, DataVersionFilter};
use super::super::status::Status;
use super::super::value::Value;
use crate::error::ImError;

/// Receives the reassembled records of a read or subscription.
///
/// The client passes the callback by `&mut` into every call that can
/// produce records, so one callback may serve several clients.
pub trait ReadClientCallback {
    /// One attribute record: the full value of a concrete path, a single
    /// list item operation, or the status the server reported for it.
    fn on_attribute_data(&mut self, path: &ConcreteDataAttributePath, data: Result<&Value, Status>);

    fn on_event_data(&mut self, event: &EventDataIB);

    fn on_event_status(&mut self, _status: &EventStatusIB) {}

    /// A transaction-fatal error. Always followed by either
    /// [`ReadClientCallback::on_done`] or a scheduled resubscription.
    fn on_error(&mut self, error: &ImError);

    /// The client reached its terminal state and will deliver nothing more.
    fn on_done(&mut self);

    fn on_report_begin(&mut self) {}

    fn on_report_end(&mut self) {}

    fn on_subscription_established(&mut self, _subscription_id: SubscriptionId) {}

    fn on_resubscription_scheduled(&mut self, _attempt: u32, _wait: Duration) {}

    /// The attribute patterns of a request about to be sent, including a
    /// resubscription.
    fn on_request_prepared(&mut self, _attribute_paths: &[AttributePathParams]) {}

    /// Highest event number already held, used as the event floor when the
    /// request does not set one.
    fn highest_received_event_number(&self) -> Option<EventNumber> {
        None
    }

    /// Data version filters to send along with a request for `paths`.
    fn data_version_filters(&self, _paths: &[AttributePathParams]) -> Vec<DataVersionFilter> {
        Vec::new()
    }
}
