//! Interaction Model messages of the read/subscribe protocol.

use serde::{Deserialize, Serialize};

use super::events::{EventDataIB, EventPathParams, EventStatusIB};
use super::ids::{EventNumber, SubscriptionId};
use super::path::{
    AttributePathParams, ConcreteAttributePath, ConcreteDataAttributePath, DataVersionFilter,
};
use super::status::Status;
use super::value::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub attribute_requests: Vec<AttributePathParams>,
    pub event_requests: Vec<EventPathParams>,
    pub data_version_filters: Vec<DataVersionFilter>,
    /// Only events numbered at or above this are reported.
    pub event_filter_min: Option<EventNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub keep_subscriptions: bool,
    pub min_interval_floor: u16,
    pub max_interval_ceiling: u16,
    pub attribute_requests: Vec<AttributePathParams>,
    pub event_requests: Vec<EventPathParams>,
    pub data_version_filters: Vec<DataVersionFilter>,
    pub event_filter_min: Option<EventNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub subscription_id: SubscriptionId,
    pub max_interval: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDataIB {
    pub path: ConcreteDataAttributePath,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatusIB {
    pub path: ConcreteAttributePath,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeReportIB {
    Data(AttributeDataIB),
    Status(AttributeStatusIB),
}

impl AttributeReportIB {
    pub fn path(&self) -> &ConcreteAttributePath {
        match self {
            AttributeReportIB::Data(data) => &data.path.path,
            AttributeReportIB::Status(status) => &status.path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventReportIB {
    Data(EventDataIB),
    Status(EventStatusIB),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportData {
    pub subscription_id: Option<SubscriptionId>,
    pub attribute_reports: Vec<AttributeReportIB>,
    pub event_reports: Vec<EventReportIB>,
    /// Further chunks of this report follow.
    pub more_chunked_messages: bool,
    /// The receiver must not answer with a StatusResponse.
    pub suppress_response: bool,
}

impl ReportData {
    pub fn is_empty(&self) -> bool {
        self.attribute_reports.is_empty() && self.event_reports.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    ReadRequest(ReadRequest),
    SubscribeRequest(SubscribeRequest),
    SubscribeResponse(SubscribeResponse),
    ReportData(ReportData),
    StatusResponse(StatusResponse),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ReadRequest(_) => "ReadRequest",
            Message::SubscribeRequest(_) => "SubscribeRequest",
            Message::SubscribeResponse(_) => "SubscribeResponse",
            Message::ReportData(_) => "ReportData",
            Message::StatusResponse(_) => "StatusResponse",
        }
    }

    pub fn status(status: Status) -> Self {
        Message::StatusResponse(StatusResponse { status })
    }
}
