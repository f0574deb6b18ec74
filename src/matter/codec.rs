//! Message encoding.
//!
//! Report generation needs to know how many bytes an element adds before
//! committing it to a chunk, so the codec also measures elements.

use super::ids::SubscriptionId;
use super::messages::{AttributeReportIB, EventReportIB, Message, ReportData};
use super::value::Value;
use crate::error::Result;

pub trait Codec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;
    fn decode(&self, payload: &[u8]) -> Result<Message>;

    /// Size of an empty ReportData envelope, flags included.
    fn report_overhead(&self, subscription_id: Option<SubscriptionId>) -> Result<usize>;
    /// Bytes an attribute element adds to a report.
    fn attribute_report_size(&self, report: &AttributeReportIB) -> Result<usize>;
    /// Bytes an event element adds to a report.
    fn event_report_size(&self, report: &EventReportIB) -> Result<usize>;
    /// Bytes one list item adds to an enclosing list.
    fn list_item_size(&self, item: &Value) -> Result<usize>;
}

/// JSON message codec.
///
/// Measurements include one separator byte per element, so a report built
/// from measured elements never exceeds its budget.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Message> {
        Ok(serde_json::from_slice(payload)?)
    }

    fn report_overhead(&self, subscription_id: Option<SubscriptionId>) -> Result<usize> {
        // Both flags false is the longest rendering
        let empty = Message::ReportData(ReportData {
            subscription_id,
            ..Default::default()
        });
        Ok(serde_json::to_vec(&empty)?.len())
    }

    fn attribute_report_size(&self, report: &AttributeReportIB) -> Result<usize> {
        Ok(serde_json::to_vec(report)?.len() + 1)
    }

    fn event_report_size(&self, report: &EventReportIB) -> Result<usize> {
        Ok(serde_json::to_vec(report)?.len() + 1)
    }

    fn list_item_size(&self, item: &Value) -> Result<usize> {
        Ok(serde_json::to_vec(item)?.len() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::messages::{AttributeDataIB, StatusResponse};
    use crate::matter::path::{ConcreteAttributePath, ConcreteDataAttributePath};
    use crate::matter::status::Status;

    fn data_ib(value: Value) -> AttributeReportIB {
        AttributeReportIB::Data(AttributeDataIB {
            path: ConcreteDataAttributePath::new(ConcreteAttributePath::new(1, 6, 0), Some(7)),
            data: value,
        })
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(JsonCodec.decode(b"not a message").is_err());
    }

    #[test]
    fn test_status_response_roundtrip() {
        let message = Message::StatusResponse(StatusResponse {
            status: Status::InvalidSubscription,
        });
        let bytes = JsonCodec.encode(&message).unwrap();
        assert_eq!(JsonCodec.decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_measured_report_fits_budget() {
        let codec = JsonCodec;
        let reports = vec![data_ib(Value::Bool(true)), data_ib(Value::from("hello"))];
        let budget = codec.report_overhead(Some(5)).unwrap()
            + reports
                .iter()
                .map(|r| codec.attribute_report_size(r).unwrap())
                .sum::<usize>();

        let message = Message::ReportData(ReportData {
            subscription_id: Some(5),
            attribute_reports: reports,
            more_chunked_messages: true,
            ..Default::default()
        });
        assert!(codec.encode(&message).unwrap().len() <= budget);
    }

    #[test]
    fn test_list_item_size_accounts_for_growth() {
        let codec = JsonCodec;
        let empty = codec.attribute_report_size(&data_ib(Value::List(vec![]))).unwrap();
        let item = Value::from("abc");
        let grown = codec
            .attribute_report_size(&data_ib(Value::List(vec![item.clone()])))
            .unwrap();
        assert!(grown <= empty + codec.list_item_size(&item).unwrap());
    }
}
