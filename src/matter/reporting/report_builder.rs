//! Size-bounded assembly of one ReportData chunk.

use super::super::codec::Codec;
use super::super::events::EventDataIB;
use super::super::ids::SubscriptionId;
use super::super::messages::{
    AttributeDataIB, AttributeReportIB, AttributeStatusIB, EventReportIB, ReportData,
};
use super::super::path::{ConcreteAttributePath, ConcreteDataAttributePath, ListOperation};
use super::super::status::Status;
use super::super::value::Value;
use crate::error::{ImError, Result};

/// Collects report elements until the message budget is used up.
///
/// Every push measures the element first and refuses it when it would not
/// fit, leaving the builder unchanged.
pub struct ReportBuilder<'a> {
    codec: &'a dyn Codec,
    capacity: usize,
    used: usize,
    report: ReportData,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(
        codec: &'a dyn Codec,
        capacity: usize,
        subscription_id: Option<SubscriptionId>,
    ) -> Result<Self> {
        let used = codec.report_overhead(subscription_id)?;
        if used >= capacity {
            return Err(ImError::BufferTooSmall(used));
        }
        Ok(Self {
            codec,
            capacity,
            used,
            report: ReportData {
                subscription_id,
                ..Default::default()
            },
        })
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    pub fn is_empty(&self) -> bool {
        self.report.is_empty()
    }

    pub fn try_push_attribute(&mut self, report: AttributeReportIB) -> Result<bool> {
        let size = self.codec.attribute_report_size(&report)?;
        if size > self.remaining() {
            return Ok(false);
        }
        self.used += size;
        self.report.attribute_reports.push(report);
        Ok(true)
    }

    pub fn try_push_data(&mut self, path: ConcreteDataAttributePath, data: Value) -> Result<bool> {
        self.try_push_attribute(AttributeReportIB::Data(AttributeDataIB { path, data }))
    }

    pub fn try_push_status(&mut self, path: ConcreteAttributePath, status: Status) -> Result<bool> {
        self.try_push_attribute(AttributeReportIB::Status(AttributeStatusIB { path, status }))
    }

    pub fn try_push_event(&mut self, report: EventReportIB) -> Result<bool> {
        let size = self.codec.event_report_size(&report)?;
        if size > self.remaining() {
            return Ok(false);
        }
        self.used += size;
        self.report.event_reports.push(report);
        Ok(true)
    }

    pub fn try_push_event_data(&mut self, event: &EventDataIB) -> Result<bool> {
        self.try_push_event(EventReportIB::Data(event.clone()))
    }

    /// Emit a ReplaceAll element carrying as many leading items of `items` as
    /// fit. Returns the number of items included, or `None` when not even an
    /// empty list fits.
    pub fn push_partial_list(
        &mut self,
        path: ConcreteDataAttributePath,
        items: &[Value],
    ) -> Result<Option<usize>> {
        let path = path.with_list_op(ListOperation::ReplaceAll);
        let header = AttributeReportIB::Data(AttributeDataIB {
            path,
            data: Value::List(Vec::new()),
        });
        let mut size = self.codec.attribute_report_size(&header)?;
        let budget = self.remaining();
        if size > budget {
            return Ok(None);
        }

        let mut count = 0;
        for item in items {
            let item_size = self.codec.list_item_size(item)?;
            if size + item_size > budget {
                break;
            }
            size += item_size;
            count += 1;
        }

        self.used += size;
        self.report
            .attribute_reports
            .push(AttributeReportIB::Data(AttributeDataIB {
                path,
                data: Value::List(items[..count].to_vec()),
            }));
        Ok(Some(count))
    }

    pub fn finish(mut self, more_chunked_messages: bool, suppress_response: bool) -> ReportData {
        self.report.more_chunked_messages = more_chunked_messages;
        self.report.suppress_response = suppress_response;
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::codec::JsonCodec;
    use crate::matter::messages::Message;

    fn path() -> ConcreteDataAttributePath {
        ConcreteDataAttributePath::new(ConcreteAttributePath::new(1, 0x0045, 0), Some(3))
    }

    #[test]
    fn test_rejects_capacity_below_overhead() {
        assert!(matches!(
            ReportBuilder::new(&JsonCodec, 10, Some(1)),
            Err(ImError::BufferTooSmall(_))
        ));
    }

    #[test]
    fn test_refuses_element_past_budget() {
        let codec = JsonCodec;
        let mut builder = ReportBuilder::new(&codec, 400, None).unwrap();
        assert!(builder.try_push_data(path(), Value::Bool(true)).unwrap());
        let before = builder.remaining();
        assert!(!builder.try_push_data(path(), Value::from("x".repeat(200))).unwrap());
        assert_eq!(builder.remaining(), before);
    }

    #[test]
    fn test_partial_list_fits_encoded_size() {
        let codec = JsonCodec;
        let capacity = 360;
        let items: Vec<Value> = (0..10).map(|i| Value::from(format!("item-{i:04}"))).collect();

        let mut builder = ReportBuilder::new(&codec, capacity, Some(7)).unwrap();
        let count = builder.push_partial_list(path(), &items).unwrap().unwrap();
        assert!(count > 0 && count < items.len());

        let report = builder.finish(true, false);
        let encoded = codec.encode(&Message::ReportData(report.clone())).unwrap();
        assert!(encoded.len() <= capacity);

        let AttributeReportIB::Data(data) = &report.attribute_reports[0] else {
            panic!("expected data element");
        };
        assert_eq!(data.path.list_op, ListOperation::ReplaceAll);
        assert_eq!(data.data.as_list().unwrap(), &items[..count]);
    }

    #[test]
    fn test_finish_sets_flags() {
        let codec = JsonCodec;
        let builder = ReportBuilder::new(&codec, 200, None).unwrap();
        assert!(builder.is_empty());
        let report = builder.finish(false, true);
        assert!(!report.more_chunked_messages);
        assert!(report.suppress_response);
    }
}
