//! Reassembly of lists split across report chunks.
//!
//! A server splits a large list into a ReplaceAll element carrying a prefix
//! of the items followed by AppendItem elements. The assembler buffers the
//! items and hands the callback one record holding the whole list, once a
//! different element arrives or the report ends.

use log::trace;

use super::super::messages::AttributeReportIB;
use super::super::path::{ConcreteDataAttributePath, ListOperation};
use super::super::value::Value;
use super::callback::ReadClientCallback;

#[derive(Debug, Default)]
pub struct ReportAssembler {
    open: Option<OpenList>,
}

#[derive(Debug)]
struct OpenList {
    path: ConcreteDataAttributePath,
    items: Vec<Value>,
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_open_list(&self) -> bool {
        self.open.is_some()
    }

    pub fn process(&mut self, report: &AttributeReportIB, callback: &mut dyn ReadClientCallback) {
        match report {
            AttributeReportIB::Status(status) => {
                self.flush(callback);
                let path = ConcreteDataAttributePath::new(status.path, None);
                callback.on_attribute_data(&path, Err(status.status));
            }
            AttributeReportIB::Data(data) => match data.path.list_op {
                ListOperation::ReplaceAll => {
                    self.flush(callback);
                    let items = data.data.as_list().map(<[Value]>::to_vec).unwrap_or_default();
                    self.open = Some(OpenList {
                        path: data.path,
                        items,
                    });
                }
                ListOperation::AppendItem => match &mut self.open {
                    Some(open) if open.path.path == data.path.path => {
                        open.items.push(data.data.clone());
                    }
                    _ => {
                        self.flush(callback);
                        callback.on_attribute_data(&data.path, Ok(&data.data));
                    }
                },
                ListOperation::NotList | ListOperation::ReplaceItem(_) => {
                    self.flush(callback);
                    callback.on_attribute_data(&data.path, Ok(&data.data));
                }
            },
        }
    }

    /// Deliver the buffered list, if any.
    pub fn flush(&mut self, callback: &mut dyn ReadClientCallback) {
        if let Some(open) = self.open.take() {
            trace!("Delivering {} with {} items", open.path.path, open.items.len());
            let path = open.path.with_list_op(ListOperation::NotList);
            callback.on_attribute_data(&path, Ok(&Value::List(open.items)));
        }
    }

    /// Drop a partially received list.
    pub fn reset(&mut self) {
        self.open = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImError;
    use crate::matter::events::EventDataIB;
    use crate::matter::messages::{AttributeDataIB, AttributeStatusIB};
    use crate::matter::path::ConcreteAttributePath;
    use crate::matter::status::Status;

    #[derive(Default)]
    struct Records(Vec<(ConcreteDataAttributePath, Result<Value, Status>)>);

    impl ReadClientCallback for Records {
        fn on_attribute_data(
            &mut self,
            path: &ConcreteDataAttributePath,
            data: Result<&Value, Status>,
        ) {
            self.0.push((*path, data.cloned()));
        }

        fn on_event_data(&mut self, _event: &EventDataIB) {}

        fn on_error(&mut self, _error: &ImError) {}

        fn on_done(&mut self) {}
    }

    fn data(attribute: u32, list_op: ListOperation, value: Value) -> AttributeReportIB {
        AttributeReportIB::Data(AttributeDataIB {
            path: ConcreteDataAttributePath::new(ConcreteAttributePath::new(1, 0x001D, attribute), Some(4))
                .with_list_op(list_op),
            data: value,
        })
    }

    #[test]
    fn test_split_list_is_merged() {
        let mut assembler = ReportAssembler::new();
        let mut records = Records::default();
        let items: Vec<Value> = (0..6u32).map(Value::from).collect();

        assembler.process(&data(0, ListOperation::ReplaceAll, Value::List(items[..4].to_vec())), &mut records);
        assembler.process(&data(0, ListOperation::AppendItem, items[4].clone()), &mut records);
        assert!(records.0.is_empty());
        // Chunk boundary: the list stays open
        assembler.process(&data(0, ListOperation::AppendItem, items[5].clone()), &mut records);
        assembler.process(&data(1, ListOperation::NotList, Value::Bool(true)), &mut records);

        assert_eq!(records.0.len(), 2);
        assert_eq!(records.0[0].0.list_op, ListOperation::NotList);
        assert_eq!(records.0[0].0.data_version, Some(4));
        assert_eq!(records.0[0].1, Ok(Value::List(items)));
        assert_eq!(records.0[1].1, Ok(Value::Bool(true)));
    }

    #[test]
    fn test_status_closes_open_list() {
        let mut assembler = ReportAssembler::new();
        let mut records = Records::default();

        assembler.process(&data(0, ListOperation::ReplaceAll, Value::List(vec![])), &mut records);
        assembler.process(
            &AttributeReportIB::Status(AttributeStatusIB {
                path: ConcreteAttributePath::new(1, 0x001D, 9),
                status: Status::UnsupportedAttribute,
            }),
            &mut records,
        );
        assert_eq!(records.0.len(), 2);
        assert_eq!(records.0[0].1, Ok(Value::List(vec![])));
        assert_eq!(records.0[1].1, Err(Status::UnsupportedAttribute));
        assert!(!assembler.has_open_list());
    }

    #[test]
    fn test_stray_append_is_passed_through() {
        let mut assembler = ReportAssembler::new();
        let mut records = Records::default();
        assembler.process(&data(0, ListOperation::AppendItem, Value::from(3u32)), &mut records);
        assert_eq!(records.0[0].0.list_op, ListOperation::AppendItem);
        assert!(!assembler.has_open_list());
    }
}
