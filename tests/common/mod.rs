#![allow(dead_code)]

use std::time::Duration;

use matter_im_reporting::config::Config;
use matter_im_reporting::error::ImError;
use matter_im_reporting::matter::client::{
    CachedCallback, ClientHandle, ClientRegistry, ReadClientCallback, ReadPrepareParams,
};
use matter_im_reporting::matter::codec::{Codec, JsonCodec};
use matter_im_reporting::matter::data_model::MemoryDataModel;
use matter_im_reporting::matter::events::{EventDataIB, EventStatusIB};
use matter_im_reporting::matter::ids::{
    AttributeId, ClusterId, EndpointId, GlobalAttribute, ScopedNodeId, SubscriptionId,
};
use matter_im_reporting::matter::loopback::{Datagram, Direction, LoopbackLink};
use matter_im_reporting::matter::messages::{Message, ReportData};
use matter_im_reporting::matter::metadata::{ClusterDescriptor, EndpointDescriptor, NodeDescriptor};
pub use matter_im_reporting::matter::metadata::ClusterMetadata;
use matter_im_reporting::matter::path::{AttributePathParams, ConcreteAttributePath, ConcreteDataAttributePath};
use matter_im_reporting::matter::reporting::Engine;
use matter_im_reporting::matter::status::Status;
use matter_im_reporting::matter::value::Value;

pub const ROOT: EndpointId = 0;
pub const LIGHT: EndpointId = 1;
pub const SENSOR: EndpointId = 2;

pub const DESCRIPTOR: ClusterId = 0x001D;
pub const BASIC_INFORMATION: ClusterId = 0x0028;
pub const ON_OFF: ClusterId = 0x0006;
pub const LEVEL_CONTROL: ClusterId = 0x0008;
pub const UNIT_TESTING: ClusterId = 0xFFF1_FC05;
pub const BOOLEAN_STATE: ClusterId = 0x0045;
pub const SWITCH: ClusterId = 0x003B;
pub const TEMPERATURE: ClusterId = 0x0402;

/// Scalar attribute of the unit testing cluster.
pub const UNIT_TESTING_SCALAR: AttributeId = 0x0000;
/// List attribute of the unit testing cluster.
pub const UNIT_TESTING_LIST: AttributeId = 0x0001;

pub const STATE_CHANGE: u32 = 0x00;
pub const INITIAL_PRESS: u32 = 0x01;

pub const FABRIC: u8 = 1;

pub fn server_node() -> ScopedNodeId {
    ScopedNodeId::new(0x0000_0000_0000_1001, FABRIC)
}

pub fn client_node() -> ScopedNodeId {
    ScopedNodeId::new(0x0000_0000_0001_B669, FABRIC)
}

/// A cluster whose table holds its own attributes followed by
/// ClusterRevision; every other global is synthesized.
fn cluster(id: ClusterId, own: &[AttributeId]) -> ClusterDescriptor {
    let mut attributes = own.to_vec();
    attributes.push(GlobalAttribute::ClusterRevision.id());
    ClusterDescriptor {
        attributes,
        ..ClusterDescriptor::new(id, 1)
    }
}

/// Three endpoints with two to four clusters each.
pub fn test_node() -> NodeDescriptor {
    NodeDescriptor::new()
        .endpoint(
            EndpointDescriptor::new(ROOT)
                .cluster(cluster(DESCRIPTOR, &[0, 1, 2, 3]))
                .cluster(cluster(BASIC_INFORMATION, &[1, 2])),
        )
        .endpoint(
            EndpointDescriptor::new(LIGHT)
                .cluster(cluster(ON_OFF, &[0]).accepted_commands(&[0, 1, 2]))
                .cluster(cluster(LEVEL_CONTROL, &[0, 1, 2]))
                .cluster(cluster(UNIT_TESTING, &[UNIT_TESTING_SCALAR, UNIT_TESTING_LIST])),
        )
        .endpoint(
            EndpointDescriptor::new(SENSOR)
                .cluster(cluster(BOOLEAN_STATE, &[0]).events(&[STATE_CHANGE]))
                .cluster(cluster(SWITCH, &[0, 1]).events(&[INITIAL_PRESS]))
                .cluster(cluster(TEMPERATURE, &[0, 1, 2]))
                .cluster(cluster(0x0101, &[])),
        )
}

/// Six list elements, large next to the separators between them.
pub fn list_items() -> Vec<Value> {
    (0..6)
        .map(|i| Value::Utf8(format!("element-{i}-{}", "x".repeat(12))))
        .collect()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.persistence.subscriptions_file = None;
    config
}

/// Records everything a read client reports.
#[derive(Debug, Default)]
pub struct Recorder {
    pub attributes: Vec<(ConcreteDataAttributePath, Result<Value, Status>)>,
    pub events: Vec<EventDataIB>,
    pub event_statuses: Vec<EventStatusIB>,
    pub errors: Vec<Status>,
    pub error_messages: Vec<String>,
    pub reports: usize,
    pub established: Vec<SubscriptionId>,
    pub resubscriptions: Vec<(u32, Duration)>,
    pub done: usize,
}

impl Recorder {
    pub fn attribute_paths(&self) -> Vec<ConcreteAttributePath> {
        self.attributes.iter().map(|(p, _)| p.path).collect()
    }

    /// Last value recorded for `path`.
    pub fn last_value(&self, path: &ConcreteAttributePath) -> Option<&Result<Value, Status>> {
        self.attributes
            .iter()
            .rev()
            .find(|(p, _)| p.path == *path)
            .map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.attributes.clear();
        self.events.clear();
        self.event_statuses.clear();
        self.reports = 0;
    }
}

impl ReadClientCallback for Recorder {
    fn on_attribute_data(&mut self, path: &ConcreteDataAttributePath, data: Result<&Value, Status>) {
        self.attributes.push((*path, data.cloned()));
    }

    fn on_event_data(&mut self, event: &EventDataIB) {
        self.events.push(event.clone());
    }

    fn on_event_status(&mut self, status: &EventStatusIB) {
        self.event_statuses.push(*status);
    }

    fn on_error(&mut self, error: &ImError) {
        self.errors.push(error.status());
        self.error_messages.push(error.to_string());
    }

    fn on_done(&mut self) {
        self.done += 1;
    }

    fn on_report_end(&mut self) {
        self.reports += 1;
    }

    fn on_subscription_established(&mut self, subscription_id: SubscriptionId) {
        self.established.push(subscription_id);
    }

    fn on_resubscription_scheduled(&mut self, attempt: u32, wait: Duration) {
        self.resubscriptions.push((attempt, wait));
    }
}

pub type Callback = CachedCallback<Recorder>;

/// A device and a controller joined by a loopback link, on a manual clock.
pub struct Fixture {
    pub engine: Engine<MemoryDataModel>,
    pub clients: ClientRegistry<Callback>,
    pub link: LoopbackLink,
    pub now: Duration,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let mut data_model = MemoryDataModel::new(test_node())
            .with_event_list(config.engine.event_list_enabled);
        data_model
            .set_attribute(
                ConcreteAttributePath::new(LIGHT, UNIT_TESTING, UNIT_TESTING_LIST),
                Value::List(list_items()),
            )
            .expect("list attribute exists");
        data_model
            .set_attribute(ConcreteAttributePath::new(SENSOR, TEMPERATURE, 0), 2150i16)
            .expect("temperature attribute exists");

        Self {
            engine: Engine::new(&config, data_model, Box::new(JsonCodec)),
            clients: ClientRegistry::new(&config.client, Box::new(JsonCodec)),
            link: LoopbackLink::new(server_node(), client_node()),
            now: Duration::ZERO,
        }
    }

    pub fn params(&self) -> ReadPrepareParams {
        ReadPrepareParams::new(self.link.client_session)
    }

    pub fn read(&mut self, params: ReadPrepareParams) -> ClientHandle<Callback> {
        self.clients
            .read(&mut self.link.client, params, CachedCallback::new(Recorder::default()))
            .expect("read request sent")
    }

    pub fn subscribe(&mut self, params: ReadPrepareParams) -> ClientHandle<Callback> {
        self.clients
            .subscribe(&mut self.link.client, params, CachedCallback::new(Recorder::default()))
            .expect("subscribe request sent")
    }

    pub fn pump(&mut self) -> usize {
        self.link.pump(&mut self.engine, &mut self.clients, self.now)
    }

    /// Move the clock, fire both timers and deliver whatever they send.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        self.engine.on_timer(&mut self.link.server, self.now);
        self.clients.on_timer(&mut self.link.client, self.now);
        self.pump();
    }

    pub fn advance_to(&mut self, at: Duration) {
        let by = at.saturating_sub(self.now);
        self.advance(by);
    }

    /// Change an attribute value and tell the engine about it.
    pub fn change(&mut self, path: ConcreteAttributePath, value: impl Into<Value>) {
        let changed = self
            .engine
            .data_model_mut()
            .set_attribute(path, value)
            .expect("attribute exists");
        assert!(changed, "{path} did not change");
        self.engine.set_dirty(path.into(), self.now);
    }

    pub fn recorder(&self, handle: ClientHandle<Callback>) -> &Recorder {
        &self.clients.callback(handle).expect("client is registered").inner
    }

    pub fn callback(&self, handle: ClientHandle<Callback>) -> &Callback {
        self.clients.callback(handle).expect("client is registered")
    }

    pub fn callback_mut(&mut self, handle: ClientHandle<Callback>) -> &mut Callback {
        self.clients.callback_mut(handle).expect("client is registered")
    }

    /// Hand one queued client message to the engine.
    pub fn deliver_to_server(&mut self, datagram: &Datagram) {
        let _ = self.engine.on_message(
            &mut self.link.server,
            datagram.exchange,
            &self.link.server_session,
            &datagram.payload,
            self.now,
        );
    }

    /// Hand one queued server message to the client registry.
    pub fn deliver_to_client(&mut self, datagram: &Datagram) {
        let _ = self.clients.on_message(
            &mut self.link.client,
            datagram.exchange,
            &self.link.client_session,
            &datagram.payload,
            self.now,
        );
    }

    /// Decoded messages delivered since the last call.
    pub fn wire(&mut self) -> Vec<(Direction, Message)> {
        self.link
            .take_history()
            .into_iter()
            .map(|(direction, datagram)| (direction, decode(&datagram)))
            .collect()
    }

    /// Reports the server delivered since the last call.
    pub fn reports_to_client(&mut self) -> Vec<ReportData> {
        self.wire()
            .into_iter()
            .filter_map(|(direction, message)| match (direction, message) {
                (Direction::ToClient, Message::ReportData(report)) => Some(report),
                _ => None,
            })
            .collect()
    }
}

pub fn decode(datagram: &Datagram) -> Message {
    JsonCodec.decode(&datagram.payload).expect("valid message")
}

pub fn encode(message: &Message) -> Vec<u8> {
    JsonCodec.encode(message).expect("encodable message")
}

pub fn wildcard() -> AttributePathParams {
    AttributePathParams::wildcard()
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}
