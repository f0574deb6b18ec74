//! Server side of one read or subscribe transaction.
//!
//! A handler walks its attribute patterns with a path expander, reads each
//! concrete path from the data model and packs the results into report
//! chunks bounded by the message size. A chunk is only built after the
//! previous one was acknowledged; the [`ResumptionCursor`] remembers where
//! the walk stopped, down to the next unsent element of a split list.
//!
//! Subscriptions stay alive after the priming report. Later reports only
//! carry paths marked dirty since the previous report began.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use strum::Display;

use super::super::codec::Codec;
use super::super::data_model::DataModel;
use super::super::events::{ConcreteEventPath, EventLog, EventPathParams, EventStatusIB};
use super::super::ids::{EventNumber, ScopedNodeId, SubscriptionId};
use super::super::messages::{EventReportIB, ReadRequest, ReportData, SubscribeRequest};
use super::super::path::{
    AttributePathParams, ConcreteAttributePath, ConcreteDataAttributePath, DataVersionFilter,
    ListOperation,
};
use super::super::status::Status;
use super::super::transport::{ExchangeId, SessionHandle};
use super::super::value::Value;
use super::dirty::DirtySet;
use super::expand::{AttributePathExpander, remove_duplicate_concrete_paths};
use super::report_builder::ReportBuilder;
use super::scheduler::IntervalScheduler;
use crate::error::{ImError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum InteractionType {
    Read,
    Subscribe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum HandlerState {
    Idle,
    GeneratingInitialReport,
    AwaitingChunkAck,
    GeneratingNextChunk,
    /// Subscription established, waiting for its scheduler.
    Active,
    GeneratingUpdateReport,
    Terminal,
}

/// Negotiated parameters and timing of a subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub min_interval_floor: u16,
    pub max_interval: u16,
    pub scheduler: IntervalScheduler,
    /// The priming report completed and the SubscribeResponse went out.
    pub established: bool,
}

/// What report generation reads from.
pub struct ReportContext<'a, D: DataModel> {
    pub data_model: &'a D,
    pub dirty_set: &'a DirtySet,
    pub event_log: &'a EventLog,
    pub codec: &'a dyn Codec,
    pub max_message_size: usize,
    pub event_list_enabled: bool,
}

/// Position of an in-progress report.
#[derive(Debug, Clone)]
struct ResumptionCursor {
    expander: AttributePathExpander,
    /// Next unsent element of the list at the current path.
    list_index: usize,
    /// The ReplaceAll element of the current list was already sent.
    list_started: bool,
    attributes_done: bool,
    event_status_index: usize,
    events_done: bool,
}

impl ResumptionCursor {
    fn new(expander: AttributePathExpander) -> Self {
        Self {
            expander,
            list_index: 0,
            list_started: false,
            attributes_done: false,
            event_status_index: 0,
            events_done: false,
        }
    }

    fn advance<D: DataModel>(&mut self, data_model: &D) {
        self.expander.advance(data_model);
        self.list_index = 0;
        self.list_started = false;
    }
}

enum Emitted {
    Done,
    Full,
}

/// Outcome of a chunk acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkAck {
    SendNext,
    ReportComplete { priming: bool },
}

pub struct ReadHandler {
    interaction: InteractionType,
    state: HandlerState,
    session: SessionHandle,
    exchange: Option<ExchangeId>,
    attribute_paths: Arc<[AttributePathParams]>,
    event_paths: Arc<[EventPathParams]>,
    data_version_filters: Vec<DataVersionFilter>,
    /// Next event number this handler has to report.
    event_min: EventNumber,
    subscription: Option<Subscription>,
    cursor: Option<ResumptionCursor>,
    priming: bool,
    report_begin_generation: u64,
    /// Dirty generation at which the last completed report began.
    reported_generation: u64,
    /// Paths already carried by the current update report.
    reported: HashSet<ConcreteAttributePath>,
    final_chunk_sent: bool,
}

impl ReadHandler {
    pub fn new_read<D: DataModel>(
        session: SessionHandle,
        exchange: ExchangeId,
        request: ReadRequest,
        data_model: &D,
    ) -> Self {
        Self::new(
            InteractionType::Read,
            session,
            Some(exchange),
            request.attribute_requests,
            request.event_requests,
            request.data_version_filters,
            request.event_filter_min,
            None,
            data_model,
        )
    }

    pub fn new_subscription<D: DataModel>(
        session: SessionHandle,
        exchange: Option<ExchangeId>,
        request: SubscribeRequest,
        subscription_id: SubscriptionId,
        max_interval: u16,
        data_model: &D,
    ) -> Self {
        let subscription = Subscription {
            id: subscription_id,
            min_interval_floor: request.min_interval_floor,
            max_interval,
            scheduler: IntervalScheduler::new(request.min_interval_floor, max_interval),
            established: false,
        };
        Self::new(
            InteractionType::Subscribe,
            session,
            exchange,
            request.attribute_requests,
            request.event_requests,
            request.data_version_filters,
            request.event_filter_min,
            Some(subscription),
            data_model,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new<D: DataModel>(
        interaction: InteractionType,
        session: SessionHandle,
        exchange: Option<ExchangeId>,
        mut attribute_paths: Vec<AttributePathParams>,
        event_paths: Vec<EventPathParams>,
        data_version_filters: Vec<DataVersionFilter>,
        event_filter_min: Option<EventNumber>,
        subscription: Option<Subscription>,
        data_model: &D,
    ) -> Self {
        remove_duplicate_concrete_paths(&mut attribute_paths, data_model);
        Self {
            interaction,
            state: HandlerState::Idle,
            session,
            exchange,
            attribute_paths: attribute_paths.into(),
            event_paths: event_paths.into(),
            data_version_filters,
            event_min: event_filter_min.unwrap_or(0),
            subscription,
            cursor: None,
            priming: true,
            report_begin_generation: 0,
            reported_generation: 0,
            reported: HashSet::new(),
            final_chunk_sent: false,
        }
    }

    pub fn interaction(&self) -> InteractionType {
        self.interaction
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn set_session(&mut self, session: SessionHandle) {
        self.session = session;
    }

    pub fn peer(&self) -> ScopedNodeId {
        self.session.peer
    }

    pub fn exchange(&self) -> Option<ExchangeId> {
        self.exchange
    }

    pub fn set_exchange(&mut self, exchange: Option<ExchangeId>) {
        self.exchange = exchange;
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(|s| s.id)
    }

    pub fn attribute_paths(&self) -> &[AttributePathParams] {
        &self.attribute_paths
    }

    pub fn event_paths(&self) -> &[EventPathParams] {
        &self.event_paths
    }

    pub fn is_priming(&self) -> bool {
        self.priming
    }

    pub fn is_generating(&self) -> bool {
        self.cursor.is_some()
    }

    /// Oldest dirty generation this handler may still need.
    pub fn dirty_watermark(&self) -> Option<u64> {
        self.subscription.as_ref().map(|_| self.reported_generation)
    }

    /// Start a report: priming for reads and new subscriptions, an update
    /// report afterwards.
    pub fn begin_report<D: DataModel>(
        &mut self,
        data_model: &D,
        current_generation: u64,
        event_list_enabled: bool,
    ) {
        self.priming = self.subscription.as_ref().is_none_or(|s| !s.established);
        self.cursor = Some(ResumptionCursor::new(AttributePathExpander::new(
            self.attribute_paths.clone(),
            data_model,
            event_list_enabled,
        )));
        self.report_begin_generation = current_generation;
        if self.priming {
            self.reported_generation = current_generation;
        }
        self.reported.clear();
        self.final_chunk_sent = false;
        self.state = if self.priming {
            HandlerState::GeneratingInitialReport
        } else {
            HandlerState::GeneratingUpdateReport
        };
        if let Some(subscription) = &mut self.subscription {
            subscription.scheduler.report_started();
        }
        trace!(
            "Handler for {} begins {} report at generation {}",
            self.session.peer,
            if self.priming { "priming" } else { "update" },
            current_generation
        );
    }

    /// Build the next chunk of the report in progress.
    pub fn build_chunk<D: DataModel>(&mut self, ctx: &ReportContext<'_, D>) -> Result<ReportData> {
        let mut cursor = self
            .cursor
            .take()
            .ok_or(ImError::IncorrectState("no report in progress"))?;
        let result = self.fill_chunk(ctx, &mut cursor);
        self.cursor = Some(cursor);

        let report = result?;
        self.final_chunk_sent = !report.more_chunked_messages;
        self.state = HandlerState::AwaitingChunkAck;
        Ok(report)
    }

    /// The peer acknowledged the outstanding chunk.
    pub fn on_chunk_acked(&mut self, now: Duration) -> Result<ChunkAck> {
        if self.state != HandlerState::AwaitingChunkAck {
            return Err(ImError::IncorrectState("no chunk awaiting acknowledgement"));
        }
        if !self.final_chunk_sent {
            self.state = HandlerState::GeneratingNextChunk;
            return Ok(ChunkAck::SendNext);
        }

        let priming = self.priming;
        self.cursor = None;
        self.reported.clear();
        match &mut self.subscription {
            Some(subscription) => {
                subscription.scheduler.report_completed(now);
                subscription.established = true;
                self.reported_generation = self.report_begin_generation;
                self.priming = false;
                self.state = HandlerState::Active;
            }
            None => self.state = HandlerState::Terminal,
        }
        Ok(ChunkAck::ReportComplete { priming })
    }

    pub fn close(&mut self) {
        self.cursor = None;
        self.state = HandlerState::Terminal;
    }

    /// An attribute changed. Returns true when the subscription's schedule
    /// moved.
    pub fn on_attribute_dirty<D: DataModel>(
        &mut self,
        path: &AttributePathParams,
        data_model: &D,
        now: Duration,
    ) -> bool {
        if !self.attribute_paths.iter().any(|p| p.intersects(path)) {
            return false;
        }

        if let Some(cursor) = &mut self.cursor
            && let Some(current) = cursor.expander.get()
            && path.matches_cluster(current.endpoint_id, current.cluster_id)
        {
            debug!(
                "Cluster {}/0x{:04x} changed mid-report, restarting it",
                current.endpoint_id, current.cluster_id
            );
            cursor.expander.reset_current_cluster(data_model);
            cursor.list_index = 0;
            cursor.list_started = false;
            self.reported.retain(|p| p.cluster() != current.cluster());
        }

        match &mut self.subscription {
            Some(subscription) => subscription.scheduler.mark_dirty(now),
            None => false,
        }
    }

    /// An event was logged. Urgent matches make the subscription dirty.
    pub fn on_event_logged(&mut self, path: &ConcreteEventPath, now: Duration) -> bool {
        let Some(subscription) = &mut self.subscription else {
            return false;
        };
        if self
            .event_paths
            .iter()
            .any(|p| p.is_urgent && p.matches(path))
        {
            subscription.scheduler.mark_dirty(now)
        } else {
            false
        }
    }

    pub fn is_reportable(&self, now: Duration) -> bool {
        self.state == HandlerState::Active
            && self
                .subscription
                .as_ref()
                .is_some_and(|s| s.scheduler.is_reportable(now))
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        if self.state != HandlerState::Active {
            return None;
        }
        self.subscription.as_ref()?.scheduler.next_deadline()
    }

    fn fill_chunk<D: DataModel>(
        &mut self,
        ctx: &ReportContext<'_, D>,
        cursor: &mut ResumptionCursor,
    ) -> Result<ReportData> {
        let mut builder =
            ReportBuilder::new(ctx.codec, ctx.max_message_size, self.subscription_id())?;

        let mut full = false;
        if !cursor.attributes_done {
            full = self.fill_attributes(ctx, cursor, &mut builder)?;
        }
        if !full && !cursor.events_done {
            full = self.fill_events(ctx, cursor, &mut builder)?;
        }

        let suppress = !full && self.interaction == InteractionType::Read;
        Ok(builder.finish(full, suppress))
    }

    fn fill_attributes<D: DataModel>(
        &mut self,
        ctx: &ReportContext<'_, D>,
        cursor: &mut ResumptionCursor,
        builder: &mut ReportBuilder<'_>,
    ) -> Result<bool> {
        while let Some(path) = cursor.expander.get() {
            if let Emitted::Full = self.emit_attribute(ctx, cursor, builder, path)? {
                return Ok(true);
            }
            if !self.priming {
                self.reported.insert(path);
            }
            cursor.advance(ctx.data_model);
        }
        cursor.attributes_done = true;
        Ok(false)
    }

    fn emit_attribute<D: DataModel>(
        &self,
        ctx: &ReportContext<'_, D>,
        cursor: &mut ResumptionCursor,
        builder: &mut ReportBuilder<'_>,
        path: ConcreteAttributePath,
    ) -> Result<Emitted> {
        if !cursor.list_started {
            if self.priming {
                if self.filtered_by_data_version(ctx.data_model, &path) {
                    trace!("Skipping {}, data version unchanged", path);
                    return Ok(Emitted::Done);
                }
            } else if self.reported.contains(&path)
                || !ctx.dirty_set.is_dirty(&path, self.reported_generation)
            {
                return Ok(Emitted::Done);
            }
        }

        let value = match ctx.data_model.read_attribute(&path) {
            Ok(value) => value,
            Err(status) => return push_status(builder, path, status),
        };
        let data_version = ctx.data_model.data_version(path.endpoint_id, path.cluster_id);
        let data_path = ConcreteDataAttributePath::new(path, data_version);

        if let Some(index) = cursor.expander.current_list_index() {
            return match value.as_list() {
                None => push_status(builder, path, Status::InvalidDataType),
                Some(items) => match items.get(usize::from(index)) {
                    None => push_status(builder, path, Status::ConstraintError),
                    Some(item) => push_element(
                        builder,
                        path,
                        data_path.with_list_op(ListOperation::ReplaceItem(index)),
                        item.clone(),
                    ),
                },
            };
        }

        match value {
            Value::List(items) => emit_list(builder, cursor, path, data_path, &items),
            value => push_element(builder, path, data_path, value),
        }
    }

    /// Priming reports skip clusters the peer already holds at the current
    /// version. Conflicting filters for one cluster disable the skip.
    fn filtered_by_data_version<D: DataModel>(
        &self,
        data_model: &D,
        path: &ConcreteAttributePath,
    ) -> bool {
        let mut filters = self
            .data_version_filters
            .iter()
            .filter(|f| f.endpoint_id == path.endpoint_id && f.cluster_id == path.cluster_id);
        let Some(first) = filters.next() else {
            return false;
        };
        if filters.any(|f| f.data_version != first.data_version) {
            return false;
        }
        data_model.data_version(path.endpoint_id, path.cluster_id) == Some(first.data_version)
    }

    fn fill_events<D: DataModel>(
        &mut self,
        ctx: &ReportContext<'_, D>,
        cursor: &mut ResumptionCursor,
        builder: &mut ReportBuilder<'_>,
    ) -> Result<bool> {
        if self.priming {
            let invalid: Vec<EventStatusIB> = self
                .event_paths
                .iter()
                .filter_map(|p| match (p.endpoint_id, p.cluster_id, p.event_id) {
                    (Some(e), Some(c), Some(v)) => Some(ConcreteEventPath::new(e, c, v)),
                    _ => None,
                })
                .filter_map(|path| {
                    ctx.data_model
                        .check_event_path(&path)
                        .err()
                        .map(|status| EventStatusIB { path, status })
                })
                .collect();

            while let Some(status) = invalid.get(cursor.event_status_index) {
                if builder.try_push_event(EventReportIB::Status(*status))? {
                    cursor.event_status_index += 1;
                } else if builder.is_empty() {
                    return Err(ImError::BufferTooSmall(builder.remaining()));
                } else {
                    return Ok(true);
                }
            }
        }

        for event in ctx.event_log.events_since(self.event_min) {
            if !self
                .event_paths
                .iter()
                .any(|p| p.matches(&event.header.path))
            {
                continue;
            }
            if builder.try_push_event_data(event)? {
                self.event_min = event.event_number() + 1;
            } else if builder.is_empty() {
                warn!(
                    "Event #{} does not fit in an empty report, skipping",
                    event.event_number()
                );
                self.event_min = event.event_number() + 1;
            } else {
                return Ok(true);
            }
        }

        cursor.events_done = true;
        Ok(false)
    }
}

fn push_status(
    builder: &mut ReportBuilder<'_>,
    path: ConcreteAttributePath,
    status: Status,
) -> Result<Emitted> {
    if builder.try_push_status(path, status)? {
        Ok(Emitted::Done)
    } else if builder.is_empty() {
        Err(ImError::BufferTooSmall(builder.remaining()))
    } else {
        Ok(Emitted::Full)
    }
}

fn push_element(
    builder: &mut ReportBuilder<'_>,
    path: ConcreteAttributePath,
    data_path: ConcreteDataAttributePath,
    value: Value,
) -> Result<Emitted> {
    if builder.try_push_data(data_path, value)? {
        Ok(Emitted::Done)
    } else if builder.is_empty() {
        warn!("Attribute {} does not fit in an empty report", path);
        push_status(builder, path, Status::ResourceExhausted)
    } else {
        Ok(Emitted::Full)
    }
}

/// Send a list whole when it fits, otherwise as a ReplaceAll prefix followed
/// by one AppendItem element per remaining item across later chunks.
fn emit_list(
    builder: &mut ReportBuilder<'_>,
    cursor: &mut ResumptionCursor,
    path: ConcreteAttributePath,
    data_path: ConcreteDataAttributePath,
    items: &[Value],
) -> Result<Emitted> {
    if !cursor.list_started {
        let whole = data_path.with_list_op(ListOperation::ReplaceAll);
        if builder.try_push_data(whole, Value::List(items.to_vec()))? {
            return Ok(Emitted::Done);
        }
        if !builder.is_empty() {
            return Ok(Emitted::Full);
        }
        return match builder.push_partial_list(data_path, items)? {
            Some(count) if count == items.len() => Ok(Emitted::Done),
            Some(count) => {
                debug!(
                    "Splitting list {}: {} of {} items in first chunk",
                    path,
                    count,
                    items.len()
                );
                cursor.list_started = true;
                cursor.list_index = count;
                Ok(Emitted::Full)
            }
            None => push_status(builder, path, Status::ResourceExhausted),
        };
    }

    let append = data_path.with_list_op(ListOperation::AppendItem);
    while let Some(item) = items.get(cursor.list_index) {
        if builder.try_push_data(append, item.clone())? {
            cursor.list_index += 1;
        } else if builder.is_empty() {
            warn!(
                "Item {} of list {} does not fit in an empty report",
                cursor.list_index, path
            );
            return push_status(builder, path, Status::ResourceExhausted);
        } else {
            return Ok(Emitted::Full);
        }
    }
    Ok(Emitted::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::codec::JsonCodec;
    use crate::matter::events::{EventPriority, EventTimestamp};
    use crate::matter::ids::ScopedNodeId;
    use crate::matter::messages::{AttributeReportIB, Message};
    use crate::matter::metadata::{ClusterDescriptor, ClusterMetadata, EndpointDescriptor, NodeDescriptor};
    use crate::matter::data_model::MemoryDataModel;

    const CLUSTER: u32 = 0xFC00;
    const SCALAR: u32 = 0x0000;
    const LIST: u32 = 0x0001;

    fn data_model() -> MemoryDataModel {
        let node = NodeDescriptor::new().endpoint(
            EndpointDescriptor::new(1).cluster(
                ClusterDescriptor::new(CLUSTER, 1)
                    .attributes(&[SCALAR, LIST])
                    .events(&[0]),
            ),
        );
        let mut model = MemoryDataModel::new(node);
        let path = |a| ConcreteAttributePath::new(1, CLUSTER, a);
        model.set_attribute(path(SCALAR), 7u32).unwrap();
        let items: Vec<Value> = (0..6)
            .map(|i| Value::from(format!("{i}-{}", "x".repeat(60))))
            .collect();
        model.set_attribute(path(LIST), Value::List(items)).unwrap();
        model
    }

    fn session() -> SessionHandle {
        SessionHandle::new(1, ScopedNodeId::new(0x1122, 1))
    }

    fn read_handler(model: &MemoryDataModel, paths: Vec<AttributePathParams>) -> ReadHandler {
        let request = ReadRequest {
            attribute_requests: paths,
            ..Default::default()
        };
        ReadHandler::new_read(session(), ExchangeId(1), request, model)
    }

    fn subscription_handler(model: &MemoryDataModel) -> ReadHandler {
        let request = SubscribeRequest {
            min_interval_floor: 0,
            max_interval_ceiling: 60,
            attribute_requests: vec![AttributePathParams::new(Some(1), Some(CLUSTER), None)],
            event_requests: vec![EventPathParams::cluster(1, CLUSTER).urgent()],
            ..Default::default()
        };
        ReadHandler::new_subscription(session(), Some(ExchangeId(1)), request, 9, 60, model)
    }

    /// Build and acknowledge chunks until the report completes.
    fn run_report(
        handler: &mut ReadHandler,
        model: &MemoryDataModel,
        dirty_set: &DirtySet,
        event_log: &EventLog,
        max_message_size: usize,
    ) -> Vec<ReportData> {
        let codec = JsonCodec;
        let ctx = ReportContext {
            data_model: model,
            dirty_set,
            event_log,
            codec: &codec,
            max_message_size,
            event_list_enabled: true,
        };
        handler.begin_report(model, dirty_set.current_generation(), true);
        let mut chunks = Vec::new();
        loop {
            let chunk = handler.build_chunk(&ctx).unwrap();
            let encoded = codec.encode(&Message::ReportData(chunk.clone())).unwrap();
            assert!(encoded.len() <= max_message_size);
            let more = chunk.more_chunked_messages;
            chunks.push(chunk);
            if !more && handler.interaction() == InteractionType::Read {
                break;
            }
            if let ChunkAck::ReportComplete { .. } = handler.on_chunk_acked(Duration::ZERO).unwrap()
            {
                break;
            }
        }
        chunks
    }

    fn attribute_reports(chunks: &[ReportData]) -> Vec<&AttributeReportIB> {
        chunks.iter().flat_map(|c| c.attribute_reports.iter()).collect()
    }

    #[test]
    fn test_read_fits_in_one_chunk() {
        let model = data_model();
        let mut handler = read_handler(&model, vec![AttributePathParams::concrete(1, CLUSTER, SCALAR)]);
        let chunks = run_report(&mut handler, &model, &DirtySet::new(), &EventLog::new(4), 1200);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].suppress_response);
        assert!(!chunks[0].more_chunked_messages);
        assert_eq!(chunks[0].subscription_id, None);
        let AttributeReportIB::Data(data) = &chunks[0].attribute_reports[0] else {
            panic!("expected data");
        };
        assert_eq!(data.data, Value::Unsigned(7));
        assert_eq!(data.path.data_version, model.data_version(1, CLUSTER));
    }

    #[test]
    fn test_large_list_is_split_without_loss() {
        let model = data_model();
        let list_path = AttributePathParams::concrete(1, CLUSTER, LIST);
        let mut handler = read_handler(&model, vec![list_path]);
        let chunks = run_report(&mut handler, &model, &DirtySet::new(), &EventLog::new(4), 600);
        assert!(chunks.len() > 1);

        let mut received = Vec::new();
        for (i, report) in attribute_reports(&chunks).into_iter().enumerate() {
            let AttributeReportIB::Data(data) = report else {
                panic!("expected data");
            };
            if i == 0 {
                assert_eq!(data.path.list_op, ListOperation::ReplaceAll);
                received.extend(data.data.as_list().unwrap().iter().cloned());
            } else {
                assert_eq!(data.path.list_op, ListOperation::AppendItem);
                received.push(data.data.clone());
            }
        }

        let expected = model
            .attribute(&ConcreteAttributePath::new(1, CLUSTER, LIST))
            .unwrap();
        assert_eq!(received, expected.as_list().unwrap());
    }

    #[test]
    fn test_list_index_statuses() {
        let model = data_model();
        let paths = vec![
            AttributePathParams::concrete(1, CLUSTER, LIST).with_list_index(2),
            AttributePathParams::concrete(1, CLUSTER, LIST).with_list_index(10),
            AttributePathParams::concrete(1, CLUSTER, SCALAR).with_list_index(0),
        ];
        let mut handler = read_handler(&model, paths);
        let chunks = run_report(&mut handler, &model, &DirtySet::new(), &EventLog::new(4), 1200);
        let reports = attribute_reports(&chunks);

        let AttributeReportIB::Data(item) = reports[0] else {
            panic!("expected data");
        };
        assert_eq!(item.path.list_op, ListOperation::ReplaceItem(2));
        assert!(matches!(
            reports[1],
            AttributeReportIB::Status(s) if s.status == Status::ConstraintError
        ));
        assert!(matches!(
            reports[2],
            AttributeReportIB::Status(s) if s.status == Status::InvalidDataType
        ));
    }

    #[test]
    fn test_data_version_filter_skips_cluster() {
        let model = data_model();
        let version = model.data_version(1, CLUSTER).unwrap();
        let request = ReadRequest {
            attribute_requests: vec![AttributePathParams::new(Some(1), Some(CLUSTER), None)],
            data_version_filters: vec![DataVersionFilter::new(1, CLUSTER, version)],
            ..Default::default()
        };
        let mut handler = ReadHandler::new_read(session(), ExchangeId(1), request, &model);
        let chunks = run_report(&mut handler, &model, &DirtySet::new(), &EventLog::new(4), 1200);
        assert!(attribute_reports(&chunks).is_empty());

        // Filters that disagree with each other are ignored
        let request = ReadRequest {
            attribute_requests: vec![AttributePathParams::new(Some(1), Some(CLUSTER), None)],
            data_version_filters: vec![
                DataVersionFilter::new(1, CLUSTER, version),
                DataVersionFilter::new(1, CLUSTER, version.wrapping_add(5)),
            ],
            ..Default::default()
        };
        let mut handler = ReadHandler::new_read(session(), ExchangeId(1), request, &model);
        let chunks = run_report(&mut handler, &model, &DirtySet::new(), &EventLog::new(4), 4000);
        assert!(!attribute_reports(&chunks).is_empty());
    }

    #[test]
    fn test_update_report_carries_only_dirty_paths() {
        let mut model = data_model();
        let mut dirty_set = DirtySet::new();
        let event_log = EventLog::new(4);
        let mut handler = subscription_handler(&model);

        run_report(&mut handler, &model, &dirty_set, &event_log, 4000);
        assert_eq!(handler.state(), HandlerState::Active);

        let scalar = ConcreteAttributePath::new(1, CLUSTER, SCALAR);
        model.set_attribute(scalar, 8u32).unwrap();
        dirty_set.mark_dirty(scalar.into());
        dirty_set.mark_dirty(scalar.into());
        assert!(handler.on_attribute_dirty(&scalar.into(), &model, Duration::ZERO));
        assert!(handler.is_reportable(Duration::ZERO));

        let chunks = run_report(&mut handler, &model, &dirty_set, &event_log, 4000);
        let reports = attribute_reports(&chunks);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].path(), &scalar);
        assert_eq!(chunks[0].subscription_id, Some(9));
        assert!(!chunks[0].suppress_response);
    }

    #[test]
    fn test_keep_alive_report_is_empty() {
        let model = data_model();
        let dirty_set = DirtySet::new();
        let event_log = EventLog::new(4);
        let mut handler = subscription_handler(&model);
        run_report(&mut handler, &model, &dirty_set, &event_log, 4000);

        assert_eq!(handler.next_deadline(), Some(Duration::from_secs(60)));
        assert!(handler.is_reportable(Duration::from_secs(60)));
        let chunks = run_report(&mut handler, &model, &dirty_set, &event_log, 4000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn test_urgent_event_marks_dirty() {
        let model = data_model();
        let dirty_set = DirtySet::new();
        let mut event_log = EventLog::new(4);
        let mut handler = subscription_handler(&model);
        run_report(&mut handler, &model, &dirty_set, &event_log, 4000);

        let path = ConcreteEventPath::new(1, CLUSTER, 0);
        event_log.log(path, EventPriority::Info, EventTimestamp::SystemTime(5), Value::Null);
        assert!(handler.on_event_logged(&path, Duration::ZERO));

        let chunks = run_report(&mut handler, &model, &dirty_set, &event_log, 4000);
        let events: Vec<_> = chunks.iter().flat_map(|c| c.event_reports.iter()).collect();
        assert_eq!(events.len(), 1);
        assert!(attribute_reports(&chunks).is_empty());
    }

    #[test]
    fn test_invalid_concrete_event_path_status() {
        let model = data_model();
        let request = ReadRequest {
            event_requests: vec![EventPathParams::new(1, CLUSTER, 7)],
            ..Default::default()
        };
        let mut handler = ReadHandler::new_read(session(), ExchangeId(1), request, &model);
        let chunks = run_report(&mut handler, &model, &DirtySet::new(), &EventLog::new(4), 1200);
        assert_eq!(
            chunks[0].event_reports,
            vec![EventReportIB::Status(EventStatusIB {
                path: ConcreteEventPath::new(1, CLUSTER, 7),
                status: Status::UnsupportedEvent,
            })]
        );
    }

    #[test]
    fn test_dirty_mid_report_restarts_cluster() {
        let mut model = data_model();
        let dirty_set = DirtySet::new();
        let event_log = EventLog::new(4);
        let codec = JsonCodec;
        let mut handler = read_handler(&model, vec![AttributePathParams::concrete(1, CLUSTER, LIST)]);

        handler.begin_report(&model, 0, true);
        let first = {
            let ctx = ReportContext {
                data_model: &model,
                dirty_set: &dirty_set,
                event_log: &event_log,
                codec: &codec,
                max_message_size: 600,
                event_list_enabled: true,
            };
            handler.build_chunk(&ctx).unwrap()
        };
        assert!(first.more_chunked_messages);
        handler.on_chunk_acked(Duration::ZERO).unwrap();

        let list = ConcreteAttributePath::new(1, CLUSTER, LIST);
        model.set_attribute(list, Value::List(vec![Value::from("short")])).unwrap();
        handler.on_attribute_dirty(&list.into(), &model, Duration::ZERO);

        let ctx = ReportContext {
            data_model: &model,
            dirty_set: &dirty_set,
            event_log: &event_log,
            codec: &codec,
            max_message_size: 600,
            event_list_enabled: true,
        };
        let second = handler.build_chunk(&ctx).unwrap();
        let AttributeReportIB::Data(data) = &second.attribute_reports[0] else {
            panic!("expected data");
        };
        assert_eq!(data.path.list_op, ListOperation::ReplaceAll);
        assert_eq!(data.data, Value::List(vec![Value::from("short")]));
        assert!(!second.more_chunked_messages);
    }
}
