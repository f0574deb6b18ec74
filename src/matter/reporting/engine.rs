//! Server-side reporting engine.
//!
//! The engine owns every read handler, the dirty set and the event log. It
//! is driven from a single event loop: incoming messages, timer expiry and
//! data changes all enter through `&mut self`, and the transport is passed
//! in per call. After any call the loop asks [`Engine::next_deadline`] when
//! to fire [`Engine::on_timer`] next.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use strum::Display;

use super::super::backoff::resumption_retry_delay;
use super::super::codec::Codec;
use super::super::data_model::DataModel;
use super::super::events::{ConcreteEventPath, EventLog, EventPriority, EventTimestamp};
use super::super::icd;
use super::super::ids::{EventNumber, FabricIndex, SubscriptionId};
use super::super::messages::{
    Message, ReadRequest, StatusResponse, SubscribeRequest, SubscribeResponse,
};
use super::super::path::AttributePathParams;
use super::super::pool::{Handle, Pool};
use super::super::status::Status;
use super::super::subscription_persistence::{
    PendingResumption, PersistedSubscription, SubscriptionStore,
};
use super::super::transport::{ExchangeId, SessionHandle, Transport};
use super::super::value::Value;
use super::dirty::DirtySet;
use super::read_handler::{ChunkAck, HandlerState, InteractionType, ReadHandler, ReportContext};
use crate::config::{Config, EngineConfig, IcdConfig};
use crate::error::{ImError, Result};

pub type HandlerHandle = Handle<ReadHandler>;

/// Why a handler was destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum TeardownReason {
    /// A read finished its last chunk.
    Complete,
    /// The peer answered a report with a failure status.
    PeerRejected(Status),
    /// No acknowledgement arrived on the exchange.
    Timeout,
    SessionDefunct,
    FabricRemoved,
    /// A new subscription from the same peer without keep_subscriptions.
    Replaced,
    /// Local shutdown request.
    Shutdown,
    ProtocolError,
}

impl TeardownReason {
    /// Whether the persisted copy of the subscription goes too.
    fn forgets_subscription(self) -> bool {
        matches!(
            self,
            TeardownReason::PeerRejected(_)
                | TeardownReason::FabricRemoved
                | TeardownReason::Replaced
                | TeardownReason::Shutdown
        )
    }
}

pub struct Engine<D: DataModel> {
    config: EngineConfig,
    icd: IcdConfig,
    data_model: D,
    codec: Box<dyn Codec>,
    handlers: Pool<ReadHandler>,
    dirty_set: DirtySet,
    event_log: EventLog,
    /// Report chunks sent and not yet acknowledged.
    reports_in_flight: usize,
    store: Option<Arc<SubscriptionStore>>,
    resumptions: Vec<PendingResumption>,
}

impl<D: DataModel> Engine<D> {
    pub fn new(config: &Config, data_model: D, codec: Box<dyn Codec>) -> Self {
        let engine = config.engine.clone();
        Self {
            handlers: Pool::with_capacity(engine.max_read_handlers + engine.max_subscriptions),
            event_log: EventLog::new(engine.event_log_capacity),
            icd: config.icd.clone(),
            config: engine,
            data_model,
            codec,
            dirty_set: DirtySet::new(),
            reports_in_flight: 0,
            store: None,
            resumptions: Vec::new(),
        }
    }

    /// Persist established subscriptions and schedule resumption of the
    /// ones already stored.
    pub fn with_subscription_store(mut self, store: Arc<SubscriptionStore>, now: Duration) -> Self {
        self.resumptions = store
            .get_all()
            .into_iter()
            .map(|s| PendingResumption::new(s, now))
            .collect();
        if !self.resumptions.is_empty() {
            info!(
                "{} persisted subscription(s) pending resumption",
                self.resumptions.len()
            );
        }
        self.store = Some(store);
        self
    }

    pub fn data_model(&self) -> &D {
        &self.data_model
    }

    /// Mutable access for business logic. Changes must be announced with
    /// [`Engine::set_dirty`].
    pub fn data_model_mut(&mut self) -> &mut D {
        &mut self.data_model
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn dirty_set(&self) -> &DirtySet {
        &self.dirty_set
    }

    pub fn reports_in_flight(&self) -> usize {
        self.reports_in_flight
    }

    pub fn handler(&self, handle: HandlerHandle) -> Option<&ReadHandler> {
        self.handlers.get(handle)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn read_handler_count(&self) -> usize {
        self.count(InteractionType::Read)
    }

    pub fn subscription_count(&self) -> usize {
        self.count(InteractionType::Subscribe)
    }

    pub fn pending_resumptions(&self) -> &[PendingResumption] {
        &self.resumptions
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = (HandlerHandle, &ReadHandler)> {
        self.handlers
            .iter()
            .filter(|(_, h)| h.interaction() == InteractionType::Subscribe)
    }

    pub fn find_subscription(&self, subscription_id: SubscriptionId) -> Option<HandlerHandle> {
        self.handlers
            .find(|h| h.subscription_id() == Some(subscription_id))
    }

    fn count(&self, interaction: InteractionType) -> usize {
        self.handlers
            .iter()
            .filter(|(_, h)| h.interaction() == interaction)
            .count()
    }

    /// Handle one incoming Interaction Model message.
    pub fn on_message(
        &mut self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        session: &SessionHandle,
        payload: &[u8],
        now: Duration,
    ) -> Result<()> {
        let message = match self.codec.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("[IM] Undecodable message on {}: {}", exchange, e);
                self.reject(transport, exchange, session, Status::InvalidAction);
                if let Some(handle) = self.handlers.find(|h| h.exchange() == Some(exchange)) {
                    self.destroy(transport, handle, TeardownReason::ProtocolError);
                }
                return Err(e);
            }
        };
        trace!("[IM] {} on {} from {}", message.kind(), exchange, session.peer);

        match message {
            Message::ReadRequest(request) => {
                self.on_read_request(transport, exchange, session, request, now)
            }
            Message::SubscribeRequest(request) => {
                self.on_subscribe_request(transport, exchange, session, request, now)
            }
            Message::StatusResponse(StatusResponse { status }) => {
                self.on_status_response(transport, exchange, status, now)
            }
            other => {
                warn!("[IM] Unexpected {} on {}", other.kind(), exchange);
                self.reject(transport, exchange, session, Status::InvalidAction);
                Err(ImError::ProtocolViolation(format!(
                    "unexpected {}",
                    other.kind()
                )))
            }
        }
    }

    fn on_read_request(
        &mut self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        session: &SessionHandle,
        request: ReadRequest,
        now: Duration,
    ) -> Result<()> {
        if !request.attribute_requests.iter().all(AttributePathParams::is_valid) {
            self.reject(transport, exchange, session, Status::InvalidAction);
            return Err(ImError::InvalidArgument(
                "list index requires a concrete attribute".into(),
            ));
        }
        if self.read_handler_count() >= self.config.max_read_handlers {
            warn!("[IM] Read from {} rejected, no free read handler", session.peer);
            self.reject(transport, exchange, session, Status::ResourceExhausted);
            return Err(ImError::ResourceExhausted("read handlers"));
        }

        debug!(
            "[IM] Read from {}: {} attribute path(s), {} event path(s)",
            session.peer,
            request.attribute_requests.len(),
            request.event_requests.len()
        );
        let handler = ReadHandler::new_read(*session, exchange, request, &self.data_model);
        let handle = self.handlers.insert(handler)?;
        self.start_report(transport, handle, now)
    }

    fn on_subscribe_request(
        &mut self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        session: &SessionHandle,
        request: SubscribeRequest,
        now: Duration,
    ) -> Result<()> {
        if request.attribute_requests.is_empty() && request.event_requests.is_empty() {
            self.reject(transport, exchange, session, Status::InvalidAction);
            return Err(ImError::InvalidArgument("subscribe request without paths".into()));
        }
        if !request.attribute_requests.iter().all(AttributePathParams::is_valid) {
            self.reject(transport, exchange, session, Status::InvalidAction);
            return Err(ImError::InvalidArgument(
                "list index requires a concrete attribute".into(),
            ));
        }
        if request.min_interval_floor > request.max_interval_ceiling {
            self.reject(transport, exchange, session, Status::InvalidAction);
            return Err(ImError::InvalidArgument(format!(
                "min interval {} exceeds max interval {}",
                request.min_interval_floor, request.max_interval_ceiling
            )));
        }

        if !request.keep_subscriptions {
            let peer = session.peer;
            for handle in self
                .handlers
                .find_all(|h| h.interaction() == InteractionType::Subscribe && h.peer() == peer)
            {
                self.destroy(transport, handle, TeardownReason::Replaced);
            }
            self.resumptions.retain(|r| r.subscription.peer() != peer);
        }

        if self.subscription_count() >= self.config.max_subscriptions {
            warn!(
                "[IM] Subscribe from {} rejected, subscription limit reached",
                session.peer
            );
            self.reject(transport, exchange, session, Status::ResourceExhausted);
            return Err(ImError::ResourceExhausted("subscriptions"));
        }

        let max_interval = icd::max_interval_for(
            &self.icd,
            request.min_interval_floor,
            request.max_interval_ceiling,
        );
        let subscription_id = self.allocate_subscription_id();
        info!(
            "[IM] Subscribe from {}: id 0x{:08x}, interval {}..{}s",
            session.peer, subscription_id, request.min_interval_floor, max_interval
        );

        let handler = ReadHandler::new_subscription(
            *session,
            Some(exchange),
            request,
            subscription_id,
            max_interval,
            &self.data_model,
        );
        let handle = self.handlers.insert(handler)?;
        self.start_report(transport, handle, now)
    }

    fn on_status_response(
        &mut self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        status: Status,
        now: Duration,
    ) -> Result<()> {
        let Some(handle) = self.handlers.find(|h| h.exchange() == Some(exchange)) else {
            debug!("[IM] StatusResponse on unknown exchange {}", exchange);
            return Ok(());
        };

        if !status.is_success() {
            info!("[IM] Peer answered report on {} with {}", exchange, status);
            self.destroy(transport, handle, TeardownReason::PeerRejected(status));
            return Ok(());
        }

        let handler = self.handlers.get_mut(handle).ok_or(ImError::StaleHandle)?;
        if handler.state() != HandlerState::AwaitingChunkAck {
            warn!("[IM] Unsolicited StatusResponse on {}", exchange);
            return Err(ImError::ProtocolViolation("unsolicited status response".into()));
        }
        self.reports_in_flight = self.reports_in_flight.saturating_sub(1);

        match handler.on_chunk_acked(now)? {
            ChunkAck::SendNext => self.send_next_chunk(transport, handle),
            ChunkAck::ReportComplete { priming } => {
                let session = *handler.session();
                handler.set_exchange(None);
                if priming {
                    self.complete_priming(transport, handle, exchange, &session)?;
                }
                transport.close_exchange(exchange);
                self.collect_garbage();
                Ok(())
            }
        }
    }

    fn complete_priming(
        &mut self,
        transport: &mut dyn Transport,
        handle: HandlerHandle,
        exchange: ExchangeId,
        session: &SessionHandle,
    ) -> Result<()> {
        let handler = self.handlers.get(handle).ok_or(ImError::StaleHandle)?;
        let Some(subscription) = handler.subscription() else {
            return Ok(());
        };
        let response = Message::SubscribeResponse(SubscribeResponse {
            subscription_id: subscription.id,
            max_interval: subscription.max_interval,
        });
        info!(
            "[IM] Subscription 0x{:08x} established with {} (max interval {}s)",
            subscription.id, session.peer, subscription.max_interval
        );

        if let Some(store) = &self.store {
            store.add(PersistedSubscription {
                fabric_idx: session.peer.fabric_index,
                peer_node_id: session.peer.node_id,
                subscription_id: subscription.id,
                min_int_secs: subscription.min_interval_floor,
                max_int_secs: subscription.max_interval,
                attribute_paths: handler.attribute_paths().to_vec(),
                event_paths: handler.event_paths().to_vec(),
            });
        }

        if let Err(e) = self.send_message(transport, exchange, session, &response) {
            warn!("[IM] Failed to send SubscribeResponse: {}", e);
            self.destroy(transport, handle, TeardownReason::SessionDefunct);
            return Err(e);
        }
        Ok(())
    }

    /// The transport gave up waiting for an acknowledgement.
    pub fn on_response_timeout(&mut self, transport: &mut dyn Transport, exchange: ExchangeId) {
        if let Some(handle) = self.handlers.find(|h| h.exchange() == Some(exchange)) {
            warn!("[IM] Report on {} timed out", exchange);
            self.destroy(transport, handle, TeardownReason::Timeout);
        }
    }

    pub fn on_session_defunct(&mut self, transport: &mut dyn Transport, session: &SessionHandle) {
        for handle in self.handlers.find_all(|h| h.session() == session) {
            self.destroy(transport, handle, TeardownReason::SessionDefunct);
        }
    }

    pub fn on_fabric_removed(&mut self, transport: &mut dyn Transport, fabric_index: FabricIndex) {
        for handle in self
            .handlers
            .find_all(|h| h.peer().fabric_index == fabric_index)
        {
            self.destroy(transport, handle, TeardownReason::FabricRemoved);
        }
        self.resumptions
            .retain(|r| r.subscription.fabric_idx != fabric_index);
        if let Some(store) = &self.store {
            store.remove_fabric(fabric_index);
        }
    }

    pub fn shutdown_subscription(
        &mut self,
        transport: &mut dyn Transport,
        subscription_id: SubscriptionId,
    ) -> Result<()> {
        let handle = self
            .find_subscription(subscription_id)
            .ok_or(ImError::InvalidSubscription(subscription_id))?;
        self.destroy(transport, handle, TeardownReason::Shutdown);
        Ok(())
    }

    /// Announce an attribute change.
    pub fn set_dirty(&mut self, path: AttributePathParams, now: Duration) {
        let generation = self.dirty_set.mark_dirty(path);
        trace!("[IM] {} dirty at generation {}", path, generation);
        for (_, handler) in self.handlers.iter_mut() {
            handler.on_attribute_dirty(&path, &self.data_model, now);
        }
    }

    /// Record an event. Urgent subscribers are scheduled right away; the
    /// rest pick the event up with their next report.
    pub fn log_event(
        &mut self,
        path: ConcreteEventPath,
        priority: EventPriority,
        timestamp: EventTimestamp,
        data: Value,
        now: Duration,
    ) -> EventNumber {
        let event_number = self.event_log.log(path, priority, timestamp, data);
        for (_, handler) in self.handlers.iter_mut() {
            handler.on_event_logged(&path, now);
        }
        event_number
    }

    /// Run due work: resumption attempts and subscription reports.
    pub fn on_timer(&mut self, transport: &mut dyn Transport, now: Duration) {
        self.resume_subscriptions(transport, now);

        let due: Vec<HandlerHandle> = self
            .handlers
            .iter()
            .filter(|(_, h)| h.is_reportable(now))
            .map(|(handle, _)| handle)
            .collect();
        for handle in due {
            if self.reports_in_flight >= self.config.max_reports_in_flight {
                debug!(
                    "[IM] {} reports in flight, deferring the rest",
                    self.reports_in_flight
                );
                break;
            }
            if let Err(e) = self.start_report(transport, handle, now) {
                warn!("[IM] Report for {:?} failed: {}", handle, e);
            }
        }
    }

    /// Earliest time [`Engine::on_timer`] has work to do.
    pub fn next_deadline(&self) -> Option<Duration> {
        let reports = if self.reports_in_flight < self.config.max_reports_in_flight {
            self.handlers
                .iter()
                .filter_map(|(_, h)| h.next_deadline())
                .min()
        } else {
            None
        };
        let resumptions = self.resumptions.iter().map(|r| r.next_attempt).min();
        reports.into_iter().chain(resumptions).min()
    }

    fn start_report(
        &mut self,
        transport: &mut dyn Transport,
        handle: HandlerHandle,
        _now: Duration,
    ) -> Result<()> {
        let generation = self.dirty_set.current_generation();
        let handler = self.handlers.get_mut(handle).ok_or(ImError::StaleHandle)?;
        handler.begin_report(&self.data_model, generation, self.config.event_list_enabled);
        self.send_next_chunk(transport, handle)
    }

    fn send_next_chunk(&mut self, transport: &mut dyn Transport, handle: HandlerHandle) -> Result<()> {
        let handler = self.handlers.get_mut(handle).ok_or(ImError::StaleHandle)?;
        let session = *handler.session();
        if !transport.is_session_active(&session) {
            info!("[IM] Session to {} is defunct, dropping handler", session.peer);
            handler.close();
            self.destroy(transport, handle, TeardownReason::SessionDefunct);
            return Ok(());
        }

        let exchange = match handler.exchange() {
            Some(exchange) => exchange,
            None => match transport.new_exchange(&session) {
                Ok(exchange) => {
                    handler.set_exchange(Some(exchange));
                    exchange
                }
                Err(e) => {
                    handler.close();
                    self.destroy(transport, handle, TeardownReason::SessionDefunct);
                    return Err(e);
                }
            },
        };

        let ctx = ReportContext {
            data_model: &self.data_model,
            dirty_set: &self.dirty_set,
            event_log: &self.event_log,
            codec: self.codec.as_ref(),
            max_message_size: self.config.max_message_size,
            event_list_enabled: self.config.event_list_enabled,
        };
        let report = match handler.build_chunk(&ctx) {
            Ok(report) => report,
            Err(e) => {
                error!("[IM] Failed to build report chunk: {}", e);
                handler.close();
                self.reject(transport, exchange, &session, e.status());
                self.destroy(transport, handle, TeardownReason::ProtocolError);
                return Err(e);
            }
        };

        let suppress = report.suppress_response;
        debug!(
            "[IM] ReportData to {} on {}: {} attribute(s), {} event(s), more={}",
            session.peer,
            exchange,
            report.attribute_reports.len(),
            report.event_reports.len(),
            report.more_chunked_messages
        );
        if let Err(e) = self.send_message(transport, exchange, &session, &Message::ReportData(report))
        {
            warn!("[IM] Failed to send report to {}: {}", session.peer, e);
            if let Some(handler) = self.handlers.get_mut(handle) {
                handler.close();
            }
            self.destroy(transport, handle, TeardownReason::SessionDefunct);
            return Err(e);
        }

        if suppress {
            if let Some(handler) = self.handlers.get_mut(handle) {
                handler.close();
            }
            self.destroy(transport, handle, TeardownReason::Complete);
        } else {
            self.reports_in_flight += 1;
        }
        Ok(())
    }

    /// Try every persisted subscription whose retry time has come.
    pub fn resume_subscriptions(&mut self, transport: &mut dyn Transport, now: Duration) {
        if self.resumptions.is_empty() {
            return;
        }
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.resumptions)
            .into_iter()
            .partition(|r| r.next_attempt <= now);
        self.resumptions = waiting;

        for mut pending in due {
            match self.resume_subscription(transport, &pending.subscription, now) {
                Ok(()) => info!(
                    "[IM] Resumed subscription 0x{:08x} with {}",
                    pending.subscription.subscription_id,
                    pending.subscription.peer()
                ),
                Err(e) => {
                    pending.attempts += 1;
                    let delay = resumption_retry_delay(pending.attempts);
                    pending.next_attempt = now + delay;
                    info!(
                        "[IM] Resuming 0x{:08x} failed ({}), retry {} in {}s",
                        pending.subscription.subscription_id,
                        e,
                        pending.attempts,
                        delay.as_secs()
                    );
                    self.resumptions.push(pending);
                }
            }
        }
    }

    fn resume_subscription(
        &mut self,
        transport: &mut dyn Transport,
        persisted: &PersistedSubscription,
        now: Duration,
    ) -> Result<()> {
        if self.subscription_count() >= self.config.max_subscriptions {
            return Err(ImError::ResourceExhausted("subscriptions"));
        }
        let session = transport
            .session_for_peer(&persisted.peer())
            .ok_or(ImError::SessionInvalidated)?;

        let request = SubscribeRequest {
            keep_subscriptions: true,
            min_interval_floor: persisted.min_int_secs,
            max_interval_ceiling: persisted.max_int_secs,
            attribute_requests: persisted.attribute_paths.clone(),
            event_requests: persisted.event_paths.clone(),
            ..Default::default()
        };
        let handler = ReadHandler::new_subscription(
            session,
            None,
            request,
            persisted.subscription_id,
            persisted.max_int_secs,
            &self.data_model,
        );
        let handle = self.handlers.insert(handler)?;
        self.start_report(transport, handle, now)
    }

    fn allocate_subscription_id(&self) -> SubscriptionId {
        loop {
            let id = rand::random::<SubscriptionId>();
            if id != 0 && self.find_subscription(id).is_none() {
                return id;
            }
        }
    }

    fn destroy(
        &mut self,
        transport: &mut dyn Transport,
        handle: HandlerHandle,
        reason: TeardownReason,
    ) -> Option<ReadHandler> {
        let handler = self.handlers.remove(handle)?;
        if handler.state() == HandlerState::AwaitingChunkAck {
            self.reports_in_flight = self.reports_in_flight.saturating_sub(1);
        }
        if let Some(exchange) = handler.exchange() {
            transport.close_exchange(exchange);
        }

        match handler.subscription_id() {
            Some(id) => {
                info!(
                    "[IM] Subscription 0x{:08x} with {} ended: {}",
                    id,
                    handler.peer(),
                    reason
                );
                if reason.forgets_subscription()
                    && let Some(store) = &self.store
                {
                    store.remove(id);
                }
            }
            None => debug!("[IM] Read for {} ended: {}", handler.peer(), reason),
        }
        self.collect_garbage();
        Some(handler)
    }

    fn collect_garbage(&mut self) {
        let watermark = self
            .handlers
            .iter()
            .filter_map(|(_, h)| h.dirty_watermark())
            .min();
        match watermark {
            Some(generation) => self.dirty_set.garbage_collect(generation),
            None => {
                let dropped = self.dirty_set.drain();
                trace!("Dropped {} dirty path(s), no subscription left", dropped.len());
            }
        }
    }

    fn reject(
        &self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        session: &SessionHandle,
        status: Status,
    ) {
        if let Err(e) = self.send_message(transport, exchange, session, &Message::status(status)) {
            debug!("[IM] Could not send {} status: {}", status, e);
        }
    }

    fn send_message(
        &self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        session: &SessionHandle,
        message: &Message,
    ) -> Result<()> {
        let payload = self.codec.encode(message)?;
        transport.send(exchange, session, payload)
    }
}
