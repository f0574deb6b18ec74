//! Client side of one read or subscribe transaction.
//!
//! A [`ReadClient`] sends the request, consumes report chunks in arrival
//! order, acknowledges them and hands reassembled records to its callback.
//! Subscriptions then watch for liveness: a report must arrive within the
//! negotiated max interval plus a grace margin, otherwise the client fails
//! and, when enabled, schedules a resubscription.

use std::time::Duration;

use log::{debug, info, trace, warn};
use strum::Display;

use super::super::backoff::resubscribe_wait;
use super::super::codec::Codec;
use super::super::events::EventPathParams;
use super::super::ids::{EventNumber, ScopedNodeId, SubscriptionId};
use super::super::messages::{
    EventReportIB, Message, ReadRequest, ReportData, SubscribeRequest, SubscribeResponse,
};
use super::super::path::{AttributePathParams, DataVersionFilter};
use super::super::status::Status;
use super::super::transport::{ExchangeId, SessionHandle, Transport};
use super::callback::ReadClientCallback;
use super::reassembly::ReportAssembler;
use crate::config::ClientConfig;
use crate::error::{ImError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ClientInteraction {
    Read,
    Subscribe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ClientState {
    Idle,
    AwaitingInitialReport,
    ReceivingChunk,
    AwaitingSubscribeResponse,
    SubscriptionActive,
    /// Waiting for the resubscribe timer after a failure.
    Resubscribing,
    Terminal,
}

/// Everything one request needs.
#[derive(Debug, Clone)]
pub struct ReadPrepareParams {
    pub session: SessionHandle,
    pub attribute_paths: Vec<AttributePathParams>,
    pub event_paths: Vec<EventPathParams>,
    pub data_version_filters: Vec<DataVersionFilter>,
    /// Explicit event floor. Overrides what the callback already holds.
    pub event_number_min: Option<EventNumber>,
    pub min_interval_floor: u16,
    pub max_interval_ceiling: u16,
    pub keep_subscriptions: bool,
}

impl ReadPrepareParams {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            attribute_paths: Vec::new(),
            event_paths: Vec::new(),
            data_version_filters: Vec::new(),
            event_number_min: None,
            min_interval_floor: 0,
            max_interval_ceiling: 60,
            keep_subscriptions: false,
        }
    }

    pub fn attributes(mut self, paths: impl IntoIterator<Item = AttributePathParams>) -> Self {
        self.attribute_paths.extend(paths);
        self
    }

    pub fn events(mut self, paths: impl IntoIterator<Item = EventPathParams>) -> Self {
        self.event_paths.extend(paths);
        self
    }

    pub fn intervals(mut self, min_interval_floor: u16, max_interval_ceiling: u16) -> Self {
        self.min_interval_floor = min_interval_floor;
        self.max_interval_ceiling = max_interval_ceiling;
        self
    }

    fn validate(&self, interaction: ClientInteraction) -> Result<()> {
        if !self.attribute_paths.iter().all(AttributePathParams::is_valid) {
            return Err(ImError::InvalidArgument(
                "list index requires a concrete attribute".into(),
            ));
        }
        if interaction == ClientInteraction::Subscribe {
            if self.attribute_paths.is_empty() && self.event_paths.is_empty() {
                return Err(ImError::InvalidArgument("subscription without paths".into()));
            }
            if self.min_interval_floor > self.max_interval_ceiling {
                return Err(ImError::InvalidArgument(format!(
                    "min interval {} exceeds max interval {}",
                    self.min_interval_floor, self.max_interval_ceiling
                )));
            }
        }
        Ok(())
    }
}

pub struct ReadClient {
    interaction: ClientInteraction,
    state: ClientState,
    params: Option<ReadPrepareParams>,
    exchange: Option<ExchangeId>,
    subscription_id: Option<SubscriptionId>,
    max_interval: u16,
    liveness_deadline: Option<Duration>,
    resubscribe_at: Option<Duration>,
    resubscribe_attempts: u32,
    liveness_grace: Duration,
    auto_resubscribe: bool,
    last_event_number: Option<EventNumber>,
    assembler: ReportAssembler,
    report_open: bool,
}

impl ReadClient {
    pub fn new(interaction: ClientInteraction, config: &ClientConfig) -> Self {
        Self {
            interaction,
            state: ClientState::Idle,
            params: None,
            exchange: None,
            subscription_id: None,
            max_interval: 0,
            liveness_deadline: None,
            resubscribe_at: None,
            resubscribe_attempts: 0,
            liveness_grace: Duration::from_millis(config.liveness_grace_ms),
            auto_resubscribe: config.auto_resubscribe,
            last_event_number: None,
            assembler: ReportAssembler::new(),
            report_open: false,
        }
    }

    pub fn interaction(&self) -> ClientInteraction {
        self.interaction
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn exchange(&self) -> Option<ExchangeId> {
        self.exchange
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.params.as_ref().map(|p| &p.session)
    }

    pub fn peer(&self) -> Option<ScopedNodeId> {
        self.session().map(|s| s.peer)
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription_id
    }

    /// Max interval the server granted, in seconds.
    pub fn max_interval(&self) -> u16 {
        self.max_interval
    }

    pub fn liveness_deadline(&self) -> Option<Duration> {
        self.liveness_deadline
    }

    pub fn resubscribe_attempts(&self) -> u32 {
        self.resubscribe_attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ClientState::Terminal
    }

    pub fn is_subscription_active(&self) -> bool {
        self.state == ClientState::SubscriptionActive
    }

    /// Whether a report for `subscription_id` from `peer` belongs here.
    pub fn owns_subscription(&self, peer: ScopedNodeId, subscription_id: SubscriptionId) -> bool {
        self.subscription_id == Some(subscription_id) && self.peer() == Some(peer)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        match self.state {
            ClientState::Resubscribing => self.resubscribe_at,
            ClientState::SubscriptionActive => self.liveness_deadline,
            _ => None,
        }
    }

    /// Send the request and leave Idle.
    pub fn send_request(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn Codec,
        params: ReadPrepareParams,
        callback: &mut dyn ReadClientCallback,
    ) -> Result<()> {
        if self.state != ClientState::Idle {
            return Err(ImError::IncorrectState("request already sent"));
        }
        params.validate(self.interaction)?;
        self.params = Some(params);
        self.transmit(transport, codec, callback)
    }

    fn transmit(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn Codec,
        callback: &mut dyn ReadClientCallback,
    ) -> Result<()> {
        let params = self
            .params
            .as_ref()
            .ok_or(ImError::IncorrectState("no request parameters"))?;

        callback.on_request_prepared(&params.attribute_paths);
        let event_filter_min = params
            .event_number_min
            .or_else(|| callback.highest_received_event_number().map(|n| n + 1));
        let mut data_version_filters = params.data_version_filters.clone();
        if data_version_filters.is_empty() {
            data_version_filters = callback.data_version_filters(&params.attribute_paths);
        }

        let message = match self.interaction {
            ClientInteraction::Read => Message::ReadRequest(ReadRequest {
                attribute_requests: params.attribute_paths.clone(),
                event_requests: params.event_paths.clone(),
                data_version_filters,
                event_filter_min,
            }),
            ClientInteraction::Subscribe => Message::SubscribeRequest(SubscribeRequest {
                keep_subscriptions: params.keep_subscriptions,
                min_interval_floor: params.min_interval_floor,
                max_interval_ceiling: params.max_interval_ceiling,
                attribute_requests: params.attribute_paths.clone(),
                event_requests: params.event_paths.clone(),
                data_version_filters,
                event_filter_min,
            }),
        };
        let session = params.session;

        let exchange = transport.new_exchange(&session)?;
        let payload = codec.encode(&message)?;
        debug!(
            "[IM] {} to {} on {} ({} bytes)",
            message.kind(),
            session.peer,
            exchange,
            payload.len()
        );
        if let Err(e) = transport.send(exchange, &session, payload) {
            transport.close_exchange(exchange);
            return Err(e);
        }

        self.exchange = Some(exchange);
        self.subscription_id = None;
        self.liveness_deadline = None;
        self.resubscribe_at = None;
        self.assembler.reset();
        self.report_open = false;
        self.state = ClientState::AwaitingInitialReport;
        Ok(())
    }

    /// Handle a message routed to this client. Failures are delivered to
    /// the callback; the returned error is informational.
    pub fn on_message(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn Codec,
        exchange: ExchangeId,
        message: Message,
        now: Duration,
        callback: &mut dyn ReadClientCallback,
    ) -> Result<()> {
        if matches!(self.state, ClientState::Terminal | ClientState::Resubscribing) {
            debug!("[IM] Ignoring {} in state {}", message.kind(), self.state);
            return Ok(());
        }
        self.exchange = Some(exchange);

        let result = match message {
            Message::ReportData(report) => {
                self.process_report(transport, codec, exchange, report, now, callback)
            }
            Message::SubscribeResponse(response) => {
                self.process_subscribe_response(transport, exchange, response, now, callback)
            }
            Message::StatusResponse(response) if !response.status.is_success() => {
                Err(ImError::StatusReport(response.status))
            }
            other => Err(ImError::ProtocolViolation(format!(
                "unexpected {} in state {}",
                other.kind(),
                self.state
            ))),
        };

        if let Err(e) = &result {
            self.fail(transport, e, now, callback);
        }
        result
    }

    fn process_report(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn Codec,
        exchange: ExchangeId,
        report: ReportData,
        now: Duration,
        callback: &mut dyn ReadClientCallback,
    ) -> Result<()> {
        match self.state {
            ClientState::AwaitingInitialReport
            | ClientState::ReceivingChunk
            | ClientState::SubscriptionActive => {}
            state => {
                return Err(ImError::ProtocolViolation(format!(
                    "ReportData in state {}",
                    state
                )));
            }
        }

        match (self.interaction, report.subscription_id) {
            (ClientInteraction::Read, Some(id)) => {
                return Err(ImError::InvalidArgument(format!(
                    "read report carries subscription id 0x{:08x}",
                    id
                )));
            }
            (ClientInteraction::Read, None) => {}
            (ClientInteraction::Subscribe, None) => {
                return Err(ImError::InvalidArgument(
                    "subscription report without subscription id".into(),
                ));
            }
            (ClientInteraction::Subscribe, Some(id)) => match self.subscription_id {
                None => self.subscription_id = Some(id),
                Some(expected) if expected == id => {}
                Some(expected) => {
                    warn!(
                        "[IM] Report for 0x{:08x} on subscription 0x{:08x}",
                        id, expected
                    );
                    return Err(ImError::InvalidSubscription(id));
                }
            },
        }

        if self.state == ClientState::SubscriptionActive {
            self.liveness_deadline = Some(self.liveness_after(now));
        }
        if !self.report_open {
            self.report_open = true;
            callback.on_report_begin();
        }

        trace!(
            "[IM] Report chunk: {} attribute(s), {} event(s), more={}",
            report.attribute_reports.len(),
            report.event_reports.len(),
            report.more_chunked_messages
        );
        for attribute in &report.attribute_reports {
            self.assembler.process(attribute, callback);
        }
        for event in &report.event_reports {
            match event {
                EventReportIB::Data(data) => {
                    let number = data.event_number();
                    self.last_event_number =
                        Some(self.last_event_number.map_or(number, |n| n.max(number)));
                    callback.on_event_data(data);
                }
                EventReportIB::Status(status) => callback.on_event_status(status),
            }
        }

        if report.more_chunked_messages {
            if report.suppress_response {
                return Err(ImError::ProtocolViolation(
                    "more chunks announced with suppressed response".into(),
                ));
            }
            if self.state == ClientState::AwaitingInitialReport {
                self.state = ClientState::ReceivingChunk;
            }
            return self.acknowledge(transport, codec, exchange);
        }

        self.assembler.flush(callback);
        self.report_open = false;
        callback.on_report_end();

        match self.interaction {
            ClientInteraction::Read => {
                if !report.suppress_response {
                    self.acknowledge(transport, codec, exchange)?;
                }
                self.finish(transport, callback);
            }
            ClientInteraction::Subscribe => {
                self.acknowledge(transport, codec, exchange)?;
                if self.state == ClientState::SubscriptionActive {
                    transport.close_exchange(exchange);
                    self.exchange = None;
                } else {
                    self.state = ClientState::AwaitingSubscribeResponse;
                }
            }
        }
        Ok(())
    }

    fn process_subscribe_response(
        &mut self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        response: SubscribeResponse,
        now: Duration,
        callback: &mut dyn ReadClientCallback,
    ) -> Result<()> {
        if self.state != ClientState::AwaitingSubscribeResponse {
            return Err(ImError::ProtocolViolation(format!(
                "SubscribeResponse in state {}",
                self.state
            )));
        }
        if self.subscription_id != Some(response.subscription_id) {
            return Err(ImError::InvalidSubscription(response.subscription_id));
        }

        self.max_interval = response.max_interval;
        self.liveness_deadline = Some(self.liveness_after(now));
        self.resubscribe_attempts = 0;
        self.state = ClientState::SubscriptionActive;
        transport.close_exchange(exchange);
        self.exchange = None;
        info!(
            "[IM] Subscription 0x{:08x} active, max interval {}s",
            response.subscription_id, response.max_interval
        );
        callback.on_subscription_established(response.subscription_id);
        Ok(())
    }

    /// Check liveness and resubscribe timers.
    pub fn on_timer(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn Codec,
        now: Duration,
        callback: &mut dyn ReadClientCallback,
    ) {
        match self.state {
            ClientState::SubscriptionActive => {
                if let Some(deadline) = self.liveness_deadline
                    && now >= deadline
                {
                    let id = self.subscription_id.unwrap_or_default();
                    warn!("[IM] Subscription 0x{:08x} missed its liveness deadline", id);
                    self.fail(transport, &ImError::LivenessTimeout(id), now, callback);
                }
            }
            ClientState::Resubscribing => {
                if self.resubscribe_at.is_some_and(|at| now >= at) {
                    self.resubscribe(transport, codec, now, callback);
                }
            }
            _ => {}
        }
    }

    fn resubscribe(
        &mut self,
        transport: &mut dyn Transport,
        codec: &dyn Codec,
        now: Duration,
        callback: &mut dyn ReadClientCallback,
    ) {
        if let Some(params) = &mut self.params {
            if let Some(session) = transport.session_for_peer(&params.session.peer) {
                params.session = session;
            }
            if let Some(last) = self.last_event_number {
                params.event_number_min = Some(last + 1);
            }
        }
        info!(
            "[IM] Resubscribing to {:?}, attempt {}",
            self.peer(),
            self.resubscribe_attempts
        );
        if let Err(e) = self.transmit(transport, codec, callback) {
            self.fail(transport, &e, now, callback);
        }
    }

    /// The session to the server went away.
    pub fn on_session_defunct(
        &mut self,
        transport: &mut dyn Transport,
        now: Duration,
        callback: &mut dyn ReadClientCallback,
    ) {
        if matches!(self.state, ClientState::Idle | ClientState::Terminal) {
            return;
        }
        if self.state == ClientState::Resubscribing {
            // The resubscribe timer asks the transport for a session again
            return;
        }
        self.fail(transport, &ImError::SessionInvalidated, now, callback);
    }

    /// Tear down without notifying the server. The next report for the
    /// subscription is answered with InvalidSubscription by the registry.
    pub fn shutdown(&mut self, transport: &mut dyn Transport, callback: &mut dyn ReadClientCallback) {
        if self.state == ClientState::Terminal {
            return;
        }
        debug!("[IM] Shutting down client in state {}", self.state);
        self.finish(transport, callback);
    }

    fn fail(
        &mut self,
        transport: &mut dyn Transport,
        error: &ImError,
        now: Duration,
        callback: &mut dyn ReadClientCallback,
    ) {
        if let Some(exchange) = self.exchange.take() {
            transport.close_exchange(exchange);
        }
        self.assembler.reset();
        self.report_open = false;
        self.liveness_deadline = None;
        callback.on_error(error);

        if self.interaction == ClientInteraction::Subscribe
            && self.auto_resubscribe
            && self.params.is_some()
        {
            self.resubscribe_attempts += 1;
            let wait = resubscribe_wait(self.resubscribe_attempts);
            self.resubscribe_at = Some(now + wait);
            self.subscription_id = None;
            self.state = ClientState::Resubscribing;
            info!(
                "[IM] Subscription failed ({}), resubscribing in {:?}",
                error, wait
            );
            callback.on_resubscription_scheduled(self.resubscribe_attempts, wait);
        } else {
            self.state = ClientState::Terminal;
            callback.on_done();
        }
    }

    fn finish(&mut self, transport: &mut dyn Transport, callback: &mut dyn ReadClientCallback) {
        if let Some(exchange) = self.exchange.take() {
            transport.close_exchange(exchange);
        }
        self.liveness_deadline = None;
        self.resubscribe_at = None;
        self.state = ClientState::Terminal;
        callback.on_done();
    }

    fn acknowledge(
        &self,
        transport: &mut dyn Transport,
        codec: &dyn Codec,
        exchange: ExchangeId,
    ) -> Result<()> {
        let session = self
            .params
            .as_ref()
            .map(|p| p.session)
            .ok_or(ImError::IncorrectState("no session"))?;
        let payload = codec.encode(&Message::status(Status::Success))?;
        transport.send(exchange, &session, payload)
    }

    fn liveness_after(&self, now: Duration) -> Duration {
        now + Duration::from_secs(u64::from(self.max_interval)) + self.liveness_grace
    }
}
