//! In-process transport connecting an engine and a client registry.
//!
//! Each side gets a [`LoopbackTransport`] that queues outgoing messages;
//! [`LoopbackLink::pump`] moves them across until both queues are empty.
//! Every message is logged the way a network transport logs packets, and
//! the link keeps a history so callers can inspect the wire.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use log::{debug, trace, warn};

use super::client::{ClientRegistry, ReadClientCallback};
use super::data_model::DataModel;
use super::ids::ScopedNodeId;
use super::reporting::Engine;
use super::transport::{ExchangeId, SessionHandle, Transport};
use crate::error::{ImError, Result};

/// Upper bound on deliveries per pump, in case two peers keep answering
/// each other.
const MAX_DELIVERIES_PER_PUMP: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Datagram {
    pub exchange: ExchangeId,
    pub session: SessionHandle,
    pub payload: Vec<u8>,
}

pub struct LoopbackTransport {
    label: &'static str,
    next_exchange: u32,
    outbox: VecDeque<Datagram>,
    open_exchanges: HashSet<ExchangeId>,
    sessions: Vec<SessionHandle>,
    defunct: HashSet<u32>,
    drop_next: usize,
    dropped: usize,
}

impl LoopbackTransport {
    /// `exchange_base` keeps the exchange ids of both sides apart.
    pub fn new(label: &'static str, exchange_base: u32) -> Self {
        Self {
            label,
            next_exchange: exchange_base,
            outbox: VecDeque::new(),
            open_exchanges: HashSet::new(),
            sessions: Vec::new(),
            defunct: HashSet::new(),
            drop_next: 0,
            dropped: 0,
        }
    }

    pub fn register_session(&mut self, session: SessionHandle) {
        if !self.sessions.contains(&session) {
            self.sessions.push(session);
        }
    }

    pub fn take_outbox(&mut self) -> Vec<Datagram> {
        self.outbox.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    pub fn mark_session_defunct(&mut self, session: &SessionHandle) {
        debug!("[{}] Session {} to {} is defunct", self.label, session.session_id, session.peer);
        self.defunct.insert(session.session_id);
    }

    pub fn revive_session(&mut self, session: &SessionHandle) {
        self.defunct.remove(&session.session_id);
    }

    /// Silently lose the next `count` messages.
    pub fn drop_next(&mut self, count: usize) {
        self.drop_next = count;
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn open_exchanges(&self) -> usize {
        self.open_exchanges.len()
    }
}

impl Transport for LoopbackTransport {
    fn new_exchange(&mut self, session: &SessionHandle) -> Result<ExchangeId> {
        if !self.is_session_active(session) {
            return Err(ImError::SessionInvalidated);
        }
        let exchange = ExchangeId(self.next_exchange);
        self.next_exchange = self.next_exchange.wrapping_add(1);
        self.open_exchanges.insert(exchange);
        trace!("[{}] Opened exchange {}", self.label, exchange);
        Ok(exchange)
    }

    fn send(&mut self, exchange: ExchangeId, session: &SessionHandle, payload: Vec<u8>) -> Result<()> {
        if !self.is_session_active(session) {
            return Err(ImError::SessionInvalidated);
        }
        if self.drop_next > 0 {
            self.drop_next -= 1;
            self.dropped += 1;
            debug!(
                "[{} TX] Dropping {} bytes on {} to {}",
                self.label,
                payload.len(),
                exchange,
                session.peer
            );
            return Ok(());
        }

        debug!(
            "[{} TX] {} bytes on {} to {}",
            self.label,
            payload.len(),
            exchange,
            session.peer
        );
        let preview_len = payload.len().min(64);
        trace!(
            "[{} TX] payload: {}",
            self.label,
            String::from_utf8_lossy(&payload[..preview_len])
        );

        self.open_exchanges.insert(exchange);
        self.outbox.push_back(Datagram {
            exchange,
            session: *session,
            payload,
        });
        Ok(())
    }

    fn close_exchange(&mut self, exchange: ExchangeId) {
        if self.open_exchanges.remove(&exchange) {
            trace!("[{}] Closed exchange {}", self.label, exchange);
        }
    }

    fn is_session_active(&self, session: &SessionHandle) -> bool {
        !self.defunct.contains(&session.session_id)
    }

    fn session_for_peer(&mut self, peer: &ScopedNodeId) -> Option<SessionHandle> {
        self.sessions
            .iter()
            .find(|s| s.peer == *peer && !self.defunct.contains(&s.session_id))
            .copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    ToServer,
    ToClient,
}

/// One server and one client node talking over a single session.
pub struct LoopbackLink {
    pub server: LoopbackTransport,
    pub client: LoopbackTransport,
    /// The session as the server sees it: its peer is the client node.
    pub server_session: SessionHandle,
    /// The session as the client sees it: its peer is the server node.
    pub client_session: SessionHandle,
    history: Vec<(Direction, Datagram)>,
}

impl LoopbackLink {
    pub fn new(server_node: ScopedNodeId, client_node: ScopedNodeId) -> Self {
        let server_session = SessionHandle::new(1, client_node);
        let client_session = SessionHandle::new(1, server_node);
        let mut server = LoopbackTransport::new("SRV", 0x8001);
        let mut client = LoopbackTransport::new("CLI", 0x0001);
        server.register_session(server_session);
        client.register_session(client_session);
        Self {
            server,
            client,
            server_session,
            client_session,
            history: Vec::new(),
        }
    }

    /// Take the session down on both ends.
    pub fn break_session(&mut self) {
        self.server.mark_session_defunct(&self.server_session);
        self.client.mark_session_defunct(&self.client_session);
    }

    pub fn restore_session(&mut self) {
        self.server.revive_session(&self.server_session);
        self.client.revive_session(&self.client_session);
    }

    /// Everything delivered since the last call.
    pub fn take_history(&mut self) -> Vec<(Direction, Datagram)> {
        std::mem::take(&mut self.history)
    }

    /// Deliver queued messages in both directions until nothing is left.
    /// Returns the number of messages delivered.
    pub fn pump<D, C>(
        &mut self,
        engine: &mut Engine<D>,
        clients: &mut ClientRegistry<C>,
        now: Duration,
    ) -> usize
    where
        D: DataModel,
        C: ReadClientCallback,
    {
        let mut delivered = 0;
        while delivered < MAX_DELIVERIES_PER_PUMP {
            if let Some(datagram) = self.client.outbox.pop_front() {
                debug!(
                    "[SRV RX] {} bytes on {} from {}",
                    datagram.payload.len(),
                    datagram.exchange,
                    self.server_session.peer
                );
                if let Err(e) = engine.on_message(
                    &mut self.server,
                    datagram.exchange,
                    &self.server_session,
                    &datagram.payload,
                    now,
                ) {
                    debug!("[SRV RX] {}", e);
                }
                self.history.push((Direction::ToServer, datagram));
            } else if let Some(datagram) = self.server.outbox.pop_front() {
                debug!(
                    "[CLI RX] {} bytes on {} from {}",
                    datagram.payload.len(),
                    datagram.exchange,
                    self.client_session.peer
                );
                if let Err(e) = clients.on_message(
                    &mut self.client,
                    datagram.exchange,
                    &self.client_session,
                    &datagram.payload,
                    now,
                ) {
                    debug!("[CLI RX] {}", e);
                }
                self.history.push((Direction::ToClient, datagram));
            } else {
                return delivered;
            }
            delivered += 1;
        }
        warn!("Loopback still busy after {} deliveries", delivered);
        delivered
    }
}
