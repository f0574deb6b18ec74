//! Bounded set of read clients sharing one transport.
//!
//! The registry decodes incoming messages once and routes them: by exchange
//! for transactions in progress, by peer and subscription id for update
//! reports the server sends on fresh exchanges.

use std::time::Duration;

use log::{debug, warn};

use super::super::codec::Codec;
use super::super::ids::{FabricIndex, SubscriptionId};
use super::super::messages::Message;
use super::super::pool::{Handle, Pool};
use super::super::status::Status;
use super::super::transport::{ExchangeId, SessionHandle, Transport};
use super::callback::ReadClientCallback;
use super::read_client::{ClientInteraction, ReadClient, ReadPrepareParams};
use crate::config::ClientConfig;
use crate::error::{ImError, Result};

pub struct ClientEntry<C> {
    pub client: ReadClient,
    pub callback: C,
}

pub type ClientHandle<C> = Handle<ClientEntry<C>>;

pub struct ClientRegistry<C: ReadClientCallback> {
    config: ClientConfig,
    codec: Box<dyn Codec>,
    clients: Pool<ClientEntry<C>>,
}

impl<C: ReadClientCallback> ClientRegistry<C> {
    pub fn new(config: &ClientConfig, codec: Box<dyn Codec>) -> Self {
        Self {
            clients: Pool::with_capacity(config.max_clients),
            config: config.clone(),
            codec,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn client(&self, handle: ClientHandle<C>) -> Option<&ReadClient> {
        self.clients.get(handle).map(|e| &e.client)
    }

    pub fn callback(&self, handle: ClientHandle<C>) -> Option<&C> {
        self.clients.get(handle).map(|e| &e.callback)
    }

    pub fn callback_mut(&mut self, handle: ClientHandle<C>) -> Option<&mut C> {
        self.clients.get_mut(handle).map(|e| &mut e.callback)
    }

    /// Create a client and send its request.
    pub fn start(
        &mut self,
        transport: &mut dyn Transport,
        interaction: ClientInteraction,
        params: ReadPrepareParams,
        callback: C,
    ) -> Result<ClientHandle<C>> {
        let handle = self.clients.insert(ClientEntry {
            client: ReadClient::new(interaction, &self.config),
            callback,
        })?;
        let entry = self.clients.get_mut(handle).ok_or(ImError::StaleHandle)?;
        if let Err(e) = entry
            .client
            .send_request(transport, self.codec.as_ref(), params, &mut entry.callback)
        {
            self.clients.remove(handle);
            return Err(e);
        }
        Ok(handle)
    }

    pub fn read(
        &mut self,
        transport: &mut dyn Transport,
        params: ReadPrepareParams,
        callback: C,
    ) -> Result<ClientHandle<C>> {
        self.start(transport, ClientInteraction::Read, params, callback)
    }

    pub fn subscribe(
        &mut self,
        transport: &mut dyn Transport,
        params: ReadPrepareParams,
        callback: C,
    ) -> Result<ClientHandle<C>> {
        self.start(transport, ClientInteraction::Subscribe, params, callback)
    }

    /// Route one incoming message.
    pub fn on_message(
        &mut self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        session: &SessionHandle,
        payload: &[u8],
        now: Duration,
    ) -> Result<()> {
        let message = self.codec.decode(payload)?;

        let handle = self
            .clients
            .find(|e| e.client.exchange() == Some(exchange))
            .or_else(|| match &message {
                Message::ReportData(report) => report.subscription_id.and_then(|id| {
                    self.clients.find(|e| {
                        e.client.is_subscription_active()
                            && e.client.owns_subscription(session.peer, id)
                    })
                }),
                _ => None,
            });

        let Some(handle) = handle else {
            return self.on_unsolicited(transport, exchange, session, &message);
        };
        let entry = self.clients.get_mut(handle).ok_or(ImError::StaleHandle)?;
        entry.client.on_message(
            transport,
            self.codec.as_ref(),
            exchange,
            message,
            now,
            &mut entry.callback,
        )
    }

    /// A report nobody is waiting for. Subscriptions the client no longer
    /// holds are cancelled on the server by answering InvalidSubscription.
    fn on_unsolicited(
        &mut self,
        transport: &mut dyn Transport,
        exchange: ExchangeId,
        session: &SessionHandle,
        message: &Message,
    ) -> Result<()> {
        match message {
            Message::ReportData(report) if !report.suppress_response => {
                let id: SubscriptionId = report.subscription_id.unwrap_or_default();
                warn!(
                    "[IM] Report for unknown subscription 0x{:08x} from {}",
                    id, session.peer
                );
                let payload = self
                    .codec
                    .encode(&Message::status(Status::InvalidSubscription))?;
                transport.send(exchange, session, payload)?;
                transport.close_exchange(exchange);
                Err(ImError::InvalidSubscription(id))
            }
            other => {
                debug!("[IM] Dropping unsolicited {} on {}", other.kind(), exchange);
                Ok(())
            }
        }
    }

    pub fn on_timer(&mut self, transport: &mut dyn Transport, now: Duration) {
        for (_, entry) in self.clients.iter_mut() {
            entry
                .client
                .on_timer(transport, self.codec.as_ref(), now, &mut entry.callback);
        }
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.clients
            .iter()
            .filter_map(|(_, e)| e.client.next_deadline())
            .min()
    }

    pub fn on_session_defunct(
        &mut self,
        transport: &mut dyn Transport,
        session: &SessionHandle,
        now: Duration,
    ) {
        for (_, entry) in self.clients.iter_mut() {
            if entry.client.session() == Some(session) {
                entry
                    .client
                    .on_session_defunct(transport, now, &mut entry.callback);
            }
        }
    }

    /// Shut down every client talking to a node on the removed fabric.
    pub fn on_fabric_removed(&mut self, transport: &mut dyn Transport, fabric_index: FabricIndex) {
        for (_, entry) in self.clients.iter_mut() {
            if entry.client.peer().is_some_and(|p| p.fabric_index == fabric_index) {
                entry.client.shutdown(transport, &mut entry.callback);
            }
        }
    }

    /// Shut the client down and release its slot.
    pub fn shutdown(&mut self, transport: &mut dyn Transport, handle: ClientHandle<C>) -> Option<C> {
        let mut entry = self.clients.remove(handle)?;
        entry.client.shutdown(transport, &mut entry.callback);
        Some(entry.callback)
    }

    /// Release the slots of clients that reached their terminal state.
    pub fn remove_terminated(&mut self) -> Vec<C> {
        self.clients
            .find_all(|e| e.client.is_terminal())
            .into_iter()
            .filter_map(|handle| self.clients.remove(handle))
            .map(|entry| entry.callback)
            .collect()
    }
}
