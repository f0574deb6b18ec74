//! Contract with the reliable message layer.
//!
//! The transport owns acknowledgement, retransmission and exchange
//! bookkeeping. Send confirmation at this level means the message was
//! handed off; application-level acknowledgement of report chunks is a
//! StatusResponse travelling back through the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::ScopedNodeId;
use crate::error::Result;

/// Request/response conversation identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ExchangeId(pub u32);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

/// An established secure session with a peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SessionHandle {
    pub session_id: u32,
    pub peer: ScopedNodeId,
}

impl SessionHandle {
    pub fn new(session_id: u32, peer: ScopedNodeId) -> Self {
        Self { session_id, peer }
    }
}

pub trait Transport {
    /// Open an exchange initiated by this side.
    fn new_exchange(&mut self, session: &SessionHandle) -> Result<ExchangeId>;

    /// Hand a message to the reliable layer. Fails with
    /// `SessionInvalidated` when the session is gone.
    fn send(&mut self, exchange: ExchangeId, session: &SessionHandle, payload: Vec<u8>)
    -> Result<()>;

    fn close_exchange(&mut self, exchange: ExchangeId);

    fn is_session_active(&self, session: &SessionHandle) -> bool;

    /// Find, or start establishing, a session to `peer`.
    fn session_for_peer(&mut self, _peer: &ScopedNodeId) -> Option<SessionHandle> {
        None
    }
}
