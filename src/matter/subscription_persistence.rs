//! Subscription persistence for resumption after restart.
//!
//! Established subscriptions are written to a JSON file together with their
//! path lists. After a restart the engine reads them back and tries to
//! re-establish each one on its own, so controllers keep receiving reports
//! without re-subscribing.
//!
//! ## Resumption Flow
//!
//! 1. Engine starts and loads the persisted subscriptions
//! 2. On each timer tick, due entries ask the transport for a session to
//!    the peer
//! 3. With a session, the subscription is recreated under its old id and a
//!    priming report is sent
//! 4. Without one, the entry is retried on a fibonacci schedule
//!    (5 minutes growing to once a day)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::events::EventPathParams;
use super::ids::{FabricIndex, NodeId, ScopedNodeId, SubscriptionId};
use super::path::AttributePathParams;

/// Persisted subscription info - enough to recreate it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSubscription {
    pub fabric_idx: FabricIndex,
    pub peer_node_id: NodeId,
    pub subscription_id: SubscriptionId,
    pub min_int_secs: u16,
    pub max_int_secs: u16,
    #[serde(default)]
    pub attribute_paths: Vec<AttributePathParams>,
    #[serde(default)]
    pub event_paths: Vec<EventPathParams>,
}

impl PersistedSubscription {
    pub fn peer(&self) -> ScopedNodeId {
        ScopedNodeId::new(self.peer_node_id, self.fabric_idx)
    }
}

/// Persisted subscriptions state
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSubscriptions {
    pub subscriptions: Vec<PersistedSubscription>,
}

impl PersistedSubscriptions {
    /// Load from file
    pub fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedSubscriptions>(&bytes) {
                Ok(state) => {
                    info!(
                        "Loaded {} persisted subscriptions from {:?}",
                        state.subscriptions.len(),
                        path
                    );
                    state
                }
                Err(e) => {
                    warn!("Failed to parse subscriptions file: {}", e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No persisted subscriptions found (first run)");
                Self::default()
            }
            Err(e) => {
                error!("Failed to read subscriptions file: {}", e);
                Self::default()
            }
        }
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        info!(
            "Saved {} subscriptions to {:?}",
            self.subscriptions.len(),
            path
        );
        Ok(())
    }

    /// Add or replace the entry with the same subscription id
    pub fn upsert(&mut self, sub: PersistedSubscription) {
        self.subscriptions
            .retain(|s| s.subscription_id != sub.subscription_id);
        self.subscriptions.push(sub);
    }

    pub fn remove(&mut self, subscription_id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|s| s.subscription_id != subscription_id);
        self.subscriptions.len() != before
    }

    /// Clear all subscriptions for a fabric
    pub fn remove_fabric(&mut self, fabric_idx: FabricIndex) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.fabric_idx != fabric_idx);
        self.subscriptions.len() != before
    }
}

/// Store wrapper with auto-save
pub struct SubscriptionStore {
    path: PathBuf,
    state: RwLock<PersistedSubscriptions>,
}

impl SubscriptionStore {
    pub fn new(path: PathBuf) -> Self {
        let state = PersistedSubscriptions::load(&path);
        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_all(&self) -> Vec<PersistedSubscription> {
        self.state.read().subscriptions.clone()
    }

    pub fn add(&self, sub: PersistedSubscription) {
        let mut state = self.state.write();
        if state.subscriptions.contains(&sub) {
            return; // Already saved, no need to write again
        }
        state.upsert(sub);
        if let Err(e) = state.save(&self.path) {
            error!("Failed to save subscriptions: {}", e);
        }
    }

    pub fn remove(&self, subscription_id: SubscriptionId) {
        let mut state = self.state.write();
        if state.remove(subscription_id)
            && let Err(e) = state.save(&self.path)
        {
            error!("Failed to save subscriptions: {}", e);
        }
    }

    pub fn remove_fabric(&self, fabric_idx: FabricIndex) {
        let mut state = self.state.write();
        if state.remove_fabric(fabric_idx)
            && let Err(e) = state.save(&self.path)
        {
            error!("Failed to save subscriptions: {}", e);
        }
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.state.read().subscriptions.is_empty()
    }
}

/// A persisted subscription waiting to be re-established.
#[derive(Debug, Clone)]
pub struct PendingResumption {
    pub subscription: PersistedSubscription,
    pub attempts: u32,
    pub next_attempt: Duration,
}

impl PendingResumption {
    pub fn new(subscription: PersistedSubscription, next_attempt: Duration) -> Self {
        Self {
            subscription,
            attempts: 0,
            next_attempt,
        }
    }
}
