//! Host collaborator contracts.
//!
//! RULE: The registry only touches the host tree through these traits.
//! It never stores anything the host owns, only ids.

use crate::{
    declaration::SubscriptionDecl,
    error::ConnectRejected,
    types::{EntityPath, EventName},
    weak_ref::{EntityId, Liveness},
};
use serde::{Deserialize, Serialize};

/// What the resolver needs from the tree that owns the entities.
pub trait SignalHost: Liveness {
    /// Event names the entity can currently emit.
    fn emittable_events(&self, id: EntityId) -> Vec<EventName>;

    /// Subscriptions declared by the entity's kind.
    fn declared_subscriptions(&self, id: EntityId) -> Vec<SubscriptionDecl>;

    /// Wire `event` on `emitter` to `handler` on `subscriber`.
    fn connect(
        &mut self,
        emitter: EntityId,
        event: &str,
        subscriber: EntityId,
        handler: &str,
    ) -> Result<(), ConnectRejected>;

    /// Undo a connection. Only called when the host would not have
    /// dropped it on its own.
    fn disconnect(&mut self, emitter: EntityId, event: &str, subscriber: EntityId, handler: &str);

    /// Whether destroying an entity drops its connections.
    fn auto_disconnects(&self) -> bool {
        true
    }
}

/// Tree entry/exit, each carrying the path the entity had at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNotification {
    Entered { id: EntityId, path: EntityPath },
    Exited { id: EntityId, path: EntityPath },
}

impl TreeNotification {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Entered { id, .. } | Self::Exited { id, .. } => *id,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Entered { path, .. } | Self::Exited { path, .. } => path,
        }
    }
}

/// Hosts that buffer tree notifications for the driver to pull.
pub trait NotificationSource {
    fn drain_notifications(&mut self) -> Vec<TreeNotification>;

    /// Every entity currently in the tree, parents before children.
    /// Used to rebuild the registry from scratch.
    fn live_tree(&self) -> Vec<(EntityId, EntityPath)>;
}
