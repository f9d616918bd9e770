//! Connection keys and the set of applied connections.

use crate::{
    types::{EntityPath, EventName, HandlerId},
    weak_ref::{EntityId, WeakEntityRef},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The only de-duplication unit: one emitter, one event, one subscriber,
/// one handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub emitter_path:    EntityPath,
    pub event:           EventName,
    pub subscriber_path: EntityPath,
    pub handler:         HandlerId,
}

impl ConnectionKey {
    pub fn new(
        emitter_path: impl Into<EntityPath>,
        event: impl Into<EventName>,
        subscriber_path: impl Into<EntityPath>,
        handler: impl Into<HandlerId>,
    ) -> Self {
        Self {
            emitter_path:    emitter_path.into(),
            event:           event.into(),
            subscriber_path: subscriber_path.into(),
            handler:         handler.into(),
        }
    }

    pub fn involves_path(&self, path: &str) -> bool {
        self.emitter_path == path || self.subscriber_path == path
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.emitter_path, self.event, self.subscriber_path, self.handler
        )
    }
}

/// The endpoints a key was applied with.
#[derive(Debug, Clone, Copy)]
pub struct AppliedConnection {
    pub emitter:    WeakEntityRef,
    pub subscriber: WeakEntityRef,
}

impl AppliedConnection {
    /// Same occupants as when the key was applied. A different id at the
    /// same path means the path has been reused.
    pub fn same_endpoints(&self, emitter: EntityId, subscriber: EntityId) -> bool {
        self.emitter.raw_id() == emitter && self.subscriber.raw_id() == subscriber
    }
}

/// Keys currently applied on the host, in application order.
#[derive(Debug, Default)]
pub struct ConnectedSet {
    applied: IndexMap<ConnectionKey, AppliedConnection>,
}

impl ConnectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&AppliedConnection> {
        self.applied.get(key)
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.applied.contains_key(key)
    }

    pub fn insert(&mut self, key: ConnectionKey, applied: AppliedConnection) {
        self.applied.insert(key, applied);
    }

    /// Order of the remaining keys is preserved.
    pub fn remove(&mut self, key: &ConnectionKey) -> Option<AppliedConnection> {
        self.applied.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ConnectionKey> {
        self.applied.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionKey, &AppliedConnection)> {
        self.applied.iter()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}
