//! Snapshot of registry state: both indices and the connected-set.
//!
//! Taken for tooling and tests. Nothing here is meant to be reloaded:
//! the registry is always rebuilt from the live tree.

use crate::{
    connection::ConnectionKey,
    resolver::ConnectionResolver,
    types::{EntityPath, EventName, HandlerId, Tick},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub tick:          Tick,
    pub passes:        u64,
    pub root:          Option<EntityPath>,
    pub emitters:      Vec<EmitterEntry>,
    pub subscriptions: Vec<SubscriptionEntry>,
    pub connected:     Vec<ConnectionKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterEntry {
    pub event: EventName,
    pub paths: Vec<EntityPath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub event:           EventName,
    pub subscriber_path: EntityPath,
    pub handler:         HandlerId,
    pub path_filter:     String,
}

impl RegistrySnapshot {
    pub fn capture(tick: Tick, resolver: &ConnectionResolver) -> Self {
        let emitters = resolver
            .emitters()
            .event_names()
            .map(|event| EmitterEntry {
                event: event.clone(),
                paths: resolver
                    .emitters()
                    .records(event)
                    .iter()
                    .map(|r| r.path.clone())
                    .collect(),
            })
            .collect();

        let subscriptions = resolver
            .subscriptions()
            .event_names()
            .flat_map(|event| {
                resolver
                    .subscriptions()
                    .records(event)
                    .iter()
                    .map(move |r| SubscriptionEntry {
                        event:           event.clone(),
                        subscriber_path: r.subscriber_path.clone(),
                        handler:         r.handler.clone(),
                        path_filter:     r.path_filter.clone(),
                    })
            })
            .collect();

        Self {
            tick,
            passes: resolver.passes(),
            root: resolver.root_path().map(str::to_string),
            emitters,
            subscriptions,
            connected: resolver.connected().keys().cloned().collect(),
        }
    }

    /// True if no record or key mentions `path`.
    pub fn is_clear_of(&self, path: &str) -> bool {
        self.emitters.iter().all(|e| e.paths.iter().all(|p| p != path))
            && self.subscriptions.iter().all(|s| s.subscriber_path != path)
            && self.connected.iter().all(|k| !k.involves_path(path))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
