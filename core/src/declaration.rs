//! Declared signals and subscriptions.
//!
//! RULE: Subscriptions are declared per entity kind in an explicit table.
//! Nothing is discovered by inspecting entities at runtime; a kind's lists
//! are resolved once, when an entity of that kind is constructed.

use crate::types::{EventName, HandlerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// "Call `handler` when `event` fires on an emitter at `path_filter`,
/// or on any emitter when the filter is empty."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDecl {
    pub event:       EventName,
    #[serde(default)]
    pub path_filter: String,
    pub handler:     HandlerId,
}

impl SubscriptionDecl {
    pub fn new(
        event: impl Into<EventName>,
        path_filter: impl Into<String>,
        handler: impl Into<HandlerId>,
    ) -> Self {
        Self {
            event:       event.into(),
            path_filter: path_filter.into(),
            handler:     handler.into(),
        }
    }

    /// Subscribe to every emitter of `event`.
    pub fn any(event: impl Into<EventName>, handler: impl Into<HandlerId>) -> Self {
        Self::new(event, "", handler)
    }

    pub fn matches(&self, emitter_path: &str) -> bool {
        self.path_filter.is_empty() || self.path_filter == emitter_path
    }
}

/// Capability contract for anything that declares signals and subscriptions.
pub trait DeclaresSubscriptions {
    fn signals(&self) -> Vec<EventName>;
    fn subscriptions(&self) -> Vec<SubscriptionDecl>;
}

/// A registered entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKind {
    pub name:          String,
    #[serde(default)]
    pub signals:       Vec<EventName>,
    #[serde(default)]
    pub handlers:      Vec<HandlerId>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDecl>,
}

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_signal(mut self, event: impl Into<EventName>) -> Self {
        self.signals.push(event.into());
        self
    }

    /// Adds the handler too, so the kind can actually receive the event.
    pub fn with_subscription(mut self, decl: SubscriptionDecl) -> Self {
        if !self.handlers.contains(&decl.handler) {
            self.handlers.push(decl.handler.clone());
        }
        self.subscriptions.push(decl);
        self
    }

    pub fn with_handler(mut self, handler: impl Into<HandlerId>) -> Self {
        self.handlers.push(handler.into());
        self
    }

    pub fn has_handler(&self, handler: &str) -> bool {
        self.handlers.iter().any(|h| h == handler)
    }
}

impl DeclaresSubscriptions for EntityKind {
    fn signals(&self) -> Vec<EventName> {
        self.signals.clone()
    }

    fn subscriptions(&self) -> Vec<SubscriptionDecl> {
        self.subscriptions.clone()
    }
}

/// Kinds by name. Registered up front, shared by every entity of a kind.
#[derive(Debug, Clone, Default)]
pub struct KindTable {
    kinds: HashMap<String, Arc<EntityKind>>,
}

impl KindTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations with the same name replace earlier ones.
    /// Every handler named by a subscription is added to the kind's handlers.
    pub fn register(&mut self, mut kind: EntityKind) {
        for decl in &kind.subscriptions {
            if !kind.handlers.contains(&decl.handler) {
                kind.handlers.push(decl.handler.clone());
            }
        }
        if self.kinds.contains_key(&kind.name) {
            log::warn!("Entity kind '{}' registered twice; keeping the later one", kind.name);
        }
        self.kinds.insert(kind.name.clone(), Arc::new(kind));
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntityKind>> {
        self.kinds.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl FromIterator<EntityKind> for KindTable {
    fn from_iter<I: IntoIterator<Item = EntityKind>>(iter: I) -> Self {
        let mut table = KindTable::new();
        for kind in iter {
            table.register(kind);
        }
        table
    }
}

/// A non-empty filter must be an absolute path: leading `/`,
/// no empty segments, no trailing `/`.
pub fn is_valid_path_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    match filter.strip_prefix('/') {
        Some(rest) => !rest.is_empty() && rest.split('/').all(|seg| !seg.is_empty()),
        None => false,
    }
}
