//! Reference host: a generational arena of named nodes.
//!
//! RULES:
//!   - Slots are reused; each reuse bumps the slot's generation, so ids of
//!     destroyed nodes never resolve again. A slot whose generation is
//!     exhausted is retired instead of wrapping.
//!   - Every tree entry/exit is buffered as a `TreeNotification` until the
//!     driver drains it. Entries go parent-first, exits children-first.
//!   - Connections are keyed by ids. Destroying a node drops its
//!     connections unless auto-disconnect is turned off.

use crate::{
    declaration::{DeclaresSubscriptions, EntityKind, KindTable, SubscriptionDecl},
    error::{ConnectRejected, RegistryError, RegistryResult},
    host::{NotificationSource, SignalHost, TreeNotification},
    types::{EntityPath, EventName, HandlerId},
    weak_ref::{EntityId, Liveness},
};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const ROOT_KIND: &str = "Root";

#[derive(Debug)]
struct Node {
    name:     String,
    kind:     Arc<EntityKind>,
    parent:   Option<EntityId>,
    children: Vec<EntityId>,
    in_tree:  bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node:       Option<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Wire {
    emitter:    EntityId,
    event:      EventName,
    subscriber: EntityId,
    handler:    HandlerId,
}

/// One successful `connect`, with the paths both ends had at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectCall {
    pub emitter_path:    EntityPath,
    pub event:           EventName,
    pub subscriber_path: EntityPath,
    pub handler:         HandlerId,
}

/// A handler invocation produced by `emit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub subscriber:      EntityId,
    pub subscriber_path: Option<EntityPath>,
    pub handler:         HandlerId,
}

#[derive(Debug)]
pub struct SceneTree {
    slots:           Vec<Slot>,
    free:            Vec<u32>,
    root:            EntityId,
    kinds:           KindTable,
    wires:           IndexSet<Wire>,
    notifications:   Vec<TreeNotification>,
    auto_disconnect: bool,
    forced_rejects:  HashMap<HandlerId, String>,
    connect_log:     Vec<ConnectCall>,
    disconnects:     usize,
    /// Detached subtree roots with the path each had when detached, oldest
    /// first. Several may share a former path.
    parked:          Vec<(EntityPath, EntityId)>,
}

impl SceneTree {
    /// A tree holding only its root, `/<root_name>`.
    /// The root uses the kind registered as "Root", or a bare kind if none.
    pub fn new(root_name: &str, kinds: KindTable) -> Self {
        let root_kind = kinds
            .get(ROOT_KIND)
            .unwrap_or_else(|| Arc::new(EntityKind::new(ROOT_KIND)));
        let root = EntityId::new(0, 0);
        Self {
            slots: vec![Slot {
                generation: 0,
                node:       Some(Node {
                    name:     root_name.to_string(),
                    kind:     root_kind,
                    parent:   None,
                    children: Vec::new(),
                    in_tree:  true,
                }),
            }],
            free: Vec::new(),
            root,
            kinds,
            wires: IndexSet::new(),
            notifications: Vec::new(),
            auto_disconnect: true,
            forced_rejects: HashMap::new(),
            connect_log: Vec::new(),
            disconnects: 0,
            parked: Vec::new(),
        }
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn kinds(&self) -> &KindTable {
        &self.kinds
    }

    pub fn set_auto_disconnect(&mut self, enabled: bool) {
        self.auto_disconnect = enabled;
    }

    /// Make every `connect` for `handler` fail with `reason`.
    pub fn reject_handler(&mut self, handler: &str, reason: &str) {
        self.forced_rejects.insert(handler.to_string(), reason.to_string());
    }

    pub fn allow_handler(&mut self, handler: &str) {
        self.forced_rejects.remove(handler);
    }

    fn node(&self, id: EntityId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: EntityId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn live_node(&self, id: EntityId) -> RegistryResult<&Node> {
        self.node(id)
            .ok_or_else(|| RegistryError::DeadEntity { id: id.to_string() })
    }

    pub fn name_of(&self, id: EntityId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    pub fn kind_of(&self, id: EntityId) -> Option<&EntityKind> {
        self.node(id).map(|n| n.kind.as_ref())
    }

    pub fn is_in_tree(&self, id: EntityId) -> bool {
        self.node(id).is_some_and(|n| n.in_tree)
    }

    /// Absolute path, or `None` for dead or detached nodes.
    pub fn path_of(&self, id: EntityId) -> Option<EntityPath> {
        let node = self.node(id)?;
        if !node.in_tree {
            return None;
        }
        let mut segments = vec![node.name.as_str()];
        let mut cursor = node.parent;
        while let Some(parent) = cursor {
            let parent_node = self.node(parent)?;
            segments.push(parent_node.name.as_str());
            cursor = parent_node.parent;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    pub fn lookup(&self, path: &str) -> Option<EntityId> {
        let mut segments = path.strip_prefix('/')?.split('/');
        let root_node = self.node(self.root)?;
        if segments.next()? != root_node.name {
            return None;
        }
        let mut current = self.root;
        for segment in segments {
            current = *self
                .node(current)?
                .children
                .iter()
                .find(|child| self.name_of(**child) == Some(segment))?;
        }
        Some(current)
    }

    pub fn require(&self, path: &str) -> RegistryResult<EntityId> {
        self.lookup(path)
            .ok_or_else(|| RegistryError::PathNotFound { path: path.to_string() })
    }

    fn has_child_named(&self, parent: &Node, name: &str) -> bool {
        parent
            .children
            .iter()
            .any(|child| self.name_of(*child) == Some(name))
    }

    fn allocate(&mut self, node: Node) -> EntityId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                EntityId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node:       Some(node),
                });
                EntityId::new(index, 0)
            }
        }
    }

    /// Construct a node of `kind` under `parent`. Enters the tree
    /// immediately if the parent is in it.
    pub fn add_child(&mut self, parent: EntityId, name: &str, kind: &str) -> RegistryResult<EntityId> {
        let parent_node = self.live_node(parent)?;
        if self.has_child_named(parent_node, name) {
            return Err(RegistryError::DuplicateChild {
                parent: self.path_of(parent).unwrap_or_else(|| parent.to_string()),
                name:   name.to_string(),
            });
        }
        let in_tree = parent_node.in_tree;
        let kind = self
            .kinds
            .get(kind)
            .ok_or_else(|| RegistryError::UnknownKind { kind: kind.to_string() })?;

        let id = self.allocate(Node {
            name: name.to_string(),
            kind,
            parent: Some(parent),
            children: Vec::new(),
            in_tree,
        });
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.push(id);
        }

        if let Some(path) = self.path_of(id) {
            log::trace!("scene: {path} entered");
            self.notifications.push(TreeNotification::Entered { id, path });
        }
        Ok(id)
    }

    /// Pre-order: parents before children.
    fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.node(current) {
                out.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn queue_exits(&mut self, subtree: &[EntityId]) {
        let exits: Vec<TreeNotification> = subtree
            .iter()
            .rev()
            .filter_map(|id| self.path_of(*id).map(|path| TreeNotification::Exited { id: *id, path }))
            .collect();
        self.notifications.extend(exits);
    }

    fn unlink_from_parent(&mut self, id: EntityId) {
        let parent = self.node(id).and_then(|n| n.parent);
        if let Some(parent_node) = parent.and_then(|p| self.node_mut(p)) {
            parent_node.children.retain(|child| *child != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    /// Destroy `id` and its whole subtree.
    pub fn remove(&mut self, id: EntityId) -> RegistryResult<()> {
        if id == self.root {
            return Err(RegistryError::RootImmutable);
        }
        self.live_node(id)?;

        let subtree = self.subtree(id);
        self.queue_exits(&subtree);
        self.unlink_from_parent(id);
        self.parked.retain(|(_, parked)| !subtree.contains(parked));

        for dead in &subtree {
            let slot = &mut self.slots[dead.index as usize];
            slot.node = None;
            match slot.generation.checked_add(1) {
                Some(next) => {
                    slot.generation = next;
                    self.free.push(dead.index);
                }
                None => log::debug!("scene: slot {} exhausted its generations, retired", dead.index),
            }
        }
        if self.auto_disconnect {
            let before = self.wires.len();
            self.wires
                .retain(|w| !subtree.contains(&w.emitter) && !subtree.contains(&w.subscriber));
            log::trace!("scene: dropped {} connection(s) on destroy", before - self.wires.len());
        }
        Ok(())
    }

    /// Take `id`'s subtree out of the tree without destroying it.
    pub fn detach(&mut self, id: EntityId) -> RegistryResult<()> {
        if id == self.root {
            return Err(RegistryError::RootImmutable);
        }
        self.live_node(id)?;
        let former_path = self.path_of(id);

        let subtree = self.subtree(id);
        self.queue_exits(&subtree);
        self.unlink_from_parent(id);
        if let Some(path) = former_path {
            self.parked.push((path, id));
        }
        for node_id in &subtree {
            if let Some(node) = self.node_mut(*node_id) {
                node.in_tree = false;
            }
        }
        Ok(())
    }

    /// The most recently detached subtree root whose path before `detach`
    /// was `former_path`.
    pub fn parked(&self, former_path: &str) -> Option<EntityId> {
        self.parked
            .iter()
            .rev()
            .find(|(path, id)| path == former_path && self.is_alive(*id))
            .map(|(_, id)| *id)
    }

    /// Former paths of every detached subtree root, sorted, each once.
    pub fn parked_paths(&self) -> Vec<EntityPath> {
        let mut paths: Vec<EntityPath> = self
            .parked
            .iter()
            .filter(|(_, id)| self.is_alive(*id))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Number of detached subtree roots still alive.
    pub fn parked_count(&self) -> usize {
        self.parked.iter().filter(|(_, id)| self.is_alive(*id)).count()
    }

    /// Put a detached subtree back under `parent`.
    pub fn attach(&mut self, parent: EntityId, id: EntityId) -> RegistryResult<()> {
        let node = self.live_node(id)?;
        if node.parent.is_some() || node.in_tree || id == self.root {
            return Err(RegistryError::AlreadyAttached {
                path: self.path_of(id).unwrap_or_else(|| node.name.clone()),
            });
        }
        let name = node.name.clone();
        let parent_node = self.live_node(parent)?;
        if self.has_child_named(parent_node, &name) {
            return Err(RegistryError::DuplicateChild {
                parent: self.path_of(parent).unwrap_or_else(|| parent.to_string()),
                name,
            });
        }
        let parent_in_tree = parent_node.in_tree;

        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.push(id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = Some(parent);
        }
        self.parked.retain(|(_, parked)| *parked != id);

        if parent_in_tree {
            let subtree = self.subtree(id);
            for node_id in &subtree {
                if let Some(node) = self.node_mut(*node_id) {
                    node.in_tree = true;
                }
            }
            for node_id in subtree {
                if let Some(path) = self.path_of(node_id) {
                    self.notifications.push(TreeNotification::Entered { id: node_id, path });
                }
            }
        }
        Ok(())
    }

    /// Fire `event` on `emitter`; returns one delivery per connected handler.
    pub fn emit(&self, emitter: EntityId, event: &str) -> Vec<Delivery> {
        if !self.is_alive(emitter) {
            return Vec::new();
        }
        self.wires
            .iter()
            .filter(|w| w.emitter == emitter && w.event == event && self.is_alive(w.subscriber))
            .map(|w| Delivery {
                subscriber:      w.subscriber,
                subscriber_path: self.path_of(w.subscriber),
                handler:         w.handler.clone(),
            })
            .collect()
    }

    pub fn is_wired(&self, emitter: EntityId, event: &str, subscriber: EntityId, handler: &str) -> bool {
        self.wires.contains(&Wire {
            emitter,
            event: event.to_string(),
            subscriber,
            handler: handler.to_string(),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.wires.len()
    }

    /// Every successful `connect`, oldest first.
    pub fn connect_log(&self) -> &[ConnectCall] {
        &self.connect_log
    }

    /// Successful connects matching one key.
    pub fn connects_for(&self, emitter_path: &str, event: &str, subscriber_path: &str, handler: &str) -> usize {
        self.connect_log
            .iter()
            .filter(|c| {
                c.emitter_path == emitter_path
                    && c.event == event
                    && c.subscriber_path == subscriber_path
                    && c.handler == handler
            })
            .count()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects
    }

    /// Live nodes, in or out of the tree.
    pub fn entity_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }
}

impl Liveness for SceneTree {
    fn is_alive(&self, id: EntityId) -> bool {
        self.node(id).is_some()
    }
}

impl SignalHost for SceneTree {
    fn emittable_events(&self, id: EntityId) -> Vec<EventName> {
        self.node(id).map(|n| n.kind.signals()).unwrap_or_default()
    }

    fn declared_subscriptions(&self, id: EntityId) -> Vec<SubscriptionDecl> {
        self.node(id).map(|n| n.kind.subscriptions()).unwrap_or_default()
    }

    fn connect(
        &mut self,
        emitter: EntityId,
        event: &str,
        subscriber: EntityId,
        handler: &str,
    ) -> Result<(), ConnectRejected> {
        let (Some(emitter_node), Some(subscriber_node)) = (self.node(emitter), self.node(subscriber)) else {
            return Err(ConnectRejected::new("endpoint is not alive"));
        };
        if !emitter_node.kind.signals.iter().any(|s| s == event) {
            return Err(ConnectRejected::new(format!(
                "kind '{}' has no signal '{event}'",
                emitter_node.kind.name
            )));
        }
        if !subscriber_node.kind.has_handler(handler) {
            return Err(ConnectRejected::new(format!(
                "kind '{}' has no handler '{handler}'",
                subscriber_node.kind.name
            )));
        }
        if let Some(reason) = self.forced_rejects.get(handler) {
            return Err(ConnectRejected::new(reason.clone()));
        }

        let wire = Wire {
            emitter,
            event: event.to_string(),
            subscriber,
            handler: handler.to_string(),
        };
        if self.wires.contains(&wire) {
            return Err(ConnectRejected::new("already connected"));
        }
        self.wires.insert(wire);
        self.connect_log.push(ConnectCall {
            emitter_path:    self.path_of(emitter).unwrap_or_default(),
            event:           event.to_string(),
            subscriber_path: self.path_of(subscriber).unwrap_or_default(),
            handler:         handler.to_string(),
        });
        Ok(())
    }

    fn disconnect(&mut self, emitter: EntityId, event: &str, subscriber: EntityId, handler: &str) {
        self.disconnects += 1;
        self.wires.shift_remove(&Wire {
            emitter,
            event: event.to_string(),
            subscriber,
            handler: handler.to_string(),
        });
    }

    fn auto_disconnects(&self) -> bool {
        self.auto_disconnect
    }
}

impl NotificationSource for SceneTree {
    fn drain_notifications(&mut self) -> Vec<TreeNotification> {
        std::mem::take(&mut self.notifications)
    }

    fn live_tree(&self) -> Vec<(EntityId, EntityPath)> {
        self.subtree(self.root)
            .into_iter()
            .filter_map(|id| self.path_of(id).map(|path| (id, path)))
            .collect()
    }
}
