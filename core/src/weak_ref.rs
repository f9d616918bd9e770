//! Non-owning entity handles.
//!
//! Entities live in a generational arena owned by the host. An `EntityId`
//! names a slot plus the generation that occupied it; once the host frees
//! the slot the generation moves on and every outstanding id for the old
//! occupant stops resolving.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena slot index plus generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub index:      u32,
    pub generation: u32,
}

impl EntityId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Anything that can answer "is this id still the live occupant of its slot".
pub trait Liveness {
    fn is_alive(&self, id: EntityId) -> bool;
}

/// A handle that never keeps its entity alive.
///
/// Deliberately not `PartialEq`: identity only means something while the
/// entity is live, so comparison goes through [`WeakEntityRef::same_live_entity`].
#[derive(Debug, Clone, Copy)]
pub struct WeakEntityRef {
    id: EntityId,
}

impl WeakEntityRef {
    pub fn wrap(id: EntityId) -> Self {
        Self { id }
    }

    /// The live id, or `None` once the entity has been destroyed.
    pub fn resolve(&self, host: &impl Liveness) -> Option<EntityId> {
        host.is_alive(self.id).then_some(self.id)
    }

    pub fn is_live(&self, host: &impl Liveness) -> bool {
        self.resolve(host).is_some()
    }

    /// True only if both refs resolve and name the same entity.
    /// Two refs to destroyed entities are never the same.
    pub fn same_live_entity(&self, other: &WeakEntityRef, host: &impl Liveness) -> bool {
        match (self.resolve(host), other.resolve(host)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// The raw id this ref was created from, live or not.
    /// Bookkeeping only; use `resolve` before touching the entity.
    pub fn raw_id(&self) -> EntityId {
        self.id
    }
}
