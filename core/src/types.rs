//! Shared primitive types used across the registry.

/// A driver tick. One tick = one settled batch of tree mutations.
pub type Tick = u64;

/// Name of an event (signal) an entity can emit.
pub type EventName = String;

/// Identifier of a handler declared on a subscriber's entity kind.
pub type HandlerId = String;

/// Absolute tree path, e.g. `/root/GameManager`.
pub type EntityPath = String;
