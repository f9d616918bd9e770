//! Event name → entities currently known to emit it.

use crate::{
    types::{EntityPath, EventName},
    weak_ref::{EntityId, Liveness, WeakEntityRef},
};
use indexmap::IndexMap;

/// "An entity at `path` can emit this event."
#[derive(Debug, Clone)]
pub struct EmitterRecord {
    pub path:    EntityPath,
    pub emitter: WeakEntityRef,
}

#[derive(Debug, Default)]
pub struct EmitterIndex {
    by_event: IndexMap<EventName, Vec<EmitterRecord>>,
}

impl EmitterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one emitter per exposed event.
    /// A leftover record at the same path (missed exit) is replaced,
    /// so each (event, path) pair has at most one record.
    pub fn on_entity_entered(&mut self, id: EntityId, path: &str, events: &[EventName]) {
        for event in events {
            let records = self.by_event.entry(event.clone()).or_default();
            if let Some(pos) = records.iter().position(|r| r.path == path) {
                log::debug!("emitter index: replacing stale '{event}' record at {path}");
                records.remove(pos);
            }
            records.push(EmitterRecord {
                path:    path.to_string(),
                emitter: WeakEntityRef::wrap(id),
            });
        }
    }

    /// Drop the records `id` left at `path`, plus any dead leftovers there.
    /// A live successor that entered at the same path first is kept, so a
    /// late exit cannot unindex it.
    pub fn on_entity_exited(&mut self, id: EntityId, path: &str, host: &impl Liveness) -> usize {
        let mut removed = 0;
        for records in self.by_event.values_mut() {
            let before = records.len();
            records.retain(|r| r.path != path || (r.emitter.raw_id() != id && r.emitter.is_live(host)));
            removed += before - records.len();
        }
        self.by_event.retain(|_, records| !records.is_empty());
        removed
    }

    /// Drop records whose entity is gone. Returns how many were dropped.
    pub fn prune(&mut self, host: &impl Liveness) -> usize {
        let mut pruned = 0;
        for records in self.by_event.values_mut() {
            let before = records.len();
            records.retain(|r| r.emitter.is_live(host));
            pruned += before - records.len();
        }
        self.by_event.retain(|_, records| !records.is_empty());
        pruned
    }

    pub fn records(&self, event: &str) -> &[EmitterRecord] {
        self.by_event.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Event names in first-seen order.
    pub fn event_names(&self) -> impl Iterator<Item = &EventName> {
        self.by_event.keys()
    }

    pub fn contains(&self, event: &str, path: &str) -> bool {
        self.records(event).iter().any(|r| r.path == path)
    }

    /// True if any record, for any event, sits at `path`.
    pub fn references_path(&self, path: &str) -> bool {
        self.by_event.values().flatten().any(|r| r.path == path)
    }

    /// Total number of records across all events.
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_event.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Alive(HashSet<EntityId>);

    impl Liveness for Alive {
        fn is_alive(&self, id: EntityId) -> bool {
            self.0.contains(&id)
        }
    }

    fn events(names: &[&str]) -> Vec<EventName> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn entry_indexes_every_exposed_event() {
        let mut index = EmitterIndex::new();
        index.on_entity_entered(EntityId::new(1, 0), "/root/A", &events(&["hit", "died"]));

        assert!(index.contains("hit", "/root/A"));
        assert!(index.contains("died", "/root/A"));
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.event_names().cloned().collect::<Vec<_>>(),
            events(&["hit", "died"])
        );
    }

    #[test]
    fn reentry_at_same_path_replaces_record() {
        let mut index = EmitterIndex::new();
        index.on_entity_entered(EntityId::new(1, 0), "/root/A", &events(&["hit"]));
        index.on_entity_entered(EntityId::new(1, 1), "/root/A", &events(&["hit"]));

        let records = index.records("hit");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].emitter.raw_id(), EntityId::new(1, 1));
    }

    #[test]
    fn exit_removes_by_path_across_events() {
        let mut index = EmitterIndex::new();
        index.on_entity_entered(EntityId::new(1, 0), "/root/A", &events(&["hit", "died"]));
        index.on_entity_entered(EntityId::new(2, 0), "/root/B", &events(&["hit"]));

        let host = Alive([EntityId::new(2, 0)].into_iter().collect());
        assert_eq!(index.on_entity_exited(EntityId::new(1, 0), "/root/A", &host), 2);
        assert!(!index.references_path("/root/A"));
        assert!(index.contains("hit", "/root/B"));
        assert_eq!(index.records("died").len(), 0);
    }

    #[test]
    fn late_exit_keeps_live_successor_at_same_path() {
        let old = EntityId::new(1, 0);
        let new = EntityId::new(1, 1);
        let host = Alive([new].into_iter().collect());
        let mut index = EmitterIndex::new();
        index.on_entity_entered(old, "/root/A", &events(&["hit"]));
        index.on_entity_entered(new, "/root/A", &events(&["hit"]));

        assert_eq!(index.on_entity_exited(old, "/root/A", &host), 0);
        let records = index.records("hit");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].emitter.raw_id(), new);

        assert_eq!(index.on_entity_exited(new, "/root/A", &host), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn exit_sweeps_dead_leftover_at_same_path() {
        let host = Alive(HashSet::new());
        let mut index = EmitterIndex::new();
        index.on_entity_entered(EntityId::new(3, 0), "/root/A", &events(&["hit"]));

        // A different, already-dead id at the path still gets cleared.
        assert_eq!(index.on_entity_exited(EntityId::new(3, 1), "/root/A", &host), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn prune_drops_dead_refs_and_is_idempotent() {
        let live = EntityId::new(2, 0);
        let host = Alive([live].into_iter().collect());
        let mut index = EmitterIndex::new();
        index.on_entity_entered(EntityId::new(1, 0), "/root/A", &events(&["hit"]));
        index.on_entity_entered(live, "/root/B", &events(&["hit"]));

        assert_eq!(index.prune(&host), 1);
        assert_eq!(index.prune(&host), 0);
        assert_eq!(index.len(), 1);
    }
}
