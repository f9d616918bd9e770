//! Event name → subscribers waiting for it.

use crate::{
    declaration::{is_valid_path_filter, SubscriptionDecl},
    types::{EntityPath, EventName, HandlerId},
    weak_ref::{EntityId, Liveness, WeakEntityRef},
};
use indexmap::IndexMap;

#[derive(Debug, Clone)]
pub struct SubscriptionRecord {
    pub subscriber:      WeakEntityRef,
    pub subscriber_path: EntityPath,
    pub handler:         HandlerId,
    /// Empty means any emitter.
    pub path_filter:     String,
}

impl SubscriptionRecord {
    pub fn matches(&self, emitter_path: &str) -> bool {
        self.path_filter.is_empty() || self.path_filter == emitter_path
    }
}

/// What happened when an entity's declarations were indexed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub registered:        usize,
    /// Records left over from an earlier entry at the same path.
    pub superseded:        usize,
    /// (event, handler) pairs declared more than once; later copies ignored.
    pub duplicates:        Vec<(EventName, HandlerId)>,
    /// Registered anyway; they only match an emitter at that exact path.
    pub malformed_filters: Vec<SubscriptionDecl>,
}

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    by_event: IndexMap<EventName, Vec<SubscriptionRecord>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_entity_entered(
        &mut self,
        id: EntityId,
        path: &str,
        declarations: &[SubscriptionDecl],
    ) -> EntryReport {
        let mut report = EntryReport {
            superseded: self.remove_where(|r| r.subscriber_path == path),
            ..EntryReport::default()
        };
        if report.superseded > 0 {
            log::debug!(
                "subscription index: {} stale record(s) at {path} superseded",
                report.superseded
            );
        }

        let mut seen: Vec<(&str, &str)> = Vec::with_capacity(declarations.len());
        for decl in declarations {
            let pair = (decl.event.as_str(), decl.handler.as_str());
            if seen.contains(&pair) {
                log::debug!(
                    "subscription index: {path} declares '{}' -> {} twice, ignoring",
                    decl.event,
                    decl.handler
                );
                report.duplicates.push((decl.event.clone(), decl.handler.clone()));
                continue;
            }
            seen.push(pair);

            if !is_valid_path_filter(&decl.path_filter) {
                report.malformed_filters.push(decl.clone());
            }

            self.by_event
                .entry(decl.event.clone())
                .or_default()
                .push(SubscriptionRecord {
                    subscriber:      WeakEntityRef::wrap(id),
                    subscriber_path: path.to_string(),
                    handler:         decl.handler.clone(),
                    path_filter:     decl.path_filter.clone(),
                });
            report.registered += 1;
        }
        report
    }

    /// Drop the records `id` left at `path`, plus any dead leftovers there.
    /// A live subscriber that has since entered at `path` keeps its records.
    pub fn on_entity_exited(&mut self, id: EntityId, path: &str, host: &impl Liveness) -> usize {
        self.remove_where(|r| {
            r.subscriber_path == path && (r.subscriber.raw_id() == id || !r.subscriber.is_live(host))
        })
    }

    pub fn prune(&mut self, host: &impl Liveness) -> usize {
        self.remove_where(|r| !r.subscriber.is_live(host))
    }

    fn remove_where(&mut self, doomed: impl Fn(&SubscriptionRecord) -> bool) -> usize {
        let mut removed = 0;
        for records in self.by_event.values_mut() {
            let before = records.len();
            records.retain(|r| !doomed(r));
            removed += before - records.len();
        }
        self.by_event.retain(|_, records| !records.is_empty());
        removed
    }

    pub fn records(&self, event: &str) -> &[SubscriptionRecord] {
        self.by_event.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn event_names(&self) -> impl Iterator<Item = &EventName> {
        self.by_event.keys()
    }

    pub fn references_path(&self, path: &str) -> bool {
        self.by_event
            .values()
            .flatten()
            .any(|r| r.subscriber_path == path)
    }

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

    #[test]
    fn duplicate_declarations_are_ignored() {
        let mut index = SubscriptionIndex::new();
        let decls = vec![
            SubscriptionDecl::any("hit", "on_hit"),
            SubscriptionDecl::new("hit", "/root/Boss", "on_hit"),
            SubscriptionDecl::any("died", "on_hit"),
        ];
        let report = index.on_entity_entered(EntityId::new(5, 0), "/root/Hud", &decls);

        assert_eq!(report.registered, 2);
        assert_eq!(report.duplicates, vec![("hit".to_string(), "on_hit".to_string())]);
        assert_eq!(index.records("hit").len(), 1);
        assert!(index.records("hit")[0].path_filter.is_empty());
    }

    #[test]
    fn malformed_filter_is_reported_but_registered() {
        let mut index = SubscriptionIndex::new();
        let decls = vec![SubscriptionDecl::new("hit", "root/Boss", "on_hit")];
        let report = index.on_entity_entered(EntityId::new(5, 0), "/root/Hud", &decls);

        assert_eq!(report.malformed_filters.len(), 1);
        assert_eq!(index.records("hit").len(), 1);
    }

    #[test]
    fn second_entry_at_same_path_supersedes_first() {
        let mut index = SubscriptionIndex::new();
        let decls = vec![SubscriptionDecl::any("hit", "on_hit")];
        index.on_entity_entered(EntityId::new(5, 0), "/root/Hud", &decls);
        let report = index.on_entity_entered(EntityId::new(5, 1), "/root/Hud", &decls);

        assert_eq!(report.superseded, 1);
        let records = index.records("hit");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subscriber.raw_id(), EntityId::new(5, 1));
    }

    #[test]
    fn exit_clears_all_events_for_subscriber() {
        let mut index = SubscriptionIndex::new();
        index.on_entity_entered(
            EntityId::new(5, 0),
            "/root/Hud",
            &[SubscriptionDecl::any("hit", "on_hit"), SubscriptionDecl::any("died", "on_died")],
        );
        index.on_entity_entered(
            EntityId::new(6, 0),
            "/root/Log",
            &[SubscriptionDecl::any("hit", "on_hit")],
        );

        let host = Alive([EntityId::new(6, 0)].into_iter().collect());
        assert_eq!(index.on_entity_exited(EntityId::new(5, 0), "/root/Hud", &host), 2);
        assert!(!index.references_path("/root/Hud"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn late_exit_keeps_live_successor_at_same_path() {
        let old = EntityId::new(5, 0);
        let new = EntityId::new(5, 1);
        let host = Alive([new].into_iter().collect());
        let decls = vec![SubscriptionDecl::any("hit", "on_hit")];
        let mut index = SubscriptionIndex::new();
        index.on_entity_entered(new, "/root/Hud", &decls);

        assert_eq!(index.on_entity_exited(old, "/root/Hud", &host), 0);
        assert_eq!(index.records("hit")[0].subscriber.raw_id(), new);
    }

    #[test]
    fn prune_drops_dead_subscribers_only() {
        let live = EntityId::new(6, 0);
        let host = Alive([live].into_iter().collect());
        let mut index = SubscriptionIndex::new();
        index.on_entity_entered(
            EntityId::new(5, 0),
            "/root/Hud",
            &[SubscriptionDecl::any("hit", "on_hit"), SubscriptionDecl::any("died", "on_died")],
        );
        index.on_entity_entered(live, "/root/Log", &[SubscriptionDecl::any("hit", "on_hit")]);

        assert_eq!(index.prune(&host), 2);
        assert_eq!(index.prune(&host), 0);
        assert!(!index.references_path("/root/Hud"));
        assert_eq!(index.records("hit").len(), 1);
        assert_eq!(index.records("died").len(), 0);
        assert_eq!(index.event_names().cloned().collect::<Vec<_>>(), vec!["hit".to_string()]);
    }
}
