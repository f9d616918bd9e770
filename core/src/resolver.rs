//! Connection resolver: settles declared subscriptions against live emitters.
//!
//! PASS ORDER (fixed):
//!   1. Prune dead references from both indices.
//!   2. Pair live emitters with live subscriptions, per event, in insertion
//!      order (event, then emitter, then subscriber).
//!   3. Evict applied keys with no live pair left. A moved entity keeps
//!      its ids, so its old wire must be gone before the new key connects.
//!   4. Connect every pair whose key is not yet applied.
//!   5. Back to Idle.
//!
//! RULES:
//!   - Tree notifications only update indices and schedule a pass.
//!   - At most one pass is pending at a time; further requests coalesce.
//!   - A key is applied at most once while both endpoints stay live.
//!   - Nothing inside a pass is fatal. A rejected pair is retried next pass.

use crate::{
    config::RegistryConfig,
    connection::{AppliedConnection, ConnectedSet, ConnectionKey},
    emitter_index::EmitterIndex,
    error::{RegistryError, RegistryResult},
    event::{EvictionReason, RegistryEvent},
    host::SignalHost,
    scheduler::{Task, TaskId, TaskQueue},
    subscription_index::SubscriptionIndex,
    types::{EntityPath, EventName, HandlerId, Tick},
    weak_ref::{EntityId, Liveness, WeakEntityRef},
};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    Scheduled(TaskId),
}

/// Counts for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub connected: usize,
    pub evicted:   usize,
    pub rejected:  usize,
}

#[derive(Debug)]
pub struct ConnectionResolver {
    failure_threshold: u32,
    warn_malformed:    bool,
    root:              Option<(EntityId, EntityPath)>,
    emitters:          EmitterIndex,
    subscriptions:     SubscriptionIndex,
    connected:         ConnectedSet,
    /// Consecutive rejections per key; cleared on success or when the pair goes away.
    failures:          HashMap<ConnectionKey, u32>,
    /// (event, handler, filter) already warned about. Bounded by the
    /// declarations of the registered kinds, not by how many entities enter.
    warned_filters:    HashSet<(EventName, HandlerId, String)>,
    state:             ReconcileState,
    passes:            u64,
}

impl ConnectionResolver {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            failure_threshold: config.persistent_failure_threshold,
            warn_malformed:    config.warn_malformed_filters,
            root:              None,
            emitters:          EmitterIndex::new(),
            subscriptions:     SubscriptionIndex::new(),
            connected:         ConnectedSet::new(),
            failures:          HashMap::new(),
            warned_filters:    HashSet::new(),
            state:             ReconcileState::Idle,
            passes:            0,
        }
    }

    /// Record the tree root. Must happen before any notification.
    pub fn observe_root(
        &mut self,
        tick: Tick,
        host: &impl SignalHost,
        root: EntityId,
        path: &str,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        if !host.is_alive(root) {
            return Err(RegistryError::DeadEntity { id: root.to_string() });
        }
        self.root = Some((root, path.to_string()));
        log::debug!("resolver: root observed at {path}");
        Ok(vec![RegistryEvent::RootObserved {
            tick,
            path: path.to_string(),
        }])
    }

    pub fn root(&self) -> Option<EntityId> {
        self.root.as_ref().map(|(id, _)| *id)
    }

    pub fn root_path(&self) -> Option<&str> {
        self.root.as_ref().map(|(_, path)| path.as_str())
    }

    fn ensure_root(&self) -> RegistryResult<()> {
        match self.root {
            Some(_) => Ok(()),
            None => Err(RegistryError::RootNotObserved),
        }
    }

    pub fn notify_entered(
        &mut self,
        tick: Tick,
        host: &impl SignalHost,
        id: EntityId,
        path: &str,
        queue: &mut TaskQueue,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        self.ensure_root()?;
        let mut events = Vec::new();

        // Destroyed between the notification and now; nothing to index.
        if !host.is_alive(id) {
            log::debug!("resolver: entry of {path} ({id}) arrived after it was destroyed");
            return Ok(events);
        }

        let signals = host.emittable_events(id);
        let declarations = host.declared_subscriptions(id);

        self.emitters.on_entity_entered(id, path, &signals);
        let report = self.subscriptions.on_entity_entered(id, path, &declarations);

        events.push(RegistryEvent::EntityEntered {
            tick,
            path:          path.to_string(),
            signals:       signals.len(),
            subscriptions: report.registered,
        });

        for (event, handler) in report.duplicates {
            events.push(RegistryEvent::DuplicateDeclarationIgnored {
                tick,
                subscriber_path: path.to_string(),
                event,
                handler,
            });
        }

        if self.warn_malformed {
            for decl in report.malformed_filters {
                let warned = (decl.event.clone(), decl.handler.clone(), decl.path_filter.clone());
                if !self.warned_filters.insert(warned) {
                    continue;
                }
                log::warn!(
                    "{path}: handler '{}' filters '{}' on '{}', which is not an absolute path; \
                     it will only connect to an emitter at exactly that path",
                    decl.handler,
                    decl.path_filter,
                    decl.event
                );
                events.push(RegistryEvent::PathFilterWarning {
                    tick,
                    subscriber_path: path.to_string(),
                    handler:         decl.handler,
                    path_filter:     decl.path_filter,
                });
            }
        }

        self.request_reconcile(tick, queue, &mut events);
        Ok(events)
    }

    /// Un-index what `id` left at `path`. Records of a live successor that
    /// already entered at the same path stay put.
    pub fn notify_exited(
        &mut self,
        tick: Tick,
        host: &impl SignalHost,
        id: EntityId,
        path: &str,
        queue: &mut TaskQueue,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        self.ensure_root()?;
        let emitters = self.emitters.on_entity_exited(id, path, host);
        let subscriptions = self.subscriptions.on_entity_exited(id, path, host);
        log::debug!(
            "resolver: {path} ({id}) exited, dropped {emitters} emitter and {subscriptions} subscription record(s)"
        );

        let mut events = vec![RegistryEvent::EntityExited {
            tick,
            path: path.to_string(),
        }];
        self.request_reconcile(tick, queue, &mut events);
        Ok(events)
    }

    /// Idle → Scheduled. Already scheduled means coalesce.
    fn request_reconcile(&mut self, tick: Tick, queue: &mut TaskQueue, events: &mut Vec<RegistryEvent>) {
        if let ReconcileState::Scheduled(task_id) = self.state {
            if queue.is_pending(task_id) {
                events.push(RegistryEvent::ReconcileCoalesced { tick });
                return;
            }
        }
        let task_id = queue.schedule(Task::Reconcile);
        self.state = ReconcileState::Scheduled(task_id);
        events.push(RegistryEvent::ReconcileScheduled { tick, task_id });
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// One reconciliation pass. See the module docs for the order.
    pub fn reconcile<H: SignalHost>(&mut self, tick: Tick, host: &mut H) -> Vec<RegistryEvent> {
        self.passes += 1;
        let mut events = Vec::new();
        let mut summary = PassSummary::default();

        // 1. Prune.
        let pruned_emitters = self.emitters.prune(&*host);
        let pruned_subscriptions = self.subscriptions.prune(&*host);
        if pruned_emitters + pruned_subscriptions > 0 {
            log::debug!(
                "tick={tick} resolver: pruned {pruned_emitters} emitter and \
                 {pruned_subscriptions} subscription record(s)"
            );
            events.push(RegistryEvent::RecordsPruned {
                tick,
                emitters:      pruned_emitters,
                subscriptions: pruned_subscriptions,
            });
        }

        // 2. Pair.
        let live = self.live_pairings(&*host);

        // 3. Evict.
        let stale: Vec<ConnectionKey> = self
            .connected
            .keys()
            .filter(|key| !live.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            let Some(applied) = self.connected.remove(&key) else {
                continue;
            };
            let reason = if !applied.emitter.is_live(&*host) {
                EvictionReason::EmitterDestroyed
            } else if !applied.subscriber.is_live(&*host) {
                EvictionReason::SubscriberDestroyed
            } else {
                EvictionReason::Detached
            };
            Self::release(host, &key, &applied);
            log::info!("tick={tick} evicted {key} ({reason:?})");
            events.push(RegistryEvent::ConnectionEvicted { tick, key, reason });
            summary.evicted += 1;
        }

        // 4. Connect.
        for (key, &(emitter, subscriber)) in &live {
            if let Some(applied) = self.connected.get(key) {
                if applied.same_endpoints(emitter, subscriber) {
                    continue;
                }
                // New occupant at a reused path; the old key must not block it.
                if let Some(previous) = self.connected.remove(key) {
                    Self::release(host, key, &previous);
                    log::info!("tick={tick} superseded {key}");
                    events.push(RegistryEvent::ConnectionEvicted {
                        tick,
                        key:    key.clone(),
                        reason: EvictionReason::Superseded,
                    });
                    summary.evicted += 1;
                }
            }

            match host.connect(emitter, &key.event, subscriber, &key.handler) {
                Ok(()) => {
                    self.failures.remove(key);
                    self.connected.insert(
                        key.clone(),
                        AppliedConnection {
                            emitter:    WeakEntityRef::wrap(emitter),
                            subscriber: WeakEntityRef::wrap(subscriber),
                        },
                    );
                    log::info!("tick={tick} connected {key}");
                    events.push(RegistryEvent::Connected {
                        tick,
                        key: key.clone(),
                    });
                    summary.connected += 1;
                }
                Err(rejected) => {
                    let attempts = self.failures.entry(key.clone()).or_insert(0);
                    *attempts += 1;
                    let attempts = *attempts;
                    log::warn!(
                        "tick={tick} host rejected {key} (attempt {attempts}): {}",
                        rejected.reason
                    );
                    events.push(RegistryEvent::ConnectRejected {
                        tick,
                        key: key.clone(),
                        reason: rejected.reason,
                        attempts,
                    });
                    if self.failure_threshold > 0 && attempts == self.failure_threshold {
                        log::warn!("tick={tick} {key} keeps failing after {attempts} attempts");
                        events.push(RegistryEvent::PersistentConnectFailure {
                            tick,
                            key: key.clone(),
                            attempts,
                        });
                    }
                    summary.rejected += 1;
                }
            }
        }

        self.failures.retain(|key, _| live.contains_key(key));

        // 5. Idle.
        self.state = ReconcileState::Idle;

        log::debug!(
            "tick={tick} pass={} connected={} evicted={} rejected={} active={}",
            self.passes,
            summary.connected,
            summary.evicted,
            summary.rejected,
            self.connected.len()
        );
        events.push(RegistryEvent::ReconcileCompleted {
            tick,
            pass:      self.passes,
            connected: summary.connected,
            evicted:   summary.evicted,
            rejected:  summary.rejected,
            active:    self.connected.len(),
        });
        events
    }

    /// Every (emitter, subscriber) pair that should be connected right now.
    fn live_pairings(&self, host: &impl Liveness) -> IndexMap<ConnectionKey, (EntityId, EntityId)> {
        let mut live = IndexMap::new();
        for event in self.emitters.event_names() {
            let subscriptions = self.subscriptions.records(event);
            if subscriptions.is_empty() {
                continue;
            }
            for emitter in self.emitters.records(event) {
                let Some(emitter_id) = emitter.emitter.resolve(host) else {
                    continue;
                };
                for sub in subscriptions.iter().filter(|s| s.matches(&emitter.path)) {
                    let Some(subscriber_id) = sub.subscriber.resolve(host) else {
                        continue;
                    };
                    let key = ConnectionKey::new(
                        emitter.path.as_str(),
                        event.as_str(),
                        sub.subscriber_path.as_str(),
                        sub.handler.as_str(),
                    );
                    live.insert(key, (emitter_id, subscriber_id));
                }
            }
        }
        live
    }

    /// Disconnect an evicted key unless the host already dropped it:
    /// always when both ends are alive, otherwise only for hosts that
    /// keep connections to destroyed entities.
    fn release<H: SignalHost>(host: &mut H, key: &ConnectionKey, applied: &AppliedConnection) {
        let emitter = applied.emitter.resolve(&*host);
        let subscriber = applied.subscriber.resolve(&*host);
        match (emitter, subscriber) {
            (Some(emitter), Some(subscriber)) => {
                host.disconnect(emitter, &key.event, subscriber, &key.handler);
            }
            _ if !host.auto_disconnects() => {
                host.disconnect(
                    applied.emitter.raw_id(),
                    &key.event,
                    applied.subscriber.raw_id(),
                    &key.handler,
                );
            }
            _ => {}
        }
    }

    /// Empty both indices and cancel a pending pass, ready for the live
    /// tree to be entered again. Applied keys and failure counts are kept:
    /// the next pass evicts the keys that no longer pair and leaves the
    /// rest connected. The root is kept.
    pub fn clear_indices(&mut self, queue: &mut TaskQueue) {
        if let ReconcileState::Scheduled(task_id) = self.state {
            queue.cancel(task_id);
        }
        self.state = ReconcileState::Idle;
        self.emitters.clear();
        self.subscriptions.clear();
    }

    pub fn emitters(&self) -> &EmitterIndex {
        &self.emitters
    }

    pub fn subscriptions(&self) -> &SubscriptionIndex {
        &self.subscriptions
    }

    pub fn connected(&self) -> &ConnectedSet {
        &self.connected
    }

    pub fn is_connected(&self, key: &ConnectionKey) -> bool {
        self.connected.contains(key)
    }

    /// Consecutive rejections recorded for `key`.
    pub fn failure_count(&self, key: &ConnectionKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}
