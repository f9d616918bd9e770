//! The wiring engine: drives the resolver once per tick.
//!
//! TICK ORDER (fixed):
//!   1. Pull buffered tree notifications from the host and feed them to the
//!      resolver (index updates, one reconcile request per burst).
//!   2. Drain the deferred task queue; a pending reconcile runs exactly once.
//!   3. Record everything in the event log.
//!
//! RULES:
//!   - All registry state is touched from the thread that owns the engine.
//!   - Cross-thread requests go through `remote()` and wait for a drain.

use crate::{
    config::RegistryConfig,
    error::{RegistryError, RegistryResult},
    event::{EventLogEntry, RegistryEvent},
    host::{NotificationSource, SignalHost, TreeNotification},
    resolver::{ConnectionResolver, ReconcileState},
    scheduler::{RemoteScheduler, Task, TaskQueue},
    snapshot::RegistrySnapshot,
    types::Tick,
    weak_ref::EntityId,
};
use std::collections::VecDeque;

pub struct WiringEngine {
    pub config: RegistryConfig,
    tick:       Tick,
    resolver:   ConnectionResolver,
    queue:      TaskQueue,
    log:        VecDeque<EventLogEntry>,
}

impl WiringEngine {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            tick:     0,
            resolver: ConnectionResolver::new(&config),
            queue:    TaskQueue::new(),
            log:      VecDeque::new(),
            config,
        }
    }

    /// Engine for `host`, with every entity already in the tree indexed.
    /// Nothing is connected until the first tick.
    pub fn attach<H: SignalHost + NotificationSource>(
        config: RegistryConfig,
        host: &mut H,
    ) -> RegistryResult<Self> {
        let mut engine = Self::new(config);
        engine.rebuild(host)?;
        Ok(engine)
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    pub fn reconcile_state(&self) -> ReconcileState {
        self.resolver.state()
    }

    pub fn reconcile_passes(&self) -> u64 {
        self.resolver.passes()
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Handle for requesting a pass from another thread.
    pub fn remote(&self) -> RemoteScheduler {
        self.queue.remote()
    }

    pub fn observe_root<H: SignalHost>(&mut self, host: &H, root: EntityId, path: &str) -> RegistryResult<()> {
        let events = self.resolver.observe_root(self.tick, host, root, path)?;
        self.record("engine", &events)
    }

    /// Push one notification now; it is settled on the next tick.
    pub fn notify<H: SignalHost>(&mut self, host: &H, notification: TreeNotification) -> RegistryResult<()> {
        self.apply_notification(host, notification).map(|_| ())
    }

    /// Feed the host's buffered notifications to the resolver without
    /// advancing the tick. Returns how many were applied.
    pub fn pump<H: SignalHost + NotificationSource>(&mut self, host: &mut H) -> RegistryResult<usize> {
        let notifications = host.drain_notifications();
        let count = notifications.len();
        for notification in notifications {
            self.apply_notification(&*host, notification)?;
        }
        Ok(count)
    }

    fn apply_notification<H: SignalHost>(
        &mut self,
        host: &H,
        notification: TreeNotification,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        let events = match notification {
            TreeNotification::Entered { id, path } => {
                self.resolver.notify_entered(self.tick, host, id, &path, &mut self.queue)?
            }
            TreeNotification::Exited { id, path } => {
                self.resolver.notify_exited(self.tick, host, id, &path, &mut self.queue)?
            }
        };
        self.record("resolver", &events)?;
        Ok(events)
    }

    /// Re-index the host's live tree from scratch. The stale notification
    /// buffer is discarded. Applied connections are not released: on the
    /// next tick the ones that still pair stay as they are and the rest are
    /// evicted, so a mid-run rebuild never connects a live key twice.
    pub fn rebuild<H: SignalHost + NotificationSource>(&mut self, host: &mut H) -> RegistryResult<usize> {
        let discarded = host.drain_notifications().len();
        if discarded > 0 {
            log::debug!("engine: rebuild discarded {discarded} buffered notification(s)");
        }
        self.resolver.clear_indices(&mut self.queue);

        let tree = host.live_tree();
        let (root, root_path) = tree.first().cloned().ok_or(RegistryError::RootNotObserved)?;
        self.observe_root(&*host, root, &root_path)?;
        for (id, path) in &tree {
            self.notify(&*host, TreeNotification::Entered { id: *id, path: path.clone() })?;
        }

        log::info!("engine: registry rebuilt from {} live entities", tree.len());
        self.record(
            "engine",
            &[RegistryEvent::RegistryRebuilt {
                tick:     self.tick,
                entities: tree.len(),
            }],
        )?;
        Ok(tree.len())
    }

    /// Advance one tick: pull the host's notifications, then settle.
    pub fn tick<H: SignalHost + NotificationSource>(&mut self, host: &mut H) -> RegistryResult<Vec<RegistryEvent>> {
        let notifications = host.drain_notifications();
        self.tick_with(host, notifications)
    }

    /// Advance one tick with notifications supplied by the caller.
    pub fn tick_with<H: SignalHost>(
        &mut self,
        host: &mut H,
        notifications: Vec<TreeNotification>,
    ) -> RegistryResult<Vec<RegistryEvent>> {
        self.tick += 1;
        let tick = self.tick;
        let mut tick_events = vec![RegistryEvent::TickStarted { tick }];
        self.record("engine", &tick_events)?;

        for notification in notifications {
            let events = self.apply_notification(&*host, notification)?;
            tick_events.extend(events);
        }

        // Everything queued before this point belongs to this tick's batch.
        let tasks = self.queue.drain();
        let reconcile_requested = tasks.iter().any(|(_, task)| *task == Task::Reconcile);
        if tasks.len() > 1 {
            log::debug!("tick={tick} engine: {} deferred tasks collapsed", tasks.len());
        }
        if reconcile_requested {
            let events = self.resolver.reconcile(tick, host);
            self.record("resolver", &events)?;
            tick_events.extend(events);
        }

        let completed = RegistryEvent::TickCompleted { tick };
        self.record("engine", std::slice::from_ref(&completed))?;
        tick_events.push(completed);
        Ok(tick_events)
    }

    /// Run n ticks against a host that buffers its own notifications.
    pub fn run_ticks<H: SignalHost + NotificationSource>(&mut self, host: &mut H, n: u64) -> RegistryResult<()> {
        for _ in 0..n {
            self.tick(host)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::capture(self.tick, &self.resolver)
    }

    /// Log entries for one tick, in the order they were recorded.
    pub fn events_for_tick(&self, tick: Tick) -> Vec<EventLogEntry> {
        self.log.iter().filter(|e| e.tick == tick).cloned().collect()
    }

    pub fn event_log(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.log.iter()
    }

    fn record(&mut self, source: &str, events: &[RegistryEvent]) -> RegistryResult<()> {
        for event in events {
            self.log.push_back(EventLogEntry {
                tick:       self.tick,
                source:     source.to_string(),
                event_type: event.type_name().to_string(),
                payload:    serde_json::to_string(event)?,
            });
        }
        if let Some(capacity) = self.config.event_log_capacity {
            while self.log.len() > capacity {
                self.log.pop_front();
            }
        }
        Ok(())
    }
}
