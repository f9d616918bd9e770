//! Registry diagnostics: everything the engine observed, tick by tick.
//!
//! RULE: These are records of what the registry did, not signals for
//! entities. Entity events travel through the host once connected.

use crate::{
    connection::ConnectionKey,
    scheduler::TaskId,
    types::{EntityPath, EventName, HandlerId, Tick},
};
use serde::{Deserialize, Serialize};

/// Variants are appended, never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    // ── Driver ─────────────────────────────────────
    TickStarted {
        tick: Tick,
    },
    TickCompleted {
        tick: Tick,
    },
    RootObserved {
        tick: Tick,
        path: EntityPath,
    },
    RegistryRebuilt {
        tick:     Tick,
        entities: usize,
    },

    // ── Tree notifications ─────────────────────────
    EntityEntered {
        tick:          Tick,
        path:          EntityPath,
        signals:       usize,
        subscriptions: usize,
    },
    EntityExited {
        tick: Tick,
        path: EntityPath,
    },
    ReconcileScheduled {
        tick:    Tick,
        task_id: TaskId,
    },
    ReconcileCoalesced {
        tick: Tick,
    },

    // ── Declaration diagnostics ────────────────────
    DuplicateDeclarationIgnored {
        tick:            Tick,
        subscriber_path: EntityPath,
        event:           EventName,
        handler:         HandlerId,
    },
    PathFilterWarning {
        tick:            Tick,
        subscriber_path: EntityPath,
        handler:         HandlerId,
        path_filter:     String,
    },

    // ── Reconciliation ─────────────────────────────
    RecordsPruned {
        tick:          Tick,
        emitters:      usize,
        subscriptions: usize,
    },
    Connected {
        tick: Tick,
        key:  ConnectionKey,
    },
    ConnectRejected {
        tick:     Tick,
        key:      ConnectionKey,
        reason:   String,
        attempts: u32,
    },
    PersistentConnectFailure {
        tick:     Tick,
        key:      ConnectionKey,
        attempts: u32,
    },
    ConnectionEvicted {
        tick:   Tick,
        key:    ConnectionKey,
        reason: EvictionReason,
    },
    ReconcileCompleted {
        tick:      Tick,
        pass:      u64,
        connected: usize,
        evicted:   usize,
        rejected:  usize,
        active:    usize,
    },
}

impl RegistryEvent {
    /// Stable name used for the `event_type` column of the log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TickStarted { .. }                 => "tick_started",
            Self::TickCompleted { .. }               => "tick_completed",
            Self::RootObserved { .. }                => "root_observed",
            Self::RegistryRebuilt { .. }             => "registry_rebuilt",
            Self::EntityEntered { .. }               => "entity_entered",
            Self::EntityExited { .. }                => "entity_exited",
            Self::ReconcileScheduled { .. }          => "reconcile_scheduled",
            Self::ReconcileCoalesced { .. }          => "reconcile_coalesced",
            Self::DuplicateDeclarationIgnored { .. } => "duplicate_declaration_ignored",
            Self::PathFilterWarning { .. }           => "path_filter_warning",
            Self::RecordsPruned { .. }               => "records_pruned",
            Self::Connected { .. }                   => "connected",
            Self::ConnectRejected { .. }             => "connect_rejected",
            Self::PersistentConnectFailure { .. }    => "persistent_connect_failure",
            Self::ConnectionEvicted { .. }           => "connection_evicted",
            Self::ReconcileCompleted { .. }          => "reconcile_completed",
        }
    }
}

/// Why an applied key left the connected-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    EmitterDestroyed,
    SubscriberDestroyed,
    /// An endpoint left the tree but is still alive.
    Detached,
    /// A different entity now occupies one of the key's paths.
    Superseded,
}

/// One line of the in-memory event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub tick:       Tick,
    pub source:     String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized RegistryEvent
}
