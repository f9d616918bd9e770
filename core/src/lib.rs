//! Automatic signal wiring for a live entity tree.
//!
//! Entities declare which events they emit and which events they want to
//! handle. The registry indexes both as entities enter and leave the tree,
//! and a deferred reconciliation pass connects every matching pair exactly
//! once while both ends are alive.

pub mod churn;
pub mod command;
pub mod config;
pub mod connection;
pub mod declaration;
pub mod emitter_index;
pub mod engine;
pub mod error;
pub mod event;
pub mod host;
pub mod resolver;
pub mod rng;
pub mod scene;
pub mod scheduler;
pub mod snapshot;
pub mod subscription_index;
pub mod types;
pub mod weak_ref;
