use crate::{
    engine::WiringEngine,
    error::{RegistryError, RegistryResult},
    event::RegistryEvent,
    scene::{Delivery, SceneTree},
};
use serde::{Deserialize, Serialize};

/// Mutations and queries a driver can issue against a scene.
/// Variants are appended, never reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SceneCommand {
    // ── Tree mutation ─────────────────────────────
    Add {
        parent: String,
        name:   String,
        kind:   String,
    },
    Remove {
        path: String,
    },
    Detach {
        path: String,
    },
    /// `path` is where the subtree was before it was detached.
    Attach {
        parent: String,
        path:   String,
    },

    // ── Signals ───────────────────────────────────
    Emit {
        path:  String,
        event: String,
    },

    // ── Driver ────────────────────────────────────
    Tick {
        count: u64,
    },

    // ── Parked subtrees ───────────────────────────
    /// Destroy the subtree most recently detached from `path`. A live node
    /// now at `path` is left alone.
    Discard {
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Applied,
    Delivered(Vec<Delivery>),
    Ticked(Vec<RegistryEvent>),
}

/// Run one command. Tree mutations only buffer notifications;
/// they reach the registry on the next tick.
pub fn apply_command(
    engine: &mut WiringEngine,
    scene: &mut SceneTree,
    command: &SceneCommand,
) -> RegistryResult<CommandOutcome> {
    match command {
        SceneCommand::Add { parent, name, kind } => {
            let parent = scene.require(parent)?;
            scene.add_child(parent, name, kind)?;
            Ok(CommandOutcome::Applied)
        }
        SceneCommand::Remove { path } => {
            let id = scene.require(path)?;
            scene.remove(id)?;
            Ok(CommandOutcome::Applied)
        }
        SceneCommand::Detach { path } => {
            let id = scene.require(path)?;
            scene.detach(id)?;
            Ok(CommandOutcome::Applied)
        }
        SceneCommand::Attach { parent, path } => {
            let parent = scene.require(parent)?;
            let id = scene
                .parked(path)
                .ok_or_else(|| RegistryError::PathNotFound { path: path.clone() })?;
            scene.attach(parent, id)?;
            Ok(CommandOutcome::Applied)
        }
        SceneCommand::Emit { path, event } => {
            let id = scene.require(path)?;
            let deliveries = scene.emit(id, event);
            log::debug!("{path} emitted '{event}' to {} handler(s)", deliveries.len());
            Ok(CommandOutcome::Delivered(deliveries))
        }
        SceneCommand::Tick { count } => {
            let mut events = Vec::new();
            for _ in 0..*count {
                events.extend(engine.tick(scene)?);
            }
            Ok(CommandOutcome::Ticked(events))
        }
        SceneCommand::Discard { path } => {
            let id = scene
                .parked(path)
                .ok_or_else(|| RegistryError::PathNotFound { path: path.clone() })?;
            scene.remove(id)?;
            Ok(CommandOutcome::Applied)
        }
    }
}
