//! Random tree churn against the reference scene.
//!
//! Every command is drawn from the scene's current shape, so it always
//! applies cleanly. With the same seed and kinds, a run produces the same
//! commands and the same event log.

use crate::{
    command::{apply_command, CommandOutcome, SceneCommand},
    declaration::KindTable,
    engine::WiringEngine,
    error::RegistryResult,
    host::NotificationSource,
    rng::ChurnRng,
    scene::SceneTree,
    types::EntityPath,
};
use serde::{Deserialize, Serialize};

/// Relative odds of each mutation. Need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnWeights {
    pub add:    f64,
    pub remove: f64,
    pub detach: f64,
    pub attach: f64,
    pub emit:   f64,
}

impl Default for ChurnWeights {
    fn default() -> Self {
        Self {
            add:    0.40,
            remove: 0.20,
            detach: 0.10,
            attach: 0.10,
            emit:   0.20,
        }
    }
}

/// Totals over a churn run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnStats {
    pub commands:   usize,
    pub deliveries: usize,
    pub ticks:      u64,
}

pub struct RandomChurn {
    rng:          ChurnRng,
    weights:      ChurnWeights,
    kinds:        Vec<String>,
    /// Live entities beyond this only get removed, never added.
    max_entities: usize,
    next_name:    u64,
    stats:        ChurnStats,
}

impl RandomChurn {
    /// Churn over every registered kind except the root's.
    pub fn new(seed: u64, kinds: &KindTable) -> Self {
        let kinds = kinds.names().into_iter().filter(|k| k != "Root").collect();
        Self {
            rng: ChurnRng::new(seed, 0),
            weights: ChurnWeights::default(),
            kinds,
            max_entities: 64,
            next_name: 0,
            stats: ChurnStats::default(),
        }
    }

    pub fn with_weights(mut self, weights: ChurnWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }

    pub fn stats(&self) -> ChurnStats {
        self.stats
    }

    /// Draw one command that is valid for `scene` as it is now.
    pub fn next_command(&mut self, scene: &SceneTree) -> Option<SceneCommand> {
        let tree = scene.live_tree();
        let paths: Vec<EntityPath> = tree.iter().map(|(_, path)| path.clone()).collect();
        let removable: Vec<EntityPath> = paths.iter().skip(1).cloned().collect();
        let parked = scene.parked_paths();
        let emitters: Vec<(EntityPath, String)> = tree
            .iter()
            .filter_map(|(id, path)| scene.kind_of(*id).map(|kind| (path, kind)))
            .flat_map(|(path, kind)| kind.signals.iter().map(move |s| (path.clone(), s.clone())))
            .collect();

        let can_add = !self.kinds.is_empty() && scene.entity_count() < self.max_entities;
        let options = [
            (self.weights.add, can_add),
            (self.weights.remove, !removable.is_empty() || !parked.is_empty()),
            (self.weights.detach, !removable.is_empty()),
            (self.weights.attach, !parked.is_empty()),
            (self.weights.emit, !emitters.is_empty()),
        ];
        let total: f64 = options.iter().filter(|(_, ok)| *ok).map(|(w, _)| w).sum();
        if total <= 0.0 {
            return None;
        }

        let mut roll = self.rng.next_f64() * total;
        let mut choice = None;
        for (i, (weight, ok)) in options.iter().enumerate() {
            if !ok {
                continue;
            }
            if roll < *weight {
                choice = Some(i);
                break;
            }
            roll -= weight;
        }
        // Float rounding can leave the roll past the last bucket.
        let choice = choice.or_else(|| options.iter().rposition(|(_, ok)| *ok))?;

        match choice {
            0 => {
                let parent = self.rng.pick(&paths)?.clone();
                let kind = self.rng.pick(&self.kinds)?.clone();
                self.next_name += 1;
                Some(SceneCommand::Add {
                    parent,
                    name: format!("{kind}{}", self.next_name),
                    kind,
                })
            }
            1 => {
                if removable.is_empty() || (!parked.is_empty() && self.rng.chance(0.25)) {
                    let path = self.rng.pick(&parked)?.clone();
                    Some(SceneCommand::Discard { path })
                } else {
                    let path = self.rng.pick(&removable)?.clone();
                    Some(SceneCommand::Remove { path })
                }
            }
            2 => {
                let path = self.rng.pick(&removable)?.clone();
                Some(SceneCommand::Detach { path })
            }
            3 => {
                let path = self.rng.pick(&parked)?.clone();
                let parent = self.rng.pick(&paths)?.clone();
                Some(SceneCommand::Attach { parent, path })
            }
            _ => {
                let (path, event) = self.rng.pick(&emitters)?.clone();
                Some(SceneCommand::Emit { path, event })
            }
        }
    }

    /// Apply up to `commands` random commands, then advance one tick.
    pub fn step(
        &mut self,
        engine: &mut WiringEngine,
        scene: &mut SceneTree,
        commands: usize,
    ) -> RegistryResult<()> {
        for _ in 0..commands {
            let Some(command) = self.next_command(scene) else {
                break;
            };
            log::trace!("churn: {command:?}");
            if let CommandOutcome::Delivered(deliveries) = apply_command(engine, scene, &command)? {
                self.stats.deliveries += deliveries.len();
            }
            self.stats.commands += 1;
        }
        engine.tick(scene)?;
        self.stats.ticks += 1;
        Ok(())
    }

    pub fn run(
        &mut self,
        engine: &mut WiringEngine,
        scene: &mut SceneTree,
        ticks: u64,
        commands_per_tick: usize,
    ) -> RegistryResult<ChurnStats> {
        for _ in 0..ticks {
            self.step(engine, scene, commands_per_tick)?;
        }
        Ok(self.stats)
    }
}
