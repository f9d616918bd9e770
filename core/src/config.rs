use crate::{command::SceneCommand, declaration::EntityKind, types::Tick};
use serde::{Deserialize, Serialize};

/// Log capacity the runner falls back to when a config leaves it unset.
pub const RUNNER_EVENT_LOG_CAPACITY: usize = 50_000;

/// Registry tuning. Loaded from JSON; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Consecutive rejections of one key before it is reported as a
    /// persistent failure. 0 disables the report.
    pub persistent_failure_threshold: u32,
    /// Report malformed path filters (once per event/handler/filter).
    pub warn_malformed_filters: bool,
    /// Oldest log entries are dropped past this many. `None` keeps all.
    pub event_log_capacity: Option<usize>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            persistent_failure_threshold: 3,
            warn_malformed_filters: true,
            event_log_capacity: None,
        }
    }
}

impl RegistryConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: RegistryConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Config with hardcoded values for use in tests.
    pub fn default_test() -> Self {
        Self {
            persistent_failure_threshold: 2,
            warn_malformed_filters: true,
            event_log_capacity: Some(10_000),
        }
    }

    /// Fill in a log capacity if none was configured. An explicit one wins.
    pub fn with_log_capacity_or(mut self, capacity: usize) -> Self {
        self.event_log_capacity.get_or_insert(capacity);
        self
    }
}

/// A scripted run for the scene runner: kinds, then timed commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_root_name")]
    pub root_name: String,
    #[serde(default = "default_auto_disconnect")]
    pub auto_disconnect: bool,
    pub kinds: Vec<EntityKind>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Commands run before this tick is driven.
    pub tick:     Tick,
    pub commands: Vec<SceneCommand>,
}

fn default_root_name() -> String {
    "root".into()
}

fn default_auto_disconnect() -> bool {
    true
}

impl ScenarioConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let mut scenario: ScenarioConfig = serde_json::from_str(content)?;
        scenario.steps.sort_by_key(|s| s.tick);
        Ok(scenario)
    }

    /// Last tick any step is scheduled for.
    pub fn last_tick(&self) -> Tick {
        self.steps.iter().map(|s| s.tick).max().unwrap_or(0)
    }
}
