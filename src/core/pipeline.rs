//! Pipeline definitions and loading.
//!
//! A pipeline is an ordered list of tasks. It can be built in code or
//! loaded from YAML.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskKey};

/// A complete pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name (used in logs)
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Tasks, in execution order
    pub tasks: Vec<Task>,
}

/// YAML shape of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PipelineFile {
    name: String,

    #[serde(default)]
    description: String,

    tasks: Vec<TaskDef>,
}

/// YAML shape of a single task
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskDef {
    name: String,

    id: String,

    #[serde(default = "default_delay_ms")]
    delay_ms: u64,

    #[serde(default = "default_requires_network")]
    requires_network: bool,

    #[serde(default)]
    fail: bool,
}

fn default_delay_ms() -> u64 {
    3000
}
fn default_requires_network() -> bool {
    true
}

impl Pipeline {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tasks,
        }
    }

    /// The three-stage chain: first("001") → second("001") → third("003")
    pub fn demo(work_delay: Duration) -> Self {
        Self {
            name: "demo".to_string(),
            description: "Three chained workers gated on network".to_string(),
            tasks: vec![
                Task::new("first", "001", work_delay),
                Task::new("second", "001", work_delay),
                Task::new("third", "003", work_delay),
            ],
        }
    }

    /// Load a pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a pipeline from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: PipelineFile =
            serde_yaml::from_str(content).context("Failed to parse pipeline YAML")?;

        let tasks = file
            .tasks
            .into_iter()
            .map(|def| Task {
                key: TaskKey::new(),
                name: def.name,
                id: def.id,
                delay: Duration::from_millis(def.delay_ms),
                requires_network: def.requires_network,
                fails: def.fail,
            })
            .collect();

        Ok(Self {
            name: file.name,
            description: file.description,
            tasks,
        })
    }

    /// Replace every task's delay
    pub fn with_work_delay(mut self, delay: Duration) -> Self {
        for task in &mut self.tasks {
            task.delay = delay;
        }
        self
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }

        if self.tasks.is_empty() {
            anyhow::bail!("Pipeline must have at least one task");
        }

        let mut seen = HashSet::new();
        for (i, task) in self.tasks.iter().enumerate() {
            if task.name.is_empty() {
                anyhow::bail!("Task {} has an empty name", i);
            }
            if task.id.is_empty() {
                anyhow::bail!("Task '{}' has an empty id", task.name);
            }
            if !seen.insert(task.name.as_str()) {
                anyhow::bail!("Duplicate task name '{}'", task.name);
            }
        }

        Ok(())
    }

}
