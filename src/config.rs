//! Configuration for taskchain.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TASKCHAIN_TICK_MS, TASKCHAIN_WORK_DELAY_MS,
//!    TASKCHAIN_GATE_PROBE)
//! 2. Project config file (.taskchain/config.yaml, searched upward from the
//!    current directory)
//! 3. User config file (~/.taskchain/config.yaml)
//! 4. Defaults (1s ticks, 3s work, always-open gate)

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{AlwaysOpen, Gate, NetworkReachable, OrchestratorSettings};
use crate::domain::NotifierProfile;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const CONFIG_DIR: &str = ".taskchain";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub gate: Option<GateConfig>,
    #[serde(default)]
    pub notifiers: NotifiersConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimingConfig {
    pub tick_ms: Option<u64>,
    pub work_delay_ms: Option<u64>,
    pub gate_poll_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    pub kind: GateKind,
    pub probe: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Always,
    Network,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifiersConfig {
    pub primary: Option<ProfileOverride>,
    pub secondary: Option<ProfileOverride>,
}

/// Partial notifier profile; unset fields keep the built-in value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileOverride {
    pub start_value: Option<u32>,
    pub title: Option<String>,
    pub tick_template: Option<String>,
    pub completion_label: Option<String>,
    pub session_id: Option<String>,
}

impl ProfileOverride {
    fn apply(&self, mut profile: NotifierProfile) -> NotifierProfile {
        if let Some(v) = self.start_value {
            profile.start_value = v;
        }
        if let Some(ref v) = self.title {
            profile.title = v.clone();
        }
        if let Some(ref v) = self.tick_template {
            profile.tick_template = v.clone();
        }
        if let Some(ref v) = self.completion_label {
            profile.completion_label = v.clone();
        }
        if let Some(ref v) = self.session_id {
            profile.session_id = v.clone();
        }
        profile
    }
}

/// Resolved gate settings
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub kind: GateKind,
    pub probe: String,
    pub timeout: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            kind: GateKind::Always,
            probe: "1.1.1.1:53".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub tick_interval: Duration,
    pub work_delay: Duration,
    pub gate_poll_interval: Duration,
    pub gate: GateSettings,
    pub primary: NotifierProfile,
    pub secondary: NotifierProfile,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Schema version declared by the config file
    pub config_version: Option<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            work_delay: Duration::from_millis(3000),
            gate_poll_interval: Duration::from_millis(1000),
            gate: GateSettings::default(),
            primary: NotifierProfile::primary(),
            secondary: NotifierProfile::secondary(),
            config_file: None,
            config_version: None,
        }
    }
}

impl ResolvedConfig {
    /// Settings for an orchestrator built from this configuration
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            tick_interval: self.tick_interval,
            gate_poll_interval: self.gate_poll_interval,
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
        }
    }

    /// The configured gate
    pub fn build_gate(&self) -> Arc<dyn Gate> {
        match self.gate.kind {
            GateKind::Always => Arc::new(AlwaysOpen),
            GateKind::Network => Arc::new(NetworkReachable::new(
                self.gate.probe.clone(),
                self.gate.timeout,
            )),
        }
    }
}

/// Find the project config file by searching current directory and parents
fn find_project_config() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Find the user-level config file
fn find_user_config() -> Option<PathBuf> {
    let path = dirs::home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
    path.exists().then_some(path)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn env_millis<F>(env: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a number of milliseconds, got '{}'", key, raw))
        })
        .transpose()
}

/// Merge a parsed file and environment lookups over the defaults
fn resolve<F>(file: Option<(PathBuf, ConfigFile)>, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ResolvedConfig::default();

    if let Some((path, file)) = file {
        if let Some(ms) = file.timing.tick_ms {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.timing.work_delay_ms {
            config.work_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.timing.gate_poll_ms {
            config.gate_poll_interval = Duration::from_millis(ms);
        }
        if let Some(gate) = file.gate {
            config.gate.kind = gate.kind;
            if let Some(probe) = gate.probe {
                config.gate.probe = probe;
            }
            if let Some(ms) = gate.timeout_ms {
                config.gate.timeout = Duration::from_millis(ms);
            }
        }
        if let Some(ref o) = file.notifiers.primary {
            config.primary = o.apply(config.primary);
        }
        if let Some(ref o) = file.notifiers.secondary {
            config.secondary = o.apply(config.secondary);
        }
        config.config_file = Some(path);
        config.config_version = file.version;
    }

    if let Some(ms) = env_millis(&env, "TASKCHAIN_TICK_MS")? {
        config.tick_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = env_millis(&env, "TASKCHAIN_WORK_DELAY_MS")? {
        config.work_delay = Duration::from_millis(ms);
    }
    if let Some(probe) = env("TASKCHAIN_GATE_PROBE") {
        config.gate.kind = GateKind::Network;
        config.gate.probe = probe;
    }

    Ok(config)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let file = match find_project_config().or_else(find_user_config) {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    resolve(file, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
