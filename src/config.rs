//! Agent configuration loading
//!
//! YAML with a fallback chain: explicit `--config` path, then `.autodev.yml`
//! in the working directory, then `~/.config/autodev/autodev.yml`, then
//! defaults. `AGENT_*` environment variables override the file afterwards;
//! nothing is mutated once the agent starts.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::monitor::MonitorConfig;
use crate::queue::QueueConfig;

/// Top-level agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Master switch (AGENT_MODE)
    pub enabled: bool,

    /// Queue and dispatcher tunables
    pub queue: QueueConfig,

    /// Monitor tunables and triggers
    pub monitor: MonitorConfig,

    /// ReAct cycle budget per subtask
    #[serde(rename = "planner-max-cycles")]
    pub planner_max_cycles: u32,

    /// Path to the MCP servers JSON document
    #[serde(rename = "mcp-config", skip_serializing_if = "Option::is_none")]
    pub mcp_config_path: Option<PathBuf>,

    /// Where the queue snapshot lives
    #[serde(rename = "snapshot-path")]
    pub snapshot_path: PathBuf,

    /// Persist a snapshot on stop and restore it on start (AGENT_AUTO_SAVE)
    #[serde(rename = "auto-save")]
    pub auto_save: bool,

    /// Log level when the CLI does not override it
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue: QueueConfig::default(),
            monitor: MonitorConfig::default(),
            planner_max_cycles: 5,
            mcp_config_path: None,
            snapshot_path: PathBuf::from(".autodev/snapshot.json"),
            auto_save: false,
            log_level: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration with the fallback chain, then apply environment
    /// overrides.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local = PathBuf::from(".autodev.yml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("failed to load {}: {}", local.display(), e),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("autodev").join("autodev.yml");
            if user.exists() {
                match Self::load_from_file(&user) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("failed to load {}: {}", user.display(), e),
                }
            }
        }

        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Apply `AGENT_MODE`, `AGENT_MAX_TASKS`, `AGENT_INTERVAL_MS`,
    /// `AGENT_AUTO_SAVE`.
    pub fn apply_env(&mut self) {
        if let Ok(mode) = std::env::var("AGENT_MODE") {
            match mode.to_lowercase().as_str() {
                "enable" | "enabled" | "true" | "1" | "on" => self.enabled = true,
                "disable" | "disabled" | "false" | "0" | "off" => self.enabled = false,
                other => warn!("ignoring unrecognized AGENT_MODE value '{}'", other),
            }
        }

        if let Ok(max) = std::env::var("AGENT_MAX_TASKS") {
            match max.parse::<usize>() {
                Ok(value) if value > 0 => self.queue.max_concurrent = value,
                _ => warn!("ignoring invalid AGENT_MAX_TASKS value '{}'", max),
            }
        }

        if let Ok(interval) = std::env::var("AGENT_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(value) if value > 0 => self.queue.worker_tick_ms = value,
                _ => warn!("ignoring invalid AGENT_INTERVAL_MS value '{}'", interval),
            }
        }

        if let Ok(auto_save) = std::env::var("AGENT_AUTO_SAVE") {
            self.auto_save = matches!(auto_save.to_lowercase().as_str(), "true" | "1" | "on" | "yes");
        }
    }

    /// Write this configuration to a YAML file (used by `agent config`)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path.as_ref(), yaml).context("Failed to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert!(config.enabled);
        assert_eq!(config.queue.max_concurrent, 3);
        assert_eq!(config.planner_max_cycles, 5);
        assert!(!config.auto_save);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
queue:
  max-concurrent: 7
auto-save: true
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.queue.max_concurrent, 7);
        assert!(config.auto_save);
        assert_eq!(config.queue.worker_tick_ms, 1_000);
        assert!(config.enabled);
    }

    #[test]
    fn test_yaml_with_triggers() {
        let yaml = r#"
monitor:
  triggers:
    - name: watch
      type: file_change
      path: ./watch
      action: FILE_READ
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.monitor.triggers.len(), 1);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let mut config = AgentConfig::default();

        unsafe {
            std::env::set_var("AGENT_MODE", "disable");
            std::env::set_var("AGENT_MAX_TASKS", "9");
            std::env::set_var("AGENT_INTERVAL_MS", "250");
            std::env::set_var("AGENT_AUTO_SAVE", "true");
        }
        config.apply_env();
        unsafe {
            std::env::remove_var("AGENT_MODE");
            std::env::remove_var("AGENT_MAX_TASKS");
            std::env::remove_var("AGENT_INTERVAL_MS");
            std::env::remove_var("AGENT_AUTO_SAVE");
        }

        assert!(!config.enabled);
        assert_eq!(config.queue.max_concurrent, 9);
        assert_eq!(config.queue.worker_tick_ms, 250);
        assert!(config.auto_save);
    }

    #[test]
    #[serial]
    fn test_env_invalid_values_ignored() {
        let mut config = AgentConfig::default();

        unsafe {
            std::env::set_var("AGENT_MAX_TASKS", "zero");
        }
        config.apply_env();
        unsafe {
            std::env::remove_var("AGENT_MAX_TASKS");
        }

        assert_eq!(config.queue.max_concurrent, 3);
    }

    #[test]
    #[serial]
    fn test_save_load_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("autodev.yml");

        let mut config = AgentConfig::default();
        config.queue.max_concurrent = 5;
        config.save(&path).unwrap();

        let back = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(back.queue.max_concurrent, 5);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let missing = PathBuf::from("/nonexistent/autodev.yml");
        assert!(AgentConfig::load(Some(&missing)).is_err());
    }
}
