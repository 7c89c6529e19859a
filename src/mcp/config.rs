//! Remote tool manager configuration
//!
//! Loaded once at startup from a JSON document with `client` and `servers`
//! sections; immutable afterwards.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::McpError;

/// Client identity and default timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpClientConfig {
    pub name: String,
    pub version: String,

    /// Connect timeout in milliseconds
    #[serde(rename = "connectTimeout")]
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds
    #[serde(rename = "readTimeout")]
    pub read_timeout_ms: u64,

    /// Write timeout in milliseconds
    #[serde(rename = "writeTimeout")]
    pub write_timeout_ms: u64,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            name: "autodev".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connect_timeout_ms: 30_000,
            read_timeout_ms: 60_000,
            write_timeout_ms: 30_000,
        }
    }
}

/// One configured remote server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub url: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Failover order: lower value wins
    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default, rename = "connectTimeout", skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    #[serde(default, rename = "readTimeout", skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    100
}

/// The full configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub client: McpClientConfig,

    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

impl McpConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, McpError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| McpError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| McpError::Config(format!("cannot parse {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate server urls and ids
    pub fn validate(&self) -> Result<(), McpError> {
        for (id, server) in &self.servers {
            if id.trim().is_empty() {
                return Err(McpError::Config("server id must be non-empty".to_string()));
            }
            let url = server.url.trim();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(McpError::Config(format!(
                    "server '{}' url must be http(s), got '{}'",
                    id, server.url
                )));
            }
        }
        Ok(())
    }

    /// Enabled servers ordered by priority (then id, for determinism)
    pub fn servers_by_priority(&self) -> Vec<(&str, &McpServerConfig)> {
        let mut servers: Vec<_> = self
            .servers
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(id, s)| (id.as_str(), s))
            .collect();
        servers.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then_with(|| a.0.cmp(b.0)));
        servers
    }

    /// Serialize back to pretty JSON (for `mcp config save`)
    pub fn to_json(&self) -> Result<String, McpError> {
        serde_json::to_string_pretty(self).map_err(|e| McpError::Config(e.to_string()))
    }

    /// A starter document with one disabled example server
    pub fn example() -> Self {
        let mut servers = HashMap::new();
        servers.insert(
            "local".to_string(),
            McpServerConfig {
                url: "http://localhost:8080".to_string(),
                name: "Local tool server".to_string(),
                description: "Example server entry".to_string(),
                enabled: false,
                priority: 1,
                headers: HashMap::new(),
                connect_timeout_ms: None,
                read_timeout_ms: None,
            },
        );
        Self {
            client: McpClientConfig::default(),
            servers,
        }
    }
}
