//! CLI configuration.
//!
//! Stored as TOML at `$XDG_CONFIG_HOME/blossom/config.toml`, falling back to
//! `~/.config/blossom/config.toml`. Every key is optional.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use blossom_client::Timeouts;
use blossom_media::AvailabilityConfig;
use blossom_protocol::{ServerEndpoint, ServerRole};
use blossom_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_HASH_WINDOW};
use blossom_upload::{FallbackPolicy, OrchestratorConfig, SessionConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred chunk size in bytes.
    pub chunk_size: u64,

    /// Leading chunks in flight per server.
    pub chunk_concurrency: usize,

    /// Read window for hashing, in bytes.
    pub hash_window: u64,

    pub probe_timeout_secs: u64,
    pub negotiate_timeout_secs: u64,

    /// No limit when unset.
    pub transfer_timeout_secs: Option<u64>,

    /// How long an availability answer is reused.
    pub availability_ttl_secs: u64,

    pub fallback: FallbackPolicy,

    /// Program and arguments that print a signed authorization event for
    /// the hash passed as the last argument.
    pub signer_command: Vec<String>,

    /// Configured servers, each `{ url, role }`. Kept last so it serializes
    /// as trailing `[[servers]]` tables.
    pub servers: Vec<ServerEndpoint>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_concurrency: 1,
            hash_window: DEFAULT_HASH_WINDOW,
            probe_timeout_secs: 5,
            negotiate_timeout_secs: 10,
            transfer_timeout_secs: None,
            availability_ttl_secs: 300,
            fallback: FallbackPolicy::default(),
            signer_command: Vec::new(),
            servers: Vec::new(),
        }
    }
}

impl Config {
    /// Loads `explicit`, or the default path. A missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            servers = config.servers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn servers_with(&self, role: ServerRole) -> Vec<ServerEndpoint> {
        self.servers
            .iter()
            .filter(|s| s.role() == role)
            .cloned()
            .collect()
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            probe: Duration::from_secs(self.probe_timeout_secs),
            negotiate: Duration::from_secs(self.negotiate_timeout_secs),
            transfer: self.transfer_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            session: SessionConfig {
                chunk_size: self.chunk_size,
                concurrency: self.chunk_concurrency,
                hash_window: self.hash_window,
            },
            fallback: self.fallback,
        }
    }

    pub fn availability(&self) -> AvailabilityConfig {
        AvailabilityConfig {
            ttl: Duration::from_secs(self.availability_ttl_secs),
        }
    }
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    config_path_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
    .context("cannot locate a config directory: neither XDG_CONFIG_HOME nor HOME is set")
}

fn config_path_from(xdg: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = match xdg.filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => PathBuf::from(home.filter(|v| !v.is_empty())?).join(".config"),
    };
    Some(base.join("blossom").join("config.toml"))
}
