//! Configuration system for meshchat.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MESHCHAT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/meshchat/config.toml
//!   3. ~/.config/meshchat/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::deframe::DEFAULT_MAX_FRAME_BYTES;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub network: NetworkConfig,
    pub handshake: HandshakeConfig,
    pub repair: RepairConfig,
    pub presence: PresenceConfig,
    pub dedup: DedupConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// TCP listen port. 0 = OS-assigned.
    pub listen_port: u16,
    /// `host:port` of a node to join on startup. Empty = start a new mesh.
    pub join: String,
    /// Bytes requested per socket read.
    pub read_buffer: usize,
    /// Largest frame accepted from a peer, header included.
    pub max_frame_bytes: usize,
    /// A write to one peer that takes longer than this drops that peer.
    pub write_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Delay between polls while waiting for the peer's reply.
    pub confirmation_poll_ms: u64,
    /// Give up on a handshake after this long.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Passes over the known address list before giving up. 0 = disabled.
    pub max_rounds: u32,
    /// Pause after the first failed pass; doubles every pass after that.
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// ONLINE heartbeat period.
    pub heartbeat_secs: u64,
    /// Presence table eviction period.
    pub refresh_secs: u64,
    /// Nicknames silent for longer than this are dropped.
    pub stale_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How long a packet id is remembered.
    pub window_secs: u64,
    /// How often expired ids are pruned.
    pub prune_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub nickname: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            listen_port: 9090,
            join: String::new(),
            read_buffer: 4096,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            write_timeout_ms: 5000,
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            confirmation_poll_ms: 1000,
            timeout_secs: 10,
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 10,
            refresh_secs: 5,
            stale_secs: 30,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_secs: 600,
            prune_secs: 60,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            nickname: std::env::var("USER").unwrap_or_else(|_| "anonymous".to_string()),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

impl NetworkConfig {
    /// `bind_addr:listen_port`.
    pub fn listen_on(&self) -> String {
        format!("{}:{}", self.bind_addr, self.listen_port)
    }

    /// The join target, if one is configured.
    pub fn join_addr(&self) -> Option<&str> {
        let addr = self.join.trim();
        (!addr.is_empty()).then_some(addr)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

impl HandshakeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RepairConfig {
    /// Pause after failed pass number `round` (0-based).
    pub fn backoff(&self, round: u32) -> Duration {
        let factor = 1u64.checked_shl(round.min(32)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl PresenceConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn prune_every(&self) -> Duration {
        Duration::from_secs(self.prune_secs.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("meshchat")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MeshConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MeshConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MESHCHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MeshConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply MESHCHAT_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MESHCHAT_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Ok(v) = std::env::var("MESHCHAT_NETWORK__LISTEN_PORT") {
            if let Ok(p) = v.parse() {
                self.network.listen_port = p;
            }
        }
        if let Ok(v) = std::env::var("MESHCHAT_NETWORK__JOIN") {
            self.network.join = v;
        }
        if let Ok(v) = std::env::var("MESHCHAT_NETWORK__WRITE_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.network.write_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("MESHCHAT_CHAT__NICKNAME") {
            self.chat.nickname = v;
        }
        if let Ok(v) = std::env::var("MESHCHAT_REPAIR__MAX_ROUNDS") {
            if let Ok(n) = v.parse() {
                self.repair.max_rounds = n;
            }
        }
        if let Ok(v) = std::env::var("MESHCHAT_PRESENCE__STALE_SECS") {
            if let Ok(n) = v.parse() {
                self.presence.stale_secs = n;
            }
        }
    }
}
