use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use switchboard_core::{CoordinatorConfig, RequeuePolicy};

// =============================================================================
// Unified config (figment-deserialized from defaults / switchboard.toml / env)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   switchboard.toml:  [coordinator]
//                      requeue = "front"
//
//   env var:           SWITCHBOARD_COORDINATOR__REQUEUE=front
//
//   (single underscore stays within field names: SWITCHBOARD_COORDINATOR__EVENT_CAPACITY)

pub const DEFAULT_CONFIG_FILE: &str = "switchboard.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub coordinator: CoordinatorFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerFileConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// Matchmaking knobs (lives under `[coordinator]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorFileConfig {
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Per-session outbound queue length
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    #[serde(default)]
    pub requeue: RequeuePolicy,
}

impl Default for CoordinatorFileConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            outbound_capacity: default_outbound_capacity(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            requeue: RequeuePolicy::default(),
        }
    }
}

impl CoordinatorFileConfig {
    /// Runtime view handed to the coordinator.
    pub fn runtime(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            event_capacity: self.event_capacity.max(1),
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms.max(1)),
            requeue: self.requeue,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_event_capacity() -> usize {
    64
}
fn default_outbound_capacity() -> usize {
    32
}
fn default_delivery_timeout_ms() -> u64 {
    5000
}

/// Build a figment that layers: defaults → TOML file → SWITCHBOARD_* env vars.
///
/// A missing TOML file is not an error; figment skips it.
///
/// Env vars use double-underscore for nesting into sections:
///   `SWITCHBOARD_SERVER__PORT=9000`  →  `server.port = 9000`
pub fn load_config(path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SWITCHBOARD_").split("__"))
}

/// Load and extract in one step.
pub fn resolve(path: &Path) -> Result<FileConfig> {
    load_config(path)
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
