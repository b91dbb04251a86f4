//! Construction descriptor for a cache instance.
//!
//! `CacheSettings` names the backend kind, the key delimiter and the
//! parameters of each backend. It deserializes from the host application's
//! configuration with serde, and can also be built in code:
//!
//! ```
//! use cachex::{BackendKind, CacheSettings, EmbeddedSettings};
//!
//! let settings = CacheSettings::new()
//!     .kind(BackendKind::Embedded)
//!     .delimiter("|")
//!     .embedded(EmbeddedSettings::new().path("/var/lib/app/cache"))
//!     .build();
//! assert_eq!(settings.kind, BackendKind::Embedded);
//! ```

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::key::DEFAULT_DELIMITER;

/// Which backend a cache instance is built on.
///
/// Parsed case-insensitively, from configuration files as well as from
/// the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Expiring map inside this process.
    #[default]
    Memory,

    /// Embedded durable store on local disk. Also named `badger` or `sled`.
    Embedded,

    /// Redis server or cluster. Also named `redis`.
    Remote,

    /// Anything else. Built as the in-process backend.
    Unknown,
}

impl FromStr for BackendKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "memory" => BackendKind::Memory,
            "embedded" | "badger" | "sled" => BackendKind::Embedded,
            "remote" | "redis" => BackendKind::Remote,
            _ => BackendKind::Unknown,
        })
    }
}

impl<'de> Deserialize<'de> for BackendKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        match name.parse() {
            Ok(kind) => Ok(kind),
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Memory => "memory",
            BackendKind::Embedded => "embedded",
            BackendKind::Remote => "remote",
            BackendKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Top-level cache descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Backend to construct.
    pub kind: BackendKind,

    /// Separator between namespace and key in composite keys.
    pub delimiter: String,

    pub memory: MemorySettings,
    pub embedded: EmbeddedSettings,
    pub remote: RemoteSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            memory: MemorySettings::default(),
            embedded: EmbeddedSettings::default(),
            remote: RemoteSettings::default(),
        }
    }
}

impl CacheSettings {
    /// Create a new settings builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the composite-key delimiter. An empty string keeps the default.
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        self.delimiter = if delimiter.is_empty() {
            DEFAULT_DELIMITER.to_string()
        } else {
            delimiter
        };
        self
    }

    pub fn memory(mut self, memory: MemorySettings) -> Self {
        self.memory = memory;
        self
    }

    pub fn embedded(mut self, embedded: EmbeddedSettings) -> Self {
        self.embedded = embedded;
        self
    }

    pub fn remote(mut self, remote: RemoteSettings) -> Self {
        self.remote = remote;
        self
    }

    /// Build the final settings.
    pub fn build(self) -> Self {
        self
    }
}

/// In-process backend parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemorySettings {
    /// Seconds between background sweeps of expired entries.
    /// `0` disables the sweep (expired entries are still hidden on read).
    #[serde(alias = "sweep_interval_seconds", alias = "cleanupInterval")]
    pub sweep_interval_seconds: u64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 60,
        }
    }
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        sweep_interval(self.sweep_interval_seconds)
    }
}

fn sweep_interval(seconds: u64) -> Option<Duration> {
    match seconds {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

/// Embedded backend parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddedSettings {
    /// Directory holding the store's files. Created if missing.
    pub path: PathBuf,

    /// Seconds between background sweeps that delete expired records from
    /// disk. `0` disables the sweep; expired records are then only removed
    /// when a read or an iteration meets them.
    #[serde(alias = "sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for EmbeddedSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/cache"),
            sweep_interval_seconds: 60,
        }
    }
}

impl EmbeddedSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        sweep_interval(self.sweep_interval_seconds)
    }
}

/// Remote backend parameters.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteSettings {
    /// `host:port` of the server. In cluster mode, a comma-separated list of
    /// seed nodes.
    #[serde(alias = "addr")]
    pub address: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Logical database selected after connecting. Ignored in cluster mode.
    #[serde(alias = "database_index", alias = "db")]
    pub database_index: i64,

    /// Connect with the cluster-aware client.
    pub cluster: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            database_index: 0,
            cluster: false,
        }
    }
}

// Hand-written so the password never ends up in logs.
impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database_index", &self.database_index)
            .field("cluster", &self.cluster)
            .finish()
    }
}

impl RemoteSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the ACL username. Empty strings are treated as unset.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into()).filter(|u| !u.is_empty());
        self
    }

    /// Set the password. Empty strings are treated as unset.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into()).filter(|p| !p.is_empty());
        self
    }

    pub fn database_index(mut self, db: i64) -> Self {
        self.database_index = db;
        self
    }

    pub fn cluster(mut self, enabled: bool) -> Self {
        self.cluster = enabled;
        self
    }

    /// The configured node addresses, trimmed, empty entries dropped.
    pub fn nodes(&self) -> Vec<&str> {
        self.address
            .split(',')
            .map(str::trim)
            .filter(|node| !node.is_empty())
            .collect()
    }
}
