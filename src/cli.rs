//! Command-line interface definitions.
//!
//! The `cachex` binary builds a cache from these flags and runs one
//! facade operation against it.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{
    BackendKind, CacheSettings, EmbeddedSettings, MemorySettings, RemoteSettings,
};
use crate::key::DEFAULT_DELIMITER;

/// Namespaced cache client.
///
/// Runs a single operation against an in-process, embedded or remote cache.
#[derive(Parser, Debug)]
#[command(name = "cachex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// The command to execute.
    #[command(subcommand)]
    pub command: ClientCommand,
}

/// Flags selecting and configuring the backend.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Backend kind: memory, embedded (badger, sled) or remote (redis).
    #[arg(long, global = true, env = "CACHEX_BACKEND", default_value = "embedded")]
    pub backend: BackendKind,

    /// Separator between namespace and key.
    #[arg(long, global = true, env = "CACHEX_DELIMITER", default_value = DEFAULT_DELIMITER)]
    pub delimiter: String,

    /// Directory of the embedded store.
    #[arg(long, global = true, env = "CACHEX_PATH", default_value = "data/cache")]
    pub path: PathBuf,

    /// Remote address (`host:port`, comma-separated in cluster mode).
    #[arg(long, global = true, env = "CACHEX_ADDRESS", default_value = "127.0.0.1:6379")]
    pub address: String,

    #[arg(long, global = true, env = "CACHEX_USERNAME")]
    pub username: Option<String>,

    #[arg(long, global = true, env = "CACHEX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Remote database index.
    #[arg(long, global = true, env = "CACHEX_DB", default_value_t = 0)]
    pub db: i64,

    /// Use the cluster-aware remote client.
    #[arg(long, global = true, env = "CACHEX_CLUSTER")]
    pub cluster: bool,
}

impl BackendArgs {
    /// Turn the flags into a construction descriptor.
    pub fn settings(&self) -> CacheSettings {
        let mut remote = RemoteSettings::new()
            .address(self.address.clone())
            .database_index(self.db)
            .cluster(self.cluster);
        if let Some(username) = &self.username {
            remote = remote.username(username.clone());
        }
        if let Some(password) = &self.password {
            remote = remote.password(password.clone());
        }

        CacheSettings::new()
            .kind(self.backend)
            .delimiter(self.delimiter.clone())
            // One-shot process: nothing lives long enough to need sweeping.
            .memory(MemorySettings::new().sweep_interval_seconds(0))
            .embedded(
                EmbeddedSettings::new()
                    .path(self.path.clone())
                    .sweep_interval_seconds(0),
            )
            .remote(remote)
            .build()
    }
}

/// Available client commands.
#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Store a value.
    Set {
        namespace: String,
        key: String,
        value: String,
        /// Expire the entry after this many milliseconds (0 = never).
        #[arg(long, default_value_t = 0)]
        ttl_ms: u64,
    },

    /// Print the value stored at a key.
    Get { namespace: String, key: String },

    /// Print and remove the value stored at a key.
    Take { namespace: String, key: String },

    /// Report whether a key holds a live entry.
    Exists { namespace: String, key: String },

    /// Remove a key.
    Delete { namespace: String, key: String },

    /// List the entries of a namespace.
    List {
        namespace: String,
        /// Stop after this many entries.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show operation counters for this run.
    Stats,
}

impl ClientCommand {
    /// The TTL requested by `set`, if any.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            ClientCommand::Set { ttl_ms, .. } if *ttl_ms > 0 => {
                Some(Duration::from_millis(*ttl_ms))
            }
            _ => None,
        }
    }
}
