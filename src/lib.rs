//! # cachex
//!
//! One namespaced key-value cache contract over three storage engines:
//!
//! - **In-process**: an expiring map with a background sweep
//! - **Embedded**: a durable sled database on local disk
//! - **Remote**: a Redis server or Redis Cluster
//!
//! The backend is picked once, when the cache is built from its
//! [`CacheSettings`]. Callers only ever see `Arc<dyn Cache>`.
//!
//! ## Quick Start
//!
//! ```rust
//! use cachex::{open_cache, Bytes, CacheSettings};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> cachex::CacheResult<()> {
//! let (cache, teardown) = open_cache(&CacheSettings::default()).await?;
//!
//! // Store and retrieve values
//! cache.set("user", "123", Bytes::from("Alice"), None).await?;
//! if let Some(value) = cache.get("user", "123").await? {
//!     println!("Found: {:?}", value);
//! }
//!
//! // Set with a TTL
//! cache
//!     .set("session", "abc", Bytes::from("data"), Some(Duration::from_secs(60)))
//!     .await?;
//!
//! // Consume a one-time value
//! let token = cache.get_and_delete("session", "abc").await?;
//! assert!(token.is_some());
//! assert!(!cache.exists("session", "abc").await?);
//!
//! teardown.run().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Every backend is `Send + Sync`; share the `Arc<dyn Cache>` across tasks
//! and threads.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod key;
pub mod stats;

pub mod cli;

pub(crate) mod entry;

pub use backend::{EmbeddedCache, MemoryCache, RemoteCache};
pub use bytes::Bytes;
pub use cache::{Cache, Visitor};
pub use config::{BackendKind, CacheSettings, EmbeddedSettings, MemorySettings, RemoteSettings};
pub use error::{CacheError, CacheResult};
pub use factory::{open_cache, Teardown};
pub use key::{KeyComposer, DEFAULT_DELIMITER};
pub use stats::{CacheStats, StatsSnapshot};
