//! The cache facade.
//!
//! `Cache` is the one contract every backend satisfies. Callers hold an
//! `Arc<dyn Cache>` produced once by [`open_cache`](crate::open_cache) and
//! never branch on which backend is behind it.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

use crate::error::CacheResult;
use crate::stats::StatsSnapshot;

/// Visitor passed to [`Cache::iterate`].
///
/// Receives the logical key (namespace already stripped) and the value.
/// Returning `false` stops the traversal.
pub type Visitor<'a> = dyn FnMut(&str, &Bytes) -> bool + Send + 'a;

/// A namespaced key-value cache with optional per-entry TTL.
///
/// # Semantics
/// - Absent and expired entries are reported as `None` / `false`, never as
///   an error.
/// - A `ttl` of `None` or `Duration::ZERO` means the entry never expires.
/// - Every operation may be cancelled by dropping its future; no operation
///   imposes a timeout of its own.
/// - Once [`close`](Cache::close) has been called the instance is terminal.
///
/// # Example
/// ```
/// use cachex::{open_cache, CacheSettings};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> cachex::CacheResult<()> {
/// let (cache, teardown) = open_cache(&CacheSettings::default()).await?;
///
/// cache.set("jwt", "token-1", "revoked".into(), Some(Duration::from_secs(60))).await?;
/// assert!(cache.exists("jwt", "token-1").await?);
///
/// let mut seen = Vec::new();
/// cache
///     .iterate("jwt", &mut |key: &str, _value: &bytes::Bytes| {
///         seen.push(key.to_string());
///         true
///     })
///     .await?;
/// assert_eq!(seen, vec!["token-1"]);
///
/// teardown.run().await;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Cache: Send + Sync + fmt::Debug {
    /// Insert or replace the value stored at `(namespace, key)`.
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    /// Read the value stored at `(namespace, key)`.
    async fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>>;

    /// Read and remove the value stored at `(namespace, key)`.
    ///
    /// When this returns `Some`, a following `get` returns `None` unless
    /// another writer stored the key again in between. Whether the read and
    /// the removal are one atomic step depends on the backend.
    async fn get_and_delete(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>>;

    /// Whether a live entry exists at `(namespace, key)`.
    async fn exists(&self, namespace: &str, key: &str) -> CacheResult<bool>;

    /// Remove `(namespace, key)`. Removing a missing key succeeds.
    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<()>;

    /// Visit every live entry in `namespace` until `visit` returns `false`.
    ///
    /// Order is backend-dependent. Entries written or removed while the
    /// traversal runs may or may not be seen; entries removed before it
    /// starts are never seen.
    async fn iterate(&self, namespace: &str, visit: &mut Visitor<'_>) -> CacheResult<()>;

    /// Release the backend resource.
    async fn close(&self) -> CacheResult<()>;

    /// Point-in-time operation counters for this instance.
    fn stats(&self) -> StatsSnapshot;
}
