//! Builds the backend named by a [`CacheSettings`] descriptor.

use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{EmbeddedCache, MemoryCache, RemoteCache};
use crate::cache::Cache;
use crate::config::{BackendKind, CacheSettings};
use crate::error::CacheResult;
use crate::key::KeyComposer;

/// Releases a cache built by [`open_cache`].
#[derive(Debug, Clone)]
pub struct Teardown {
    cache: Arc<dyn Cache>,
}

impl Teardown {
    /// Close the cache. A close failure is logged, never propagated.
    pub async fn run(self) {
        if let Err(err) = self.cache.close().await {
            warn!(error = %err, "failed to close cache");
        }
    }
}

/// Construct the cache described by `settings`.
///
/// Returns the live cache and the teardown that closes it. A backend that
/// cannot be opened or reached is an error; there is no fallback to a
/// different backend. An unknown backend kind is built as the in-process
/// cache.
///
/// # Example
/// ```
/// use cachex::{open_cache, BackendKind, CacheSettings};
///
/// # #[tokio::main]
/// # async fn main() -> cachex::CacheResult<()> {
/// let settings = CacheSettings::new().kind(BackendKind::Memory).build();
/// let (cache, teardown) = open_cache(&settings).await?;
///
/// cache.set("session", "abc", "data".into(), None).await?;
/// assert_eq!(cache.get("session", "abc").await?, Some("data".into()));
///
/// teardown.run().await;
/// # Ok(())
/// # }
/// ```
pub async fn open_cache(settings: &CacheSettings) -> CacheResult<(Arc<dyn Cache>, Teardown)> {
    let keys = if settings.delimiter.is_empty() {
        KeyComposer::default()
    } else {
        KeyComposer::new(settings.delimiter.clone())
    };

    let delimiter = keys.delimiter().to_string();

    let cache: Arc<dyn Cache> = match settings.kind {
        BackendKind::Memory => Arc::new(MemoryCache::new(settings.memory.clone(), keys)),
        BackendKind::Embedded => Arc::new(EmbeddedCache::open(&settings.embedded, keys)?),
        BackendKind::Remote => Arc::new(RemoteCache::connect(&settings.remote, keys).await?),
        BackendKind::Unknown => {
            warn!("unknown cache kind, using the in-process backend");
            Arc::new(MemoryCache::new(settings.memory.clone(), keys))
        }
    };
    info!(kind = %settings.kind, %delimiter, "cache ready");

    let teardown = Teardown {
        cache: Arc::clone(&cache),
    };
    Ok((cache, teardown))
}
