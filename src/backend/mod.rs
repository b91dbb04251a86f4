//! The three storage engines behind the [`Cache`](crate::Cache) facade.
//!
//! | Backend          | Engine              | `iterate` order   | `get_and_delete` |
//! |------------------|---------------------|-------------------|------------------|
//! | [`MemoryCache`]  | `IndexMap` + sweep  | insertion         | atomic           |
//! | [`EmbeddedCache`]| sled                | key-sorted        | atomic           |
//! | [`RemoteCache`]  | Redis / Redis Cluster | SCAN cursor     | `GET` then `DEL` |

use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

mod embedded;
mod memory;
mod remote;

pub use embedded::EmbeddedCache;
pub use memory::MemoryCache;
pub use remote::{RemoteCache, SCAN_BATCH};

/// Run `sweep` against `store` every `interval` until the store is dropped.
///
/// Returns `None` outside a Tokio runtime; expired entries are then only
/// removed when reads meet them.
pub(crate) fn spawn_sweeper<T>(
    store: Weak<T>,
    interval: Duration,
    sweep: fn(&T) -> usize,
) -> Option<JoinHandle<()>>
where
    T: Send + Sync + 'static,
{
    let handle = tokio::runtime::Handle::try_current().ok()?;
    Some(handle.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                break;
            };
            // A sweep walks the whole store.
            let removed = match tokio::task::spawn_blocking(move || sweep(&store)).await {
                Ok(removed) => removed,
                Err(_) => break,
            };
            if removed > 0 {
                debug!(removed, "swept expired entries");
            }
        }
    }))
}
