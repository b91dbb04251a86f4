//! Embedded backend on top of `sled`.
//!
//! Records are stored as `deadline (u64 BE, unix millis, 0 = never) ++ value`.
//! sled has no native per-entry TTL, so expiry is checked on every read.
//! Expired records are deleted when a read or an iteration meets them, and
//! by a periodic sweep for keys nobody reads again.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::spawn_sweeper;
use crate::cache::{Cache, Visitor};
use crate::config::EmbeddedSettings;
use crate::error::{CacheError, CacheResult};
use crate::key::KeyComposer;
use crate::stats::{CacheStats, StatsSnapshot};

const HEADER_LEN: usize = 8;

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
struct Record {
    /// Absolute deadline in unix milliseconds, `0` for none.
    deadline: u64,
    value: Bytes,
}

impl Record {
    fn new(value: Bytes, ttl: Option<Duration>, now: u64) -> Self {
        let deadline = match ttl.filter(|ttl| !ttl.is_zero()) {
            // Round sub-millisecond TTLs up so they still expire; saturate
            // TTLs too long to count in milliseconds.
            Some(ttl) => {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                now.saturating_add(millis.max(1))
            }
            None => 0,
        };
        Self { deadline, value }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.value.len());
        out.extend_from_slice(&self.deadline.to_be_bytes());
        out.extend_from_slice(&self.value);
        out
    }

    fn decode(raw: &[u8]) -> CacheResult<Self> {
        if raw.len() < HEADER_LEN {
            return Err(CacheError::Corrupted(format!(
                "record of {} bytes is shorter than its header",
                raw.len()
            )));
        }
        let (header, value) = raw.split_at(HEADER_LEN);
        let mut deadline = [0u8; HEADER_LEN];
        deadline.copy_from_slice(header);
        Ok(Self {
            deadline: u64::from_be_bytes(deadline),
            value: Bytes::copy_from_slice(value),
        })
    }

    fn is_expired_at(&self, now: u64) -> bool {
        self.deadline != 0 && now >= self.deadline
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Shared state of an embedded cache. The sweeper only holds a `Weak`
/// reference to it.
struct Store {
    db: RwLock<Option<sled::Db>>,
    stats: CacheStats,
}

impl Store {
    /// A handle to the open database, or `Closed`.
    fn db(&self) -> CacheResult<sled::Db> {
        self.db
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(CacheError::Closed)
    }

    /// Decode `raw` stored at `key`; if it has expired, reclaim it.
    fn live_record(
        &self,
        db: &sled::Db,
        key: &[u8],
        raw: &sled::IVec,
        now: u64,
    ) -> CacheResult<Option<Record>> {
        let record = Record::decode(raw)?;
        if !record.is_expired_at(now) {
            return Ok(Some(record));
        }
        self.reclaim(db, key, raw)?;
        Ok(None)
    }

    /// Remove the expired `raw` at `key` unless a writer replaced it
    /// meanwhile.
    fn reclaim(&self, db: &sled::Db, key: &[u8], raw: &sled::IVec) -> CacheResult<bool> {
        let swapped = db.compare_and_swap(key, Some(raw), None::<&[u8]>)?;
        if swapped.is_ok() {
            self.stats.record_expirations(1);
        }
        Ok(swapped.is_ok())
    }

    fn try_cleanup_expired(&self) -> CacheResult<usize> {
        let db = match self.db() {
            Ok(db) => db,
            Err(CacheError::Closed) => return Ok(0),
            Err(err) => return Err(err),
        };

        let now = now_millis();
        let mut removed = 0;
        for item in db.iter() {
            let (key, raw) = item?;
            // Records that fail to decode are reported by reads, not here.
            let Ok(record) = Record::decode(&raw) else {
                continue;
            };
            if record.is_expired_at(now) && self.reclaim(&db, &key, &raw)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Sweeper entry point: errors are logged and the next tick retries.
    fn cleanup_expired(&self) -> usize {
        self.try_cleanup_expired().unwrap_or_else(|err| {
            warn!(error = %err, "embedded sweep failed");
            0
        })
    }
}

/// Cache backed by an embedded sled database.
///
/// `get_and_delete` uses sled's atomic remove, so the read and the removal
/// happen as one step. Expired records are deleted from disk when a read or
/// an iteration meets them, and by an optional background sweep.
pub struct EmbeddedCache {
    store: Arc<Store>,
    keys: KeyComposer,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for EmbeddedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = self.store.db.read().map(|db| db.is_some()).unwrap_or(false);
        f.debug_struct("EmbeddedCache")
            .field("open", &open)
            .field("keys", &self.keys)
            .field("stats", &self.store.stats)
            .finish()
    }
}

impl EmbeddedCache {
    /// Open (or create) the store at `settings.path`.
    ///
    /// If a sweep interval is configured and a Tokio runtime is available,
    /// a background task deletes expired records on that interval.
    pub fn open(settings: &EmbeddedSettings, keys: KeyComposer) -> CacheResult<Self> {
        let db = sled::Config::new().path(&settings.path).open()?;
        let store = Arc::new(Store {
            db: RwLock::new(Some(db)),
            stats: CacheStats::new(),
        });

        let sweeper = settings.sweep_interval().and_then(|interval| {
            spawn_sweeper(Arc::downgrade(&store), interval, Store::cleanup_expired)
        });

        info!(
            path = %settings.path.display(),
            sweeping = sweeper.is_some(),
            "opened embedded cache"
        );

        Ok(Self {
            store,
            keys,
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Delete expired records now instead of waiting for the sweep.
    ///
    /// Returns the number of records that were removed.
    pub fn cleanup_expired(&self) -> CacheResult<usize> {
        self.store.try_cleanup_expired()
    }

    fn abort_sweeper(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
    }
}

#[async_trait]
impl Cache for EmbeddedCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let db = self.store.db()?;
        let record = Record::new(value, ttl, now_millis());

        db.insert(self.keys.compose(namespace, key).as_bytes(), record.encode())?;
        self.store.stats.record_set();
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>> {
        let db = self.store.db()?;
        let key = self.keys.compose(namespace, key);

        let value = match db.get(key.as_bytes())? {
            Some(raw) => self
                .store
                .live_record(&db, key.as_bytes(), &raw, now_millis())?
                .map(|record| record.value),
            None => None,
        };

        self.store.stats.record_read(value.is_some());
        Ok(value)
    }

    async fn get_and_delete(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>> {
        let db = self.store.db()?;
        let key = self.keys.compose(namespace, key);

        let value = match db.remove(key.as_bytes())? {
            Some(raw) => {
                let record = Record::decode(&raw)?;
                if record.is_expired_at(now_millis()) {
                    self.store.stats.record_expirations(1);
                    None
                } else {
                    self.store.stats.record_delete();
                    Some(record.value)
                }
            }
            None => None,
        };

        self.store.stats.record_read(value.is_some());
        Ok(value)
    }

    async fn exists(&self, namespace: &str, key: &str) -> CacheResult<bool> {
        let db = self.store.db()?;
        let key = self.keys.compose(namespace, key);

        match db.get(key.as_bytes())? {
            Some(raw) => Ok(self
                .store
                .live_record(&db, key.as_bytes(), &raw, now_millis())?
                .is_some()),
            None => Ok(false),
        }
    }

    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<()> {
        let db = self.store.db()?;
        if db.remove(self.keys.compose(namespace, key).as_bytes())?.is_some() {
            self.store.stats.record_delete();
        }
        Ok(())
    }

    async fn iterate(&self, namespace: &str, visit: &mut Visitor<'_>) -> CacheResult<()> {
        let db = self.store.db()?;
        let prefix = self.keys.prefix(namespace);
        let now = now_millis();

        for item in db.scan_prefix(prefix.as_bytes()) {
            let (raw_key, raw_value) = item?;
            let Some(record) = self.store.live_record(&db, &raw_key, &raw_value, now)? else {
                continue;
            };

            let composite = String::from_utf8_lossy(&raw_key);
            if !visit(self.keys.strip(&composite, namespace), &record.value) {
                break;
            }
        }
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        self.abort_sweeper();

        let db = self.store.db.write().unwrap_or_else(|e| e.into_inner()).take();
        let Some(db) = db else {
            debug!("embedded cache already closed");
            return Ok(());
        };

        let flushed = tokio::task::spawn_blocking(move || db.flush())
            .await
            .map_err(|e| CacheError::Io(io::Error::other(e)))??;
        info!(flushed_bytes = flushed, "closed embedded cache");
        Ok(())
    }

    fn stats(&self) -> StatsSnapshot {
        self.store.stats.snapshot()
    }
}

impl Drop for EmbeddedCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            sweeper.abort();
        }
    }
}
