//! Remote backend on top of Redis.
//!
//! A single endpoint is served through an auto-reconnecting
//! `ConnectionManager`; cluster mode uses the cluster-aware async
//! connection. Both speak the unmodified Redis protocol.
//!
//! `get_and_delete` is `GET` followed by `DEL`: two round trips, not one
//! transaction. A `set` racing in between those two commands is lost.

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{Client, Cmd, ConnectionInfo, FromRedisValue, IntoConnectionInfo, RedisResult};
use std::collections::HashSet;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::{Cache, Visitor};
use crate::config::RemoteSettings;
use crate::error::{CacheError, CacheResult};
use crate::key::KeyComposer;
use crate::stats::{CacheStats, StatsSnapshot};

/// Keys requested per `SCAN` round trip.
pub const SCAN_BATCH: usize = 100;

#[derive(Clone)]
enum Connection {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
}

impl Connection {
    async fn query<T: FromRedisValue>(&mut self, cmd: &Cmd) -> RedisResult<T> {
        match self {
            Connection::Single(conn) => cmd.query_async(conn).await,
            Connection::Cluster(conn) => cmd.query_async(conn).await,
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            Connection::Single(_) => "single",
            Connection::Cluster(_) => "cluster",
        }
    }
}

/// Connection info for one node, with the configured credentials applied.
fn node_info(node: &str, settings: &RemoteSettings) -> RedisResult<ConnectionInfo> {
    let url = if node.contains("://") {
        node.to_string()
    } else {
        format!("redis://{}", node)
    };

    let mut info = url.into_connection_info()?;
    if settings.username.is_some() {
        info.redis.username = settings.username.clone();
    }
    if settings.password.is_some() {
        info.redis.password = settings.password.clone();
    }
    Ok(info)
}

/// Upper bound for `PX`. The server rejects expiries whose absolute
/// deadline overflows a signed 64-bit millisecond clock.
const MAX_PX_MILLIS: u64 = i64::MAX as u64 / 2;

/// `PX` argument for `ttl`; `None` when the key must not expire.
fn px_millis(ttl: Option<Duration>) -> Option<u64> {
    ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| {
        u64::try_from(ttl.as_millis())
            .unwrap_or(u64::MAX)
            .clamp(1, MAX_PX_MILLIS)
    })
}

fn key_cmd(name: &str, key: &str) -> Cmd {
    let mut cmd = redis::cmd(name);
    cmd.arg(key);
    cmd
}

/// Cache backed by a Redis server or cluster.
pub struct RemoteCache {
    conn: RwLock<Option<Connection>>,
    keys: KeyComposer,
    stats: CacheStats,
}

impl fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = self
            .conn
            .read()
            .ok()
            .and_then(|conn| conn.as_ref().map(Connection::mode))
            .unwrap_or("closed");
        f.debug_struct("RemoteCache")
            .field("mode", &mode)
            .field("keys", &self.keys)
            .field("stats", &self.stats)
            .finish()
    }
}

impl RemoteCache {
    /// Connect to the configured server (or cluster) and verify it answers
    /// `PING`.
    pub async fn connect(settings: &RemoteSettings, keys: KeyComposer) -> CacheResult<Self> {
        let nodes = settings.nodes();
        let mut conn = match (settings.cluster, nodes.as_slice()) {
            (_, []) => {
                return Err(CacheError::Config("remote address is empty".to_string()));
            }
            (false, [node]) => {
                let mut info = node_info(node, settings)?;
                info.redis.db = settings.database_index;
                let client = Client::open(info)?;
                Connection::Single(ConnectionManager::new(client).await?)
            }
            (false, _) => {
                return Err(CacheError::Config(format!(
                    "{} nodes configured but cluster mode is off",
                    nodes.len()
                )));
            }
            (true, nodes) => {
                let infos = nodes
                    .iter()
                    .map(|node| node_info(node, settings))
                    .collect::<RedisResult<Vec<_>>>()?;
                let mut builder = ClusterClientBuilder::new(infos);
                if let Some(username) = &settings.username {
                    builder = builder.username(username.clone());
                }
                if let Some(password) = &settings.password {
                    builder = builder.password(password.clone());
                }
                Connection::Cluster(builder.build()?.get_async_connection().await?)
            }
        };

        conn.query::<()>(&redis::cmd("PING")).await?;
        info!(
            address = %settings.address,
            mode = conn.mode(),
            db = settings.database_index,
            "connected remote cache"
        );

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            keys,
            stats: CacheStats::new(),
        })
    }

    /// A handle to the open connection, or `Closed`.
    fn connection(&self) -> CacheResult<Connection> {
        self.conn
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(CacheError::Closed)
    }
}

#[async_trait]
impl Cache for RemoteCache {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(self.keys.compose(namespace, key)).arg(&value[..]);
        if let Some(millis) = px_millis(ttl) {
            cmd.arg("PX").arg(millis);
        }

        conn.query::<()>(&cmd).await?;
        self.stats.record_set();
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>> {
        let mut conn = self.connection()?;
        let key = self.keys.compose(namespace, key);

        let value: Option<Vec<u8>> = conn.query(&key_cmd("GET", &key)).await?;
        self.stats.record_read(value.is_some());
        Ok(value.map(Bytes::from))
    }

    async fn get_and_delete(&self, namespace: &str, key: &str) -> CacheResult<Option<Bytes>> {
        let mut conn = self.connection()?;
        let key = self.keys.compose(namespace, key);

        let value: Option<Vec<u8>> = conn.query(&key_cmd("GET", &key)).await?;
        self.stats.record_read(value.is_some());
        let Some(value) = value else {
            return Ok(None);
        };

        // The value is only handed out once the key is gone.
        let _removed: i64 = conn.query(&key_cmd("DEL", &key)).await?;
        self.stats.record_delete();
        Ok(Some(Bytes::from(value)))
    }

    async fn exists(&self, namespace: &str, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection()?;
        let key = self.keys.compose(namespace, key);

        let count: i64 = conn.query(&key_cmd("EXISTS", &key)).await?;
        Ok(count > 0)
    }

    async fn delete(&self, namespace: &str, key: &str) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let key = self.keys.compose(namespace, key);

        let removed: i64 = conn.query(&key_cmd("DEL", &key)).await?;
        if removed > 0 {
            self.stats.record_delete();
        }
        Ok(())
    }

    async fn iterate(&self, namespace: &str, visit: &mut Visitor<'_>) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let pattern = self.keys.scan_pattern(namespace);
        let prefix = self.keys.prefix(namespace);

        // SCAN may report a key more than once.
        let mut seen = HashSet::new();
        let mut visited = 0usize;
        let mut cursor: u64 = 0;
        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<Vec<u8>>) = conn.query(&scan).await?;

            for raw in batch {
                // Written by another client; not a key this cache composes.
                let Ok(composite) = String::from_utf8(raw) else {
                    continue;
                };
                let Some(key) = composite.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                if !seen.insert(key.to_string()) {
                    continue;
                }

                // Gone since the scan: expired or deleted.
                let value: Option<Vec<u8>> = conn.query(&key_cmd("GET", &composite)).await?;
                let Some(value) = value else {
                    continue;
                };

                visited += 1;
                if !visit(key, &Bytes::from(value)) {
                    return Ok(());
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(
            namespace,
            scanned = seen.len(),
            visited,
            "remote scan finished"
        );
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        let conn = self.conn.write().unwrap_or_else(|e| e.into_inner()).take();
        match conn {
            Some(conn) => info!(mode = conn.mode(), "closed remote cache"),
            None => debug!("remote cache already closed"),
        }
        Ok(())
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
