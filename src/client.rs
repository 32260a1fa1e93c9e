//! Asynchronous SSDB client.
//!
//! The client is a facade over the connection pool and the wire codec.
//! Every command goes through [`Client::execute`]: lease a connection,
//! write the request, read one response frame, shape it by the command's
//! response class, return the connection. The typed methods below cover
//! the everyday command surface; `execute` is the escape hatch for the
//! rest of the server's commands.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::connection::{ConnectionConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RECV_CHUNK};
use crate::error::{Result, SsdbError};
use crate::pool::{ConnectionPool, PoolConfig, PooledConnection};
use crate::protocol::{canonical_name, Arg};
use crate::response::{interpret, IntValueMode, Reply, ScanPage};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Password for the `auth` handshake on every new connection.
    pub password: Option<String>,
    /// Enable TCP keepalive on new sockets.
    pub socket_keepalive: bool,
    /// Maximum bytes pulled from the socket per read.
    pub recv_chunk: usize,
    /// Maximum live connections; `0` means unbounded.
    pub max_connections: usize,
    /// Bound on how long a lease may wait when the pool is at capacity.
    pub lease_timeout: Option<Duration>,
    /// Pin a single connection instead of leasing per command.
    pub single_connection: bool,
    /// Reject non-digit integer-map values instead of coercing to `-1`.
    pub strict_int_maps: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
            socket_keepalive: false,
            recv_chunk: DEFAULT_RECV_CHUNK,
            max_connections: 0,
            lease_timeout: None,
            single_connection: false,
            strict_int_maps: false,
        }
    }
}

/// Asynchronous SSDB client.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct Client {
    pool: ConnectionPool,
    pinned: Option<Mutex<Option<PooledConnection>>>,
    int_mode: IntValueMode,
}

impl Client {
    /// Create a client against `localhost` with default settings.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client for the given host and port.
    pub fn open(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        })
    }

    /// Create a client with explicit configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        let int_mode = if config.strict_int_maps {
            IntValueMode::Strict
        } else {
            IntValueMode::Lenient
        };
        let pinned = config.single_connection.then(|| Mutex::new(None));
        let pool = ConnectionPool::new(PoolConfig {
            connection: ConnectionConfig {
                host: config.host,
                port: config.port,
                password: config.password,
                keepalive: config.socket_keepalive,
                recv_chunk: config.recv_chunk,
            },
            max_connections: config.max_connections,
            lease_timeout: config.lease_timeout,
        });
        Self {
            pool,
            pinned,
            int_mode,
        }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run one command and interpret its response.
    ///
    /// Returns `Ok(None)` when the server answered `not_found` or the
    /// command's class carries no payload.
    pub async fn execute(&self, cmd: &str, args: Vec<Arg>) -> Result<Option<Reply>> {
        let cmd = canonical_name(cmd);
        let frame = match &self.pinned {
            Some(slot) => {
                let mut pinned = slot.lock().await;
                if pinned.is_none() {
                    *pinned = Some(self.pool.lease().await?);
                }
                let lease = pinned.as_mut().expect("pinned lease installed above");
                match lease.request(cmd, &args).await {
                    Ok(frame) => frame,
                    Err(err) => {
                        // Drop the broken pinned lease; the next command
                        // pins a fresh connection.
                        *pinned = None;
                        return Err(err);
                    }
                }
            }
            None => {
                let mut lease = self.pool.lease().await?;
                lease.request(cmd, &args).await?
            }
        };
        interpret(cmd, &frame, self.int_mode)
    }

    /// Release the pinned connection (if any) and disconnect every idle
    /// pooled connection.
    pub async fn close(&self) -> Result<()> {
        if let Some(slot) = &self.pinned {
            slot.lock().await.take();
        }
        self.pool.disconnect_all().await
    }

    // Server commands

    /// Check that the server is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.execute("ping", vec![]).await.map(|_| ())
    }

    /// Server version string.
    pub async fn version(&self) -> Result<Bytes> {
        expect_bytes(self.execute("version", vec![]).await?)
    }

    /// Server information lines.
    pub async fn info(&self) -> Result<Vec<Bytes>> {
        expect_list(self.execute("info", vec![]).await?)
    }

    /// Number of keys in the database.
    pub async fn dbsize(&self) -> Result<i64> {
        expect_int(self.execute("dbsize", vec![]).await?)
    }

    // Key-value commands

    /// Fetch a value, `None` when the key does not exist.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        opt_bytes(self.execute("get", vec![key.into()]).await?)
    }

    /// Store a value.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.execute("set", vec![key.into(), value.into()])
            .await
            .map(|_| ())
    }

    /// Store a value with a time-to-live in seconds.
    pub async fn setx(&self, key: &[u8], value: &[u8], ttl: i64) -> Result<()> {
        self.execute("setx", vec![key.into(), value.into(), ttl.into()])
            .await
            .map(|_| ())
    }

    /// Store a value only if the key is absent. Returns whether it was set.
    pub async fn setnx(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        Ok(expect_int(self.execute("setnx", vec![key.into(), value.into()]).await?)? != 0)
    }

    /// Swap in a new value, returning the previous one.
    pub async fn getset(&self, key: &[u8], value: &[u8]) -> Result<Option<Bytes>> {
        opt_bytes(
            self.execute("getset", vec![key.into(), value.into()])
                .await?,
        )
    }

    /// Delete a key.
    pub async fn del(&self, key: &[u8]) -> Result<()> {
        self.execute("del", vec![key.into()]).await.map(|_| ())
    }

    /// Whether a key exists.
    pub async fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(expect_int(self.execute("exists", vec![key.into()]).await?)? != 0)
    }

    /// Increment a numeric value, returning the new value.
    pub async fn incr(&self, key: &[u8], delta: i64) -> Result<i64> {
        expect_int(self.execute("incr", vec![key.into(), delta.into()]).await?)
    }

    /// Set a key's time-to-live in seconds. Returns whether the key exists.
    pub async fn expire(&self, key: &[u8], ttl: i64) -> Result<bool> {
        Ok(expect_int(self.execute("expire", vec![key.into(), ttl.into()]).await?)? != 0)
    }

    /// Remaining time-to-live in seconds, `-1` when none is set.
    pub async fn ttl(&self, key: &[u8]) -> Result<i64> {
        expect_int(self.execute("ttl", vec![key.into()]).await?)
    }

    /// Keys in `(start, end]`, ascending, at most `limit`.
    pub async fn keys(&self, start: &[u8], end: &[u8], limit: i64) -> Result<Vec<Bytes>> {
        expect_list(
            self.execute("keys", vec![start.into(), end.into(), limit.into()])
                .await?,
        )
    }

    /// One page of key-value pairs in `(start, end]`, ascending.
    pub async fn scan(&self, start: &[u8], end: &[u8], limit: i64) -> Result<ScanPage<Bytes>> {
        expect_str_scan(
            self.execute("scan", vec![start.into(), end.into(), limit.into()])
                .await?,
        )
    }

    /// Fetch values for several keys as an ordered mapping.
    pub async fn multi_get(&self, keys: &[&[u8]]) -> Result<Vec<(Bytes, Bytes)>> {
        let args = keys.iter().map(|k| Arg::from(*k)).collect();
        expect_str_map(self.execute("multi_get", args).await?)
    }

    // Hashmap commands

    /// Fetch one field of a hashmap.
    pub async fn hget(&self, name: &[u8], key: &[u8]) -> Result<Option<Bytes>> {
        opt_bytes(self.execute("hget", vec![name.into(), key.into()]).await?)
    }

    /// Set one field of a hashmap.
    pub async fn hset(&self, name: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        self.execute("hset", vec![name.into(), key.into(), value.into()])
            .await
            .map(|_| ())
    }

    /// Delete one field of a hashmap.
    pub async fn hdel(&self, name: &[u8], key: &[u8]) -> Result<()> {
        self.execute("hdel", vec![name.into(), key.into()])
            .await
            .map(|_| ())
    }

    /// Number of fields in a hashmap.
    pub async fn hsize(&self, name: &[u8]) -> Result<i64> {
        expect_int(self.execute("hsize", vec![name.into()]).await?)
    }

    /// All fields of a hashmap as an ordered mapping.
    pub async fn hgetall(&self, name: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        expect_str_map(self.execute("hgetall", vec![name.into()]).await?)
    }

    /// One page of a hashmap's fields in `(start, end]`, ascending.
    pub async fn hscan(
        &self,
        name: &[u8],
        start: &[u8],
        end: &[u8],
        limit: i64,
    ) -> Result<ScanPage<Bytes>> {
        expect_str_scan(
            self.execute(
                "hscan",
                vec![name.into(), start.into(), end.into(), limit.into()],
            )
            .await?,
        )
    }

    // Sorted-set commands

    /// Set the score of a member.
    pub async fn zset(&self, name: &[u8], key: &[u8], score: i64) -> Result<()> {
        self.execute("zset", vec![name.into(), key.into(), score.into()])
            .await
            .map(|_| ())
    }

    /// Score of a member, `None` when absent.
    pub async fn zget(&self, name: &[u8], key: &[u8]) -> Result<Option<i64>> {
        match self.execute("zget", vec![name.into(), key.into()]).await? {
            None => Ok(None),
            reply => expect_int(reply).map(Some),
        }
    }

    /// Remove a member.
    pub async fn zdel(&self, name: &[u8], key: &[u8]) -> Result<()> {
        self.execute("zdel", vec![name.into(), key.into()])
            .await
            .map(|_| ())
    }

    /// Increment a member's score, returning the new score.
    pub async fn zincr(&self, name: &[u8], key: &[u8], delta: i64) -> Result<i64> {
        expect_int(
            self.execute("zincr", vec![name.into(), key.into(), delta.into()])
                .await?,
        )
    }

    /// Number of members in a sorted set.
    pub async fn zsize(&self, name: &[u8]) -> Result<i64> {
        expect_int(self.execute("zsize", vec![name.into()]).await?)
    }

    /// Members by rank range, with scores.
    pub async fn zrange(&self, name: &[u8], offset: i64, limit: i64) -> Result<Vec<(Bytes, i64)>> {
        expect_int_map(
            self.execute("zrange", vec![name.into(), offset.into(), limit.into()])
                .await?,
        )
    }

    /// One page of members in `(key_start, score range]` order.
    pub async fn zscan(
        &self,
        name: &[u8],
        key_start: &[u8],
        score_start: &[u8],
        score_end: &[u8],
        limit: i64,
    ) -> Result<ScanPage<i64>> {
        expect_int_scan(
            self.execute(
                "zscan",
                vec![
                    name.into(),
                    key_start.into(),
                    score_start.into(),
                    score_end.into(),
                    limit.into(),
                ],
            )
            .await?,
        )
    }

    // Queue commands

    /// Push an item onto the back of a queue, returning the new length.
    pub async fn qpush(&self, name: &[u8], item: &[u8]) -> Result<i64> {
        expect_int(self.execute("qpush", vec![name.into(), item.into()]).await?)
    }

    /// Pop items from the front of a queue.
    pub async fn qpop(&self, name: &[u8], count: i64) -> Result<Vec<Bytes>> {
        expect_list(self.execute("qpop", vec![name.into(), count.into()]).await?)
    }

    /// Number of items in a queue.
    pub async fn qsize(&self, name: &[u8]) -> Result<i64> {
        expect_int(self.execute("qsize", vec![name.into()]).await?)
    }

    /// Front item of a queue without popping it.
    pub async fn qfront(&self, name: &[u8]) -> Result<Option<Bytes>> {
        opt_bytes(self.execute("qfront", vec![name.into()]).await?)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

// Reply downcasts for the typed wrappers. The interpreter guarantees the
// shape matches the command's class, so a mismatch here means the wrapper
// and the classification table disagree.

fn shape_mismatch(reply: Option<Reply>) -> SsdbError {
    SsdbError::Protocol(format!("unexpected response shape: {reply:?}"))
}

fn expect_int(reply: Option<Reply>) -> Result<i64> {
    match reply {
        Some(Reply::Int(value)) => Ok(value),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_bytes(reply: Option<Reply>) -> Result<Bytes> {
    match reply {
        Some(Reply::Bytes(value)) => Ok(value),
        other => Err(shape_mismatch(other)),
    }
}

fn opt_bytes(reply: Option<Reply>) -> Result<Option<Bytes>> {
    match reply {
        None => Ok(None),
        Some(Reply::Bytes(value)) => Ok(Some(value)),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_list(reply: Option<Reply>) -> Result<Vec<Bytes>> {
    match reply {
        Some(Reply::List(items)) => Ok(items),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_str_map(reply: Option<Reply>) -> Result<Vec<(Bytes, Bytes)>> {
    match reply {
        Some(Reply::StrMap(entries)) => Ok(entries),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_int_map(reply: Option<Reply>) -> Result<Vec<(Bytes, i64)>> {
    match reply {
        Some(Reply::IntMap(entries)) => Ok(entries),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_str_scan(reply: Option<Reply>) -> Result<ScanPage<Bytes>> {
    match reply {
        Some(Reply::StrScan(page)) => Ok(page),
        other => Err(shape_mismatch(other)),
    }
}

fn expect_int_scan(reply: Option<Reply>) -> Result<ScanPage<i64>> {
    match reply {
        Some(Reply::IntScan(page)) => Ok(page),
        other => Err(shape_mismatch(other)),
    }
}
