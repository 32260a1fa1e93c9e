//! Blocking SSDB client.
//!
//! A thin adapter that drives the async [`Client`](crate::Client) on a
//! private current-thread runtime, for callers that are not themselves
//! running inside an async runtime. Each method blocks the calling
//! thread until the command completes.

use bytes::Bytes;
use tokio::runtime::Runtime;

use crate::client::{Client, ClientConfig};
use crate::error::Result;
use crate::protocol::Arg;
use crate::response::{Reply, ScanPage};

/// Blocking SSDB client.
///
/// Must not be created or used from within an async runtime; use
/// [`Client`](crate::Client) there instead.
#[derive(Debug)]
pub struct BlockingClient {
    inner: Client,
    rt: Runtime,
}

impl BlockingClient {
    /// Create a client against `localhost` with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            inner: Client::with_config(config),
            rt,
        })
    }

    /// Run one command and interpret its response.
    pub fn execute(&self, cmd: &str, args: Vec<Arg>) -> Result<Option<Reply>> {
        self.rt.block_on(self.inner.execute(cmd, args))
    }

    /// Check that the server is reachable.
    pub fn ping(&self) -> Result<()> {
        self.rt.block_on(self.inner.ping())
    }

    /// Number of keys in the database.
    pub fn dbsize(&self) -> Result<i64> {
        self.rt.block_on(self.inner.dbsize())
    }

    /// Fetch a value, `None` when the key does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.rt.block_on(self.inner.get(key))
    }

    /// Store a value.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.rt.block_on(self.inner.set(key, value))
    }

    /// Delete a key.
    pub fn del(&self, key: &[u8]) -> Result<()> {
        self.rt.block_on(self.inner.del(key))
    }

    /// Whether a key exists.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        self.rt.block_on(self.inner.exists(key))
    }

    /// Increment a numeric value, returning the new value.
    pub fn incr(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.rt.block_on(self.inner.incr(key, delta))
    }

    /// Keys in `(start, end]`, ascending, at most `limit`.
    pub fn keys(&self, start: &[u8], end: &[u8], limit: i64) -> Result<Vec<Bytes>> {
        self.rt.block_on(self.inner.keys(start, end, limit))
    }

    /// One page of key-value pairs in `(start, end]`, ascending.
    pub fn scan(&self, start: &[u8], end: &[u8], limit: i64) -> Result<ScanPage<Bytes>> {
        self.rt.block_on(self.inner.scan(start, end, limit))
    }

    /// Fetch one field of a hashmap.
    pub fn hget(&self, name: &[u8], key: &[u8]) -> Result<Option<Bytes>> {
        self.rt.block_on(self.inner.hget(name, key))
    }

    /// Set one field of a hashmap.
    pub fn hset(&self, name: &[u8], key: &[u8], value: &[u8]) -> Result<()> {
        self.rt.block_on(self.inner.hset(name, key, value))
    }

    /// All fields of a hashmap as an ordered mapping.
    pub fn hgetall(&self, name: &[u8]) -> Result<Vec<(Bytes, Bytes)>> {
        self.rt.block_on(self.inner.hgetall(name))
    }

    /// Release pooled connections.
    pub fn close(&self) -> Result<()> {
        self.rt.block_on(self.inner.close())
    }
}
