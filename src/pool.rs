//! Bounded, fork-safe connection pool.
//!
//! The pool multiplexes one client across many short-lived requests while
//! keeping at most one request in flight per physical connection. Pool
//! state lives under a plain mutex that is only held for bookkeeping;
//! all socket I/O happens outside it so a slow connect never serializes
//! other leases. Leases at capacity park on a notifier until a release.
//!
//! Pool identity is tied to the PID that created it. After a fork the
//! first pool operation in the child detects the PID mismatch and resets
//! all state, abandoning the parent's connections without shutting down
//! the sockets it inherited.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::connection::{Connection, ConnectionConfig, IdleProbe};
use crate::error::{Result, SsdbError};
use crate::protocol::{Arg, Frame};

/// Bounded wait for the fork-reset lock before giving up.
pub const FORK_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Effective capacity when `max_connections` is zero.
const UNBOUNDED_CONNECTIONS: usize = i32::MAX as usize;

/// Pool configuration.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Settings applied to every connection the pool creates.
    pub connection: ConnectionConfig,
    /// Maximum live connections; `0` means unbounded.
    pub max_connections: usize,
    /// How long a lease may wait at capacity before failing with
    /// [`SsdbError::PoolExhausted`]. `None` waits indefinitely.
    pub lease_timeout: Option<Duration>,
}

#[derive(Debug)]
struct PoolState {
    /// Idle connections, popped LIFO so the warmest one is reused first.
    available: Vec<Connection>,
    created: usize,
    in_use: usize,
    /// Bumped by `disconnect_all` and fork resets; leases from an older
    /// generation are discarded on release instead of pooled.
    generation: u64,
}

#[derive(Debug)]
struct PoolInner {
    config: PoolConfig,
    owning_pid: AtomicU32,
    state: Mutex<PoolState>,
    released: Notify,
    fork_lock: Mutex<()>,
}

/// Cloneable handle to a shared connection pool.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create an empty pool. Connections are created on demand.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                owning_pid: AtomicU32::new(std::process::id()),
                state: Mutex::new(PoolState {
                    available: Vec::new(),
                    created: 0,
                    in_use: 0,
                    generation: 0,
                }),
                released: Notify::new(),
                fork_lock: Mutex::new(()),
            }),
        }
    }

    fn capacity(&self) -> usize {
        match self.inner.config.max_connections {
            0 => UNBOUNDED_CONNECTIONS,
            n => n,
        }
    }

    /// Take a ready-to-use connection out of the pool.
    ///
    /// Pops the most recently used idle connection (or creates one),
    /// connects it if necessary and probes that it is truly idle. A stale
    /// or stray-data connection gets one reconnect before the lease fails.
    pub async fn lease(&self) -> Result<PooledConnection> {
        self.check_pid()?;
        let (mut conn, generation) = self.take_or_create().await?;
        match self.prepare(&mut conn).await {
            Ok(()) => Ok(PooledConnection {
                pool: self.inner.clone(),
                conn: Some(conn),
                generation,
                reusable: true,
            }),
            Err(err) => {
                // The connection object survives the failed lease; it is
                // reconnected from scratch next time it is popped.
                self.finish_release(conn, generation, true);
                Err(err)
            }
        }
    }

    async fn take_or_create(&self) -> Result<(Connection, u64)> {
        loop {
            let wait = {
                let mut state = self.inner.state.lock();
                if let Some(conn) = state.available.pop() {
                    state.in_use += 1;
                    return Ok((conn, state.generation));
                }
                if state.created < self.capacity() {
                    state.created += 1;
                    state.in_use += 1;
                    let conn = Connection::new(self.inner.config.connection.clone());
                    return Ok((conn, state.generation));
                }
                self.inner.released.notified()
            };
            match self.inner.config.lease_timeout {
                Some(limit) => tokio::time::timeout(limit, wait)
                    .await
                    .map_err(|_| SsdbError::PoolExhausted)?,
                None => wait.await,
            }
        }
    }

    async fn prepare(&self, conn: &mut Connection) -> Result<()> {
        match self.connect_and_probe(conn).await {
            Ok(IdleProbe::Idle) => return Ok(()),
            Ok(IdleProbe::DataPresent) => {
                tracing::warn!("recycling pooled connection with undrained data");
            }
            Err(err) => {
                tracing::debug!(error = %err, "retrying pooled connection once");
            }
        }
        let _ = conn.disconnect().await;
        match self.connect_and_probe(conn).await? {
            IdleProbe::Idle => Ok(()),
            IdleProbe::DataPresent => Err(SsdbError::ConnectionNotReady),
        }
    }

    async fn connect_and_probe(&self, conn: &mut Connection) -> Result<IdleProbe> {
        conn.connect().await?;
        conn.probe_idle().await
    }

    fn finish_release(&self, conn: Connection, generation: u64, reusable: bool) {
        {
            let mut state = self.inner.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
            let owned = conn.owning_pid() == self.inner.owning_pid.load(Ordering::Acquire);
            if reusable && owned && generation == state.generation {
                state.available.push(conn);
            } else {
                state.created = state.created.saturating_sub(1);
                // Dropping the connection closes this process's
                // descriptor without an orderly shutdown.
            }
        }
        self.inner.released.notify_one();
    }

    /// Disconnect every idle connection and retire the current
    /// generation so in-flight connections are discarded on release.
    pub async fn disconnect_all(&self) -> Result<()> {
        self.check_pid()?;
        let drained: Vec<Connection> = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            let drained = std::mem::take(&mut state.available);
            state.created = state.created.saturating_sub(drained.len());
            drained
        };
        let mut last_err = None;
        for mut conn in drained {
            if let Err(err) = conn.disconnect().await {
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Detect a fork and reset pool state if one happened.
    ///
    /// The reset is serialized through a second lock so sibling threads
    /// racing into the child all observe a single re-initialization, and
    /// so it stays acquirable even if the primary mutex was held by the
    /// parent at fork time.
    pub(crate) fn check_pid(&self) -> Result<()> {
        let current = std::process::id();
        if self.inner.owning_pid.load(Ordering::Acquire) == current {
            return Ok(());
        }
        let guard = self
            .inner
            .fork_lock
            .try_lock_for(FORK_LOCK_TIMEOUT)
            .ok_or(SsdbError::ForkLockTimeout)?;
        if self.inner.owning_pid.load(Ordering::Acquire) != current {
            tracing::warn!(pid = current, "fork detected, resetting pool");
            let mut state = self.inner.state.lock();
            // Parent-owned sockets are abandoned, never shut down: the
            // child closes only its inherited descriptor copies.
            state.available.clear();
            state.created = 0;
            state.in_use = 0;
            state.generation += 1;
            self.inner.owning_pid.store(current, Ordering::Release);
        }
        drop(guard);
        Ok(())
    }

    /// Idle connection count (for diagnostics and tests).
    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().available.len()
    }

    /// Total live connection count (idle plus leased).
    pub fn connection_count(&self) -> usize {
        self.inner.state.lock().created
    }

    /// Leased connection count.
    pub fn in_use_count(&self) -> usize {
        self.inner.state.lock().in_use
    }
}

/// RAII lease over one pooled connection.
///
/// Dropping the guard returns the connection to the pool, unless a
/// request was interrupted mid-flight (including cancellation at an
/// await point), in which case the connection is discarded: a partial
/// write or read would desynchronize the frame stream for the next user.
#[derive(Debug)]
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    generation: u64,
    reusable: bool,
}

impl PooledConnection {
    /// Issue one request and read its response.
    pub async fn request(&mut self, cmd: &str, args: &[Arg]) -> Result<Frame> {
        self.reusable = false;
        let conn = self.conn.as_mut().expect("connection exists");
        conn.send(cmd, args).await?;
        let frame = conn.read_response().await?;
        self.reusable = true;
        Ok(frame)
    }

    /// Access the underlying connection.
    pub fn connection(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection exists")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };
        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };
        // Release also runs the fork check; in a child that cannot reset
        // (lock timeout) the connection is simply dropped.
        if pool.check_pid().is_err() {
            return;
        }
        pool.finish_release(conn, self.generation, self.reusable);
    }
}
