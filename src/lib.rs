//! # ssdb
//!
//! Client for [SSDB](https://github.com/ideawu/ssdb), a Redis-like
//! networked key-value store speaking a plain-text length-prefixed
//! protocol over TCP.
//!
//! ## Architecture
//!
//! - **Protocol** (`protocol`): incremental frame parser over an
//!   append-fed receive buffer, plus the request encoder
//! - **Connection** (`connection`): one TCP socket, one request in
//!   flight, with an `auth` handshake and a non-blocking liveness probe
//! - **Pool** (`pool`): bounded, fork-safe LIFO pool of connections
//! - **Client** (`client`, `blocking`): command dispatch and typed
//!   wrappers, async and blocking
//!
//! ## Example
//!
//! ```ignore
//! use ssdb::Client;
//!
//! #[tokio::main]
//! async fn main() -> ssdb::Result<()> {
//!     let client = Client::open("127.0.0.1", 8888);
//!     client.set(b"greeting", b"hello").await?;
//!     let value = client.get(b"greeting").await?;
//!     assert_eq!(value.as_deref(), Some(&b"hello"[..]));
//!     client.close().await
//! }
//! ```

pub mod blocking;
pub mod error;
pub mod protocol;

mod client;
mod connection;
mod pool;
mod response;

pub use client::{Client, ClientConfig};
pub use connection::{Connection, ConnectionConfig, IdleProbe};
pub use error::{Result, SsdbError};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use protocol::{Arg, Frame};
pub use response::{interpret, response_class, IntValueMode, Reply, ResponseClass, ScanPage};
