#![doc(html_root_url = "https://docs.rs/querywire/latest")]
//! Pooled, rate-limited client for sentinel-framed text query protocols.
//!
//! The remote database service speaks a line-oriented protocol where every
//! frame ends with a single 0x04 control byte and responses carry
//! `<status> <json-object>` payloads. This crate provides the connection
//! lifecycle state machine (secure connect → login handshake → query
//! exchange → graceful close), a bounded connection pool with idle eviction,
//! token-bucket rate limiting, and transparent retry on transient
//! throttling.
//!
//! # Examples
//!
//! ```no_run
//! use querywire::Client;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), querywire::ClientError> {
//! let client = Client::new("demo");
//! let stats = client.query("dbstats").await?;
//! println!("{:?}", stats.body);
//! client.destroy().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod limiter;
pub mod pool;
pub mod response;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use codec::{CodecError, SENTINEL, SentinelCodec};
pub use config::{ClientConfig, DEFAULT_HOST, DEFAULT_TCP_PORT, DEFAULT_TLS_PORT, Encoding};
pub use connection::{Channel, ChannelConfig, SessionState};
pub use error::ClientError;
pub use limiter::QueryLimiter;
pub use pool::{Pool, PoolConfig};
pub use response::{ParseError, RemoteError, Response, Status};
pub use transport::{SessionStream, TcpTransport, TlsTransport, Transport};
