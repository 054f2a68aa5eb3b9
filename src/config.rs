//! Client configuration and defaults.
//!
//! [`ClientConfig`] is the fully-merged options structure consumed by the
//! rest of the crate. [`crate::ClientBuilder`] starts from
//! [`ClientConfig::default`] and applies caller overrides; there is no global
//! mutable defaults object.

use std::time::Duration;

use crate::{
    codec::{CodecError, DEFAULT_MAX_FRAME_LENGTH},
    connection::ChannelConfig,
    pool::PoolConfig,
};

/// Default service hostname.
pub const DEFAULT_HOST: &str = "api.vndb.org";

/// Default TLS port of the service.
pub const DEFAULT_TLS_PORT: u16 = 19535;

/// Default plaintext port of the service, for [`crate::TcpTransport`].
pub const DEFAULT_TCP_PORT: u16 = 19534;

/// Text encoding of protocol frames.
///
/// The service speaks UTF-8; the variant exists so the configuration surface
/// names the encoding explicitly and can grow without breaking callers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum Encoding {
    /// UTF-8 text frames.
    #[default]
    Utf8,
}

impl Encoding {
    /// Decode one frame payload.
    pub(crate) fn decode(self, bytes: &[u8]) -> Result<String, CodecError> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(CodecError::InvalidUtf8),
        }
    }
}

/// Fully-merged client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Service hostname.
    pub host: String,
    /// Service port.
    pub port: u16,
    /// Frame text encoding.
    pub encoding: Encoding,
    /// Commands permitted per [`query_interval`](Self::query_interval).
    pub query_limit: usize,
    /// Rolling window the command budget refills over.
    pub query_interval: Duration,
    /// Connection count the pool never shrinks below.
    pub min_connections: usize,
    /// Connection count the pool never grows past.
    pub max_connections: usize,
    /// Idle age past which a pooled connection is destroyed.
    pub idle_timeout: Duration,
    /// Deadline for borrowing a pooled connection.
    pub acquire_timeout: Duration,
    /// Deadline for transport establishment.
    pub connect_timeout: Duration,
    /// Deadline for the login exchange.
    pub login_timeout: Duration,
    /// Surface connection-creation failures to waiting callers instead of
    /// retrying internally.
    pub propagate_create_error: bool,
    /// Maximum resubmissions of one query under sustained throttling.
    pub throttle_retry_limit: u32,
    /// Cap on a single inbound frame.
    pub max_frame_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_TLS_PORT,
            encoding: Encoding::Utf8,
            query_limit: 200,
            query_interval: Duration::from_secs(60),
            min_connections: 1,
            max_connections: 10,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            login_timeout: Duration::from_secs(30),
            propagate_create_error: false,
            throttle_retry_limit: 4,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Clamp inconsistent bounds rather than failing construction.
    ///
    /// The pool needs at least one slot, the floor may not exceed the
    /// ceiling, and the limiter needs a non-zero budget.
    #[must_use]
    pub(crate) fn normalized(mut self) -> Self {
        self.max_connections = self.max_connections.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self.query_limit = self.query_limit.max(1);
        self
    }

    pub(crate) fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_connections: self.min_connections,
            max_connections: self.max_connections,
            idle_timeout: self.idle_timeout,
            acquire_timeout: self.acquire_timeout,
            propagate_create_error: self.propagate_create_error,
            channel: self.channel_config(),
        }
    }

    pub(crate) fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            encoding: self.encoding,
            connect_timeout: self.connect_timeout,
            login_timeout: self.login_timeout,
            throttle_retry_limit: self.throttle_retry_limit,
            max_frame_length: self.max_frame_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_target_the_public_service() {
        let config = ClientConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_TLS_PORT);
        assert_eq!(config.query_limit, 200);
        assert_eq!(config.query_interval, Duration::from_secs(60));
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_connections, 10);
    }

    #[rstest]
    #[case(0, 0, 1, 0)]
    #[case(5, 2, 2, 2)]
    #[case(3, 10, 10, 3)]
    fn normalized_clamps_pool_bounds(
        #[case] min: usize,
        #[case] max: usize,
        #[case] expected_max: usize,
        #[case] expected_min: usize,
    ) {
        let config = ClientConfig {
            min_connections: min,
            max_connections: max,
            ..ClientConfig::default()
        }
        .normalized();
        assert_eq!(config.max_connections, expected_max);
        assert_eq!(config.min_connections, expected_min);
    }

    #[test]
    fn normalized_keeps_a_nonzero_query_budget() {
        let config = ClientConfig {
            query_limit: 0,
            ..ClientConfig::default()
        }
        .normalized();
        assert_eq!(config.query_limit, 1);
    }
}
