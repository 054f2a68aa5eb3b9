//! Public client: the rate-limited dispatcher over the connection pool.
//!
//! [`Client`] composes a token-bucket [`QueryLimiter`] with a bounded
//! [`Pool`]; each query takes one rate token, borrows one pooled channel for
//! a single exchange, and returns the channel on both success and failure
//! paths. Transient throttling is absorbed inside the channel and never
//! observed here.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::{
    config::{ClientConfig, Encoding},
    error::ClientError,
    limiter::QueryLimiter,
    pool::Pool,
    response::Response,
    transport::{TlsTransport, Transport},
};

/// Client for a sentinel-framed query service.
///
/// # Examples
///
/// ```no_run
/// use querywire::Client;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), querywire::ClientError> {
/// let client = Client::new("demo");
/// let response = client.query("get vn basic (id = 4)").await?;
/// println!("{}: {:?}", response.search_type, response.body);
/// client.destroy().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client<P: Transport = TlsTransport> {
    limiter: QueryLimiter,
    pool: Pool<P>,
    destroyed: AtomicBool,
}

impl Client<TlsTransport> {
    /// Client with default configuration: TLS to the public service.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the pool spawns its
    /// worker tasks at construction.
    #[must_use]
    pub fn new(client_name: impl Into<String>) -> Self {
        Self::builder(client_name).build()
    }

    /// Start building a client.
    #[must_use]
    pub fn builder(client_name: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(client_name)
    }
}

impl<P: Transport> Client<P> {
    /// Submit one query and await its parsed response.
    ///
    /// Waits for a rate-limit token, borrows a pooled channel for exactly one
    /// exchange, and always returns the channel to the pool afterwards.
    ///
    /// # Errors
    ///
    /// [`ClientError::Destroyed`] after [`destroy`](Self::destroy); pool
    /// acquisition failures ([`ClientError::AcquireTimeout`] or a propagated
    /// create failure); any error surfaced by the exchange itself.
    pub async fn query(&self, query: &str) -> Result<Response, ClientError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(ClientError::Destroyed);
        }
        self.limiter.acquire().await;
        let mut channel = self.pool.acquire().await?;
        let result = channel.query(query).await;
        self.pool.release(channel).await;
        result
    }

    /// Tear down the pool and refuse further queries. Idempotent.
    pub async fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.pool.destroy().await;
        debug!("client destroyed");
    }

    /// Pooled-connection count: idle, lent, and connecting.
    #[must_use]
    pub fn pool_size(&self) -> usize { self.pool.size() }
}

/// Builder merging caller overrides into [`ClientConfig::default`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use querywire::Client;
///
/// # #[tokio::main]
/// # async fn main() {
/// let client = Client::builder("demo")
///     .query_limit(50)
///     .query_interval(Duration::from_secs(30))
///     .max_connections(4)
///     .build();
/// # drop(client);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    client_name: String,
    config: ClientConfig,
}

impl ClientBuilder {
    fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            config: ClientConfig::default(),
        }
    }

    /// Override the service hostname.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Override the service port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Override the frame text encoding.
    #[must_use]
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Commands permitted per [`query_interval`](Self::query_interval).
    #[must_use]
    pub fn query_limit(mut self, limit: usize) -> Self {
        self.config.query_limit = limit;
        self
    }

    /// Rolling window the command budget refills over.
    #[must_use]
    pub fn query_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.query_interval = interval;
        self
    }

    /// Connection count the pool never shrinks below.
    #[must_use]
    pub fn min_connections(mut self, min: usize) -> Self {
        self.config.min_connections = min;
        self
    }

    /// Connection count the pool never grows past.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Idle age past which a pooled connection is destroyed.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Deadline for borrowing a pooled connection.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Deadline for transport establishment.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Deadline for the login exchange.
    #[must_use]
    pub fn login_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.login_timeout = timeout;
        self
    }

    /// Surface connection-creation failures to waiting callers instead of
    /// retrying internally.
    #[must_use]
    pub fn propagate_create_error(mut self, propagate: bool) -> Self {
        self.config.propagate_create_error = propagate;
        self
    }

    /// Maximum resubmissions of one query under sustained throttling.
    #[must_use]
    pub fn throttle_retry_limit(mut self, limit: u32) -> Self {
        self.config.throttle_retry_limit = limit;
        self
    }

    /// Cap on a single inbound frame.
    #[must_use]
    pub fn max_frame_length(mut self, length: usize) -> Self {
        self.config.max_frame_length = length;
        self
    }

    /// Replace the whole configuration at once.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Build with the default TLS transport to the configured `host:port`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the pool spawns its
    /// worker tasks at construction.
    #[must_use]
    pub fn build(self) -> Client<TlsTransport> {
        let transport = TlsTransport::new(self.config.host.clone(), self.config.port);
        self.build_with_transport(transport)
    }

    /// Build against a caller-supplied transport (plaintext or test doubles).
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; the pool spawns its
    /// worker tasks at construction.
    #[must_use]
    pub fn build_with_transport<P: Transport>(self, transport: P) -> Client<P> {
        let config = self.config.normalized();
        let limiter = QueryLimiter::new(config.query_limit, config.query_interval);
        let pool = Pool::new(transport, self.client_name, config.pool_config());
        Client {
            limiter,
            pool,
            destroyed: AtomicBool::new(false),
        }
    }
}
