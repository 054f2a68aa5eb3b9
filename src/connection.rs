//! Connection channel: the lifecycle state machine for one protocol session.
//!
//! A channel owns one framed transport stream and walks `Disconnected →
//! Connected → Ready`, with teardown reachable from every state. One query is
//! in flight at a time (the exclusive borrow on [`Channel::query`] stands in
//! for a busy state), and transient throttling is absorbed here with an
//! explicit, bounded resubmission loop.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::{
    codec::{DEFAULT_MAX_FRAME_LENGTH, SENTINEL, SentinelCodec},
    config::Encoding,
    error::ClientError,
    response::{self, ParseError, Response, Status},
    transport::{SessionStream, Transport},
};

/// Protocol revision sent in the login handshake.
const PROTOCOL_VERSION: u8 = 1;

/// Client software revision sent in the login handshake.
const CLIENT_VERSION: f32 = 1.0;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Handshake body; field order matches the wire layout.
#[derive(Serialize)]
struct LoginPayload<'a> {
    protocol: u8,
    client: &'a str,
    clientver: f32,
}

/// Per-channel tunables captured at construction.
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfig {
    /// Frame text encoding.
    pub encoding: Encoding,
    /// Deadline for transport establishment.
    pub connect_timeout: Duration,
    /// Deadline for the login exchange.
    pub login_timeout: Duration,
    /// Maximum resubmissions of one query under sustained throttling.
    pub throttle_retry_limit: u32,
    /// Cap on a single inbound frame.
    pub max_frame_length: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            connect_timeout: Duration::from_secs(30),
            login_timeout: Duration::from_secs(30),
            throttle_retry_limit: 4,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// No transport stream; the initial and terminal state.
    Disconnected,
    /// Stream established, handshake not yet performed.
    Connected,
    /// Handshake acknowledged; queries may be issued.
    Ready,
}

/// One protocol session over a framed transport stream.
pub struct Channel<T: SessionStream> {
    id: u64,
    config: ChannelConfig,
    framed: Option<Framed<T, SentinelCodec>>,
    state: SessionState,
}

impl<T: SessionStream> Channel<T> {
    /// Create a disconnected channel.
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            framed: None,
            state: SessionState::Disconnected,
        }
    }

    /// Opaque identity, unique within the process.
    #[must_use]
    pub const fn id(&self) -> u64 { self.id }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState { self.state }

    /// True when the channel is logged in and can accept a query.
    #[must_use]
    pub fn is_ready(&self) -> bool { self.state == SessionState::Ready }

    /// Establish the transport stream.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectTimeout`] when the configured deadline elapses,
    /// [`ClientError::ConnectFailed`] when the transport errors before
    /// establishing, [`ClientError::AlreadyConnected`] when a stream is
    /// already held. On failure the channel stays Disconnected.
    pub async fn connect<P>(&mut self, transport: &P) -> Result<(), ClientError>
    where
        P: Transport<Stream = T>,
    {
        if self.framed.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        let stream = match timeout(self.config.connect_timeout, transport.connect()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ClientError::ConnectFailed(e)),
            Err(_) => return Err(ClientError::ConnectTimeout),
        };
        let codec = SentinelCodec::new(self.config.encoding, self.config.max_frame_length);
        self.framed = Some(Framed::new(stream, codec));
        self.state = SessionState::Connected;
        debug!(channel = self.id, "transport established");
        Ok(())
    }

    /// Perform the login handshake.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] when no stream is held (nothing is
    /// written), [`ClientError::AlreadyLoggedIn`] when the handshake already
    /// completed, [`ClientError::LoginRejected`] when the service answers
    /// with anything but `ok` (the channel disconnects first), and
    /// [`ClientError::LoginTimeout`] when the exchange misses its deadline.
    pub async fn login(&mut self, client_name: &str) -> Result<(), ClientError> {
        match self.state {
            SessionState::Disconnected => return Err(ClientError::NotConnected),
            SessionState::Ready => return Err(ClientError::AlreadyLoggedIn),
            SessionState::Connected => {}
        }
        let payload = serde_json::to_string(&LoginPayload {
            protocol: PROTOCOL_VERSION,
            client: client_name,
            clientver: CLIENT_VERSION,
        })
        .map_err(ParseError::Json)?;
        let frame = format!("login {payload}");

        let outcome = timeout(self.config.login_timeout, async {
            self.send_frame(&frame).await?;
            self.recv_frame().await
        })
        .await;
        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                self.poison();
                return Err(e);
            }
            Err(_) => {
                self.poison();
                return Err(ClientError::LoginTimeout);
            }
        };

        if reply == "ok" {
            self.state = SessionState::Ready;
            debug!(channel = self.id, "login acknowledged");
            return Ok(());
        }

        // Any other content is a handshake rejection.
        let rejection = response::parse_handshake_error(&reply);
        self.disconnect().await;
        match rejection {
            Ok(body) => Err(ClientError::LoginRejected(body)),
            Err(e) => Err(ClientError::Parse(e)),
        }
    }

    /// Issue one query and return its parsed response.
    ///
    /// Throttled rejections are absorbed by waiting the mandated `fullwait`
    /// and resubmitting the identical query, up to the configured retry
    /// limit; a missing `fullwait` resubmits at once. Parse and transport
    /// failures tear the session down and the channel must be discarded.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] when the channel is not Ready (nothing
    /// is written), [`ClientError::Remote`] for non-transient rejections,
    /// [`ClientError::Throttled`] when the retry bound is exhausted,
    /// [`ClientError::Parse`] / [`ClientError::Io`] /
    /// [`ClientError::Disconnected`] on protocol or transport failure.
    pub async fn query(&mut self, query: &str) -> Result<Response, ClientError> {
        if self.state != SessionState::Ready {
            return Err(ClientError::NotConnected);
        }
        if query.as_bytes().contains(&SENTINEL) {
            return Err(ClientError::Parse(ParseError::Frame(
                crate::codec::CodecError::SentinelInPayload,
            )));
        }

        let mut attempts: u32 = 0;
        loop {
            let response = match self.exchange(query).await {
                Ok(response) => response,
                Err(e) => {
                    self.poison();
                    return Err(e);
                }
            };
            if response.status != Status::Error {
                return Ok(response);
            }
            let Some(remote) = response.remote_error() else {
                self.poison();
                return Err(ClientError::Parse(ParseError::MalformedErrorBody));
            };
            if !remote.is_throttled() {
                return Err(ClientError::Remote(remote));
            }
            if attempts >= self.config.throttle_retry_limit {
                warn!(channel = self.id, attempts, "throttle retry limit exhausted");
                return Err(ClientError::Throttled {
                    attempts,
                    fullwait: remote.wait_duration(),
                });
            }
            attempts += 1;
            let wait = remote.wait_duration().unwrap_or(Duration::ZERO);
            trace!(channel = self.id, attempts, ?wait, "throttled; resubmitting");
            sleep(wait).await;
        }
    }

    /// Gracefully close the session.
    ///
    /// Flushes pending frames, signals end-of-stream, and drains inbound
    /// frames until the peer confirms the close. A disconnected channel
    /// resolves immediately.
    pub async fn disconnect(&mut self) {
        let Some(mut framed) = self.framed.take() else {
            return;
        };
        self.state = SessionState::Disconnected;
        // Close failures are moot: the session is ending either way.
        if SinkExt::<&str>::close(&mut framed).await.is_ok() {
            while let Some(inbound) = framed.next().await {
                if inbound.is_err() {
                    break;
                }
            }
        }
        debug!(channel = self.id, "disconnected");
    }

    /// Send one frame and parse the next inbound frame as its response.
    async fn exchange(&mut self, query: &str) -> Result<Response, ClientError> {
        self.send_frame(query).await?;
        let frame = self.recv_frame().await?;
        Ok(response::parse(query, &frame)?)
    }

    async fn send_frame(&mut self, frame: &str) -> Result<(), ClientError> {
        let framed = self.framed.as_mut().ok_or(ClientError::NotConnected)?;
        framed.send(frame).await.map_err(ClientError::from)
    }

    async fn recv_frame(&mut self) -> Result<String, ClientError> {
        let framed = self.framed.as_mut().ok_or(ClientError::NotConnected)?;
        match framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::Disconnected),
        }
    }

    /// Tear the session down after an unrecoverable failure.
    fn poison(&mut self) {
        self.framed = None;
        self.state = SessionState::Disconnected;
    }
}

impl<T: SessionStream> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
