//! Bounded connection pool.
//!
//! Owns between `min_connections` and `max_connections` logged-in channels.
//! Creation (connect + login) runs in spawned tasks so an acquire timeout
//! cancels only the waiting caller: a create that completes after its caller
//! gave up parks the channel for a future acquirer. A background reaper
//! destroys channels idle past the configured threshold without shrinking
//! the pool below its floor.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use tokio::{
    sync::Notify,
    time::{Instant, sleep, timeout_at},
};
use tracing::{debug, trace, warn};

use crate::{
    connection::{Channel, ChannelConfig},
    error::ClientError,
    transport::{SessionStream, Transport},
};

/// Backoff before a failed create is replaced when failures are retried
/// internally rather than propagated.
const CREATE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Floor on the reaper's sweep period.
const MIN_REAP_PERIOD: Duration = Duration::from_millis(10);

/// Pool tunables captured at construction.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Connection count the reaper never shrinks below.
    pub min_connections: usize,
    /// Ceiling on total channels (idle, lent, and connecting).
    pub max_connections: usize,
    /// Idle age past which a channel is destroyed.
    pub idle_timeout: Duration,
    /// Deadline for one [`Pool::acquire`] call.
    pub acquire_timeout: Duration,
    /// Surface create failures to waiting acquirers instead of retrying.
    pub propagate_create_error: bool,
    /// Options applied to every channel the pool creates.
    pub channel: ChannelConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            propagate_create_error: false,
            channel: ChannelConfig::default(),
        }
    }
}

struct IdleEntry<T: SessionStream> {
    channel: Channel<T>,
    since: Instant,
}

struct PoolState<T: SessionStream> {
    idle: VecDeque<IdleEntry<T>>,
    /// Channels accounted for: idle + lent out + being created.
    total: usize,
    /// Most recent create failure, consumed by an acquirer.
    create_error: Option<ClientError>,
    closed: bool,
}

struct PoolInner<P: Transport> {
    transport: P,
    client_name: String,
    config: PoolConfig,
    state: Mutex<PoolState<P::Stream>>,
    /// Wakes acquirers on release, create completion, and teardown.
    notify: Notify,
}

/// Handle to a shared connection pool.
pub struct Pool<P: Transport> {
    inner: Arc<PoolInner<P>>,
}

impl<P: Transport> Clone for Pool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Transport> Pool<P> {
    /// Create a pool and pre-warm `min_connections` channels.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime: creation and idle reaping
    /// run as spawned tasks.
    #[must_use]
    pub fn new(transport: P, client_name: impl Into<String>, config: PoolConfig) -> Self {
        let warm = config.min_connections;
        let reap_period = (config.idle_timeout / 2).max(MIN_REAP_PERIOD);
        let inner = Arc::new(PoolInner {
            transport,
            client_name: client_name.into(),
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: warm,
                create_error: None,
                closed: false,
            }),
            notify: Notify::new(),
        });
        for _ in 0..warm {
            Self::spawn_create(&inner);
        }
        tokio::spawn(Self::reap_loop(Arc::downgrade(&inner), reap_period));
        Self { inner }
    }

    /// Borrow a Ready channel, creating one when below the ceiling.
    ///
    /// # Errors
    ///
    /// [`ClientError::AcquireTimeout`] when no channel becomes available in
    /// time, [`ClientError::Destroyed`] after teardown, or a recorded create
    /// failure when `propagate_create_error` is set.
    pub async fn acquire(&self) -> Result<Channel<P::Stream>, ClientError> {
        let deadline = Instant::now() + self.inner.config.acquire_timeout;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock().expect("pool mutex poisoned");
                if state.closed {
                    return Err(ClientError::Destroyed);
                }
                if let Some(entry) = state.idle.pop_front() {
                    return Ok(entry.channel);
                }
                if let Some(err) = state.create_error.take() {
                    if self.inner.config.propagate_create_error {
                        return Err(err);
                    }
                    warn!(error = %err, "connection create failed; retrying");
                }
                if state.total < self.inner.config.max_connections {
                    state.total += 1;
                    drop(state);
                    Self::spawn_create(&self.inner);
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Err(ClientError::AcquireTimeout(
                    self.inner.config.acquire_timeout,
                ));
            }
        }
    }

    /// Return a borrowed channel.
    ///
    /// Ready channels re-enter the idle set timestamped for eviction;
    /// torn-down channels are destroyed and their slot freed. After
    /// [`destroy`](Self::destroy) the channel is disconnected instead of
    /// re-pooled.
    pub async fn release(&self, mut channel: Channel<P::Stream>) {
        let to_disconnect = {
            let mut state = self.inner.state.lock().expect("pool mutex poisoned");
            if state.closed || !channel.is_ready() {
                state.total -= 1;
                Some(channel)
            } else {
                state.idle.push_back(IdleEntry {
                    channel,
                    since: Instant::now(),
                });
                None
            }
        };
        if let Some(mut channel) = to_disconnect {
            channel.disconnect().await;
        }
        self.inner.notify.notify_waiters();
    }

    /// Tear down the pool: refuse new acquires, disconnect idle channels,
    /// wake pending acquirers. Idempotent.
    pub async fn destroy(&self) {
        let victims: Vec<Channel<P::Stream>> = {
            let mut state = self.inner.state.lock().expect("pool mutex poisoned");
            if state.closed {
                Vec::new()
            } else {
                state.closed = true;
                let drained: Vec<_> = state.idle.drain(..).map(|entry| entry.channel).collect();
                state.total -= drained.len();
                drained
            }
        };
        self.inner.notify.notify_waiters();
        for mut channel in victims {
            channel.disconnect().await;
        }
        debug!("pool destroyed");
    }

    /// Channels currently accounted for: idle, lent, and connecting.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.state.lock().expect("pool mutex poisoned").total
    }

    /// Channels currently parked idle.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("pool mutex poisoned")
            .idle
            .len()
    }

    /// Start creating a channel for an already-reserved slot.
    fn spawn_create(inner: &Arc<PoolInner<P>>) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            match Self::create_channel(&inner).await {
                Ok(mut channel) => {
                    {
                        let mut state = inner.state.lock().expect("pool mutex poisoned");
                        if !state.closed {
                            state.idle.push_back(IdleEntry {
                                channel,
                                since: Instant::now(),
                            });
                            drop(state);
                            inner.notify.notify_waiters();
                            return;
                        }
                        state.total -= 1;
                    }
                    // Raced with destroy; the channel never entered the pool.
                    channel.disconnect().await;
                }
                Err(err) => {
                    if !inner.config.propagate_create_error {
                        sleep(CREATE_RETRY_DELAY).await;
                    }
                    {
                        let mut state = inner.state.lock().expect("pool mutex poisoned");
                        state.total -= 1;
                        state.create_error = Some(err);
                    }
                    inner.notify.notify_waiters();
                }
            }
        });
    }

    /// Connect and log in one channel.
    async fn create_channel(inner: &PoolInner<P>) -> Result<Channel<P::Stream>, ClientError> {
        let mut channel = Channel::new(inner.config.channel);
        channel.connect(&inner.transport).await?;
        channel.login(&inner.client_name).await?;
        trace!(channel = channel.id(), "pooled channel ready");
        Ok(channel)
    }

    async fn reap_loop(inner: Weak<PoolInner<P>>, period: Duration) {
        loop {
            sleep(period).await;
            let Some(inner) = inner.upgrade() else { return };
            let victims = {
                let mut state = inner.state.lock().expect("pool mutex poisoned");
                if state.closed {
                    return;
                }
                let now = Instant::now();
                let mut victims = Vec::new();
                while let Some(entry) = state.idle.front() {
                    if state.total <= inner.config.min_connections
                        || now.duration_since(entry.since) < inner.config.idle_timeout
                    {
                        break;
                    }
                    let entry = state.idle.pop_front().expect("front entry present");
                    state.total -= 1;
                    victims.push(entry.channel);
                }
                victims
            };
            for mut channel in victims {
                trace!(channel = channel.id(), "evicting idle channel");
                channel.disconnect().await;
            }
        }
    }
}

impl<P: Transport> std::fmt::Debug for Pool<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().expect("pool mutex poisoned");
        f.debug_struct("Pool")
            .field("total", &state.total)
            .field("idle", &state.idle.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}
