//! Pool lifecycle tests: bounds, timeouts, idle eviction, teardown.

mod common;

use std::time::Duration;

use common::{accept_login, spawn_service, transport_for};
use querywire::{ChannelConfig, ClientError, Pool, PoolConfig, TcpTransport};

fn pool_config() -> PoolConfig {
    PoolConfig {
        min_connections: 0,
        max_connections: 2,
        idle_timeout: Duration::from_secs(30),
        acquire_timeout: Duration::from_millis(500),
        propagate_create_error: false,
        channel: ChannelConfig::default(),
    }
}

/// Transport aimed at a port nothing listens on.
async fn refused_transport() -> TcpTransport {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("reserve a port");
    let addr = listener.local_addr().expect("reserved addr");
    drop(listener);
    TcpTransport::new(addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn acquire_creates_then_reuses_channels() {
    let addr = spawn_service(accept_login).await;
    let pool = Pool::new(transport_for(addr), "querywire-tests", pool_config());

    let channel = pool.acquire().await.expect("create on demand");
    let id = channel.id();
    pool.release(channel).await;
    assert_eq!(pool.idle_count(), 1);

    let channel = pool.acquire().await.expect("reuse idle channel");
    assert_eq!(channel.id(), id);
    pool.release(channel).await;

    pool.destroy().await;
}

#[tokio::test]
async fn exhausted_pool_times_out_without_growing() {
    let addr = spawn_service(accept_login).await;
    let config = PoolConfig {
        max_connections: 1,
        acquire_timeout: Duration::from_millis(100),
        ..pool_config()
    };
    let pool = Pool::new(transport_for(addr), "querywire-tests", config);

    let held = pool.acquire().await.expect("first channel");
    let err = pool.acquire().await.expect_err("pool exhausted");
    assert!(matches!(err, ClientError::AcquireTimeout(_)));
    assert_eq!(pool.size(), 1, "timeout must not leak a slot");

    pool.release(held).await;
    pool.destroy().await;
}

#[tokio::test]
async fn idle_channels_are_evicted_down_to_the_floor() {
    let addr = spawn_service(accept_login).await;
    let config = PoolConfig {
        min_connections: 1,
        max_connections: 3,
        idle_timeout: Duration::from_millis(100),
        ..pool_config()
    };
    let pool = Pool::new(transport_for(addr), "querywire-tests", config);

    let a = pool.acquire().await.expect("first channel");
    let b = pool.acquire().await.expect("second channel");
    let c = pool.acquire().await.expect("third channel");
    pool.release(a).await;
    pool.release(b).await;
    pool.release(c).await;
    assert_eq!(pool.size(), 3);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(pool.size(), 1, "eviction stops at the floor");
    assert_eq!(pool.idle_count(), 1);

    pool.destroy().await;
}

#[tokio::test]
async fn destroy_wakes_pending_acquirers() {
    let addr = spawn_service(accept_login).await;
    let config = PoolConfig {
        max_connections: 1,
        acquire_timeout: Duration::from_secs(5),
        ..pool_config()
    };
    let pool = Pool::new(transport_for(addr), "querywire-tests", config);

    let held = pool.acquire().await.expect("hold the only slot");
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    pool.destroy().await;
    let err = waiter
        .await
        .expect("join waiter")
        .expect_err("woken by destroy");
    assert!(matches!(err, ClientError::Destroyed));

    // Channels still lent out are disconnected on release, not re-pooled.
    pool.release(held).await;
    assert_eq!(pool.size(), 0);
    assert_eq!(pool.idle_count(), 0);
}

#[tokio::test]
async fn create_failures_keep_retrying_until_the_deadline() {
    let transport = refused_transport().await;
    let config = PoolConfig {
        acquire_timeout: Duration::from_millis(300),
        ..pool_config()
    };
    let pool = Pool::new(transport, "querywire-tests", config);

    let err = pool.acquire().await.expect_err("no service listening");
    assert!(matches!(err, ClientError::AcquireTimeout(_)));

    // Let the last in-flight retry settle before checking bookkeeping.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pool.size(), 0);

    pool.destroy().await;
}

#[tokio::test]
async fn create_failures_propagate_when_configured() {
    let transport = refused_transport().await;
    let config = PoolConfig {
        propagate_create_error: true,
        acquire_timeout: Duration::from_secs(5),
        ..pool_config()
    };
    let pool = Pool::new(transport, "querywire-tests", config);

    let err = pool.acquire().await.expect_err("refused connect");
    assert!(matches!(err, ClientError::ConnectFailed(_)));

    pool.destroy().await;
}
