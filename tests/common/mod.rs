//! Shared mock service speaking the sentinel protocol over loopback TCP.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use querywire::TcpTransport;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// End-of-frame control byte, mirrored from the crate under test.
pub const SENTINEL: u8 = 0x04;

/// Accept connections and answer every inbound frame via `reply`.
///
/// Returning `None` drops the connection. Each connection is served on its
/// own task so pooled clients can hold several at once.
pub async fn spawn_service<F>(reply: F) -> SocketAddr
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    spawn_service_with_delay(Duration::ZERO, reply).await
}

/// Like [`spawn_service`], pausing `delay` before answering non-login frames
/// so tests can force queries to overlap.
pub async fn spawn_service_with_delay<F>(delay: Duration, reply: F) -> SocketAddr
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock service");
    let addr = listener.local_addr().expect("mock service addr");
    let reply = Arc::new(reply);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve_connection(stream, Arc::clone(&reply), delay));
        }
    });
    addr
}

/// Standard handshake acceptance for tests that only care about queries.
pub fn accept_login(frame: &str) -> Option<String> {
    frame.starts_with("login ").then(|| "ok".to_owned())
}

/// Install a test subscriber so failures carry the crate's traces.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Plaintext transport aimed at a mock service.
pub fn transport_for(addr: SocketAddr) -> TcpTransport {
    TcpTransport::new(addr.ip().to_string(), addr.port())
}

async fn serve_connection<F>(mut stream: TcpStream, reply: Arc<F>, delay: Duration)
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    let mut buf = Vec::new();
    while let Ok(Some(frame)) = read_frame(&mut stream, &mut buf).await {
        if !frame.starts_with("login ") && delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        let Some(response) = reply(&frame) else {
            return;
        };
        let mut payload = response.into_bytes();
        payload.push(SENTINEL);
        if stream.write_all(&payload).await.is_err() {
            return;
        }
    }
}

async fn read_frame(stream: &mut TcpStream, buf: &mut Vec<u8>) -> std::io::Result<Option<String>> {
    loop {
        if let Some(pos) = buf.iter().position(|&byte| byte == SENTINEL) {
            let mut frame: Vec<u8> = buf.drain(..=pos).collect();
            frame.pop();
            return Ok(Some(String::from_utf8(frame).expect("utf-8 frame")));
        }
        let mut chunk = [0u8; 1024];
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..read]);
    }
}
