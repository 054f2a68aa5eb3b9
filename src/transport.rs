//! Transport seam for client connections.
//!
//! The protocol core never names a concrete socket type: channels are generic
//! over any [`SessionStream`], and the [`Transport`] trait abstracts how such
//! a stream is established. [`TlsTransport`] is the production
//! implementation; [`TcpTransport`] serves plaintext deployments and the
//! test suite.

use std::{fmt, io, sync::Arc};

use log::debug;
use rustls::pki_types::ServerName;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::client::TlsStream;

/// Trait alias for stream types a channel can drive.
pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> SessionStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Connection factory for a channel's underlying byte stream.
///
/// Implementations establish a fresh stream per call; the channel applies its
/// own connect timeout around [`connect`](Self::connect).
pub trait Transport: Send + Sync + 'static {
    /// Established stream type.
    type Stream: SessionStream + 'static;

    /// Open a new stream to the remote service.
    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// TLS transport backed by `tokio-rustls` with webpki root anchors.
#[derive(Clone)]
pub struct TlsTransport {
    host: String,
    port: u16,
    connector: tokio_rustls::TlsConnector,
}

impl TlsTransport {
    /// Build a transport for `host:port` trusting the bundled webpki roots.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            host: host.into(),
            port,
            connector: tokio_rustls::TlsConnector::from(Arc::new(config)),
        }
    }

    /// Hostname this transport connects to.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Port this transport connects to.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }
}

impl fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Transport for TlsTransport {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self) -> io::Result<Self::Stream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;
        let name = ServerName::try_from(self.host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let stream = self.connector.connect(name, tcp).await?;
        debug!("TLS session established with {}:{}", self.host, self.port);
        Ok(stream)
    }
}

/// Plaintext TCP transport.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
}

impl TcpTransport {
    /// Build a transport for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;
        Ok(tcp)
    }
}
