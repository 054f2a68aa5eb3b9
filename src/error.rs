//! Error types for client operations.
//!
//! Every failure surfaced by the public API is one tagged variant of
//! [`ClientError`], carrying only the fields relevant to that kind, and maps
//! to a stable machine-readable code via [`ClientError::code`]. Transient
//! throttling never reaches callers unless the retry bound is exhausted.

use std::{io, time::Duration};

use crate::{
    codec::CodecError,
    response::{ParseError, RemoteError},
};

/// Errors emitted by [`crate::Client`] and its components.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Operation attempted on a channel without an active session.
    #[error("not connected")]
    NotConnected,
    /// `connect` called on a channel that already holds a stream.
    #[error("already connected")]
    AlreadyConnected,
    /// `login` called on a channel that already completed the handshake.
    #[error("already logged in")]
    AlreadyLoggedIn,
    /// Connection establishment exceeded the configured deadline.
    #[error("connection timed out")]
    ConnectTimeout,
    /// The transport failed before the connection was established.
    #[error("connection failed: {0}")]
    ConnectFailed(#[source] io::Error),
    /// The login exchange exceeded the configured deadline.
    #[error("login timed out")]
    LoginTimeout,
    /// The remote service rejected the login handshake.
    #[error("login rejected: {0}")]
    LoginRejected(RemoteError),
    /// The peer closed the connection before a response arrived.
    #[error("connection closed by peer")]
    Disconnected,
    /// The throttle retry bound was exhausted; the last rejection stands.
    #[error("throttled by server after {attempts} resubmissions")]
    Throttled {
        /// Resubmissions performed before giving up.
        attempts: u32,
        /// Wait mandated by the final throttled response.
        fullwait: Option<Duration>,
    },
    /// No pooled connection became available within the deadline.
    #[error("no connection available within {0:?}")]
    AcquireTimeout(Duration),
    /// The remote service rejected the query.
    #[error("query rejected: {0}")]
    Remote(RemoteError),
    /// A frame could not be interpreted; the channel was discarded.
    #[error("malformed response: {0}")]
    Parse(#[from] ParseError),
    /// The client was destroyed; no further queries are accepted.
    #[error("client destroyed")]
    Destroyed,
    /// Transport I/O failure mid-session.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Stable machine-readable code for this error.
    ///
    /// Remote rejections use the uppercased server `id`; local failures use
    /// fixed codes.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::NotConnected => "NOTCONNECTED".to_owned(),
            Self::AlreadyConnected => "ALREADYCONNECTED".to_owned(),
            Self::AlreadyLoggedIn => "ALREADYLOGGEDIN".to_owned(),
            Self::ConnectTimeout => "CONTIMEOUT".to_owned(),
            Self::ConnectFailed(_) => "CONFAILED".to_owned(),
            Self::LoginTimeout => "LOGINTIMEOUT".to_owned(),
            Self::LoginRejected(_) => "LOGINREJECT".to_owned(),
            Self::Disconnected => "DISCONNECTED".to_owned(),
            Self::Throttled { .. } => "THROTTLED".to_owned(),
            Self::AcquireTimeout(_) => "ACQUIRETIMEOUT".to_owned(),
            Self::Remote(remote) => remote.code(),
            Self::Parse(_) => "BADRESPONSE".to_owned(),
            Self::Destroyed => "DESTROYED".to_owned(),
            Self::Io(_) => "IO".to_owned(),
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => Self::Io(e),
            other => Self::Parse(ParseError::Frame(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ClientError::NotConnected.code(), "NOTCONNECTED");
        assert_eq!(ClientError::ConnectTimeout.code(), "CONTIMEOUT");
        let rejected = ClientError::LoginRejected(RemoteError {
            id: "auth".to_owned(),
            msg: "Bad client".to_owned(),
            field: None,
            fullwait: None,
        });
        assert_eq!(rejected.code(), "LOGINREJECT");
    }

    #[test]
    fn remote_rejections_use_the_server_id() {
        let err = ClientError::Remote(RemoteError {
            id: "parse".to_owned(),
            msg: "Invalid command".to_owned(),
            field: None,
            fullwait: None,
        });
        assert_eq!(err.code(), "PARSE");
    }

    #[test]
    fn codec_io_failures_stay_io_errors() {
        let err = ClientError::from(CodecError::Io(io::Error::other("reset")));
        assert!(matches!(err, ClientError::Io(_)));

        let err = ClientError::from(CodecError::SentinelInPayload);
        assert!(matches!(err, ClientError::Parse(ParseError::Frame(_))));
    }
}
