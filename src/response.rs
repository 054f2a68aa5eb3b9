//! Response envelope parsing.
//!
//! Every inbound frame carries `<status> <json-object>`: a whitespace-
//! delimited status token followed by a JSON body. [`parse`] turns one frame
//! into a typed [`Response`], deriving the `search_type` the originating
//! query addressed; [`parse_handshake_error`] handles pre-login rejection
//! frames where no originating query exists.

use std::{fmt, time::Duration};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::codec::CodecError;

/// Status token of an inbound response frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// Command acknowledged without a result set.
    Ok,
    /// Result set for a read-style query.
    Results,
    /// Database statistics snapshot.
    DbStats,
    /// Rejection; the body is a [`RemoteError`].
    Error,
}

impl Status {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "ok" => Some(Self::Ok),
            "results" => Some(Self::Results),
            "dbstats" => Some(Self::DbStats),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Wire token for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Results => "results",
            Self::DbStats => "dbstats",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Parsed response envelope.
#[derive(Clone, Debug)]
pub struct Response {
    /// Status token of the frame.
    pub status: Status,
    /// Entity type the originating query addressed: the word following
    /// `get ` for read queries, `"dbstats"` for statistics, or the full
    /// query string for rejections.
    pub search_type: String,
    /// JSON body of the frame.
    pub body: Map<String, Value>,
}

impl Response {
    /// Error body of an [`Status::Error`] response.
    ///
    /// Returns `None` for non-error responses and for error bodies missing
    /// the machine-readable `id` field.
    #[must_use]
    pub fn remote_error(&self) -> Option<RemoteError> {
        if self.status != Status::Error {
            return None;
        }
        serde_json::from_value(Value::Object(self.body.clone())).ok()
    }
}

/// Error body returned by the remote service.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RemoteError {
    /// Machine-readable reason.
    pub id: String,
    /// Human-readable message.
    #[serde(default)]
    pub msg: String,
    /// Field the error refers to, when applicable.
    #[serde(default)]
    pub field: Option<String>,
    /// Seconds to wait before resubmitting; sent with throttled rejections.
    #[serde(default)]
    pub fullwait: Option<f64>,
}

impl RemoteError {
    /// Normalized machine-readable code: the uppercased `id`.
    #[must_use]
    pub fn code(&self) -> String { self.id.to_uppercase() }

    /// True when the service asked the client to wait and resubmit.
    #[must_use]
    pub fn is_throttled(&self) -> bool { self.id == "throttled" }

    /// Mandated wait before resubmission, when the body carries a usable one.
    #[must_use]
    pub fn wait_duration(&self) -> Option<Duration> {
        self.fullwait
            .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.msg, self.id)?;
        if let Some(ref field) = self.field {
            write!(f, " on field {field}")?;
        }
        Ok(())
    }
}

/// Frame contents that could not be interpreted.
///
/// A parse failure means the stream is desynchronized; the owning channel is
/// torn down rather than resumed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Frame-level decode failure (framing or text encoding).
    #[error(transparent)]
    Frame(#[from] CodecError),
    /// Frame carried no status token.
    #[error("frame has no status token")]
    MissingStatus,
    /// Status token is not part of the protocol.
    #[error("unrecognized status token `{token}`")]
    UnknownStatus {
        /// Token found at the start of the frame.
        token: String,
    },
    /// Frame carried no JSON object.
    #[error("frame has no JSON object body")]
    MissingBody,
    /// Error body lacked the machine-readable `id` field.
    #[error("error body is missing its machine-readable id")]
    MalformedErrorBody,
    /// JSON object did not decode.
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse one response frame for the query that elicited it.
///
/// # Errors
///
/// [`ParseError`] when the frame has no status token, an unknown status
/// token, or no well-formed JSON object.
pub fn parse(query: &str, frame: &str) -> Result<Response, ParseError> {
    let status = status_token(frame)?;
    let body = extract_body(frame)?;
    let search_type = match status {
        Status::Error => query.to_owned(),
        Status::DbStats => "dbstats".to_owned(),
        Status::Ok | Status::Results => entity_type(query).to_owned(),
    };
    Ok(Response {
        status,
        search_type,
        body,
    })
}

/// Parse a pre-login rejection frame.
///
/// # Errors
///
/// [`ParseError`] when the frame is not an `error` frame with a well-formed
/// body carrying an `id`.
pub fn parse_handshake_error(frame: &str) -> Result<RemoteError, ParseError> {
    match status_token(frame)? {
        Status::Error => {}
        other => {
            return Err(ParseError::UnknownStatus {
                token: other.as_str().to_owned(),
            });
        }
    }
    let body = extract_body(frame)?;
    serde_json::from_value(Value::Object(body)).map_err(|_| ParseError::MalformedErrorBody)
}

fn status_token(frame: &str) -> Result<Status, ParseError> {
    let token = frame
        .split_whitespace()
        .next()
        .ok_or(ParseError::MissingStatus)?;
    Status::from_token(token).ok_or_else(|| ParseError::UnknownStatus {
        token: token.to_owned(),
    })
}

fn extract_body(frame: &str) -> Result<Map<String, Value>, ParseError> {
    let start = frame.find('{').ok_or(ParseError::MissingBody)?;
    let end = frame.rfind('}').ok_or(ParseError::MissingBody)?;
    if end < start {
        return Err(ParseError::MissingBody);
    }
    Ok(serde_json::from_str(&frame[start..=end])?)
}

/// Entity-type token of a read-style query: the word following `get `.
fn entity_type(query: &str) -> &str {
    query
        .strip_prefix("get ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("")
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
