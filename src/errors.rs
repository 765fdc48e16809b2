//! Errors module.

use std::{fmt, sync::Arc};

use rmp::{
    decode::{DecodeStringError, MarkerReadError, NumValueReadError, ValueReadError},
    encode::{RmpWriteErr, ValueWriteError},
};
use rmpv::Value;

use crate::client::schema::SchemaEntityKey;

/// Error returned by Tarantool in response to a request.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{description} (code {code})")]
pub struct ErrorResponse {
    /// Server error code (without `0x8000` response type prefix).
    pub code: u32,
    /// Human readable message.
    pub description: String,
    /// Extended error stack (`IPROTO_ERROR`), if server sent one.
    pub extra: Option<Value>,
}

impl ErrorResponse {
    pub fn new(code: u32, description: impl Into<String>, extra: Option<Value>) -> Self {
        Self {
            code,
            description: description.into(),
            extra,
        }
    }
}

/// Main error type of this crate.
///
/// Cheap to clone, since one connection failure is delivered to every
/// request which was waiting on that connection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// Failed to establish TCP connection or perform I/O while handshaking.
    #[error("Connection error: {0}")]
    Connect(Arc<tokio::io::Error>),
    /// Connection was not established in time.
    #[error("Connect timeout")]
    ConnectTimeout,
    /// Server rejected credentials.
    #[error("Authorization error: {0}")]
    Auth(#[source] ErrorResponse),
    /// Server processed request and responded with error.
    #[error("Error response: {0}")]
    Response(#[source] ErrorResponse),
    /// Connection was lost while request was in flight.
    #[error("Connection lost: {0}")]
    ConnectionLost(#[source] CodecDecodeError),
    /// Connection is closed or faulted and cannot accept requests.
    #[error("Connection closed")]
    ConnectionClosed,
    /// Request was not answered in time.
    #[error("Request timeout")]
    Timeout,
    /// Caller cancelled request or acquisition.
    #[error("Request cancelled")]
    Cancelled,
    /// No free connection appeared in the pool in time.
    #[error("Timed out waiting for free connection in pool")]
    PoolTimeout,
    /// Space with provided key not found in `_vspace`.
    #[error("Space with {0} not found")]
    SpaceNotFound(SchemaEntityKey),
    /// Index with provided key not found in `_vindex`.
    #[error("Index with {index} not found in space {space_id}")]
    IndexNotFound {
        space_id: u32,
        index: SchemaEntityKey,
    },
    /// Connection string cannot be parsed.
    #[error("Invalid connection string '{input}': {reason}")]
    InvalidConnectionString { input: String, reason: &'static str },
    /// Lua function returned error as second value (`nil, err` convention).
    #[error("Call or eval error: {0}")]
    CallEval(Value),

    #[error(transparent)]
    Encode(#[from] EncodingError),
    #[error(transparent)]
    Decode(#[from] DecodingError),
}

impl From<tokio::io::Error> for Error {
    fn from(v: tokio::io::Error) -> Self {
        Self::Connect(Arc::new(v))
    }
}

impl From<ErrorResponse> for Error {
    fn from(v: ErrorResponse) -> Self {
        Self::Response(v)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

/// Errors, raised when incoming frames are read from socket.
///
/// Each of them is fatal for the connection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CodecDecodeError {
    #[error("I/O error: {0}")]
    Io(Arc<tokio::io::Error>),
    #[error("Failed to decode frame: {0}")]
    Decode(#[source] DecodingError),
    #[error("Connection closed by server")]
    Closed,
}

impl From<tokio::io::Error> for CodecDecodeError {
    fn from(v: tokio::io::Error) -> Self {
        Self::Io(Arc::new(v))
    }
}

/// Errors, raised when outgoing frames are written to socket.
#[derive(Debug, thiserror::Error)]
pub enum CodecEncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] tokio::io::Error),
    #[error(transparent)]
    Encode(#[from] EncodingError),
}

/// Failed to encode value into MessagePack.
#[derive(Clone, Debug, thiserror::Error)]
#[error("MessagePack encoding error: {0}")]
pub struct EncodingError(Arc<anyhow::Error>);

impl EncodingError {
    pub(crate) fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }
}

impl<E> From<ValueWriteError<E>> for EncodingError
where
    E: RmpWriteErr + Send + Sync,
{
    fn from(v: ValueWriteError<E>) -> Self {
        Self::new(v)
    }
}

impl From<rmp_serde::encode::Error> for EncodingError {
    fn from(v: rmp_serde::encode::Error) -> Self {
        Self::new(v)
    }
}

impl From<std::io::Error> for EncodingError {
    fn from(v: std::io::Error) -> Self {
        Self::new(v)
    }
}

/// Failed to decode MessagePack, or decoded value has unexpected shape.
#[derive(Clone, Debug)]
pub struct DecodingError {
    kind: Arc<DecodingErrorDetails>,
    location: Option<DecodingErrorLocation>,
}

impl DecodingError {
    pub(crate) fn new(kind: DecodingErrorDetails) -> Self {
        Self {
            kind: Arc::new(kind),
            location: None,
        }
    }

    pub(crate) fn type_mismatch(expected: &'static str, actual: impl Into<String>) -> Self {
        Self::new(DecodingErrorDetails::TypeMismatch {
            expected,
            actual: actual.into(),
        })
    }

    pub(crate) fn missing_key(key: &'static str) -> Self {
        Self::new(DecodingErrorDetails::MissingKey(key))
    }

    pub(crate) fn invalid_tuple_length(expected: usize, actual: usize) -> Self {
        Self::new(DecodingErrorDetails::InvalidTupleLength { expected, actual })
    }

    pub(crate) fn message(msg: impl Into<String>) -> Self {
        Self::new(DecodingErrorDetails::Message(msg.into()))
    }

    /// Attach place, where error happened.
    pub(crate) fn in_other(mut self, other: &'static str) -> Self {
        self.location = Some(DecodingErrorLocation::Other(other));
        self
    }

    pub(crate) fn in_key(mut self, key: &'static str) -> Self {
        self.location = Some(DecodingErrorLocation::Key(key));
        self
    }

    /// Details of the error.
    pub fn kind(&self) -> &DecodingErrorDetails {
        &self.kind
    }
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} (in {})", self.kind, location),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for DecodingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodingErrorDetails {
    #[error("Unknown response code: {0}")]
    UnknownResponseCode(u32),
    #[error("Type mismatch, expected '{expected}', actual '{actual}'")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },
    #[error("Missing key '{0}'")]
    MissingKey(&'static str),
    #[error("Invalid tuple length: expected {expected}, actual {actual}")]
    InvalidTupleLength { expected: usize, actual: usize },
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Serde(#[from] rmpv::ext::Error),
    #[error("{0}")]
    MessagePack(anyhow::Error),
}

#[derive(Clone, Debug)]
enum DecodingErrorLocation {
    Key(&'static str),
    Other(&'static str),
}

impl fmt::Display for DecodingErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodingErrorLocation::Key(x) => write!(f, "key '{x}'"),
            DecodingErrorLocation::Other(x) => write!(f, "{x}"),
        }
    }
}

impl From<rmpv::ext::Error> for DecodingError {
    fn from(v: rmpv::ext::Error) -> Self {
        Self::new(DecodingErrorDetails::Serde(v))
    }
}

impl From<ValueReadError> for DecodingError {
    fn from(v: ValueReadError) -> Self {
        Self::new(DecodingErrorDetails::MessagePack(v.into()))
    }
}

impl From<rmpv::decode::Error> for DecodingError {
    fn from(v: rmpv::decode::Error) -> Self {
        Self::new(DecodingErrorDetails::MessagePack(v.into()))
    }
}

impl From<NumValueReadError> for DecodingError {
    fn from(v: NumValueReadError) -> Self {
        Self::new(DecodingErrorDetails::MessagePack(v.into()))
    }
}

impl From<DecodeStringError<'_>> for DecodingError {
    fn from(v: DecodeStringError<'_>) -> Self {
        Self::message(v.to_string())
    }
}

impl From<MarkerReadError> for DecodingError {
    fn from(v: MarkerReadError) -> Self {
        Self::new(DecodingErrorDetails::MessagePack(v.0.into()))
    }
}

impl From<std::io::Error> for DecodingError {
    fn from(v: std::io::Error) -> Self {
        Self::new(DecodingErrorDetails::MessagePack(v.into()))
    }
}
