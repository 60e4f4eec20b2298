//! Error types
//!
//! Every failure the client can report is a variant of [`Error`]. Callers that
//! only care about the broad category can match on [`Error::kind`].

use std::fmt;

use thiserror::Error;

use crate::api::meta::Status;

/// Convenience alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by the dispatcher, the watch decoder and the
/// resource clients
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error(transparent)]
    StreamClosed(#[from] StreamClosed),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
    Cancelled,
    Api,
    Encode,
    Decode,
    Framing,
    StreamClosed,
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Api(_) => ErrorKind::Api,
            Error::Encode(_) => ErrorKind::Encode,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Framing(_) => ErrorKind::Framing,
            Error::StreamClosed(_) => ErrorKind::StreamClosed,
        }
    }

    /// True when the server closed a watch normally
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::StreamClosed(StreamClosed::EndOfStream))
    }

    /// HTTP status code for API errors
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api(err) => Some(err.code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::Request(err))
    }
}

/// A resource identity component was missing, or a URL could not be built
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no api group provided")]
    MissingApiGroup,
    #[error("no api version provided")]
    MissingApiVersion,
    #[error("no resource provided")]
    MissingResource,
    #[error("no namespace provided")]
    MissingNamespace,
    #[error("no resource name provided")]
    MissingName,
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ValidationError {
    /// Name of the identity field this error refers to
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingApiGroup => Some("apiGroup"),
            ValidationError::MissingApiVersion => Some("apiVersion"),
            ValidationError::MissingResource => Some("resource"),
            ValidationError::MissingNamespace => Some("namespace"),
            ValidationError::MissingName => Some("name"),
            ValidationError::InvalidUrl(_) => None,
        }
    }
}

/// The request never produced a usable response
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("failed to read response body: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to load credentials: {0:#}")]
    Credentials(anyhow::Error),
}

impl TransportError {
    /// Whether the request or body read hit a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Request(err) => err.is_timeout(),
            TransportError::Read(err) => err.kind() == std::io::ErrorKind::TimedOut,
            TransportError::Credentials(_) => false,
        }
    }
}

/// Non-success response from the API server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code of the response
    pub code: u16,
    /// `status` field of the returned Status object, usually "Failure"
    pub status: Option<String>,
    /// Machine readable reason, e.g. "NotFound" or "AlreadyExists"
    pub reason: Option<String>,
    /// Human readable description
    pub message: String,
}

impl ApiError {
    /// Error for a response with HTTP `code` whose body decoded as `status`
    pub fn from_status(code: u16, status: Status) -> Self {
        Self {
            code,
            status: status.status,
            reason: status.reason,
            message: status.message.unwrap_or_default(),
        }
    }

    /// 404: the object or resource does not exist
    pub fn is_not_found(&self) -> bool {
        self.code == 404
    }

    /// 409: the object already exists or was modified concurrently
    pub fn is_conflict(&self) -> bool {
        self.code == 409
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "api error {} ({}): {}", self.code, reason, self.message),
            None => write!(f, "api error {}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Bytes did not match the expected codec or schema
#[derive(Debug, Error)]
#[error("decode error: {cause}")]
pub struct DecodeError {
    pub cause: String,
}

impl DecodeError {
    /// Decode error carrying a free-form cause
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

impl From<prost::DecodeError> for DecodeError {
    fn from(err: prost::DecodeError) -> Self {
        Self::new(format!("protobuf: {}", err))
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("json: {}", err))
    }
}

/// A value could not be serialized for a request body
#[derive(Debug, Error)]
#[error("encode error: {cause}")]
pub struct EncodeError {
    pub cause: String,
}

impl EncodeError {
    /// Encode error carrying a free-form cause
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

impl From<prost::EncodeError> for EncodeError {
    fn from(err: prost::EncodeError) -> Self {
        Self::new(format!("protobuf: {}", err))
    }
}

impl From<serde_json::Error> for EncodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("json: {}", err))
    }
}

/// The watch stream is corrupt and cannot be resynchronized
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("bad frame magic {found:02x?}")]
    BadMagic { found: [u8; 4] },
    #[error("truncated frame header: got {got} of 8 bytes")]
    TruncatedHeader { got: usize },
    #[error("truncated frame payload: got {got} of {expected} bytes")]
    TruncatedPayload { expected: usize, got: usize },
    #[error("stream ended inside a record ({pending} bytes pending)")]
    TruncatedRecord { pending: usize },
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}

/// Why a watcher stopped producing events
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamClosed {
    #[error("watch stream ended")]
    EndOfStream,
    #[error("watch stream closed")]
    Closed,
}
