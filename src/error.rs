use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::response::RawResponse;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Error reported by a [`Transport`](crate::Transport) for one attempt.
///
/// Only [`TransportError::Timeout`] is eligible for a retry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u128 },
    #[error("http transport error ({kind}): {source}")]
    Other {
        kind: TransportErrorKind,
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    pub fn other<E>(kind: TransportErrorKind, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Other {
            kind,
            source: source.into(),
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("failed to encode request body: {source}")]
    Encode {
        #[source]
        source: BoxError,
    },
    #[error("failed to decode response body: {source}")]
    Decode {
        #[source]
        source: BoxError,
    },
}

impl CodecError {
    pub fn encode<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Encode {
            source: source.into(),
        }
    }

    pub fn decode<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Decode {
            source: source.into(),
        }
    }
}

/// Configuration errors raised while building a dispatcher or a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("invalid service root: {root}")]
    InvalidServiceRoot { root: String },
    #[error("no tokio runtime handle configured and none is current")]
    MissingRuntime,
    #[error("no transport configured and the hyper-transport feature is disabled")]
    MissingTransport,
    #[error("failed to initialize TLS: {message}")]
    TlsInit { message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    Timeout,
    Transport,
    HttpStatus,
    Encode,
    Decode,
    Abandoned,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::HttpStatus => "http_status",
            Self::Encode => "encode",
            Self::Decode => "decode",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Terminal failure delivered to callbacks and response observers.
///
/// Built either from a transport error (no status code), from a response whose
/// status is not an accepted success code, or from a codec failure.
#[derive(Clone, Debug)]
pub struct FailedResponse {
    kind: FailureKind,
    status: Option<StatusCode>,
    status_text: Option<String>,
    body: Option<String>,
    headers: HeaderMap,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl FailedResponse {
    pub fn from_transport_error(error: TransportError) -> Self {
        let kind = if error.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Transport
        };
        Self {
            kind,
            status: None,
            status_text: None,
            body: None,
            headers: HeaderMap::new(),
            source: Some(Arc::new(error)),
        }
    }

    pub fn from_response(response: &RawResponse) -> Self {
        Self {
            kind: FailureKind::HttpStatus,
            status: Some(response.status()),
            status_text: Some(response.status_text().to_owned()),
            body: Some(response.text_lossy()),
            headers: response.headers().clone(),
            source: None,
        }
    }

    pub(crate) fn encode(error: CodecError) -> Self {
        Self {
            kind: FailureKind::Encode,
            status: None,
            status_text: None,
            body: None,
            headers: HeaderMap::new(),
            source: Some(Arc::new(error)),
        }
    }

    pub(crate) fn decode(response: &RawResponse, error: CodecError) -> Self {
        Self {
            kind: FailureKind::Decode,
            status: Some(response.status()),
            status_text: Some(response.status_text().to_owned()),
            body: Some(response.text_lossy()),
            headers: response.headers().clone(),
            source: Some(Arc::new(error)),
        }
    }

    pub(crate) fn abandoned() -> Self {
        Self {
            kind: FailureKind::Abandoned,
            status: None,
            status_text: None,
            body: None,
            headers: HeaderMap::new(),
            source: None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    /// Full response body, decoded lossily as UTF-8, for failures that carry
    /// a response.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl std::fmt::Display for FailedResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.status, &self.source) {
            (Some(status), Some(source)) => {
                write!(formatter, "{} failure with status {status}: {source}", self.kind)
            }
            (Some(status), None) => write!(formatter, "{} failure with status {status}", self.kind),
            (None, Some(source)) => write!(formatter, "{} failure: {source}", self.kind),
            (None, None) => write!(formatter, "{} failure", self.kind),
        }
    }
}

impl std::error::Error for FailedResponse {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}
