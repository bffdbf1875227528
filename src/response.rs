use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// A fully buffered response as returned by a [`Transport`](crate::Transport).
#[derive(Clone, Debug)]
pub struct RawResponse {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
}

impl RawResponse {
    /// Builds a response whose status text is the canonical reason phrase.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let status_text = status.canonical_reason().unwrap_or_default().to_owned();
        Self {
            status,
            status_text,
            headers,
            body: body.into(),
        }
    }

    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T>(&self) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.body).map_err(CodecError::decode)
    }
}
