use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::error::TransportError;
use crate::request::ResponseType;
use crate::response::RawResponse;
use crate::util::append_query_parameters;

#[cfg(feature = "hyper-transport")]
mod hyper_client;

#[cfg(feature = "hyper-transport")]
pub use self::hyper_client::{HyperTransport, HyperTransportBuilder};

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + Send + 'a>>;

/// Performs one HTTP exchange.
///
/// Implementations report an elapsed [`OutboundCall::timeout`] as
/// [`TransportError::Timeout`]; that is the only error the dispatcher retries.
pub trait Transport: Send + Sync {
    fn send(&self, call: OutboundCall) -> TransportFuture<'_>;
}

/// A fully prepared request, re-sent unchanged on every retry.
#[derive(Clone, Debug)]
pub struct OutboundCall {
    method: Method,
    url: String,
    headers: HeaderMap,
    parameters: BTreeMap<String, Vec<String>>,
    response_type: ResponseType,
    timeout: Option<Duration>,
    body: Option<Bytes>,
}

impl OutboundCall {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            parameters: BTreeMap::new(),
            response_type: ResponseType::default(),
            timeout: None,
            body: None,
        }
    }

    pub fn put_headers(mut self, headers: &HeaderMap) -> Self {
        self.headers.extend(headers.clone());
        self
    }

    pub fn put_parameters(mut self, parameters: &BTreeMap<String, Vec<String>>) -> Self {
        for (name, values) in parameters {
            self.parameters
                .entry(name.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn body(mut self, body: Option<Bytes>) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL with every parameter appended to its query string.
    pub fn url_with_parameters(&self) -> String {
        append_query_parameters(&self.url, &self.parameters)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }

    pub fn response_type_value(&self) -> ResponseType {
        self.response_type
    }

    pub fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn body_value(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}
