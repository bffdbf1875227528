use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};

use crate::DispatchResult;
use crate::codec::{RequestWriter, ResponseReader, VoidWriter};
use crate::util::{parse_header_name, parse_header_value};

const DEFAULT_SUCCESS_CODES: [u16; 5] = [200, 201, 202, 203, 204];

/// Read mode hint passed to the transport on each `OutboundCall`.
///
/// `HyperTransport` ignores it and always hands back the body bytes
/// unchanged. Custom transports may use it to choose between a text and a
/// binary read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Text,
    Binary,
}

/// The parts of a request that interceptors may edit before it is sent.
#[derive(Clone, Debug)]
pub struct RequestHead {
    method: Method,
    url: String,
    headers: HeaderMap,
    parameters: BTreeMap<String, Vec<String>>,
}

impl RequestHead {
    pub(crate) fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub(crate) fn extend_headers(&mut self, headers: HeaderMap) {
        self.headers.extend(headers);
    }

    pub fn remove_header(&mut self, name: &HeaderName) -> Option<HeaderValue> {
        self.headers.remove(name)
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<Vec<String>> {
        self.parameters.remove(name)
    }

    pub(crate) fn is_body_bearing(&self) -> bool {
        is_body_bearing_method(&self.method)
    }
}

pub(crate) fn is_body_bearing_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Describes one logical request: where it goes, how long each attempt may
/// take, how many timeouts are retried, which status codes count as success,
/// and how bodies are written and read.
///
/// `R` is the request body type and `S` the decoded success value. A request
/// built with [`RequestDescriptor::new`] is void (`R = ()`); attach a body with
/// [`RequestDescriptor::body`].
pub struct RequestDescriptor<R, S> {
    head: RequestHead,
    response_type: ResponseType,
    timeout: Option<Duration>,
    max_retries: usize,
    success_codes: BTreeSet<u16>,
    body: Option<R>,
    request_writer: Arc<dyn RequestWriter<R>>,
    response_reader: Arc<dyn ResponseReader<S>>,
}

impl<S> RequestDescriptor<(), S> {
    pub fn new<D>(method: Method, url: impl Into<String>, response_reader: D) -> Self
    where
        D: ResponseReader<S> + 'static,
    {
        Self {
            head: RequestHead::new(method, url.into()),
            response_type: ResponseType::default(),
            timeout: None,
            max_retries: 0,
            success_codes: DEFAULT_SUCCESS_CODES.into_iter().collect(),
            body: None,
            request_writer: Arc::new(VoidWriter),
            response_reader: Arc::new(response_reader),
        }
    }

    pub fn get<D>(url: impl Into<String>, response_reader: D) -> Self
    where
        D: ResponseReader<S> + 'static,
    {
        Self::new(Method::GET, url, response_reader)
    }

    pub fn post<D>(url: impl Into<String>, response_reader: D) -> Self
    where
        D: ResponseReader<S> + 'static,
    {
        Self::new(Method::POST, url, response_reader)
    }

    pub fn put<D>(url: impl Into<String>, response_reader: D) -> Self
    where
        D: ResponseReader<S> + 'static,
    {
        Self::new(Method::PUT, url, response_reader)
    }

    pub fn patch<D>(url: impl Into<String>, response_reader: D) -> Self
    where
        D: ResponseReader<S> + 'static,
    {
        Self::new(Method::PATCH, url, response_reader)
    }

    pub fn delete<D>(url: impl Into<String>, response_reader: D) -> Self
    where
        D: ResponseReader<S> + 'static,
    {
        Self::new(Method::DELETE, url, response_reader)
    }
}

impl<R, S> RequestDescriptor<R, S> {
    /// Replaces the request body and its writer.
    ///
    /// The body is only encoded and sent for POST, PUT and PATCH.
    pub fn body<B, W>(self, body: B, request_writer: W) -> RequestDescriptor<B, S>
    where
        W: RequestWriter<B> + 'static,
    {
        RequestDescriptor {
            head: self.head,
            response_type: self.response_type,
            timeout: self.timeout,
            max_retries: self.max_retries,
            success_codes: self.success_codes,
            body: Some(body),
            request_writer: Arc::new(request_writer),
            response_reader: self.response_reader,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.head.insert_header(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> DispatchResult<Self> {
        let header_name = parse_header_name(name)?;
        let header_value = parse_header_value(name, value)?;
        Ok(self.header(header_name, header_value))
    }

    /// Merges `headers`, replacing each named header with all of its values.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.head.extend_headers(headers);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.add_parameter(name, value);
        self
    }

    pub fn parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in parameters {
            self.head.add_parameter(name, value);
        }
        self
    }

    /// Per-attempt timeout; `Duration::ZERO` disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Per-attempt timeout in milliseconds; `0` disables it.
    pub fn timeout_millis(self, timeout_ms: u64) -> Self {
        self.timeout(Duration::from_millis(timeout_ms))
    }

    /// Number of extra attempts allowed after a transport timeout.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn success_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.success_codes = codes.into_iter().collect();
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        self.head.method()
    }

    pub fn url(&self) -> &str {
        self.head.url()
    }

    pub fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn max_retries_value(&self) -> usize {
        self.max_retries
    }

    pub fn success_codes_value(&self) -> &BTreeSet<u16> {
        &self.success_codes
    }

    pub fn response_type_value(&self) -> ResponseType {
        self.response_type
    }

    pub fn request_body(&self) -> Option<&R> {
        self.body.as_ref()
    }

    pub fn is_void_request(&self) -> bool {
        self.body.is_none()
    }

    pub(crate) fn is_success_code(&self, status: u16) -> bool {
        self.success_codes.contains(&status)
    }

    pub(crate) fn request_writer(&self) -> &dyn RequestWriter<R> {
        self.request_writer.as_ref()
    }

    pub(crate) fn response_reader(&self) -> &dyn ResponseReader<S> {
        self.response_reader.as_ref()
    }

    pub(crate) fn head_mut(&mut self) -> &mut RequestHead {
        &mut self.head
    }

    /// Body to encode for this request, if any.
    pub(crate) fn sendable_body(&self) -> Option<&R> {
        if self.head.is_body_bearing() {
            self.body.as_ref()
        } else {
            None
        }
    }
}

impl<R, S> std::fmt::Debug for RequestDescriptor<R, S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestDescriptor")
            .field("head", &self.head)
            .field("response_type", &self.response_type)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("success_codes", &self.success_codes)
            .field("void_request", &self.body.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::header::{ACCEPT, HeaderValue};
    use http::{HeaderMap, Method};

    use super::RequestDescriptor;
    use crate::codec::{JsonWriter, VoidReader};

    #[test]
    fn defaults_accept_2xx_without_retries_or_timeout() {
        let request = RequestDescriptor::get("/v1/items", VoidReader);
        assert_eq!(
            request.success_codes_value().iter().copied().collect::<Vec<_>>(),
            vec![200, 201, 202, 203, 204]
        );
        assert_eq!(request.max_retries_value(), 0);
        assert_eq!(request.timeout_value(), None);
        assert!(request.is_void_request());
    }

    #[test]
    fn merged_headers_replace_by_name_and_keep_every_value() {
        let mut headers = HeaderMap::new();
        headers.append(ACCEPT, HeaderValue::from_static("application/json"));
        headers.append(ACCEPT, HeaderValue::from_static("text/plain"));
        let request = RequestDescriptor::get("/v1/items", VoidReader)
            .header(ACCEPT, HeaderValue::from_static("text/html"))
            .headers(headers);
        let values: Vec<_> = request.head().headers().get_all(ACCEPT).iter().collect();
        assert_eq!(values, ["application/json", "text/plain"]);
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let request = RequestDescriptor::get("/v1/items", VoidReader)
            .timeout_millis(250)
            .timeout_millis(0);
        assert_eq!(request.timeout_value(), None);

        let request = RequestDescriptor::get("/v1/items", VoidReader).timeout_millis(250);
        assert_eq!(request.timeout_value(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn body_is_only_sendable_for_body_bearing_methods() {
        for method in [Method::POST, Method::PUT, Method::PATCH] {
            let request = RequestDescriptor::new(method.clone(), "/v1/items", VoidReader)
                .body(1_u32, JsonWriter::new());
            assert_eq!(request.sendable_body(), Some(&1), "{method} should send its body");
        }

        for method in [Method::GET, Method::DELETE, Method::HEAD, Method::OPTIONS] {
            let request = RequestDescriptor::new(method.clone(), "/v1/items", VoidReader)
                .body(1_u32, JsonWriter::new());
            assert_eq!(request.sendable_body(), None, "{method} must not send a body");
        }
    }

    #[test]
    fn parameters_accumulate_multiple_values() {
        let request = RequestDescriptor::get("/v1/items", VoidReader)
            .parameter("tag", "a")
            .parameter("tag", "b")
            .parameters([("page", "2")]);
        let parameters = request.head().parameters();
        assert_eq!(parameters["tag"], vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(parameters["page"], vec!["2".to_owned()]);
    }

    #[test]
    fn try_header_rejects_invalid_names() {
        let result = RequestDescriptor::get("/v1/items", VoidReader).try_header("bad header", "x");
        assert!(result.is_err());
    }
}
