#[cfg(feature = "rustls-tls")]
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;

#[cfg(feature = "rustls-tls")]
use hyper_rustls::HttpsConnectorBuilder;

use crate::DispatchResult;
#[cfg(feature = "rustls-tls")]
use crate::error::DispatchError;
use crate::error::{TransportError, TransportErrorKind};
use crate::response::RawResponse;
use crate::transport::{OutboundCall, Transport, TransportFuture};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

#[cfg(feature = "rustls-tls")]
type Connector = hyper_rustls::HttpsConnector<HttpConnector>;
#[cfg(not(feature = "rustls-tls"))]
type Connector = HttpConnector;

type HyperClient = Client<Connector, Full<Bytes>>;

/// HTTP/1.1 transport over hyper-util's pooled client.
///
/// With the `rustls-tls` feature both `http` and `https` URLs are accepted and
/// servers are verified against the webpki root store. Without it only plain
/// `http` works. The call timeout covers sending the request and reading the
/// whole body.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: HyperClient,
}

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

impl HyperTransportBuilder {
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn try_build(self) -> DispatchResult<HyperTransport> {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(Some(self.connect_timeout));
        http.set_nodelay(true);
        let connector = wrap_connector(http)?;
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build(connector);
        Ok(HyperTransport { client })
    }

    /// Builds the transport, panicking if TLS cannot be initialized.
    pub fn build(self) -> HyperTransport {
        match self.try_build() {
            Ok(transport) => transport,
            Err(error) => panic!("failed to build hyper transport: {error}"),
        }
    }
}

#[cfg(feature = "rustls-tls")]
fn wrap_connector(mut http: HttpConnector) -> DispatchResult<Connector> {
    http.enforce_http(false);
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls_config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|source| DispatchError::TlsInit {
            message: source.to_string(),
        })?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http))
}

#[cfg(not(feature = "rustls-tls"))]
fn wrap_connector(http: HttpConnector) -> DispatchResult<Connector> {
    Ok(http)
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::default()
    }

    /// Default transport. Panics if TLS cannot be initialized; use
    /// [`HyperTransportBuilder::try_build`] to handle that case.
    pub fn new() -> Self {
        Self::builder().build()
    }

    async fn exchange(&self, request: Request<Full<Bytes>>) -> Result<RawResponse, TransportError> {
        let response = self.client.request(request).await.map_err(|error| {
            let kind = classify_transport_error(&error);
            TransportError::other(kind, error)
        })?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|error: hyper::Error| TransportError::other(TransportErrorKind::Read, error))?
            .to_bytes();
        Ok(RawResponse::new(parts.status, parts.headers, body))
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn send(&self, call: OutboundCall) -> TransportFuture<'_> {
        Box::pin(async move {
            let request = build_request(&call)?;
            match call.timeout_value() {
                Some(limit) => match timeout(limit, self.exchange(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout {
                        timeout_ms: limit.as_millis(),
                    }),
                },
                None => self.exchange(request).await,
            }
        })
    }
}

fn build_request(call: &OutboundCall) -> Result<Request<Full<Bytes>>, TransportError> {
    let uri: Uri = call
        .url_with_parameters()
        .parse()
        .map_err(|error| TransportError::other(TransportErrorKind::Other, error))?;
    let body = call.body_value().cloned().unwrap_or_default();
    let mut request = Request::new(Full::new(body));
    *request.method_mut() = call.method().clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = call.headers().clone();
    Ok(request)
}

fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    if error.is_connect() {
        let text = error_chain_text(error);
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        return TransportErrorKind::Connect;
    }

    let text = error_chain_text(error);
    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

/// Lower-cased messages of `error` and all of its sources.
fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.to_ascii_lowercase()
}
