use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{Instrument, debug, info, info_span};

use crate::DispatchResult;
use crate::classify::{Outcome, classify};
use crate::config::{DispatchConfig, IdentityUrlNormalizer, ServiceRootNormalizer, UrlNormalizer};
use crate::error::{DispatchError, FailedResponse};
use crate::interceptor::{InterceptedRequest, InterceptorGate, RequestInterceptor};
use crate::metrics::{DispatchMetrics, DispatchMetricsSnapshot};
use crate::observer::{ObserverBus, ResponseObserver};
use crate::request::RequestDescriptor;
use crate::response::RawResponse;
use crate::retry::{DispatchAttempt, RetryDecision, on_transport_error};
use crate::transport::{OutboundCall, Transport};
use crate::util::redact_uri_for_logs;

const DEFAULT_CLIENT_NAME: &str = "restsend";

/// Receives the single terminal outcome of a dispatch.
pub trait ResponseCallback<S>: Send + 'static {
    fn on_success(self, value: S);

    fn on_failure(self, failure: FailedResponse);
}

/// Callback made of one closure per outcome. See [`callback`].
pub struct FnCallback<OnSuccess, OnFailure> {
    on_success: OnSuccess,
    on_failure: OnFailure,
}

pub fn callback<S, OnSuccess, OnFailure>(
    on_success: OnSuccess,
    on_failure: OnFailure,
) -> FnCallback<OnSuccess, OnFailure>
where
    OnSuccess: FnOnce(S) + Send + 'static,
    OnFailure: FnOnce(FailedResponse) + Send + 'static,
{
    FnCallback {
        on_success,
        on_failure,
    }
}

impl<S, OnSuccess, OnFailure> ResponseCallback<S> for FnCallback<OnSuccess, OnFailure>
where
    OnSuccess: FnOnce(S) + Send + 'static,
    OnFailure: FnOnce(FailedResponse) + Send + 'static,
{
    fn on_success(self, value: S) {
        (self.on_success)(value)
    }

    fn on_failure(self, failure: FailedResponse) {
        (self.on_failure)(failure)
    }
}

impl<S> ResponseCallback<S> for oneshot::Sender<Result<S, FailedResponse>>
where
    S: Send + 'static,
{
    fn on_success(self, value: S) {
        let _ = self.send(Ok(value));
    }

    fn on_failure(self, failure: FailedResponse) {
        let _ = self.send(Err(failure));
    }
}

pub struct DispatcherBuilder {
    transport: Option<Arc<dyn Transport>>,
    url_normalizer: Arc<dyn UrlNormalizer>,
    config: DispatchConfig,
    client_name: String,
    runtime: Option<Handle>,
    service_root: Option<String>,
}

impl DispatcherBuilder {
    pub(crate) fn new() -> Self {
        Self {
            transport: None,
            url_normalizer: Arc::new(IdentityUrlNormalizer),
            config: DispatchConfig::new(),
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            runtime: None,
            service_root: None,
        }
    }

    pub fn transport<T>(self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport_arc(Arc::new(transport))
    }

    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Resolves relative request URLs against `service_root`.
    ///
    /// Overrides any normalizer set with [`Self::url_normalizer`]; the root is
    /// validated by [`Self::try_build`].
    pub fn service_root(mut self, service_root: impl Into<String>) -> Self {
        self.service_root = Some(service_root.into());
        self
    }

    pub fn url_normalizer<N>(mut self, url_normalizer: N) -> Self
    where
        N: UrlNormalizer + 'static,
    {
        self.url_normalizer = Arc::new(url_normalizer);
        self.service_root = None;
        self
    }

    /// Shares an existing interceptor/observer configuration.
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn request_interceptor<I>(self, interceptor: I) -> Self
    where
        I: RequestInterceptor + 'static,
    {
        self.config.add_request_interceptor(interceptor);
        self
    }

    pub fn response_observer<O>(self, observer: O) -> Self
    where
        O: ResponseObserver + 'static,
    {
        self.config.add_response_observer(observer);
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Runtime used to drive requests. Defaults to the runtime current at
    /// build time.
    pub fn runtime_handle(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn try_build(self) -> DispatchResult<Dispatcher> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| DispatchError::MissingRuntime)?,
        };
        let url_normalizer = match self.service_root {
            Some(service_root) => Arc::new(ServiceRootNormalizer::new(service_root)?),
            None => self.url_normalizer,
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                transport,
                url_normalizer,
                config: self.config,
                client_name: self.client_name,
                runtime,
                metrics: DispatchMetrics::default(),
            }),
        })
    }

    /// Builds the dispatcher, panicking on invalid configuration.
    pub fn build(self) -> Dispatcher {
        match self.try_build() {
            Ok(dispatcher) => dispatcher,
            Err(error) => panic!("failed to build dispatcher: {error}"),
        }
    }
}

#[cfg(feature = "hyper-transport")]
fn default_transport() -> DispatchResult<Arc<dyn Transport>> {
    Ok(Arc::new(crate::transport::HyperTransport::builder().try_build()?))
}

#[cfg(not(feature = "hyper-transport"))]
fn default_transport() -> DispatchResult<Arc<dyn Transport>> {
    Err(DispatchError::MissingTransport)
}

/// Sends described requests through interceptors, the transport, timeout
/// retries and response observers, delivering one terminal outcome per
/// request.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    transport: Arc<dyn Transport>,
    url_normalizer: Arc<dyn UrlNormalizer>,
    config: DispatchConfig,
    client_name: String,
    runtime: Handle,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Live configuration handle; changes apply to later dispatches.
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    pub fn client_name(&self) -> &str {
        &self.inner.client_name
    }

    pub fn metrics_snapshot(&self) -> DispatchMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Starts `descriptor` and reports its outcome to `callback`.
    ///
    /// Request interceptors run first. The network exchange starts once every
    /// interceptor has signalled readiness, so an interceptor that never
    /// signals leaves the request pending forever.
    pub fn dispatch<R, S, C>(&self, mut descriptor: RequestDescriptor<R, S>, callback: C)
    where
        R: Send + 'static,
        S: Send + 'static,
        C: ResponseCallback<S>,
    {
        let normalized_url = self.inner.url_normalizer.normalize(descriptor.url());
        descriptor.head_mut().set_url(normalized_url);
        let snapshot = self.inner.config.snapshot();
        self.inner.metrics.record_dispatch_started();

        let request = InterceptedRequest::new(descriptor.head().clone());
        let edited_request = request.clone();
        let inner = Arc::clone(&self.inner);
        let observers = snapshot.observers;
        InterceptorGate::run(&snapshot.request_interceptors, &request, move || {
            *descriptor.head_mut() = edited_request.snapshot();
            let span = info_span!(
                "restsend.dispatch",
                client = %inner.client_name,
                method = %descriptor.method(),
                uri = %redact_uri_for_logs(descriptor.url()),
                max_retries = descriptor.max_retries_value()
            );
            let runtime = inner.runtime.clone();
            runtime.spawn(
                async move { inner.execute(descriptor, observers, callback).await }
                    .instrument(span),
            );
        });
    }

    /// Dispatches `descriptor` and waits for its outcome.
    pub async fn send<R, S>(
        &self,
        descriptor: RequestDescriptor<R, S>,
    ) -> Result<S, FailedResponse>
    where
        R: Send + 'static,
        S: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.dispatch(descriptor, sender);
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(FailedResponse::abandoned()),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("client_name", &self.inner.client_name)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl DispatcherInner {
    async fn execute<R, S, C>(
        &self,
        descriptor: RequestDescriptor<R, S>,
        observers: ObserverBus,
        callback: C,
    ) where
        C: ResponseCallback<S>,
    {
        let started = Instant::now();
        let in_flight = self.metrics.enter_in_flight();
        let call = outbound_call(&descriptor);
        let max_retries = descriptor.max_retries_value();
        let exchange = match call {
            Ok(call) => self.exchange(call, max_retries).await,
            Err(failure) => Err(failure),
        };
        drop(in_flight);

        match exchange {
            Ok(response) => {
                self.deliver_response(&descriptor, &observers, response, started, callback)
            }
            Err(failure) => {
                self.deliver_failure(&descriptor, &observers, failure, started, callback)
            }
        }
    }

    /// Sends the call until it yields a response or a terminal failure.
    async fn exchange(
        &self,
        call: OutboundCall,
        max_retries: usize,
    ) -> Result<RawResponse, FailedResponse> {
        let mut attempt = DispatchAttempt::new(max_retries);
        loop {
            debug!(attempt = attempt.transport_attempts(), "sending request");
            self.metrics.record_transport_attempt();
            match self.transport.send(call.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => match on_transport_error(error, attempt) {
                    RetryDecision::Retry(next) => {
                        info!(retry = next.count(), "retrying request after timeout");
                        self.metrics.record_retry();
                        attempt = next;
                    }
                    RetryDecision::Fail(failure) => return Err(failure),
                },
            }
        }
    }

    fn deliver_response<R, S, C>(
        &self,
        descriptor: &RequestDescriptor<R, S>,
        observers: &ObserverBus,
        response: RawResponse,
        started: Instant,
        callback: C,
    ) where
        C: ResponseCallback<S>,
    {
        match classify(descriptor, &response) {
            Outcome::Success(value) => {
                debug!(status = response.status().as_u16(), "request succeeded");
                self.metrics
                    .record_success(response.status().as_u16(), started.elapsed());
                observers.notify_success(descriptor.head(), &response);
                callback.on_success(value);
            }
            Outcome::Failure(failure) => {
                self.deliver_failure(descriptor, observers, failure, started, callback);
            }
        }
    }

    fn deliver_failure<R, S, C>(
        &self,
        descriptor: &RequestDescriptor<R, S>,
        observers: &ObserverBus,
        failure: FailedResponse,
        started: Instant,
        callback: C,
    ) where
        C: ResponseCallback<S>,
    {
        info!(error = %failure, "failed to execute request");
        self.metrics.record_failure(&failure, started.elapsed());
        observers.notify_failure(descriptor.head(), &failure);
        callback.on_failure(failure);
    }
}

fn outbound_call<R, S>(
    descriptor: &RequestDescriptor<R, S>,
) -> Result<OutboundCall, FailedResponse> {
    let head = descriptor.head();
    let mut call = OutboundCall::new(head.method().clone(), head.url())
        .put_headers(head.headers())
        .put_parameters(head.parameters())
        .response_type(descriptor.response_type_value())
        .timeout(descriptor.timeout_value());

    if let Some(body) = descriptor.sendable_body() {
        let writer = descriptor.request_writer();
        let encoded: Bytes = writer.write(body).map_err(FailedResponse::encode)?;
        if !call.headers().contains_key(CONTENT_TYPE)
            && let Some(content_type) = writer.content_type()
        {
            call.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        call = call.body(Some(encoded));
    }
    Ok(call)
}
