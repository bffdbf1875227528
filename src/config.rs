use std::sync::{Arc, RwLock};

use crate::DispatchResult;
use crate::error::DispatchError;
use crate::interceptor::RequestInterceptor;
use crate::observer::{ObserverBus, ResponseObserver};
use crate::util::{is_absolute_http_url, join_base_path, read_unpoisoned, write_unpoisoned};

#[derive(Default)]
struct ConfigState {
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_observers: Vec<Arc<dyn ResponseObserver>>,
}

/// Shared, ordered lists of request interceptors and response observers.
///
/// Cloning yields another handle to the same lists. Dispatchers read the lists
/// at the start of every dispatch, so changes apply to the next request.
#[derive(Clone, Default)]
pub struct DispatchConfig {
    state: Arc<RwLock<ConfigState>>,
}

pub(crate) struct ConfigSnapshot {
    pub(crate) request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    pub(crate) observers: ObserverBus,
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request_interceptor<I>(&self, interceptor: I)
    where
        I: RequestInterceptor + 'static,
    {
        self.add_request_interceptor_arc(Arc::new(interceptor));
    }

    pub fn add_request_interceptor_arc(&self, interceptor: Arc<dyn RequestInterceptor>) {
        write_unpoisoned(&self.state)
            .request_interceptors
            .push(interceptor);
    }

    pub fn add_response_observer<O>(&self, observer: O)
    where
        O: ResponseObserver + 'static,
    {
        self.add_response_observer_arc(Arc::new(observer));
    }

    pub fn add_response_observer_arc(&self, observer: Arc<dyn ResponseObserver>) {
        write_unpoisoned(&self.state).response_observers.push(observer);
    }

    pub fn clear_request_interceptors(&self) {
        write_unpoisoned(&self.state).request_interceptors.clear();
    }

    pub fn clear_response_observers(&self) {
        write_unpoisoned(&self.state).response_observers.clear();
    }

    pub fn request_interceptor_count(&self) -> usize {
        read_unpoisoned(&self.state).request_interceptors.len()
    }

    pub fn response_observer_count(&self) -> usize {
        read_unpoisoned(&self.state).response_observers.len()
    }

    pub(crate) fn snapshot(&self) -> ConfigSnapshot {
        let state = read_unpoisoned(&self.state);
        ConfigSnapshot {
            request_interceptors: state.request_interceptors.clone(),
            observers: ObserverBus::new(state.response_observers.clone()),
        }
    }
}

impl std::fmt::Debug for DispatchConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = read_unpoisoned(&self.state);
        formatter
            .debug_struct("DispatchConfig")
            .field("request_interceptors", &state.request_interceptors.len())
            .field("response_observers", &state.response_observers.len())
            .finish()
    }
}

/// Turns the URL a request was described with into the URL that is sent.
pub trait UrlNormalizer: Send + Sync {
    fn normalize(&self, url: &str) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityUrlNormalizer;

impl UrlNormalizer for IdentityUrlNormalizer {
    fn normalize(&self, url: &str) -> String {
        url.to_owned()
    }
}

/// Resolves relative request paths against a fixed service root.
///
/// Absolute `http`/`https` URLs pass through unchanged.
#[derive(Clone, Debug)]
pub struct ServiceRootNormalizer {
    service_root: String,
}

impl ServiceRootNormalizer {
    pub fn new(service_root: impl Into<String>) -> DispatchResult<Self> {
        let service_root = service_root.into();
        let valid = url::Url::parse(&service_root)
            .map(|parsed| {
                matches!(parsed.scheme(), "http" | "https")
                    && parsed.host_str().is_some()
                    && parsed.query().is_none()
                    && parsed.fragment().is_none()
            })
            .unwrap_or(false);
        if !valid {
            return Err(DispatchError::InvalidServiceRoot { root: service_root });
        }
        Ok(Self { service_root })
    }

    pub fn service_root(&self) -> &str {
        &self.service_root
    }
}

impl UrlNormalizer for ServiceRootNormalizer {
    fn normalize(&self, url: &str) -> String {
        if is_absolute_http_url(url) {
            return url.to_owned();
        }
        join_base_path(&self.service_root, url)
    }
}
