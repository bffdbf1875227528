use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::error::FailedResponse;
use crate::request::RequestHead;
use crate::response::RawResponse;

/// Process-wide hook told about every terminal outcome, before the
/// per-request callback.
pub trait ResponseObserver: Send + Sync {
    fn intercept_on_success(&self, _request: &RequestHead, _response: &RawResponse) {}

    fn intercept_on_failed(&self, _request: &RequestHead, _failure: &FailedResponse) {}
}

/// Ordered list of observers captured for one dispatch.
#[derive(Clone, Default)]
pub(crate) struct ObserverBus {
    observers: Vec<Arc<dyn ResponseObserver>>,
}

impl ObserverBus {
    pub(crate) fn new(observers: Vec<Arc<dyn ResponseObserver>>) -> Self {
        Self { observers }
    }

    pub(crate) fn notify_success(&self, request: &RequestHead, response: &RawResponse) {
        for (index, observer) in self.observers.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                observer.intercept_on_success(request, response)
            }));
            if result.is_err() {
                warn!(observer_index = index, "response observer panicked on success");
            }
        }
    }

    pub(crate) fn notify_failure(&self, request: &RequestHead, failure: &FailedResponse) {
        for (index, observer) in self.observers.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                observer.intercept_on_failed(request, failure)
            }));
            if result.is_err() {
                warn!(observer_index = index, "response observer panicked on failure");
            }
        }
    }
}
