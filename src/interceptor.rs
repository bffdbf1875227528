//! Pre-flight request interceptors and the gate that waits for all of them.
//!
//! Every interceptor gets its own [`ReadyToken`]. The gate counts tokens down
//! and runs the continuation once, when the last one signals. There is no
//! timeout on this phase: a token that is never signalled keeps the request
//! from ever being sent.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use tracing::warn;

use crate::DispatchResult;
use crate::request::RequestHead;
use crate::util::{lock_unpoisoned, parse_header_name, parse_header_value};

pub trait RequestInterceptor: Send + Sync {
    /// Inspects or edits `request`, then calls `token.ready()` exactly once,
    /// either before returning or later from any thread.
    ///
    /// A panic here is caught and logged. The unwind drops the token, so
    /// unless it was already signalled the request is never sent.
    fn intercept_request(&self, request: InterceptedRequest, token: ReadyToken);
}

impl<F> RequestInterceptor for F
where
    F: Fn(InterceptedRequest, ReadyToken) + Send + Sync,
{
    fn intercept_request(&self, request: InterceptedRequest, token: ReadyToken) {
        self(request, token)
    }
}

/// Shared, editable view of a request while interceptors run.
#[derive(Clone, Debug)]
pub struct InterceptedRequest {
    head: Arc<Mutex<RequestHead>>,
}

impl InterceptedRequest {
    pub(crate) fn new(head: RequestHead) -> Self {
        Self {
            head: Arc::new(Mutex::new(head)),
        }
    }

    pub fn method(&self) -> Method {
        lock_unpoisoned(&self.head).method().clone()
    }

    pub fn url(&self) -> String {
        lock_unpoisoned(&self.head).url().to_owned()
    }

    pub fn headers(&self) -> HeaderMap {
        lock_unpoisoned(&self.head).headers().clone()
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        lock_unpoisoned(&self.head).headers().get(name).cloned()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        lock_unpoisoned(&self.head).set_url(url);
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        lock_unpoisoned(&self.head).insert_header(name, value);
    }

    pub fn try_insert_header(&self, name: &str, value: &str) -> DispatchResult<()> {
        let header_name = parse_header_name(name)?;
        let header_value = parse_header_value(name, value)?;
        self.insert_header(header_name, header_value);
        Ok(())
    }

    pub fn remove_header(&self, name: &HeaderName) -> Option<HeaderValue> {
        lock_unpoisoned(&self.head).remove_header(name)
    }

    pub fn add_parameter(&self, name: impl Into<String>, value: impl Into<String>) {
        lock_unpoisoned(&self.head).add_parameter(name, value);
    }

    pub fn remove_parameter(&self, name: &str) -> Option<Vec<String>> {
        lock_unpoisoned(&self.head).remove_parameter(name)
    }

    /// Copy of the request as edited so far.
    pub fn snapshot(&self) -> RequestHead {
        lock_unpoisoned(&self.head).clone()
    }
}

type Continuation = Box<dyn FnOnce() + Send>;

struct CountdownLatch {
    remaining: AtomicUsize,
    continuation: Mutex<Option<Continuation>>,
}

impl CountdownLatch {
    fn new(count: usize, continuation: Continuation) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            continuation: Mutex::new(Some(continuation)),
        }
    }

    fn count_down(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let continuation = lock_unpoisoned(&self.continuation).take();
        if let Some(continuation) = continuation {
            continuation();
        }
    }
}

/// Readiness handle handed to one interceptor invocation.
pub struct ReadyToken {
    latch: Arc<CountdownLatch>,
    interceptor_index: usize,
    signalled: bool,
}

impl ReadyToken {
    /// Signals that the interceptor is done with the request.
    pub fn ready(mut self) {
        self.signalled = true;
        self.latch.count_down();
    }

    pub fn interceptor_index(&self) -> usize {
        self.interceptor_index
    }
}

impl Drop for ReadyToken {
    fn drop(&mut self) {
        if !self.signalled {
            warn!(
                interceptor_index = self.interceptor_index,
                "request interceptor dropped its ready token without signalling; request stalls"
            );
        }
    }
}

impl std::fmt::Debug for ReadyToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReadyToken")
            .field("interceptor_index", &self.interceptor_index)
            .field("remaining", &self.latch.remaining.load(Ordering::Acquire))
            .finish()
    }
}

pub struct InterceptorGate;

impl InterceptorGate {
    /// Runs every interceptor against `request` and calls `continuation` once
    /// all of them have signalled. With no interceptors the continuation runs
    /// before this function returns.
    pub fn run<F>(
        interceptors: &[Arc<dyn RequestInterceptor>],
        request: &InterceptedRequest,
        continuation: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        if interceptors.is_empty() {
            continuation();
            return;
        }

        let latch = Arc::new(CountdownLatch::new(
            interceptors.len(),
            Box::new(continuation),
        ));
        for (interceptor_index, interceptor) in interceptors.iter().enumerate() {
            let token = ReadyToken {
                latch: Arc::clone(&latch),
                interceptor_index,
                signalled: false,
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                interceptor.intercept_request(request.clone(), token)
            }));
            if outcome.is_err() {
                warn!(interceptor_index, "request interceptor panicked");
            }
        }
    }
}
