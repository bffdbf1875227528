use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{FailedResponse, FailureKind};
use crate::util::lock_unpoisoned;

#[derive(Clone, Debug)]
pub struct DispatchMetricsSnapshot {
    pub dispatches_started: u64,
    pub dispatches_succeeded: u64,
    pub dispatches_failed: u64,
    pub transport_attempts: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub http_status_failures: u64,
    pub codec_failures: u64,
    pub in_flight: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    pub status_counts: BTreeMap<u16, u64>,
    pub failure_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct DispatchMetrics {
    inner: Arc<DispatchMetricsInner>,
}

#[derive(Debug, Default)]
struct DispatchMetricsInner {
    dispatches_started: AtomicU64,
    dispatches_succeeded: AtomicU64,
    dispatches_failed: AtomicU64,
    transport_attempts: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    transport_errors: AtomicU64,
    http_status_failures: AtomicU64,
    codec_failures: AtomicU64,
    in_flight: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    failure_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    metrics: DispatchMetrics,
}

impl DispatchMetrics {
    pub(crate) fn record_dispatch_started(&self) {
        self.inner
            .dispatches_started
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_transport_attempt(&self) {
        self.inner
            .transport_attempts
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
        self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self, status: u16, latency: Duration) {
        self.inner
            .dispatches_succeeded
            .fetch_add(1, Ordering::Relaxed);
        self.add_status_count(status);
        self.record_latency(latency);
    }

    pub(crate) fn record_failure(&self, failure: &FailedResponse, latency: Duration) {
        self.inner.dispatches_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
        match failure.kind() {
            FailureKind::Timeout => {
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::Transport => {
                self.inner.transport_errors.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::HttpStatus => {
                self.inner
                    .http_status_failures
                    .fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::Encode | FailureKind::Decode => {
                self.inner.codec_failures.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::Abandoned => {}
        }
        if let Some(status) = failure.status() {
            self.add_status_count(status.as_u16());
        }
        self.add_failure_count(failure.kind());
    }

    pub(crate) fn snapshot(&self) -> DispatchMetricsSnapshot {
        let latency_samples = self.inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = self.inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        DispatchMetricsSnapshot {
            dispatches_started: self.inner.dispatches_started.load(Ordering::Relaxed),
            dispatches_succeeded: self.inner.dispatches_succeeded.load(Ordering::Relaxed),
            dispatches_failed: self.inner.dispatches_failed.load(Ordering::Relaxed),
            transport_attempts: self.inner.transport_attempts.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            timeouts: self.inner.timeouts.load(Ordering::Relaxed),
            transport_errors: self.inner.transport_errors.load(Ordering::Relaxed),
            http_status_failures: self.inner.http_status_failures.load(Ordering::Relaxed),
            codec_failures: self.inner.codec_failures.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
            failure_counts: lock_unpoisoned(&self.inner.failure_counts).clone(),
        }
    }

    fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_millis().min(u64::MAX as u128) as u64;
        self.inner
            .latency_total_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.inner.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn add_status_count(&self, status: u16) {
        let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }

    fn add_failure_count(&self, kind: FailureKind) {
        let mut failure_counts = lock_unpoisoned(&self.inner.failure_counts);
        *failure_counts.entry(kind.as_str().to_owned()).or_insert(0) += 1;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics
            .inner
            .in_flight
            .fetch_sub(1, Ordering::Relaxed);
    }
}
