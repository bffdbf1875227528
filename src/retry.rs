use crate::error::{FailedResponse, TransportError};

/// Attempt bookkeeping owned by a single dispatch.
///
/// `count` is the number of retries already issued and never exceeds
/// `max_retries`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchAttempt {
    count: usize,
    max_retries: usize,
}

impl DispatchAttempt {
    pub fn new(max_retries: usize) -> Self {
        Self {
            count: 0,
            max_retries,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Transport calls issued so far, counting the one in flight.
    pub fn transport_attempts(&self) -> usize {
        self.count + 1
    }

    fn has_retries_left(&self) -> bool {
        self.count < self.max_retries
    }
}

#[derive(Debug)]
pub enum RetryDecision {
    /// Re-issue the same outbound call with the advanced attempt.
    Retry(DispatchAttempt),
    Fail(FailedResponse),
}

/// Retries timeouts while budget remains; every other transport error is
/// terminal. There is no delay between attempts.
pub fn on_transport_error(error: TransportError, attempt: DispatchAttempt) -> RetryDecision {
    if error.is_timeout() && attempt.has_retries_left() {
        return RetryDecision::Retry(DispatchAttempt {
            count: attempt.count + 1,
            ..attempt
        });
    }
    RetryDecision::Fail(FailedResponse::from_transport_error(error))
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{DispatchAttempt, RetryDecision, on_transport_error};
    use crate::error::{FailureKind, TransportError, TransportErrorKind};

    fn timeout() -> TransportError {
        TransportError::Timeout { timeout_ms: 50 }
    }

    #[test]
    fn timeout_with_budget_advances_the_attempt_by_one() {
        let decision = on_transport_error(timeout(), DispatchAttempt::new(2));
        match decision {
            RetryDecision::Retry(next) => {
                assert_eq!(next.count(), 1);
                assert_eq!(next.max_retries(), 2);
                assert_eq!(next.transport_attempts(), 2);
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn timeout_without_budget_fails_as_timeout() {
        let mut attempt = DispatchAttempt::new(2);
        for expected in 1..=2 {
            match on_transport_error(timeout(), attempt) {
                RetryDecision::Retry(next) => {
                    assert_eq!(next.count(), expected);
                    attempt = next;
                }
                other => panic!("expected retry, got {other:?}"),
            }
        }

        match on_transport_error(timeout(), attempt) {
            RetryDecision::Fail(failure) => {
                assert_eq!(failure.kind(), FailureKind::Timeout);
                assert_eq!(failure.status(), None);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn zero_budget_never_retries() {
        assert!(matches!(
            on_transport_error(timeout(), DispatchAttempt::new(0)),
            RetryDecision::Fail(_)
        ));
    }

    #[test]
    fn non_timeout_errors_are_terminal_even_with_budget() {
        let error = TransportError::other(
            TransportErrorKind::Connect,
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        match on_transport_error(error, DispatchAttempt::new(5)) {
            RetryDecision::Fail(failure) => {
                assert_eq!(failure.kind(), FailureKind::Transport);
                assert!(failure.to_string().contains("refused"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
