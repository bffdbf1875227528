use crate::error::FailedResponse;
use crate::request::RequestDescriptor;
use crate::response::RawResponse;

#[derive(Debug)]
pub enum Outcome<S> {
    Success(S),
    Failure(FailedResponse),
}

impl<S> Outcome<S> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<S, FailedResponse> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

/// Routes a received response by its status code.
///
/// Accepted statuses are decoded with the descriptor's reader; a reader error
/// becomes a decode failure. Any other status is a failure that keeps the
/// status, reason, body and headers of the response.
pub fn classify<R, S>(descriptor: &RequestDescriptor<R, S>, response: &RawResponse) -> Outcome<S> {
    if !descriptor.is_success_code(response.status().as_u16()) {
        return Outcome::Failure(FailedResponse::from_response(response));
    }
    match descriptor.response_reader().read(response) {
        Ok(value) => Outcome::Success(value),
        Err(error) => Outcome::Failure(FailedResponse::decode(response, error)),
    }
}
