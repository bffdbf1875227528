//! `restsend` dispatches described REST requests through pre-flight
//! interceptors, a pluggable transport, timeout retries and process-wide
//! response observers, delivering exactly one outcome per request.
//!
//! # Quick Start
//!
//! ```no_run
//! use http::header::{AUTHORIZATION, HeaderValue};
//! use restsend::prelude::{
//!     Dispatcher, InterceptedRequest, JsonReader, ReadyToken, RequestDescriptor,
//! };
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Item {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::builder()
//!         .service_root("https://api.example.com/v1")
//!         .request_interceptor(|request: InterceptedRequest, token: ReadyToken| {
//!             request.insert_header(AUTHORIZATION, HeaderValue::from_static("Bearer demo"));
//!             token.ready();
//!         })
//!         .try_build()?;
//!
//!     let items: Vec<Item> = dispatcher
//!         .send(
//!             RequestDescriptor::get("/items", JsonReader::new())
//!                 .timeout_millis(2_000)
//!                 .max_retries(2),
//!         )
//!         .await?;
//!
//!     println!("fetched {} items", items.len());
//!     Ok(())
//! }
//! ```
//!
//! Only transport timeouts are retried, immediately and at most
//! `max_retries` times. Responses with a status outside the request's success
//! codes are reported as failures without a retry.

mod classify;
mod codec;
mod config;
mod dispatcher;
mod error;
mod interceptor;
mod metrics;
mod observer;
mod request;
mod response;
mod retry;
mod transport;
mod util;

pub use crate::classify::{Outcome, classify};
pub use crate::codec::{
    BytesReader, JsonReader, JsonWriter, RequestWriter, ResponseReader, TextReader, TextWriter,
    VoidReader, VoidWriter,
};
pub use crate::config::{
    DispatchConfig, IdentityUrlNormalizer, ServiceRootNormalizer, UrlNormalizer,
};
pub use crate::dispatcher::{Dispatcher, DispatcherBuilder, FnCallback, ResponseCallback, callback};
pub use crate::error::{
    CodecError, DispatchError, FailedResponse, FailureKind, TransportError, TransportErrorKind,
};
pub use crate::interceptor::{
    InterceptedRequest, InterceptorGate, ReadyToken, RequestInterceptor,
};
pub use crate::metrics::DispatchMetricsSnapshot;
pub use crate::observer::ResponseObserver;
pub use crate::request::{RequestDescriptor, RequestHead, ResponseType};
pub use crate::response::RawResponse;
pub use crate::retry::{DispatchAttempt, RetryDecision, on_transport_error};
#[cfg(feature = "hyper-transport")]
pub use crate::transport::{HyperTransport, HyperTransportBuilder};
pub use crate::transport::{OutboundCall, Transport, TransportFuture};

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

pub mod prelude {
    #[cfg(feature = "hyper-transport")]
    pub use crate::HyperTransport;
    pub use crate::{
        DispatchConfig, DispatchError, DispatchMetricsSnapshot, DispatchResult, Dispatcher,
        FailedResponse, FailureKind, InterceptedRequest, JsonReader, JsonWriter, OutboundCall,
        RawResponse, ReadyToken, RequestDescriptor, RequestHead, RequestInterceptor,
        ResponseCallback, ResponseObserver, TextReader, Transport, TransportError,
        TransportFuture, VoidReader, callback,
    };
}

#[cfg(test)]
mod tests;
