//! Request body writers and response body readers.
//!
//! A [`RequestDescriptor`](crate::RequestDescriptor) carries one of each. The
//! dispatcher only calls the writer for body-bearing methods with a body
//! present, and only calls the reader for responses with an accepted status.

use std::marker::PhantomData;

use bytes::Bytes;
use http::HeaderValue;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;
use crate::response::RawResponse;

pub trait RequestWriter<R>: Send + Sync {
    fn write(&self, body: &R) -> Result<Bytes, CodecError>;

    /// Content type applied when the request does not already set one.
    fn content_type(&self) -> Option<HeaderValue> {
        None
    }
}

pub trait ResponseReader<S>: Send + Sync {
    fn read(&self, response: &RawResponse) -> Result<S, CodecError>;
}

/// Writer for requests that never carry a body.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidWriter;

impl RequestWriter<()> for VoidWriter {
    fn write(&self, _body: &()) -> Result<Bytes, CodecError> {
        Ok(Bytes::new())
    }
}

/// Reader that ignores the response body.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidReader;

impl ResponseReader<()> for VoidReader {
    fn read(&self, _response: &RawResponse) -> Result<(), CodecError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TextReader;

impl ResponseReader<String> for TextReader {
    fn read(&self, response: &RawResponse) -> Result<String, CodecError> {
        String::from_utf8(response.body().to_vec()).map_err(CodecError::decode)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BytesReader;

impl ResponseReader<Bytes> for BytesReader {
    fn read(&self, response: &RawResponse) -> Result<Bytes, CodecError> {
        Ok(response.body().clone())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TextWriter;

impl RequestWriter<String> for TextWriter {
    fn write(&self, body: &String) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(body.as_bytes()))
    }

    fn content_type(&self) -> Option<HeaderValue> {
        Some(HeaderValue::from_static("text/plain; charset=utf-8"))
    }
}

pub struct JsonWriter<R> {
    _marker: PhantomData<fn(&R)>,
}

impl<R> JsonWriter<R> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<R> Default for JsonWriter<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for JsonWriter<R> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("JsonWriter")
    }
}

impl<R> RequestWriter<R> for JsonWriter<R>
where
    R: Serialize,
{
    fn write(&self, body: &R) -> Result<Bytes, CodecError> {
        serde_json::to_vec(body)
            .map(Bytes::from)
            .map_err(CodecError::encode)
    }

    fn content_type(&self) -> Option<HeaderValue> {
        Some(HeaderValue::from_static("application/json"))
    }
}

pub struct JsonReader<S> {
    _marker: PhantomData<fn() -> S>,
}

impl<S> JsonReader<S> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S> Default for JsonReader<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for JsonReader<S> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("JsonReader")
    }
}

impl<S> ResponseReader<S> for JsonReader<S>
where
    S: DeserializeOwned,
{
    fn read(&self, response: &RawResponse) -> Result<S, CodecError> {
        response.json()
    }
}
