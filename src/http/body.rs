//! Canonical body representation and the push-to-buffer bridge.
//!
//! # Responsibilities
//! - One body type for requests and responses on every engine
//! - Stream pass-through for engines that hand out pull streams
//! - `BodyAccumulator`: accumulate → seal → hand off, for engines that emit
//!   discrete data/end/error notifications
//!
//! # Design Decisions
//! - The buffering path materializes the whole body; a size limit guards it
//! - A body is single-use: consuming helpers take `self`

use std::fmt;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use hyper::body::Bytes;
use thiserror::Error;

use crate::error::BoxError;

/// Stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// Errors raised while reading a body.
#[derive(Debug, Error)]
pub enum BodyError {
    /// The underlying transport failed mid-body.
    #[error("body read failed: {0}")]
    Read(BoxError),

    /// The body exceeded the configured limit.
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// The body was not valid UTF-8.
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The body was not valid JSON for the requested type.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// An accumulator was used after it sealed or failed.
    #[error("body accumulator is {0}")]
    InvalidState(&'static str),
}

/// A request or response body: absent, buffered, or streamed.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    /// Wrap a fallible chunk stream.
    pub fn from_stream<S, B, E>(stream: S) -> Self
    where
        S: futures_util::Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        Body::Stream(stream.map_ok(Into::into).map_err(Into::into).boxed())
    }

    /// Length when known without reading.
    pub fn size_hint(&self) -> Option<usize> {
        match self {
            Body::Empty => Some(0),
            Body::Full(bytes) => Some(bytes.len()),
            Body::Stream(_) => None,
        }
    }

    /// View the body as a stream of chunks regardless of its shape.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Body::Empty => stream::empty().boxed(),
            Body::Full(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Body::Stream(stream) => stream,
        }
    }

    /// Read the whole body.
    pub async fn collect(self, limit: Option<usize>) -> Result<Bytes, BodyError> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => match limit {
                Some(limit) if bytes.len() > limit => Err(BodyError::TooLarge { limit }),
                _ => Ok(bytes),
            },
            Body::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(BodyError::Read)?;
                    if let Some(limit) = limit {
                        if buf.len() + chunk.len() > limit {
                            return Err(BodyError::TooLarge { limit });
                        }
                    }
                    buf.extend_from_slice(&chunk);
                }
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Convert into the body type the axum and hyper engines hand to hyper.
    pub(crate) fn into_axum(self) -> axum::body::Body {
        match self {
            Body::Empty => axum::body::Body::empty(),
            Body::Full(bytes) => axum::body::Body::from(bytes),
            Body::Stream(stream) => axum::body::Body::from_stream(stream),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => write!(f, "Body::Full({} bytes)", bytes.len()),
            Body::Stream(_) => f.write_str("Body::Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Full(Bytes::from_static(text.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Full(Bytes::from_static(bytes))
    }
}

/// A discrete body notification emitted by a push-style engine.
#[derive(Debug)]
pub enum BodyEvent {
    Data(Bytes),
    End,
    Error(BoxError),
}

#[derive(Debug)]
enum AccumulatorState {
    Accumulating(Vec<u8>),
    Sealed(Bytes),
    Failed,
    HandedOff,
}

/// Buffers push notifications into one body.
///
/// ```text
/// Accumulating --Data--> Accumulating
/// Accumulating --End---> Sealed --into_body--> HandedOff
/// Accumulating --Error/limit--> Failed
/// ```
#[derive(Debug)]
pub struct BodyAccumulator {
    state: AccumulatorState,
    limit: usize,
}

impl BodyAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            state: AccumulatorState::Accumulating(Vec::new()),
            limit,
        }
    }

    /// Feed one notification. Returns `Ok(true)` once the body has sealed.
    pub fn push(&mut self, event: BodyEvent) -> Result<bool, BodyError> {
        let buf = match &mut self.state {
            AccumulatorState::Accumulating(buf) => buf,
            AccumulatorState::Sealed(_) => return Err(BodyError::InvalidState("sealed")),
            AccumulatorState::Failed => return Err(BodyError::InvalidState("failed")),
            AccumulatorState::HandedOff => return Err(BodyError::InvalidState("handed off")),
        };

        match event {
            BodyEvent::Data(chunk) => {
                if buf.len() + chunk.len() > self.limit {
                    self.state = AccumulatorState::Failed;
                    return Err(BodyError::TooLarge { limit: self.limit });
                }
                buf.extend_from_slice(&chunk);
                Ok(false)
            }
            BodyEvent::End => {
                let bytes = Bytes::from(std::mem::take(buf));
                self.state = AccumulatorState::Sealed(bytes);
                Ok(true)
            }
            BodyEvent::Error(e) => {
                self.state = AccumulatorState::Failed;
                Err(BodyError::Read(e))
            }
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, AccumulatorState::Sealed(_))
    }

    /// Bytes buffered so far.
    pub fn buffered(&self) -> usize {
        match &self.state {
            AccumulatorState::Accumulating(buf) => buf.len(),
            AccumulatorState::Sealed(bytes) => bytes.len(),
            _ => 0,
        }
    }

    /// Hand the sealed body off. Fails unless the accumulator has sealed.
    pub fn into_body(mut self) -> Result<Body, BodyError> {
        match std::mem::replace(&mut self.state, AccumulatorState::HandedOff) {
            AccumulatorState::Sealed(bytes) if bytes.is_empty() => Ok(Body::Empty),
            AccumulatorState::Sealed(bytes) => Ok(Body::Full(bytes)),
            AccumulatorState::Accumulating(_) => Err(BodyError::InvalidState("not sealed")),
            AccumulatorState::Failed => Err(BodyError::InvalidState("failed")),
            AccumulatorState::HandedOff => Err(BodyError::InvalidState("handed off")),
        }
    }
}
