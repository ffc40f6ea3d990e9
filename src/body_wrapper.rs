//! Body capture for the middleware.
//!
//! A captured body keeps streaming to its destination unchanged; a copy of
//! each chunk is relayed to a future that assembles the
//! [`CapturedBody`](crate::types::CapturedBody) once the stream ends.

use axum::body::Bytes;
use bytes::BytesMut;
use futures::{Future, StreamExt};
use http_body_util::BodyExt;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::types::CapturedBody;

/// Error type for body capture operations
#[derive(Debug, thiserror::Error)]
pub enum BodyCaptureError {
    #[error("Body stream error: {0}")]
    StreamError(String),
}

pub type PendingCapture = Pin<Box<dyn Future<Output = Result<CapturedBody, BodyCaptureError>> + Send>>;

/// Tees `body` into a pass-through stream and a capture future.
///
/// With a `limit`, a body that grows past it resolves to
/// [`CapturedBody::NotCaptured`] while the stream itself still delivers
/// every byte.
///
/// # Examples
///
/// ```rust
/// use exchange_log::body_wrapper::capture_body;
/// use exchange_log::CapturedBody;
/// use axum::body::Body;
/// use http_body_util::BodyExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (body, capture) = capture_body(Body::from("Hello, World!"), None);
/// let forwarded = body.collect().await?.to_bytes();
/// assert_eq!(forwarded, "Hello, World!");
/// assert_eq!(capture.await?, CapturedBody::from("Hello, World!"));
/// # Ok(())
/// # }
/// ```
pub fn capture_body<B>(body: B, limit: Option<usize>) -> (axum::body::Body, PendingCapture)
where
    B: axum::body::HttpBody<Data = Bytes, Error = axum::Error> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();

    let tee = body.into_data_stream().map(move |result| {
        let relayed = match &result {
            Ok(chunk) => Ok(chunk.clone()),
            Err(e) => {
                error!(error = %e, "Stream error during body capture");
                Err(BodyCaptureError::StreamError(e.to_string()))
            }
        };
        // The receiver may already have given up on an oversized body.
        let _ = tx.send(relayed);
        result
    });

    let forwarded = axum::body::Body::from_stream(tee);

    // Resolves when the stream is dropped or finished.
    let capture = Box::pin(async move {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(e),
            };
            if limit.is_some_and(|max| buffer.len() + chunk.len() > max) {
                debug!(limit = ?limit, "Body exceeds capture limit, not keeping a copy");
                return Ok(CapturedBody::NotCaptured);
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(CapturedBody::Buffered(buffer.freeze()))
    });

    (forwarded, capture)
}
