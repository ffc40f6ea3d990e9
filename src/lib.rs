//! # exchange-log
//!
//! Template-driven structured log lines for HTTP request/response exchanges.
//!
//! A [`LogFormatter`] expands a template of named placeholders (`{method}`,
//! `{res_body}`, `{req_header_User-Agent}`, ...) against one exchange and
//! produces a single JSON object per line: timestamps moved into the
//! application time zone, response bodies decoded from their declared
//! charset, and JSON bodies shown readably instead of escaped twice.
//!
//! [`HttpLogLayer`] is a tower middleware that captures exchanges as they
//! pass through an axum service and formats them on a background task.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use exchange_log::{CaptureConfig, FormatterConfig, FormattingHandler, HttpLogLayer, Logger};
//!
//! async fn ping() -> &'static str {
//!     "pong"
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = FormatterConfig::from_env()?;
//!     exchange_log::init_tracing(&config)?;
//!
//!     let handler = FormattingHandler::new(&config, Logger::main());
//!     let app = Router::new()
//!         .route("/ping", get(ping))
//!         .layer(HttpLogLayer::new(CaptureConfig::default(), handler));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! A request to `/ping` then logs a line such as
//!
//! ```text
//! [2024-05-06 07:08:09.123456] INFO: {"method":"GET","uri":"/ping","time":"2024-05-06 07:08:09","status":"200","req_body":"","res_body":"pong","error":"NULL"}
//! ```
//!
//! ## Formatting without the middleware
//!
//! The formatter only reads [`RequestData`], [`ResponseData`] and an optional
//! error, so it works equally well for exchanges made by an HTTP client:
//!
//! ```rust
//! use axum::http::{Method, StatusCode, Uri};
//! use exchange_log::{CapturedError, FormatterConfig, LogFormatter, RequestData, ResolutionContext};
//!
//! let formatter = LogFormatter::new(&FormatterConfig::default());
//! let request = RequestData::new(Method::GET, Uri::from_static("http://upstream.test/"));
//! let error = CapturedError::new("connection refused");
//!
//! let line = formatter
//!     .format(&ResolutionContext::new(&request).with_error(&error))
//!     .unwrap();
//! assert!(line.ends_with(r#""status":"NULL","req_body":"","res_body":"NULL","error":"connection refused"}"#));
//! ```

use axum::{body::Body, extract::Request, response::Response};
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::SystemTime,
};
use tokio::sync::mpsc;
use tower::{Layer, Service};
use tracing::{debug, error, instrument};

pub mod body_wrapper;
pub mod config;
pub mod context;
pub mod decorator;
pub mod error;
pub mod formatter;
pub mod logger;
pub mod logging_handler;
pub mod resolver;
pub mod splitter;
pub mod telemetry;
pub mod template;
pub mod types;
pub mod unicode;

use body_wrapper::{capture_body, PendingCapture};

pub use config::{CaptureConfig, FormatterConfig};
pub use context::ResolutionContext;
pub use decorator::{DecoratedRecord, LogDecorator};
pub use error::{ConfigError, FormatError, SprintfError, TemplateError};
pub use formatter::LogFormatter;
pub use logger::{Level, LogSink, Logger, TracingSink};
pub use logging_handler::{ExchangeHandler, FormattingHandler};
pub use resolver::{PlaceholderResolver, Resolve};
pub use splitter::{FieldRecord, RecordSplitter};
pub use telemetry::{init_tracing, MicrosecondFormat};
pub use template::{Expansion, Preset, Template, TemplateEngine};
pub use types::{CapturedBody, CapturedError, Exchange, RequestData, ResponseData};

/// Global atomic counter for correlation IDs and process start timestamp
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(1);
static PROCESS_START_TIME: std::sync::OnceLock<u64> = std::sync::OnceLock::new();

/// Generate a unique correlation ID combining process start time and counter
fn generate_correlation_id() -> u64 {
    let start_time = *PROCESS_START_TIME.get_or_init(|| {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    });

    let counter = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);

    // High 32 bits: process start timestamp, Low 32 bits: counter
    (start_time << 32) | (counter & 0xFFFFFFFF)
}

/// Waits for a body capture; failures degrade to [`CapturedBody::NotCaptured`].
async fn settle(
    capture: Option<PendingCapture>,
    correlation_id: u64,
    side: &'static str,
) -> CapturedBody {
    let Some(capture) = capture else {
        return CapturedBody::NotCaptured;
    };
    match capture.await {
        Ok(body) => body,
        Err(e) => {
            error!(correlation_id = %correlation_id, side, error = %e, "Error capturing body");
            CapturedBody::NotCaptured
        }
    }
}

/// Tower layer that captures each exchange and hands it to an
/// [`ExchangeHandler`] on a background task.
///
/// Bodies keep streaming to their destination while a copy is collected, so
/// the handler sees an exchange only once both bodies have finished. When the
/// inner service fails, the handler receives the request together with the
/// error and the error is still returned to the caller.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use exchange_log::{CaptureConfig, FormatterConfig, FormattingHandler, HttpLogLayer};
///
/// # async fn hello() -> &'static str { "Hello" }
/// # #[tokio::main]
/// # async fn main() {
/// let config = CaptureConfig {
///     max_body_bytes: Some(64 * 1024),
///     ..CaptureConfig::default()
/// };
/// let handler = FormattingHandler::from_capture(&FormatterConfig::default(), &config);
///
/// let app: Router = Router::new()
///     .route("/hello", get(hello))
///     .layer(HttpLogLayer::new(config, handler));
/// # }
/// ```
#[derive(Clone)]
pub struct HttpLogLayer {
    config: CaptureConfig,
    tx: mpsc::UnboundedSender<Exchange>,
}

impl HttpLogLayer {
    /// Creates the layer and spawns the background task running `handler`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<H: ExchangeHandler>(config: CaptureConfig, handler: H) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Exchange>();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            while let Some(exchange) = rx.recv().await {
                handler.handle_exchange(exchange).await;
            }
        });

        Self { config, tx }
    }
}

impl<S> Layer<S> for HttpLogLayer {
    type Service = HttpLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HttpLogService {
            inner,
            config: self.config.clone(),
            tx: self.tx.clone(),
        }
    }
}

/// Service produced by [`HttpLogLayer`].
#[derive(Clone)]
pub struct HttpLogService<S> {
    inner: S,
    config: CaptureConfig,
    tx: mpsc::UnboundedSender<Exchange>,
}

impl<S> Service<Request> for HttpLogService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, mut request: Request) -> Self::Future {
        let correlation_id = generate_correlation_id();
        let start_time = SystemTime::now();

        let mut request_data = RequestData::new(request.method().clone(), request.uri().clone())
            .version(request.version());
        request_data.correlation_id = correlation_id;
        request_data.timestamp = start_time;
        request_data.headers = request.headers().clone();

        debug!(correlation_id = %correlation_id, method = %request_data.method, uri = %request_data.uri, "Extracted request metadata");

        let config = self.config.clone();
        let tx = self.tx.clone();

        let request_capture = if config.capture_request_body {
            let body = std::mem::replace(request.body_mut(), Body::empty());
            let (body_stream, capture) = capture_body(body, config.max_body_bytes);
            *request.body_mut() = body_stream;
            debug!(correlation_id = %correlation_id, "Request body capture stream created");
            Some(capture)
        } else {
            None
        };

        let future = self.inner.call(request);

        Box::pin(async move {
            let result = future.await;

            match result {
                Ok(mut response) => {
                    let end_time = SystemTime::now();
                    let mut response_data = ResponseData::new(response.status())
                        .version(response.version());
                    response_data.correlation_id = correlation_id;
                    response_data.timestamp = end_time;
                    response_data.headers = response.headers().clone();

                    let response_capture = if config.capture_response_body {
                        let body = std::mem::replace(response.body_mut(), Body::empty());
                        let (body_stream, capture) = capture_body(body, config.max_body_bytes);
                        *response.body_mut() = body_stream;
                        debug!(correlation_id = %correlation_id, "Response body capture stream created");
                        Some(capture)
                    } else {
                        None
                    };

                    // Outlives the response; resolves once both bodies have streamed.
                    tokio::spawn(async move {
                        request_data.body = settle(request_capture, correlation_id, "request").await;
                        response_data.body = settle(response_capture, correlation_id, "response").await;

                        if tx
                            .send(Exchange::completed(request_data, response_data))
                            .is_err()
                        {
                            error!(correlation_id = %correlation_id, "Failed to send exchange to background task");
                        }
                    });

                    Ok(response)
                }
                Err(e) => {
                    let captured = CapturedError::new(e.to_string());
                    tokio::spawn(async move {
                        request_data.body = settle(request_capture, correlation_id, "request").await;

                        if tx.send(Exchange::failed(request_data, captured)).is_err() {
                            error!(correlation_id = %correlation_id, "Failed to send exchange to background task");
                        }
                    });
                    Err(e)
                }
            }
        })
    }
}
