use axum::{
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use exchange_log::{
    init_tracing, CaptureConfig, FormatterConfig, FormattingHandler, HttpLogLayer, Logger,
};
use serde_json::json;
use std::time::Duration;
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    Json(json!({"greeting": "Hello, World!", "path": "/hello"}))
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

/// "中文" encoded as Big5.
async fn big5_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=big5")],
        vec![0xA4u8, 0xA4, 0xA4, 0xE5],
    )
}

async fn streaming_handler() -> Response {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    let mut response = Body::from_stream(stream).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain"),
    );
    response
}

async fn large_response_handler() -> impl IntoResponse {
    "x".repeat(2048) // over the demo capture limit
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let formatter_config = FormatterConfig::from_env()?;
    init_tracing(&formatter_config)?;

    let capture_config = CaptureConfig {
        max_body_bytes: Some(1024),
        ..CaptureConfig::default()
    };
    let handler = FormattingHandler::from_capture(&formatter_config, &capture_config);

    let app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/big5", get(big5_handler))
        .route("/streaming", get(streaming_handler))
        .route("/large", get(large_response_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(HttpLogLayer::new(capture_config, handler))
                .into_inner(),
        );

    info!("Demo server endpoints:");
    info!("  GET  /hello      - JSON greeting");
    info!("  POST /echo       - Echo request body");
    info!("  GET  /big5       - Big5-encoded text, logged as UTF-8");
    info!("  GET  /streaming  - Streaming response");
    info!("  GET  /large      - Response over the capture limit");
    info!("Set APP_TIMEZONE (e.g. Asia/Taipei) to change the logged time zone.");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    Logger::main().notice("Demo server listening on http://localhost:%d", &[json!(3000)])?;

    axum::serve(listener, app).await?;

    Ok(())
}
