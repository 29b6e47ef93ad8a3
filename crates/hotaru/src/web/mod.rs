//! Web server module: axum HTTP surface of the device.
//!
//! - `GET /`: viewer page
//! - `GET /stream`: MJPEG stream (`multipart/x-mixed-replace`)
//! - `GET /capture`: one JPEG still
//! - `GET /control?var=&val=`: toggle `motion_detect` or `alarm`
//! - `POST /alarm`: `{"command":"ALARM_ON"|"ALARM_OFF","status":"..."}`
//! - `GET /status`: telemetry snapshot
//!
//! Every response allows any origin, and `OPTIONS` preflights are answered
//! for every path.

pub mod control;

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use self::control::{AlarmRequest, ControlCommand};
use crate::alarm::AlarmCommand;
use crate::capture::available_memory_bytes;
use crate::stream::{ChunkSink, StreamSession};
use crate::{CaptureError, CommandError, Pipeline, StreamError};

/// Chunks buffered per viewer before the session waits on the client.
const STREAM_BUFFER_CHUNKS: usize = 4;

struct WebState {
    pipeline: Pipeline,
    next_session: AtomicU64,
}

/// Error returned by handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Command(_) => StatusCode::BAD_REQUEST,
            ApiError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the router for `pipeline`.
pub fn router(pipeline: Pipeline) -> Router {
    let state = Arc::new(WebState {
        pipeline,
        next_session: AtomicU64::new(1),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/stream", get(stream))
        .route("/capture", get(capture))
        .route("/control", get(control))
        .route("/alarm", post(alarm))
        .route("/status", get(status))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Start the web server on `bind`.
pub async fn start(pipeline: Pipeline, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .context(format!("Failed to bind to {}", bind))?;

    info!("Web server listening on http://{}", bind);
    serve(listener, pipeline).await
}

/// Serve on an already-bound listener until the pipeline shuts down.
pub async fn serve(listener: TcpListener, pipeline: Pipeline) -> Result<()> {
    let shutdown = pipeline.shutdown().clone();
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Web server error")?;

    Ok(())
}

/// GET /: viewer page
async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

/// Feeds a session's chunks into the response body.
struct ChannelSink {
    content_type: Option<oneshot::Sender<&'static str>>,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn start(&mut self, content_type: &'static str) -> Result<(), StreamError> {
        self.content_type
            .take()
            .ok_or(StreamError::Disconnected)?
            .send(content_type)
            .map_err(|_| StreamError::Disconnected)
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| StreamError::Disconnected)
    }
}

/// GET /stream: one session per viewer, running until the client leaves
async fn stream(State(state): State<Arc<WebState>>) -> Response {
    let id = state.next_session.fetch_add(1, Ordering::Relaxed);
    let (type_tx, type_rx) = oneshot::channel();
    let (tx, rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);
    let pipeline = state.pipeline.clone();

    tokio::spawn(async move {
        let mut sink = ChannelSink {
            content_type: Some(type_tx),
            tx,
        };
        let report = StreamSession::new(id).run(&pipeline, &mut sink).await;
        debug!(session = id, "Stream rate: {:?}", report.rate);
    });

    match type_rx.await {
        Ok(content_type) => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(ReceiverStream::new(rx)),
        )
            .into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// GET /capture: single JPEG
async fn capture(State(state): State<Arc<WebState>>) -> Result<Response, ApiError> {
    let jpeg = state.pipeline.capture_jpeg().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CONTENT_DISPOSITION, "inline; filename=capture.jpg"),
        ],
        jpeg,
    )
        .into_response())
}

/// GET /control?var=&val=
async fn control(
    State(state): State<Arc<WebState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let command = ControlCommand::parse(
        params.get("var").map(String::as_str),
        params.get("val").map(String::as_str),
    )?;

    let pipeline = &state.pipeline;
    match command {
        ControlCommand::MotionDetect(enabled) => pipeline.set_detection(enabled),
        ControlCommand::Alarm(active) => {
            pipeline.alarm().force_set(active, None);
        }
        ControlCommand::Unknown { ref var } => {
            debug!(var = %var, "Ignoring unknown control variable");
            return Ok(Json(serde_json::json!({ "status": "ignored" })));
        }
    }
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// POST /alarm
async fn alarm(
    State(state): State<Arc<WebState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = AlarmRequest::from_body(&body)?;
    let active = match request.command() {
        Some(AlarmCommand::Arm) => true,
        Some(AlarmCommand::Disarm) => false,
        None => {
            debug!(command = %request.command, "Ignoring unknown alarm command");
            return Ok(Json(serde_json::json!({ "status": "ignored" })));
        }
    };

    let alarm = state.pipeline.alarm();
    alarm.force_set(active, request.status.as_deref());
    Ok(Json(serde_json::json!({
        "status": "success",
        "alarm_active": alarm.is_active(),
    })))
}

/// GET /status: telemetry snapshot
async fn status(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let pipeline = &state.pipeline;
    let telemetry = pipeline.telemetry();
    let t = telemetry.read();
    let alarm = pipeline.alarm().snapshot();

    Json(serde_json::json!({
        "motion_detect": t.detection_enabled,
        "motion_count": t.motion_count,
        "last_motion": t.last_motion_ms,
        "alarm_active": t.alarm_active,
        "total_alerts": t.total_alerts,
        "free_heap": available_memory_bytes().unwrap_or(0),
        "actuator_on": alarm.actuator_on,
        "detection_status": t.detection_status,
        "last_detection": t.last_detection_ms,
        "capture_failures": t.capture_failures,
        "active_streams": t.active_streams,
        "last_change": t.last_change,
        "uptime_ms": telemetry.uptime_ms(),
    }))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
