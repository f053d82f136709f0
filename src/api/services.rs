use std::collections::HashMap;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::models::{HealthResponse, PoolStatus, UploadAccepted};
use super::state::AppState;
use super::utils::{content_disposition, parse_dimension, resolve_dimensions, sanitize_file_name};
use crate::api::error::ApiError;
use crate::hub::{HubError, Message, MessageSink};
use crate::pipeline::UploadJob;
use crate::transform::{Dimensions, sniff_format};

/// Upload endpoint (POST /api/v1/upload)
///
/// Multipart fields:
/// - `file` (required): PNG or JPEG image
/// - `width`, `height` (optional): target size, defaulting to the configured one
///   and capped by `transform.max_width` / `transform.max_height`
///
/// The image is only sniffed here. Transforming and storing happen on the
/// worker pool after this returns `202 Accepted`; the outcome is published to
/// `/ws` listeners. A full work queue answers `503`.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let accepted = accept_upload(&state, multipart).await.inspect_err(|e| {
        state.metrics.upload_rejected();
        warn!(error = %e, "Upload rejected");
    })?;

    state.metrics.upload_accepted();
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

struct UploadForm {
    file_name: String,
    bytes: Bytes,
    width: Option<u32>,
    height: Option<u32>,
}

async fn accept_upload(state: &AppState, mut multipart: Multipart) -> Result<UploadAccepted, ApiError> {
    let form = read_upload_form(&mut multipart, state.config.max_dimensions()).await?;

    let format = sniff_format(&form.bytes).ok_or_else(|| {
        ApiError::UnsupportedMedia(format!("{} is not a PNG or JPEG image", form.file_name))
    })?;
    let dimensions =
        resolve_dimensions(state.config.default_dimensions(), form.width, form.height);

    let job = UploadJob {
        bytes: form.bytes,
        original_name: form.file_name.clone(),
        format,
        dimensions,
    };
    state.pipeline.submit(&state.pool, job)?;

    info!(
        filename = %form.file_name,
        format = format.as_str(),
        %dimensions,
        "Upload accepted"
    );

    Ok(UploadAccepted::new(form.file_name))
}

async fn read_upload_form(
    multipart: &mut Multipart,
    limit: Dimensions,
) -> Result<UploadForm, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut width = None;
    let mut height = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let raw_name = field.file_name().map(String::from).unwrap_or_default();
                let file_name = sanitize_file_name(&raw_name).ok_or_else(|| {
                    ApiError::InvalidPayload("file field must carry a file name".to_string())
                })?;
                let bytes = field.bytes().await?;
                file = Some((file_name, bytes));
            }
            "width" => width = Some(parse_dimension("width", &field.text().await?, limit.width)?),
            "height" => {
                height = Some(parse_dimension("height", &field.text().await?, limit.height)?)
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::InvalidPayload("file is required".to_string()))?;

    Ok(UploadForm {
        file_name,
        bytes,
        width,
        height,
    })
}

/// Notification listener endpoint (GET /ws)
///
/// Each connection waits for exactly one message, writes it as JSON and
/// closes. Every connection sees every message: there is no per-upload
/// routing.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_listener(state, socket))
}

/// Writes hub messages to a websocket as text frames
struct WsSink {
    sender: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn deliver(&mut self, message: &Message) -> Result<(), String> {
        let payload = serde_json::to_string(message).map_err(|e| e.to_string())?;
        self.sender
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| e.to_string())
    }
}

impl WsSink {
    async fn close(&mut self, code: u16, reason: &'static str) {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        };
        if let Err(e) = self.sender.send(WsMessage::Close(Some(frame))).await {
            debug!(error = %e, "Close frame not sent");
        }
    }
}

async fn handle_listener(state: AppState, socket: WebSocket) {
    // Register before anything else so no publish is missed
    let subscription = state.hub.subscribe();
    let subscription_id = subscription.id();
    let (sender, mut receiver) = socket.split();
    let cancel = state.shutdown.child_token();

    info!(subscription_id = %subscription_id, "Listener connected");

    // The client never sends anything meaningful; reading only detects that it left
    let reader = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(frame) = receiver.next().await {
                match frame {
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        // Abnormal closure and going-away land here
                        debug!(error = %e, "Listener read ended");
                        break;
                    }
                }
            }
            cancel.cancel();
        })
    };

    let mut sink = WsSink { sender };
    let outcome = subscription
        .await_one(&mut sink, &cancel, state.config.write_timeout())
        .await;

    match outcome {
        Ok(message) => {
            info!(
                subscription_id = %subscription_id,
                action = ?message.action,
                "Notification delivered"
            );
            sink.close(close_code::NORMAL, "done").await;
        }
        Err(HubError::SlowConsumer) => {
            warn!(subscription_id = %subscription_id, "Disconnecting slow listener");
            sink.close(close_code::POLICY, "too slow").await;
        }
        Err(HubError::Cancelled) if state.shutdown.is_cancelled() => {
            sink.close(close_code::AWAY, "server shutting down").await;
        }
        Err(HubError::Cancelled) => {
            info!(subscription_id = %subscription_id, "Listener disconnected before notification");
        }
        Err(e) => {
            warn!(subscription_id = %subscription_id, error = %e, "Notification delivery failed");
        }
    }

    reader.abort();
}

/// Artifact download endpoint (GET /api/v1/download/{filename})
///
/// Streams the stored file. Absent and expired artifacts answer `404`.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let handle = state.store.retrieve(&filename).await?;

    let file = tokio::fs::File::open(&handle.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            // Swept between retrieve and open
            ApiError::NotFound(filename.clone())
        } else {
            ApiError::Internal(format!("Failed to open artifact: {e}"))
        }
    })?;
    let length = file.metadata().await.ok().map(|metadata| metadata.len());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, handle.content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(&handle.name));
    if let Some(length) = length {
        response = response.header(header::CONTENT_LENGTH, length);
    }

    response
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(format!("Response build failed: {e}")))
}

/// Health check endpoint (GET /health)
///
/// Returns 503 once the worker pool has stopped accepting work.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    components.insert("api".to_string(), "healthy".to_string());
    let pool_status = if state.pool.is_closed() {
        "stopped"
    } else {
        "healthy"
    };
    components.insert("worker_pool".to_string(), pool_status.to_string());
    components.insert("hub".to_string(), "healthy".to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let (overall_status, status_code) = if all_healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.hub.subscriber_count(),
        pool: PoolStatus {
            size: state.pool.pool_size(),
            in_flight: state.pool.in_flight(),
            queued: state.pool.queued(),
        },
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
