//! HTTP surface: webhook intake and health endpoints

use crate::context::AppContext;
use crate::health::{HealthCheck, HealthCheckBuilder};
use crate::monitoring::{setup_queue_monitoring, QueueMonitor};
use crate::webhook::{handle_webhook_async, WebhookEvent};
use bytes::Bytes;
use http::{header, HeaderValue, Method, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Largest webhook body accepted
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// JSON error envelope: `{"error": {"type": ..., "message": ...}}`
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "type")]
    error_type: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        let body = ErrorResponse {
            error: ErrorBody {
                error_type: self.error_type,
                message: &self.message,
            },
        };
        json_response(self.status, &body)
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| {
        br#"{"error":{"type":"internal_error","message":"Failed to serialize response"}}"#
            .to_vec()
    });
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Routes requests against one [`AppContext`]
pub struct Server {
    ctx: AppContext,
    monitor: QueueMonitor,
    health: HealthCheck,
}

impl Server {
    /// Build the server and start logging queue events
    pub fn new(ctx: AppContext) -> Self {
        let monitor = setup_queue_monitoring(&ctx.queues);
        Self::with_monitor(ctx, monitor)
    }

    /// Build the server around a monitor that is already listening
    pub fn with_monitor(ctx: AppContext, monitor: QueueMonitor) -> Self {
        let health = HealthCheckBuilder::new()
            .add_queue_checks(&ctx.queues)
            .version(env!("CARGO_PKG_VERSION"))
            .build();
        Self {
            ctx,
            monitor,
            health,
        }
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run<F>(self, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Courier listening");
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let server = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let server = server.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: hyper::Request<Incoming>| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle_incoming(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(remote = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_incoming(&self, req: hyper::Request<Incoming>) -> Response<Full<Bytes>> {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let (parts, body) = req.into_parts();

        let body = match http_body_util::Limited::new(body, MAX_BODY_BYTES)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let mut response =
                    ApiError::bad_request(format!("Unreadable body: {}", e)).into_response();
                tag_request_id(&mut response, &request_id);
                log_request(&request_id, &parts.method, parts.uri.path(), response.status(), start);
                return response;
            }
        };

        let mut response = self.respond(&parts.method, parts.uri.path(), body).await;
        tag_request_id(&mut response, &request_id);
        log_request(&request_id, &parts.method, parts.uri.path(), response.status(), start);
        response
    }

    /// Route one request. Split from the connection handling so it can be driven directly.
    pub async fn respond(&self, method: &Method, path: &str, body: Bytes) -> Response<Full<Bytes>> {
        let result = match (method, path) {
            (&Method::POST, "/webhooks/calls") => self.webhook(body).await,
            (&Method::GET, "/health") => Ok(self.liveness().await),
            (&Method::GET, "/health/queues") => self.queue_health().await,
            (_, "/webhooks/calls") | (_, "/health") | (_, "/health/queues") => Err(ApiError::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                format!("Method {} not allowed for {}", method, path),
            )),
            _ => Err(ApiError::not_found(format!(
                "No route found for {} {}",
                method, path
            ))),
        };
        result.unwrap_or_else(ApiError::into_response)
    }

    async fn webhook(&self, body: Bytes) -> Result<Response<Full<Bytes>>, ApiError> {
        let event: WebhookEvent = serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;

        let ack = handle_webhook_async(&self.ctx.queues, event)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to queue webhook");
                ApiError::unavailable("Could not queue the event")
            })?;
        Ok(json_response(StatusCode::OK, &ack))
    }

    async fn liveness(&self) -> Response<Full<Bytes>> {
        let result = self.health.execute().await;
        let status = if result.status.is_unhealthy() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        };
        json_response(status, &result)
    }

    async fn queue_health(&self) -> Result<Response<Full<Bytes>>, ApiError> {
        let snapshot = self.monitor.snapshot().await.map_err(|e| {
            error!(error = %e, "Queue snapshot failed");
            ApiError::unavailable(e.to_string())
        })?;
        Ok(json_response(StatusCode::OK, &snapshot))
    }
}

fn tag_request_id(response: &mut Response<Full<Bytes>>, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
}

fn log_request(request_id: &str, method: &Method, path: &str, status: StatusCode, start: Instant) {
    let elapsed = start.elapsed();

    if status.is_success() {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "Request completed"
        );
    } else {
        error!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            "Request failed"
        );
    }
}
