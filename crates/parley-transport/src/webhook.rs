//! The webhook gateway.
//!
//! [`WebhookGateway`] accepts `POST /hooks/{webhook_id}` with a JSON body,
//! wraps it in a [`WebhookEvent`] and pushes it onto the dispatcher's webhook
//! queue. It runs as its own Tokio task and never waits on the dispatcher:
//! a request is answered as soon as its event is queued.
//!
//! ```text
//! POST /hooks/{id} ──▶ WebhookGateway ──▶ mpsc queue ──▶ Dispatcher
//!                      200 {"status":"queued"}
//!                      4xx {"status":"failed","reason":..}
//! ```
//!
//! Every failure, including unknown routes and extractor rejections such as
//! an oversized body, is answered with the same JSON shape.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, State,
        rejection::{BytesRejection, PathRejection},
    },
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, GatewayResult};
use parley_core::WebhookEvent;

// ─── Router ───────────────────────────────────────────────────────────────────

/// HTTP front end feeding the webhook queue.
#[derive(Debug, Clone)]
pub struct WebhookGateway {
    queue: UnboundedSender<WebhookEvent>,
}

impl WebhookGateway {
    /// Creates a gateway that pushes events onto `queue`.
    pub fn new(queue: UnboundedSender<WebhookEvent>) -> Self {
        Self { queue }
    }

    /// Builds the axum [`Router`] serving the webhook endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/hooks/{webhook_id}", post(receive_webhook))
            .method_not_allowed_fallback(method_not_allowed)
            .fallback(unknown_route)
            .with_state(self.clone())
    }

    /// Binds the listener without serving yet.
    ///
    /// Port `0` picks an ephemeral port; see [`BoundGateway::local_addr`].
    pub async fn bind(self, addr: &str) -> GatewayResult<BoundGateway> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        Ok(BoundGateway {
            listener,
            local_addr,
            router: self.router(),
        })
    }
}

async fn receive_webhook(
    State(gateway): State<WebhookGateway>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, GatewayError> {
    let Path(webhook_id) = path.inspect_err(|e| {
        warn!(error = %e, "Rejected webhook with invalid path");
    })?;
    let body = body.inspect_err(|e| {
        warn!(webhook_id = %webhook_id, error = %e, "Rejected webhook body");
    })?;
    let body: Value = serde_json::from_slice(&body).inspect_err(|e| {
        warn!(webhook_id = %webhook_id, error = %e, "Rejected webhook with invalid body");
    })?;

    gateway
        .queue
        .send(WebhookEvent::new(webhook_id.as_str(), body))
        .map_err(|_| {
            error!(webhook_id = %webhook_id, "Webhook queue closed");
            GatewayError::QueueClosed
        })?;

    debug!(webhook_id = %webhook_id, "Webhook queued");
    Ok(Json(json!({ "status": "queued" })))
}

async fn unknown_route() -> GatewayError {
    GatewayError::NotFound
}

async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}

// ─── Serving ──────────────────────────────────────────────────────────────────

/// A gateway bound to its address.
#[derive(Debug)]
pub struct BoundGateway {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
}

impl BoundGateway {
    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves requests until `shutdown` fires.
    ///
    /// In-flight requests finish before this returns.
    pub async fn serve(self, shutdown: CancellationToken) -> GatewayResult<()> {
        info!(addr = %self.local_addr, "Webhook gateway listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(GatewayError::Serve)?;
        info!(addr = %self.local_addr, "Webhook gateway stopped");
        Ok(())
    }

    /// Serves on a new Tokio task.
    pub fn spawn(self) -> GatewayHandle {
        let shutdown = CancellationToken::new();
        let local_addr = self.local_addr;
        let task = tokio::spawn(self.serve(shutdown.clone()));
        GatewayHandle {
            local_addr,
            shutdown,
            task,
        }
    }
}

/// Handle to a gateway serving on its own task.
#[derive(Debug)]
pub struct GatewayHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<GatewayResult<()>>,
}

impl GatewayHandle {
    /// The address the gateway listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests and waits for the server task.
    pub async fn shutdown(self) -> GatewayResult<()> {
        self.shutdown.cancel();
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Webhook gateway task failed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_is_queued() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = WebhookGateway::new(tx).router();

        let response = router
            .oneshot(post("/hooks/deploy", r#"{"context":{"text":"shipped"}}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "queued" }));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.webhook_id, "deploy");
        assert_eq!(event.context_str("text"), Some("shipped"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = WebhookGateway::new(tx).router();

        let response = router.oneshot(post("/hooks/deploy", "not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "failed");
        assert!(body["reason"].as_str().unwrap().starts_with("invalid JSON body"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let router = WebhookGateway::new(tx).router();

        let response = router.oneshot(post("/hooks/deploy", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "status": "failed", "reason": "webhook queue is closed" })
        );
    }

    #[tokio::test]
    async fn test_other_routes_are_not_served() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = WebhookGateway::new(tx).router();

        let response = router.clone().oneshot(post("/actions/ping", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            json!({ "status": "failed", "reason": "no webhook route for this path" })
        );

        let get = Request::builder()
            .uri("/hooks/deploy")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json_body(response).await["status"], "failed");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_as_json() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = WebhookGateway::new(tx).router();

        let huge = format!(r#"{{"pad":"{}"}}"#, "x".repeat(3 * 1024 * 1024));
        let response = router.oneshot(post("/hooks/deploy", &huge)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "failed");
        assert!(!body["reason"].as_str().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_undecodable_path_is_rejected_as_json() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = WebhookGateway::new(tx).router();

        let response = router.oneshot(post("/hooks/%FF", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], "failed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_serves_over_tcp_until_shutdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bound = WebhookGateway::new(tx).bind("127.0.0.1:0").await.unwrap();
        let handle = bound.spawn();

        let body = r#"{"context":{"text":"hi"}}"#;
        let request = format!(
            "POST /hooks/ping HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with(r#"{"status":"queued"}"#));
        assert_eq!(rx.recv().await.unwrap().webhook_id, "ping");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_error_names_address() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = WebhookGateway::new(tx).bind("not-an-address").await.unwrap_err();
        assert!(matches!(err, GatewayError::Bind { ref addr, .. } if addr == "not-an-address"));
    }
}
