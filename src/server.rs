//! HTTP front end for a resource service.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /agent/capabilities` | Capability manifest |
//! | `POST /agent/execute` | Run an operation, answer with an envelope |
//! | `GET /health` | Liveness |

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{ErrorKind, Result};
use crate::protocol::{CapabilityManifest, Envelope, ExecuteRequest, HealthStatus};
use crate::service::ResourceService;

/// Build the router for one service.
pub fn router(service: Arc<ResourceService>) -> Router {
    Router::new()
        .route("/agent/capabilities", get(capabilities))
        .route("/agent/execute", post(execute))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn capabilities(State(service): State<Arc<ResourceService>>) -> Json<CapabilityManifest> {
    Json(service.manifest())
}

async fn execute(
    State(service): State<Arc<ResourceService>>,
    body: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> (StatusCode, Json<Envelope>) {
    match body {
        Ok(Json(request)) => {
            let envelope = service.execute(&request.tool_name, request.parameters).await;
            (StatusCode::OK, Json(envelope))
        }
        Err(rejection) => {
            warn!(service = %service.name(), error = %rejection, "rejected execute body");
            (
                StatusCode::BAD_REQUEST,
                Json(Envelope::failure(ErrorKind::ValidationError, rejection.body_text())),
            )
        }
    }
}

async fn health(State(service): State<Arc<ResourceService>>) -> Json<HealthStatus> {
    Json(service.health())
}

/// Serve until Ctrl-C.
pub async fn serve(service: Arc<ResourceService>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_shutdown(listener, service, async {
        // A failed signal handler means no graceful stop, not an error.
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

/// Serve on a bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown(
    listener: TcpListener,
    service: Arc<ResourceService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(service = %service.name(), address = %local, "service listening");

    axum::serve(listener, router(service.clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!(service = %service.name(), "service stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::service::{flight_service, hotel_service};

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn execute_request(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/agent/execute")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_capabilities() {
        let app = router(Arc::new(flight_service()));
        let request = Request::get("/agent/capabilities").body(Body::empty()).unwrap();

        let (status, body) = call(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent_name"], "FlightBookingAgent");
        assert_eq!(body["status"], "online");
        assert_eq!(body["tools"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(Arc::new(hotel_service()));
        let request = Request::get("/health").body(Body::empty()).unwrap();

        let (status, body) = call(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy", "agent": "HotelBookingAgent"}));
    }

    #[tokio::test]
    async fn test_execute_returns_envelope() {
        let app = router(Arc::new(hotel_service()));
        let body = json!({"tool_name": "search_hotels", "parameters": {"location": "frankfurt"}});

        let (status, body) = call(app, execute_request(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["count"], 2);
    }

    #[tokio::test]
    async fn test_execute_failure_is_still_ok_status() {
        let app = router(Arc::new(hotel_service()));
        let body = json!({"tool_name": "get_hotel_details", "parameters": {"hotel_id": "99"}});

        let (status, body) = call(app, execute_request(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "NotFound");
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_body() {
        let app = router(Arc::new(hotel_service()));

        let (status, body) = call(app, execute_request("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_kind"], "ValidationError");
    }
}
