//! HTTP server for code-based transfers
//!
//! JSON API under `/api`, optional static web UI for everything else.

use super::handlers::{download_handler, receive_handler, send_handler};
use super::response::{ApiError, ErrorBody};
use crate::config::AppConfig;
use crate::error::TransferError;
use crate::transfer::TransferRegistry;
use anyhow::Result;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

/// Room for the message part and multipart framing on top of the file limit
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Handler for unknown routes when no web UI is configured
async fn not_found_handler() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Not found".to_string(),
        }),
    )
}

/// Replace the plain-text rejection of the body limit layer with the JSON error
async fn json_payload_too_large(State(limit): State<u64>, response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if response.status() != StatusCode::PAYLOAD_TOO_LARGE || is_json {
        return response;
    }

    tracing::debug!("Rejected request body over the {} byte limit", limit);
    ApiError::from(TransferError::UploadTooLarge { limit }).into_response()
}

/// Middleware to add security headers
async fn add_security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'; style-src 'self' 'unsafe-inline'; script-src 'self' 'unsafe-inline'; img-src 'self' data:;"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    response
}

/// Build the axum router for the transfer API
pub fn create_router(registry: Arc<TransferRegistry>, config: &AppConfig) -> Router {
    let body_limit: usize = registry
        .max_upload_size()
        .saturating_add(MULTIPART_OVERHEAD)
        .try_into()
        .unwrap_or(usize::MAX);

    let api = Router::new()
        .route("/api/send", post(send_handler))
        .route("/api/receive/{code}", get(receive_handler))
        .route("/api/download/{code}", get(download_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::map_response_with_state(
            registry.max_upload_size(),
            json_payload_too_large,
        ))
        .with_state(registry);

    let router = match &config.static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api.fallback(not_found_handler),
    };
    let router = router.layer(middleware::from_fn(add_security_headers));

    if config.permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve the transfer API until `cancel_token` fires
pub async fn start_http_server(
    addr: SocketAddr,
    registry: Arc<TransferRegistry>,
    config: &AppConfig,
    cancel_token: Option<CancellationToken>,
) -> Result<()> {
    let router = create_router(registry, config);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("HTTP server starting on http://{}", listener.local_addr()?);

    if let Some(ct) = cancel_token {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                ct.cancelled().await;
                tracing::info!("HTTP server shutting down gracefully");
            })
            .await?;
    } else {
        axum::serve(listener, router).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobStore, MemoryMetadataStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn registry() -> Arc<TransferRegistry> {
        Arc::new(TransferRegistry::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_cors_headers_absent_by_default() {
        let router = create_router(registry(), &AppConfig::default());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/receive/ABC")
                    .header("Origin", "http://evil.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_cors_headers_when_permissive() {
        let config = AppConfig {
            permissive_cors: true,
            ..AppConfig::default()
        };
        let router = create_router(registry(), &config);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/receive/ABC")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get("access-control-allow-origin").is_some());
    }

    #[tokio::test]
    async fn test_security_headers() {
        let router = create_router(registry(), &AppConfig::default());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let headers = response.headers();
        assert!(headers.get("content-security-policy").is_some());
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    }

    #[tokio::test]
    async fn test_body_limit_rejection_is_json() {
        let registry = Arc::new(
            TransferRegistry::new(
                Arc::new(MemoryMetadataStore::new()),
                Arc::new(MemoryBlobStore::new()),
            )
            .with_max_upload_size(10),
        );
        let router = create_router(registry, &AppConfig::default());
        let body = vec![0u8; 2 * 1024 * 1024];

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/send")
                    .header("content-type", "multipart/form-data; boundary=x")
                    .header("content-length", body.len())
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Upload exceeds the 10 byte limit");
    }

    #[tokio::test]
    async fn test_static_dir_is_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>drop</h1>").unwrap();
        let config = AppConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..AppConfig::default()
        };
        let router = create_router(registry(), &config);

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<h1>drop</h1>");
    }
}
