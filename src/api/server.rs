use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, latest_rollup, method_not_allowed, AppState};
use crate::consumer::LatestCache;
use crate::shutdown::Shutdown;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    // CORS stays off /rollups so OPTIONS there falls through to 405
    let health = Router::new().route("/health", get(health_check)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET])
            .allow_headers(Any),
    );

    Router::new()
        .merge(health)
        // Latest rollup, GET only; `get` alone would also answer HEAD
        .route("/rollups", get(latest_rollup).head(method_not_allowed))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the query endpoint until shutdown
pub async fn run_server(
    config: ServerConfig,
    cache: Arc<LatestCache>,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = config.bind.parse()?;
    let listener = TcpListener::bind(addr).await?;
    serve(listener, cache, shutdown).await
}

/// Serve on an already bound listener until shutdown
pub async fn serve(
    listener: TcpListener,
    cache: Arc<LatestCache>,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(Arc::new(AppState { cache }));
    tracing::info!("Starting the HTTP server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::LatestRollup;
    use crate::rollup::Rollup;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, Arc<LatestCache>) {
        let cache = Arc::new(LatestCache::new());
        let state = Arc::new(AppState {
            cache: Arc::clone(&cache),
        });
        (build_router(state), cache)
    }

    fn consumed(payload: &str) -> LatestRollup {
        LatestRollup {
            rollup: Rollup::decode(payload.as_bytes()).unwrap(),
            payload: payload.as_bytes().to_vec(),
            offset: 0,
            received_at: chrono::Utc::now(),
        }
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _cache) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rollups_not_found_before_consume() {
        let (app, _cache) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/rollups")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_rollups_returns_consumed_payload() {
        let (app, cache) = create_test_app();
        let payload = r#"{"metadata":{"window-duration":"5m0s","rollup-ts":1700000000,"uptime":"10s"},"data":{"push":5}}"#;
        cache.replace(consumed(payload));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/rollups")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(body_bytes(response).await, payload.as_bytes());
    }

    #[tokio::test]
    async fn test_rollups_rejects_other_methods() {
        let (app, _cache) = create_test_app();

        for method in ["POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri("/rollups")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
            assert!(body_bytes(response).await.is_empty(), "{}", method);
        }
    }

    #[tokio::test]
    async fn test_rollups_rejects_head_and_preflight_with_cached_value() {
        let (app, cache) = create_test_app();
        cache.replace(consumed(
            r#"{"metadata":{"window-duration":"5m0s","rollup-ts":1,"uptime":"0s"},"data":{"push":5}}"#,
        ));

        let head = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri("/rollups")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(head.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(head.headers().get("allow").unwrap(), "GET");

        let preflight = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/rollups")
                    .header("origin", "https://dashboard.example.com")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(preflight.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(body_bytes(preflight).await.is_empty());
    }

    #[tokio::test]
    async fn test_health_allows_cross_origin_reads() {
        let (app, _cache) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://dashboard.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (trigger, shutdown) = crate::shutdown::channel();
        let server = tokio::spawn(serve(listener, Arc::new(LatestCache::new()), shutdown));

        trigger.trigger();
        server.await.unwrap().unwrap();
    }
}
