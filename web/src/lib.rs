//! HTTP surface of the status relay: the status stream, the compute service proxy and
//! a health check, behind session-token authentication.

use axum::http::{header, HeaderValue, Method};
use log::*;
use service::config::Config;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub use error::{Error, Result};
pub use service::AppState;

mod controller;
mod error;
mod extractors;
mod middleware;
pub mod router;
mod sse;

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let listen_addr = format!("{interface}:{}", app_state.config.port);

    info!(
        "Server starting... listening for connections on http://{listen_addr} ({} environment)",
        app_state.config.runtime_env()
    );

    let cors_layer = cors_layer(&app_state.config);
    let listener = TcpListener::bind(&listen_addr).await?;

    axum::serve(
        listener,
        router::define_routes(app_state).layer(cors_layer),
    )
    .await
}

/// Credentialed CORS for the configured web app origins. Origins that are not valid
/// header values are skipped with a warning.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring invalid CORS origin {origin:?}: {err}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CACHE_CONTROL,
            header::CONTENT_TYPE,
        ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ::sse::pubsub::memory::MemoryBroker;
    use ::sse::Manager;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(origins: &[&str]) -> axum::Router {
        let mut config = Config::default();
        config.allowed_origins = origins.iter().map(|o| o.to_string()).collect();
        let manager = Arc::new(Manager::new(
            Arc::new(MemoryBroker::new()),
            config.relay_settings(),
        ));
        let layer = cors_layer(&config);
        router::define_routes(AppState::new(config, &manager)).layer(layer)
    }

    #[tokio::test]
    async fn configured_origin_is_allowed_with_credentials() {
        let response = app(&["http://localhost:3000"])
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers["access-control-allow-origin"],
            "http://localhost:3000"
        );
        assert_eq!(headers["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn other_origins_get_no_cors_headers() {
        let response = app(&["http://localhost:3000", "not a valid\norigin"])
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }
}
