use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET liveness of the relay service
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "API router is up and responding to requests", body = String),
        (status = 500, description = "Internal Server Error")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}

#[cfg(test)]
mod tests {
    use crate::router::define_routes;
    use crate::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use service::config::Config;
    use sse::pubsub::memory::MemoryBroker;
    use sse::Manager;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_needs_no_session() {
        let config = Config::default();
        let manager = Arc::new(Manager::new(
            Arc::new(MemoryBroker::new()),
            config.relay_settings(),
        ));
        let response = define_routes(AppState::new(config, &manager))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"healthy");
    }
}
