use crate::{
    controller::{compute_controller, health_check_controller},
    middleware::auth::require_auth,
    sse, AppState,
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "PromptOps Status Relay API"
        ),
        paths(
            health_check_controller::health_check,
            sse::handler::status_stream,
            compute_controller::start_test,
            compute_controller::test_status,
            compute_controller::test_results,
            compute_controller::abort_test,
            compute_controller::stop_test,
            compute_controller::calculate_scores,
            compute_controller::check_applicability,
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "promptops_relay", description = "Live test status and compute service proxy")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// Session tokens are accepted either as a bearer token or in the `session_token` cookie.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
            components.add_security_scheme(
                "cookie_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "session_token",
                    "Session JWT issued by the web app at sign in",
                ))),
            );
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(status_stream_routes(app_state.clone()))
        .merge(project_routes(app_state.clone()))
        .merge(test_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn status_stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/status-stream/:test_id",
            get(sse::handler::status_stream),
        )
        .route_layer(from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state)
}

fn project_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/projects/:project_id/test",
            post(compute_controller::start_test),
        )
        .route("/projects/stop", post(compute_controller::stop_test))
        .route(
            "/projects/calculate-scores",
            post(compute_controller::calculate_scores),
        )
        .route(
            "/projects/check-applicability",
            post(compute_controller::check_applicability),
        )
        .route_layer(from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state)
}

fn test_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/tests/:test_id/status", get(compute_controller::test_status))
        .route("/tests/:test_id/results", get(compute_controller::test_results))
        .route("/tests/:test_id/abort", post(compute_controller::abort_test))
        .route_layer(from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state)
}
