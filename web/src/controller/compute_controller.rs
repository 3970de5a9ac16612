//! Authenticated pass-through routes to the compute service.
//!
//! Handlers only pick the upstream endpoint; the request body and content type are
//! forwarded verbatim and the upstream answer is returned as is.

use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{AppState, Error};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use domain::gateway::compute::{ComputeClient, ComputeEndpoint, ProxyRequest};
use log::*;

/// POST start a test run for a project
#[utoipa::path(
    post,
    path = "/projects/{project_id}/test",
    params(("project_id" = String, Path, description = "Project to test")),
    request_body(content = String, description = "Test run form, forwarded to the compute service unchanged"),
    responses(
        (status = 200, description = "Compute service accepted the run and returned its test id"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Compute service unreachable")
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn start_test(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    info!("User {} starting a test run for project {project_id}", user.sub);
    proxy(&app_state, ComputeEndpoint::ProcessCombined, &headers, body).await
}

/// GET the current status of a test run
#[utoipa::path(
    get,
    path = "/tests/{test_id}/status",
    params(("test_id" = String, Path, description = "Test run")),
    responses(
        (status = 200, description = "Latest status snapshot"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown test run"),
        (status = 502, description = "Compute service unreachable")
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn test_status(
    AuthenticatedUser(_user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Response, Error> {
    debug!("GET status of test {test_id}");
    let endpoint = ComputeEndpoint::TaskStatus { test_id };
    proxy(&app_state, endpoint, &HeaderMap::new(), Bytes::new()).await
}

/// GET the results of a finished test run
#[utoipa::path(
    get,
    path = "/tests/{test_id}/results",
    params(("test_id" = String, Path, description = "Test run")),
    responses(
        (status = 200, description = "Test results"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Compute service unreachable")
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn test_results(
    AuthenticatedUser(_user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Response, Error> {
    debug!("GET results of test {test_id}");
    let endpoint = ComputeEndpoint::TaskResults { test_id };
    proxy(&app_state, endpoint, &HeaderMap::new(), Bytes::new()).await
}

/// POST abort a running test
#[utoipa::path(
    post,
    path = "/tests/{test_id}/abort",
    params(("test_id" = String, Path, description = "Test run")),
    responses(
        (status = 200, description = "Abort requested"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Compute service unreachable")
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn abort_test(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Response, Error> {
    info!("User {} aborting test {test_id}", user.sub);
    let endpoint = ComputeEndpoint::AbortTest { test_id };
    proxy(&app_state, endpoint, &HeaderMap::new(), Bytes::new()).await
}

/// POST stop the tests of a project
#[utoipa::path(
    post,
    path = "/projects/stop",
    request_body(content = String, description = "Forwarded unchanged"),
    responses(
        (status = 200, description = "Stop requested"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Compute service unreachable")
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn stop_test(
    AuthenticatedUser(user): AuthenticatedUser,
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    info!("User {} stopping tests", user.sub);
    proxy(&app_state, ComputeEndpoint::StopTest, &headers, body).await
}

/// POST calculate scores for finished test results
#[utoipa::path(
    post,
    path = "/projects/calculate-scores",
    request_body(content = String, description = "Forwarded unchanged"),
    responses(
        (status = 200, description = "Scores"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Compute service unreachable")
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn calculate_scores(
    AuthenticatedUser(_user): AuthenticatedUser,
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    proxy(&app_state, ComputeEndpoint::CalculateScores, &headers, body).await
}

/// POST check which metrics apply to a project
#[utoipa::path(
    post,
    path = "/projects/check-applicability",
    request_body(content = String, description = "Forwarded unchanged"),
    responses(
        (status = 200, description = "Applicability report"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Compute service unreachable")
    ),
    security(("bearer_auth" = []), ("cookie_auth" = []))
)]
pub async fn check_applicability(
    AuthenticatedUser(_user): AuthenticatedUser,
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    proxy(&app_state, ComputeEndpoint::Applicability, &headers, body).await
}

async fn proxy(
    app_state: &AppState,
    endpoint: ComputeEndpoint,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, Error> {
    let client = ComputeClient::new(&app_state.config)?;
    let request = ProxyRequest {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    };

    let upstream = client.forward(&endpoint, request).await?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, upstream.body).into_response();
    match upstream
        .content_type
        .and_then(|content_type| content_type.parse().ok())
    {
        Some(value) => response.headers_mut().insert(header::CONTENT_TYPE, value),
        None => response.headers_mut().remove(header::CONTENT_TYPE),
    };
    Ok(response)
}
