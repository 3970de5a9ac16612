use crate::{AppState, Error};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::error::{AuthErrorKind, Error as DomainError};
use domain::jwt;
use log::*;

/// Cookie the web app stores its session token in.
pub const SESSION_COOKIE: &str = "session_token";

/// Authentication middleware that returns 401 Unauthorized for requests without a valid
/// session token.
///
/// The token is read from `Authorization: Bearer <token>`, falling back to the
/// `session_token` cookie. On success the verified claims are added to the request
/// extensions for the `AuthenticatedUser` extractor.
pub async fn require_auth(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(request.headers()) else {
        debug!("Rejecting {} without a session token", request.uri().path());
        return Error::from(DomainError::auth(AuthErrorKind::MissingToken)).into_response();
    };

    match jwt::verify_session_token(&app_state.config, &token) {
        Ok(claims) => {
            trace!("Authenticated user {} for {}", claims.sub, request.uri().path());
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => Error::from(err).into_response(),
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
