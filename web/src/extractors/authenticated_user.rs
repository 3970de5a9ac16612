use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use domain::jwt::SessionClaims;

/// The signed-in user, as established by `require_auth`.
pub(crate) struct AuthenticatedUser(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    // `require_auth` stores the verified claims in the request extensions. A handler
    // mounted without that layer gets a 401 rather than an anonymous user.
    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<SessionClaims>() {
            Some(claims) => Ok(AuthenticatedUser(claims.clone())),
            None => Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string())),
        }
    }
}
