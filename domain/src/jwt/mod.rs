//! Session tokens: HS256 JWTs signed with `SESSION_SECRET`.
//!
//! `verify_session_token` guards the status stream and the compute proxy routes.
//! `issue_session_token` exists for tooling and tests; the web app signs its own tokens
//! with the same secret.

use crate::error::{AuthErrorKind, Error};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use service::config::Config;

pub use claims::SessionClaims;

mod claims;

/// Default lifetime of issued session tokens.
pub const SESSION_TTL_HOURS: i64 = 24;

pub fn issue_session_token(
    config: &Config,
    user_id: &str,
    email: Option<&str>,
    ttl: Duration,
) -> Result<String, Error> {
    let secret = session_secret(config)?;
    let now = Utc::now();

    let claims = SessionClaims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Checks signature and expiry and returns the claims.
pub fn verify_session_token(config: &Config, token: &str) -> Result<SessionClaims, Error> {
    let secret = session_secret(config)?;
    if token.is_empty() {
        return Err(Error::auth(AuthErrorKind::MissingToken));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| {
        debug!("Rejected session token: {err}");
        Error::from(err)
    })?;

    Ok(data.claims)
}

fn session_secret(config: &Config) -> Result<String, Error> {
    config.session_secret().ok_or_else(|| {
        warn!("Failed to get session secret from config");
        Error::config()
    })
}
