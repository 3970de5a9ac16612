use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use domain::error::{
    AuthErrorKind, DomainErrorKind, Error as DomainError, ExternalErrorKind, InternalErrorKind,
    RelayErrorKind,
};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(DomainError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl Error {
    pub(crate) fn status_code(&self) -> StatusCode {
        match &self.0.error_kind {
            DomainErrorKind::Internal(internal_error_kind) => match internal_error_kind {
                InternalErrorKind::Relay(relay_error_kind) => match relay_error_kind {
                    RelayErrorKind::Invalid => StatusCode::BAD_REQUEST,
                    RelayErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    RelayErrorKind::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
                },
                InternalErrorKind::Auth(_) => StatusCode::UNAUTHORIZED,
                InternalErrorKind::Encryption
                | InternalErrorKind::Config
                | InternalErrorKind::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            DomainErrorKind::External(external_error_kind) => match external_error_kind {
                ExternalErrorKind::Network => StatusCode::BAD_GATEWAY,
                ExternalErrorKind::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Responding {status}: {}", self.0);
        }

        let message = match &self.0.error_kind {
            DomainErrorKind::Internal(InternalErrorKind::Auth(AuthErrorKind::ExpiredToken)) => {
                "Session expired".to_string()
            }
            DomainErrorKind::Internal(InternalErrorKind::Auth(_)) => "Unauthorized".to_string(),
            _ => status
                .canonical_reason()
                .unwrap_or("Error")
                .to_uppercase(),
        };

        (status, message).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sse::error::{Error as RelayError, RelayErrorKind as SseRelayErrorKind};

    fn status_of(kind: DomainErrorKind) -> StatusCode {
        Error(DomainError::new(kind)).into_response().status()
    }

    #[test]
    fn relay_errors_map_to_client_and_server_statuses() {
        let invalid: Error = RelayError::new(SseRelayErrorKind::InvalidTestId).into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let subscribe: Error = RelayError::new(SseRelayErrorKind::Subscribe).into();
        assert_eq!(
            subscribe.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        for kind in [
            AuthErrorKind::MissingToken,
            AuthErrorKind::InvalidToken,
            AuthErrorKind::ExpiredToken,
        ] {
            assert_eq!(
                status_of(DomainErrorKind::Internal(InternalErrorKind::Auth(kind))),
                StatusCode::UNAUTHORIZED
            );
        }
    }

    #[test]
    fn unreachable_upstream_is_bad_gateway() {
        assert_eq!(
            status_of(DomainErrorKind::External(ExternalErrorKind::Network)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(DomainErrorKind::Internal(InternalErrorKind::Config)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
