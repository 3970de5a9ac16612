//! Error types for the `domain` layer.
use crate::encryption::EncryptionError;
use sse::error::{Error as RelayError, RelayErrorKind as SseRelayErrorKind};
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field holds the original error. `web` depends on
/// `domain` but never inspects `sse` errors directly; it only sees the kinds below.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Enum representing the various kinds of internal errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Relay(RelayErrorKind),
    Auth(AuthErrorKind),
    Encryption,
    Config,
    Other(String),
}

/// Relay failures reduced to what callers can act on.
#[derive(Debug, PartialEq)]
pub enum RelayErrorKind {
    /// The request named no usable test.
    Invalid,
    /// The pub/sub backend could not be reached.
    Unavailable,
    Other(String),
}

#[derive(Debug, PartialEq)]
pub enum AuthErrorKind {
    MissingToken,
    InvalidToken,
    ExpiredToken,
}

/// Enum representing the various kinds of external errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    Network,
    Other(String),
}

impl Error {
    pub fn new(error_kind: DomainErrorKind) -> Self {
        Error {
            source: None,
            error_kind,
        }
    }

    pub fn config() -> Self {
        Self::new(DomainErrorKind::Internal(InternalErrorKind::Config))
    }

    pub fn auth(kind: AuthErrorKind) -> Self {
        Self::new(DomainErrorKind::Internal(InternalErrorKind::Auth(kind)))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// This is where we translate errors from the `sse` layer to the `domain` layer.
impl From<RelayError> for Error {
    fn from(err: RelayError) -> Self {
        let relay_error_kind = match err.error_kind {
            SseRelayErrorKind::InvalidTestId => RelayErrorKind::Invalid,
            SseRelayErrorKind::Subscribe => RelayErrorKind::Unavailable,
            ref other => RelayErrorKind::Other(other.to_string()),
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Relay(relay_error_kind)),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Errors that result from issues building the reqwest::Client instance. This
        // type of error will occur prior to any network calls being made.
        if err.is_builder() {
            Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                    "Failed to build reqwest client".to_string(),
                )),
            }
        // Errors that result from issues with the network call itself.
        } else {
            Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::External(ExternalErrorKind::Network),
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let auth_error_kind = match err.kind() {
            ErrorKind::ExpiredSignature => AuthErrorKind::ExpiredToken,
            _ => AuthErrorKind::InvalidToken,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Auth(auth_error_kind)),
        }
    }
}

impl From<EncryptionError> for Error {
    fn from(err: EncryptionError) -> Self {
        let error_kind = match err {
            EncryptionError::NoKeyConfigured | EncryptionError::InvalidKey => {
                InternalErrorKind::Config
            }
            _ => InternalErrorKind::Encryption,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(error_kind),
        }
    }
}
