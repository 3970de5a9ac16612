//! Error types for the `sse` crate.
//!
//! Follows the same pattern as `domain::error`: a root `Error` struct holding an
//! optional source and an `error_kind` enum describing what went wrong.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: RelayErrorKind,
}

/// The kinds of failures a relay session can run into.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayErrorKind {
    /// The test identifier was empty.
    InvalidTestId,
    /// Opening the dedicated connection or subscribing to the channel failed.
    Subscribe,
    /// The backend ended the subscription stream while the session was streaming.
    SubscriptionLost,
    /// No message arrived within the configured idle window.
    IdleTimeout,
    /// Writing to the client stream failed.
    Transport,
    /// A teardown step failed. Always logged and swallowed by the session.
    Cleanup(CleanupStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    Unsubscribe,
    Close,
}

impl Error {
    pub fn new(error_kind: RelayErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
        }
    }

    pub fn with_source<E>(error_kind: RelayErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }
}

impl fmt::Display for RelayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RelayErrorKind::InvalidTestId => write!(f, "test id must not be empty"),
            RelayErrorKind::Subscribe => write!(f, "failed to subscribe to status channel"),
            RelayErrorKind::SubscriptionLost => write!(f, "status subscription was lost"),
            RelayErrorKind::IdleTimeout => write!(f, "idle timeout"),
            RelayErrorKind::Transport => write!(f, "client stream closed"),
            RelayErrorKind::Cleanup(CleanupStep::Unsubscribe) => {
                write!(f, "failed to unsubscribe from status channel")
            }
            RelayErrorKind::Cleanup(CleanupStep::Close) => {
                write!(f, "failed to close subscription connection")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.error_kind, source),
            None => write!(f, "{}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::with_source(RelayErrorKind::Subscribe, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_source_message() {
        let err = Error::with_source(RelayErrorKind::Subscribe, "connection refused");
        assert_eq!(
            err.to_string(),
            "failed to subscribe to status channel: connection refused"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn display_without_source_is_just_the_kind() {
        let err = Error::new(RelayErrorKind::Cleanup(CleanupStep::Close));
        assert_eq!(err.to_string(), "failed to close subscription connection");
    }
}
