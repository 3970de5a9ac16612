use std::fmt;

/// Unique identifier for a relay session (server-generated), used to correlate log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a relay session.
///
/// `Created -> Streaming -> {ClosedByClient, ClosedByError}`. A client that goes away
/// before the subscription is up moves straight from `Created` to `ClosedByClient`.
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Created,
    Streaming,
    ClosedByClient,
    ClosedByError,
}

impl RelayState {
    pub fn is_closed(self) -> bool {
        matches!(self, RelayState::ClosedByClient | RelayState::ClosedByError)
    }
}
