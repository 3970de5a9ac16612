use crate::error::{Error, RelayErrorKind};
use std::fmt;

/// Prefix shared by every per-test status channel on the pub/sub backend.
pub const STATUS_CHANNEL_PREFIX: &str = "test_status:";

/// Name of the pub/sub topic carrying status updates for a single test run.
///
/// The name is derived from the test id and never persisted. Because the relay
/// pattern-subscribes, a test id containing glob characters (`*`, `?`) matches
/// every parameterized sub-channel the publisher writes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusChannel {
    test_id: String,
    name: String,
}

impl StatusChannel {
    pub fn for_test(test_id: &str) -> Result<Self, Error> {
        if test_id.trim().is_empty() {
            return Err(Error::new(RelayErrorKind::InvalidTestId));
        }

        Ok(Self {
            test_id: test_id.to_string(),
            name: format!("{STATUS_CHANNEL_PREFIX}{test_id}"),
        })
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// The channel name, also used as the subscription pattern.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StatusChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}
