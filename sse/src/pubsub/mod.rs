//! The seam between a relay session and the pub/sub backend.
//!
//! A backend hands out one dedicated [`Subscription`] per [`PubSubBackend::connect`]
//! call. Connections are never pooled or shared between sessions: two sessions on the
//! same channel get two independent connections.

use crate::error::Error;
use async_trait::async_trait;
use futures::stream::BoxStream;

#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod redis;

/// Raw message bodies received on a subscription, in delivery order.
///
/// The stream ends when the backend drops the subscription.
pub type MessageStream = BoxStream<'static, String>;

#[async_trait]
pub trait PubSubBackend: Send + Sync {
    /// Opens a new connection owned exclusively by the caller.
    async fn connect(&self) -> Result<Box<dyn Subscription>, Error>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Pattern-subscribes and returns the stream of matching message bodies.
    /// A connection supports a single subscription.
    async fn psubscribe(&mut self, pattern: &str) -> Result<MessageStream, Error>;

    async fn punsubscribe(&mut self, pattern: &str) -> Result<(), Error>;

    /// Releases the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), Error>;
}
