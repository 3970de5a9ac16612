use super::{MessageStream, PubSubBackend, Subscription};
use crate::error::{CleanupStep, Error, RelayErrorKind};
use ::redis::aio::{PubSubSink, PubSubStream};
use async_trait::async_trait;
use futures::StreamExt;
use log::*;

/// Redis-backed pub/sub. Every `connect` opens a fresh pub/sub connection.
#[derive(Clone)]
pub struct RedisBackend {
    client: ::redis::Client,
}

impl RedisBackend {
    /// Validates the URL. No connection is made until a session calls `connect`.
    pub fn new(redis_url: &str) -> Result<Self, Error> {
        let client = ::redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PubSubBackend for RedisBackend {
    async fn connect(&self) -> Result<Box<dyn Subscription>, Error> {
        let pubsub = self.client.get_async_pubsub().await?;
        let (sink, stream) = pubsub.split();

        Ok(Box::new(RedisSubscription {
            sink: Some(sink),
            stream: Some(stream),
        }))
    }
}

/// The two halves of one Redis pub/sub connection. The connection is released once
/// both halves are dropped.
struct RedisSubscription {
    sink: Option<PubSubSink>,
    stream: Option<PubSubStream>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn psubscribe(&mut self, pattern: &str) -> Result<MessageStream, Error> {
        let sink = self.sink.as_mut().ok_or_else(|| {
            Error::with_source(RelayErrorKind::Subscribe, "connection already closed")
        })?;
        let stream = self.stream.take().ok_or_else(|| {
            Error::with_source(RelayErrorKind::Subscribe, "connection already subscribed")
        })?;

        sink.psubscribe(pattern).await?;
        debug!("Redis psubscribe {pattern}");

        // SSE is a text format; a non UTF-8 payload is forwarded lossily.
        Ok(stream
            .map(|msg| String::from_utf8_lossy(msg.get_payload_bytes()).into_owned())
            .boxed())
    }

    async fn punsubscribe(&mut self, pattern: &str) -> Result<(), Error> {
        match self.sink.as_mut() {
            Some(sink) => sink.punsubscribe(pattern).await.map_err(|err| {
                Error::with_source(
                    RelayErrorKind::Cleanup(CleanupStep::Unsubscribe),
                    err,
                )
            }),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.sink.take();
        self.stream.take();
        Ok(())
    }
}
