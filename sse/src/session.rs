use crate::channel::StatusChannel;
use crate::connection::{ConnectionId, RelayState};
use crate::error::{Error, RelayErrorKind};
use crate::message::RelayFrame;
use crate::pubsub::{MessageStream, PubSubBackend, Subscription};
use futures::StreamExt;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// One client's relay: a dedicated subscription to one status channel, forwarded into
/// that client's output channel until the client leaves or the subscription fails.
///
/// The session wakes on exactly two things while streaming: a message on its channel,
/// or the client going away (the output receiver dropped, or the abort token fired).
pub(crate) struct RelaySession {
    id: ConnectionId,
    channel: StatusChannel,
    backend: Arc<dyn PubSubBackend>,
    subscription: Option<Box<dyn Subscription>>,
    messages: Option<MessageStream>,
    subscribed: bool,
    state: RelayState,
    idle_timeout: Option<Duration>,
}

impl RelaySession {
    pub(crate) fn new(
        id: ConnectionId,
        channel: StatusChannel,
        backend: Arc<dyn PubSubBackend>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            channel,
            backend,
            subscription: None,
            messages: None,
            subscribed: false,
            state: RelayState::Created,
            idle_timeout,
        }
    }

    pub(crate) fn state(&self) -> RelayState {
        self.state
    }

    /// Drives the session to a terminal state. Dropping `output` on return closes the
    /// client stream, which is always the last teardown step.
    pub(crate) async fn run(
        mut self,
        output: Sender<RelayFrame>,
        abort: CancellationToken,
    ) -> RelayState {
        match self.establish(&output, &abort).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    "[relay-{}] Client left before {} was subscribed",
                    self.id, self.channel
                );
                self.shutdown(RelayState::ClosedByClient).await;
                return self.state;
            }
            Err(err) => {
                error!("[relay-{}] Subscribe to {} failed: {err}", self.id, self.channel);
                self.fail(&output, &abort, err).await;
                return self.state;
            }
        }

        self.state = RelayState::Streaming;
        info!("[relay-{}] Streaming {}", self.id, self.channel);

        match self.forward(&output, &abort).await {
            Ok(()) => self.shutdown(RelayState::ClosedByClient).await,
            Err(err) => {
                warn!("[relay-{}] Relay for {} ended: {err}", self.id, self.channel);
                self.fail(&output, &abort, err).await;
            }
        }

        self.state
    }

    /// Opens the dedicated connection and subscribes. `Ok(false)` means the client
    /// went away first.
    async fn establish(
        &mut self,
        output: &Sender<RelayFrame>,
        abort: &CancellationToken,
    ) -> Result<bool, Error> {
        let backend = Arc::clone(&self.backend);
        let connection = tokio::select! {
            biased;
            _ = abort.cancelled() => return Ok(false),
            _ = output.closed() => return Ok(false),
            connection = backend.connect() => connection?,
        };

        // Owned by the session from here on, so every exit path releases it.
        let pattern = self.channel.name().to_string();
        let subscription = self.subscription.insert(connection);

        let messages = tokio::select! {
            biased;
            _ = abort.cancelled() => return Ok(false),
            _ = output.closed() => return Ok(false),
            messages = subscription.psubscribe(&pattern) => messages?,
        };

        self.subscribed = true;
        self.messages = Some(messages);
        Ok(true)
    }

    /// Forwards messages in arrival order. `Ok(())` means the client went away.
    async fn forward(
        &mut self,
        output: &Sender<RelayFrame>,
        abort: &CancellationToken,
    ) -> Result<(), Error> {
        let messages = self
            .messages
            .as_mut()
            .ok_or_else(|| Error::new(RelayErrorKind::SubscriptionLost))?;

        loop {
            tokio::select! {
                biased;
                _ = abort.cancelled() => return Ok(()),
                _ = output.closed() => return Ok(()),
                next = messages.next() => match next {
                    Some(body) => {
                        trace!("[relay-{}] {} -> {body}", self.id, self.channel);
                        if let Err(err) = send_frame(output, abort, RelayFrame::Status(body)).await {
                            debug!("[relay-{}] {err}, treating as disconnect", self.id);
                            return Ok(());
                        }
                    }
                    None => return Err(Error::new(RelayErrorKind::SubscriptionLost)),
                },
                _ = idle_expiry(self.idle_timeout) => {
                    return Err(Error::new(RelayErrorKind::IdleTimeout));
                }
            }
        }
    }

    /// Signals the error to the client, then tears down.
    async fn fail(&mut self, output: &Sender<RelayFrame>, abort: &CancellationToken, err: Error) {
        let frame = RelayFrame::Error(err.error_kind.to_string());
        if send_frame(output, abort, frame).await.is_err() {
            debug!("[relay-{}] Client gone before error could be sent", self.id);
        }
        self.shutdown(RelayState::ClosedByError).await;
    }

    /// Unsubscribes, then releases the connection. Each step is attempted even if the
    /// previous one failed. Runs at most once; later calls are no-ops.
    pub(crate) async fn shutdown(&mut self, terminal: RelayState) {
        if self.state.is_closed() {
            return;
        }
        self.state = terminal;

        if let Some(mut subscription) = self.subscription.take() {
            if self.subscribed {
                self.subscribed = false;
                if let Err(err) = subscription.punsubscribe(self.channel.name()).await {
                    warn!("[relay-{}] {err}", self.id);
                }
            }

            self.messages = None;
            if let Err(err) = subscription.close().await {
                warn!("[relay-{}] {err}", self.id);
            }
        }

        info!(
            "[relay-{}] Relay for {} closed ({:?})",
            self.id, self.channel, self.state
        );
    }
}

async fn send_frame(
    output: &Sender<RelayFrame>,
    abort: &CancellationToken,
    frame: RelayFrame,
) -> Result<(), Error> {
    tokio::select! {
        biased;
        _ = abort.cancelled() => Err(Error::new(RelayErrorKind::Transport)),
        sent = output.send(frame) => sent.map_err(|_| Error::new(RelayErrorKind::Transport)),
    }
}

async fn idle_expiry(idle_timeout: Option<Duration>) {
    match idle_timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::memory::{BrokerStats, Failures, MemoryBroker};
    use tokio::sync::mpsc;

    fn session(broker: &MemoryBroker, test_id: &str) -> RelaySession {
        RelaySession::new(
            ConnectionId::new(),
            StatusChannel::for_test(test_id).unwrap(),
            Arc::new(broker.clone()),
            None,
        )
    }

    async fn wait_for_subscribers(broker: &MemoryBroker, expected: usize) {
        for _ in 0..1_000 {
            if broker.active_subscriptions() == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {expected} active subscriptions");
    }

    #[tokio::test]
    async fn shutdown_twice_cleans_up_once() {
        let broker = MemoryBroker::new();
        let mut session = session(&broker, "t1");
        let (output, _frames) = mpsc::channel(4);
        assert!(session
            .establish(&output, &CancellationToken::new())
            .await
            .unwrap());

        session.shutdown(RelayState::ClosedByClient).await;
        session.shutdown(RelayState::ClosedByError).await;

        assert_eq!(session.state(), RelayState::ClosedByClient);
        assert_eq!(
            broker.stats(),
            BrokerStats {
                connects: 1,
                subscribes: 1,
                unsubscribes: 1,
                closes: 1,
            }
        );
        assert_eq!(broker.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn shutdown_before_connect_touches_nothing() {
        let broker = MemoryBroker::new();
        let mut session = session(&broker, "t1");

        session.shutdown(RelayState::ClosedByClient).await;

        assert_eq!(session.state(), RelayState::ClosedByClient);
        assert_eq!(broker.stats(), BrokerStats::default());
    }

    #[tokio::test]
    async fn cleanup_continues_when_steps_fail() {
        let broker = MemoryBroker::new();
        let mut session = session(&broker, "t1");
        let (output, _frames) = mpsc::channel(4);
        session
            .establish(&output, &CancellationToken::new())
            .await
            .unwrap();
        broker.fail_on(Failures {
            unsubscribe: true,
            close: true,
            ..Failures::default()
        });

        session.shutdown(RelayState::ClosedByClient).await;

        let stats = broker.stats();
        assert_eq!(stats.unsubscribes, 1);
        assert_eq!(stats.closes, 1);
        assert_eq!(session.state(), RelayState::ClosedByClient);
    }

    #[tokio::test]
    async fn dropped_output_is_treated_as_client_disconnect() {
        let broker = MemoryBroker::new();
        let (output, frames) = mpsc::channel(4);
        let task = tokio::spawn(session(&broker, "t1").run(output, CancellationToken::new()));
        wait_for_subscribers(&broker, 1).await;

        drop(frames);

        assert_eq!(task.await.unwrap(), RelayState::ClosedByClient);
        assert_eq!(broker.stats().closes, 1);
        assert_eq!(broker.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn lost_subscription_ends_with_error_frame() {
        let broker = MemoryBroker::new();
        let (output, mut frames) = mpsc::channel(4);
        let task = tokio::spawn(session(&broker, "t1").run(output, CancellationToken::new()));
        wait_for_subscribers(&broker, 1).await;

        broker.drop_subscriptions();

        assert_eq!(task.await.unwrap(), RelayState::ClosedByError);
        assert_eq!(
            frames.recv().await,
            Some(RelayFrame::Error("status subscription was lost".to_string()))
        );
        assert_eq!(frames.recv().await, None);
        assert_eq!(broker.stats().closes, 1);
    }
}
