use crate::channel::StatusChannel;
use crate::connection::{ConnectionId, RelayState};
use crate::error::{Error, RelayErrorKind};
use crate::message::RelayFrame;
use crate::pubsub::PubSubBackend;
use crate::session::RelaySession;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tunables applied to every relay session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaySettings {
    /// Frames buffered per session before a slow client pushes back on its relay.
    pub buffer_size: usize,
    /// Close a session that has seen no message for this long. `None` keeps it open
    /// until the client leaves.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            idle_timeout: None,
        }
    }
}

/// Opens relay sessions against a pub/sub backend.
///
/// Holds no per-session state: each call to `open_relay` spawns an independent session
/// with its own backend connection.
pub struct Manager {
    backend: Arc<dyn PubSubBackend>,
    settings: RelaySettings,
}

impl Manager {
    pub fn new(backend: Arc<dyn PubSubBackend>, settings: RelaySettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> RelaySettings {
        self.settings
    }

    /// Starts relaying the status channel of `test_id`.
    ///
    /// The returned handle yields a `Ping` first, before the backend has even been
    /// contacted, then one `Status` frame per message in arrival order. A failed
    /// subscription yields a final `Error` frame. Must be called within a tokio runtime.
    pub fn open_relay(&self, test_id: &str) -> Result<RelayHandle, Error> {
        let channel = StatusChannel::for_test(test_id)?;
        let id = ConnectionId::new();

        let (output, frames) = mpsc::channel(self.settings.buffer_size.max(1));
        output
            .try_send(RelayFrame::Ping)
            .map_err(|_| Error::new(RelayErrorKind::Transport))?;

        info!("[relay-{id}] Opening relay for {channel}");

        let abort = CancellationToken::new();
        let session = RelaySession::new(
            id.clone(),
            channel,
            Arc::clone(&self.backend),
            self.settings.idle_timeout,
        );
        let task = tokio::spawn(session.run(output, abort.clone()));

        Ok(RelayHandle {
            id,
            frames,
            abort,
            task: Some(task),
        })
    }
}

/// The client side of one relay session.
///
/// Dropping the handle is a client disconnect: the session unsubscribes, releases its
/// connection and stops.
pub struct RelayHandle {
    id: ConnectionId,
    frames: mpsc::Receiver<RelayFrame>,
    abort: CancellationToken,
    task: Option<JoinHandle<RelayState>>,
}

impl RelayHandle {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Next frame, or `None` once the session has closed the stream.
    pub async fn recv(&mut self) -> Option<RelayFrame> {
        self.frames.recv().await
    }

    /// Signals a client disconnect. Safe to call any number of times.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Waits for the session to reach its terminal state. Returns `None` if it was
    /// already awaited.
    pub async fn finished(&mut self) -> Option<RelayState> {
        let task = self.task.take()?;
        match task.await {
            Ok(state) => Some(state),
            Err(err) => {
                error!("[relay-{}] Relay task failed: {err}", self.id);
                None
            }
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.abort.cancel();
    }
}
