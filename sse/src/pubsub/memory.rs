//! In-process pub/sub broker for tests.
//!
//! Mirrors the Redis semantics the relay relies on: pattern subscriptions with glob
//! matching, per-subscriber delivery order, and `publish` returning the number of
//! receivers. Call counters and failure switches let tests observe and break each
//! step of a session's lifecycle.

use super::{MessageStream, PubSubBackend, Subscription};
use crate::error::{CleanupStep, Error, RelayErrorKind};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Which backend calls should fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct Failures {
    pub connect: bool,
    pub subscribe: bool,
    pub unsubscribe: bool,
    pub close: bool,
}

/// Number of times each backend call was made.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    pub connects: usize,
    pub subscribes: usize,
    pub unsubscribes: usize,
    pub closes: usize,
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    closes: AtomicUsize,
}

struct Subscriber {
    id: u64,
    pattern: String,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    subscribers: Vec<Subscriber>,
    failures: Failures,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    counters: Arc<Counters>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, failures: Failures) {
        self.state().failures = failures;
    }

    /// Delivers `payload` to every subscription whose pattern matches `channel`.
    /// Returns the number of subscriptions that received it.
    pub fn publish(&self, channel: &str, payload: impl Into<String>) -> usize {
        let payload = payload.into();
        let state = self.state();
        state
            .subscribers
            .iter()
            .filter(|s| glob_match(s.pattern.as_bytes(), channel.as_bytes()))
            .filter(|s| s.sender.send(payload.clone()).is_ok())
            .count()
    }

    /// Drops every live subscription, ending their message streams.
    pub fn drop_subscriptions(&self) {
        self.state().subscribers.clear();
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state().subscribers.len()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            connects: self.counters.connects.load(Ordering::SeqCst),
            subscribes: self.counters.subscribes.load(Ordering::SeqCst),
            unsubscribes: self.counters.unsubscribes.load(Ordering::SeqCst),
            closes: self.counters.closes.load(Ordering::SeqCst),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) {
        self.state().subscribers.retain(|s| s.id != id);
    }
}

#[async_trait]
impl PubSubBackend for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Subscription>, Error> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        let id = {
            let mut state = self.state();
            if state.failures.connect {
                return Err(Error::with_source(
                    RelayErrorKind::Subscribe,
                    "simulated connection refused",
                ));
            }
            state.next_id += 1;
            state.next_id
        };

        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            id,
            subscribed: false,
            closed: false,
        }))
    }
}

struct MemorySubscription {
    broker: MemoryBroker,
    id: u64,
    subscribed: bool,
    closed: bool,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn psubscribe(&mut self, pattern: &str) -> Result<MessageStream, Error> {
        self.broker.counters.subscribes.fetch_add(1, Ordering::SeqCst);

        if self.closed || self.subscribed {
            return Err(Error::with_source(
                RelayErrorKind::Subscribe,
                "connection cannot take another subscription",
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut state = self.broker.state();
            if state.failures.subscribe {
                return Err(Error::with_source(
                    RelayErrorKind::Subscribe,
                    "simulated backend outage",
                ));
            }
            state.subscribers.push(Subscriber {
                id: self.id,
                pattern: pattern.to_string(),
                sender,
            });
        }
        self.subscribed = true;

        Ok(futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|message| (message, receiver))
        })
        .boxed())
    }

    async fn punsubscribe(&mut self, _pattern: &str) -> Result<(), Error> {
        self.broker
            .counters
            .unsubscribes
            .fetch_add(1, Ordering::SeqCst);

        if self.broker.state().failures.unsubscribe {
            return Err(Error::with_source(
                RelayErrorKind::Cleanup(CleanupStep::Unsubscribe),
                "simulated unsubscribe failure",
            ));
        }

        self.broker.remove(self.id);
        self.subscribed = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.broker.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.broker.remove(self.id);

        if self.broker.state().failures.close {
            return Err(Error::with_source(
                RelayErrorKind::Cleanup(CleanupStep::Close),
                "simulated close failure",
            ));
        }
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.broker.remove(self.id);
    }
}

/// Redis-style glob matching: `*` matches any run, `?` one byte, `\` escapes.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(b'?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some(b'\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            }
            Some(&c) if c != b'\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
