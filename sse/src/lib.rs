//! Server-Sent Events (SSE) status relay for test runs.
//!
//! This crate bridges a pub/sub status channel to a per-client event stream. The
//! external compute service publishes JSON status updates for a test on
//! `test_status:<test_id>`; each client watching that test gets its own relay session
//! that forwards those messages, untouched and in order, as SSE `status` events.
//!
//! # Architecture
//!
//! - **One connection per session**: every relay session opens its own pub/sub
//!   connection. Connections are never pooled or shared, so concurrent tests never
//!   see each other's messages and teardown never affects another client.
//! - **Opaque forwarding**: the relay never parses message bodies. `StatusEvent` exists
//!   for publishers and consumers of the channel, not for the relay.
//! - **Deterministic teardown**: when the client leaves, the session unsubscribes,
//!   releases its connection and closes the output stream, in that order, each step
//!   attempted even if an earlier one failed.
//! - **No retry**: a failed subscription ends the stream with an `error` event. Clients
//!   reconnect by opening a new stream.
//!
//! # Message Flow
//!
//! 1. Client requests `/status-stream/{test_id}`
//! 2. `Manager::open_relay` queues a ping and spawns a `RelaySession`
//! 3. The session connects and pattern-subscribes to the test's channel
//! 4. Each published message becomes a `RelayFrame::Status`, framed as
//!    `event: status` / `data: <body>` by the web layer
//! 5. Client disconnect drops the `RelayHandle`, which fires the session's abort signal
//!
//! # Modules
//!
//! - `channel`: `StatusChannel` naming
//! - `connection`: `ConnectionId` and the `RelayState` lifecycle
//! - `manager`: `Manager`, `RelaySettings` and the client-side `RelayHandle`
//! - `message`: `RelayFrame` and the typed `StatusEvent` payload
//! - `pubsub`: backend seam with the Redis implementation (and `memory` under `mock`)

pub mod channel;
pub mod connection;
pub mod error;
pub mod manager;
pub mod message;
pub mod pubsub;
mod session;

pub use manager::{Manager, RelayHandle, RelaySettings};
