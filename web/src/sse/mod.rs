//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the status stream. The relay itself
//! (`Manager`, relay sessions, frames) lives in the `sse` crate.

pub mod handler;
