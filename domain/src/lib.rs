//! Domain layer of the status relay: the error tree shared by the web layer, session
//! token verification, API-key encryption and the compute service gateway.
//!
//! The relay itself lives in the `sse` crate; its errors are translated here so that
//! `web` only ever deals with `domain::error::Error`.

pub mod encryption;
pub mod error;
pub mod gateway;
pub mod jwt;
