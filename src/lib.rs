//! fanout - round-robin fan-out reverse proxy
//!
//! Spreads HTTP requests arriving on one endpoint over a fixed list of
//! backends, either by proxying them with bounded per-backend concurrency or
//! by redirecting the client to the chosen backend.

pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod proxy;
pub mod server;
