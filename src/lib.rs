//! line-reactor: a single-threaded line echo server.
//!
//! One listening socket and any number of short-lived sessions are
//! multiplexed over a single readiness poller:
//! - `runtime`: line reader, connection pool, pollers and the reactor loop
//! - `protocols`: the line echo handler
//! - `config`: CLI and TOML configuration

pub mod config;
pub mod protocols;
pub mod runtime;
