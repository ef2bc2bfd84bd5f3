//! Protocol implementations.
//!
//! Each protocol is a synchronous handler invoked by the reactor once per
//! readiness event on a connection.
//!
//! - `echo`: newline-delimited echo, one record per event

pub mod echo;
