//! Single-threaded readiness runtime.
//!
//! Building blocks, leaves first:
//! - `LineReader`: per-connection buffered record reader
//! - `Poller`: readiness facility (mio or select)
//! - `ConnectionPool`: fixed-capacity slot table owning the interest set
//! - `Reactor`: the event loop tying them to the echo handler

pub mod buffer;
pub mod connection;
pub mod event_loop;
pub mod listener;
pub mod poller;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{LineReader, Record};
pub use connection::{Connection, ConnectionPool, PoolError, PoolSettings, Slots};
pub use event_loop::{EchoStats, Reactor};
pub use listener::Acceptor;
pub use poller::{InterestSet, MioPoller, Poller, ReadySet, SelectPoller};

use crate::config::{Config, PollerType};
use tracing::info;

/// Bind the configured address and serve with the configured poller.
pub fn run(config: Config) -> std::io::Result<()> {
    let addr = listener::parse_addr(&config.listen)?;
    let listener = listener::bind(addr, config.backlog)?;

    info!(
        addr = %listener.local_addr()?,
        poller = ?config.poller,
        max_connections = config.max_connections,
        max_line = config.max_line,
        "Listening"
    );

    match config.poller {
        PollerType::Mio => Reactor::new(listener, MioPoller::new()?, &config)?.run(),
        PollerType::Select => Reactor::new(listener, SelectPoller::new(), &config)?.run(),
    }
}
