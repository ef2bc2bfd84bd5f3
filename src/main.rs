//! line-reactor: a single-threaded line echo server
//!
//! Features:
//! - Newline-delimited echo over TCP
//! - One thread, one readiness poller (mio or select)
//! - Fixed connection capacity with graceful rejection
//! - Configuration via CLI arguments or TOML file

use line_reactor::config::Config;
use line_reactor::runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        poller = ?config.poller,
        max_connections = config.max_connections,
        max_line = config.max_line,
        "Starting line-reactor server"
    );

    runtime::run(config)?;
    Ok(())
}
