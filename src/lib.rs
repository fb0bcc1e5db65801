pub mod cli;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod settings;
pub mod storage;

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

use crate::server::Server;
use crate::settings::Settings;
use crate::storage::LruStore;

/// Starts the cache server and blocks until a shutdown signal arrives, then
/// drains every in-flight connection before returning.
pub fn run(settings: Settings) -> Result<()> {
    let storage = storage::shared(LruStore::new(settings.max_size));
    let mut server = Server::start(&settings, storage)?;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("installing shutdown signal handler")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "shutdown signal received");
    }

    server.stop();
    server.join();
    info!("server stopped");
    Ok(())
}
