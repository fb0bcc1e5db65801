use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::Result;

use cachewire::cli::LogFormat;
use cachewire::server::Server;
use cachewire::settings::Settings;
use cachewire::storage::{self, LruStore};

use super::client::CacheClient;

/// A real server on an ephemeral port, torn down with a full stop/join
/// drain.
pub struct ServerHarness {
    pub addr: SocketAddr,
    server: Server,
}

impl ServerHarness {
    pub fn start(workers: usize, max_size: usize) -> Result<Self> {
        let settings = Settings {
            listen: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
            accept_threads: 1,
            workers,
            max_size,
            log: LogFormat::Text,
        };
        settings.validate()?;
        let storage = storage::shared(LruStore::new(settings.max_size));
        let server = Server::start(&settings, storage)?;
        let addr = server.local_addr();
        Ok(Self { addr, server })
    }

    pub fn connect(&self) -> Result<CacheClient> {
        CacheClient::connect(self.addr)
    }

    pub fn stop(&self) {
        self.server.stop();
    }

    pub fn shutdown(mut self) {
        self.server.stop();
        self.server.join();
    }
}
