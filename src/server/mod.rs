use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::settings::Settings;
use crate::storage::SharedStorage;

mod worker;

/// Receive timeout on client sockets; an idle connection is treated as a
/// clean close when it expires.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const LISTEN_BACKLOG: i32 = 5;
const OVERFLOW_RESPONSE: &[u8] = b"SERVER_ERROR too many connections\r\n";

/// State shared between the acceptor, the workers, and the public handle.
///
/// `clients` holds a duplicated handle for every live connection so that
/// `stop` can interrupt blocked reads; the worker owns the primary handle.
/// The condvar signals the registry becoming empty after shutdown began.
struct Shared {
    running: AtomicBool,
    clients: Mutex<HashMap<u64, TcpStream>>,
    drained: Condvar,
    next_id: AtomicU64,
    max_workers: usize,
    storage: SharedStorage,
}

/// Bounded-concurrency blocking TCP server.
///
/// One acceptor thread admits connections up to the worker cap; each
/// admitted connection is serviced end-to-end by a dedicated worker thread.
/// `stop` followed by `join` deterministically drains every worker.
pub struct Server {
    shared: Arc<Shared>,
    listener: TcpListener,
    local_addr: SocketAddr,
    acceptor: Option<JoinHandle<()>>,
}

impl Server {
    /// Binds the listening socket and spawns the acceptor.
    ///
    /// `accept_threads` in the settings is reserved; a single acceptor is
    /// spawned regardless. No signal mask is installed for broken pipes:
    /// the standard library issues socket writes with `MSG_NOSIGNAL`, so a
    /// closed peer surfaces as a write error.
    pub fn start(settings: &Settings, storage: SharedStorage) -> Result<Self> {
        let listener = bind_listener(settings.listen)?;
        let local_addr = listener
            .local_addr()
            .context("querying listener address")?;

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            clients: Mutex::new(HashMap::new()),
            drained: Condvar::new(),
            next_id: AtomicU64::new(0),
            max_workers: settings.workers,
            storage,
        });

        let acceptor = {
            let listener = listener.try_clone().context("cloning listener handle")?;
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("acceptor".to_string())
                .spawn(move || accept_loop(listener, shared))
                .context("spawning acceptor thread")?
        };

        info!(address = %local_addr, workers = settings.workers, "server started");
        Ok(Self {
            shared,
            listener,
            local_addr,
            acceptor: Some(acceptor),
        })
    }

    /// Address the server actually bound, useful when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Initiates shutdown: stops admitting connections and interrupts every
    /// blocked worker read. Safe to call more than once.
    pub fn stop(&self) {
        info!("stopping server");
        self.shared.running.store(false, Ordering::SeqCst);
        // Both directions, so a blocked accept returns immediately.
        if let Err(err) = socket2::SockRef::from(&self.listener).shutdown(Shutdown::Both) {
            debug!(error = %err, "listener shutdown failed");
        }
        let clients = self.shared.clients.lock();
        for (id, handle) in clients.iter() {
            if let Err(err) = handle.shutdown(Shutdown::Read) {
                debug!(id = *id, error = %err, "client read shutdown failed");
            }
        }
    }

    /// Waits for the acceptor to finish and for the last worker to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.acceptor.take()
            && handle.join().is_err()
        {
            warn!("acceptor thread panicked");
        }
        let mut clients = self.shared.clients.lock();
        while !clients.is_empty() {
            self.shared.drained.wait(&mut clients);
        }
        debug!("all workers drained");
    }
}

fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .context("creating listening socket")?;
    socket
        .set_reuse_address(true)
        .context("setting SO_REUSEADDR")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("binding listener on {addr}"))?;
    socket
        .listen(LISTEN_BACKLOG)
        .context("marking socket as listening")?;
    Ok(socket.into())
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while shared.running.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(err) => {
                if shared.running.load(Ordering::SeqCst) {
                    warn!(error = %err, "failed to accept incoming connection");
                    continue;
                }
                break;
            }
        };
        debug!(peer = %peer, "accepted connection");
        if let Err(err) = stream.set_read_timeout(Some(RECV_TIMEOUT)) {
            warn!(peer = %peer, error = %err, "failed to set receive timeout; dropping connection");
            continue;
        }
        if let Err(err) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %err, "failed to set TCP_NODELAY");
        }
        admit(stream, peer, &shared);
    }
    debug!("acceptor stopped");
}

/// Admits the connection under the registry lock, or rejects it with the
/// overflow response when the worker cap is reached. A worker's slot frees
/// the instant it removes itself from the registry.
fn admit(stream: TcpStream, peer: SocketAddr, shared: &Arc<Shared>) {
    let mut clients = shared.clients.lock();
    // Serialized with stop(): a connection that raced the shutdown sweep
    // must not spawn a worker the drain would never interrupt.
    if !shared.running.load(Ordering::SeqCst) {
        debug!(peer = %peer, "server stopping; dropping accepted connection");
        return;
    }
    if clients.len() >= shared.max_workers {
        drop(clients);
        reject(stream, peer);
        return;
    }

    let handle = match stream.try_clone() {
        Ok(handle) => handle,
        Err(err) => {
            drop(clients);
            warn!(peer = %peer, error = %err, "failed to duplicate client handle; dropping connection");
            return;
        }
    };
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    clients.insert(id, handle);
    drop(clients);

    let worker_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("worker-{id}"))
        .spawn(move || {
            let storage = Arc::clone(&worker_shared.storage);
            match worker::run(stream, storage) {
                Ok(()) => debug!(peer = %peer, "connection closed"),
                Err(err) => warn!(peer = %peer, error = %err, "connection closed with error"),
            }
            let mut clients = worker_shared.clients.lock();
            clients.remove(&id);
            if clients.is_empty() && !worker_shared.running.load(Ordering::SeqCst) {
                worker_shared.drained.notify_all();
            }
        });
    if let Err(err) = spawned {
        warn!(peer = %peer, error = %err, "failed to spawn worker thread");
        shared.clients.lock().remove(&id);
    }
}

fn reject(mut stream: TcpStream, peer: SocketAddr) {
    warn!(peer = %peer, "worker limit reached; rejecting connection");
    if let Err(err) = stream.write_all(OVERFLOW_RESPONSE) {
        debug!(peer = %peer, error = %err, "failed to write overflow response");
    }
}
