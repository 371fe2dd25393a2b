//! Accept loop and connection lifecycle.
//!
//! The acceptor owns the listening socket and the worker pool.
//! Accepted sockets become pool tasks running the blocking connection
//! driver; admission control closes sockets beyond the configured
//! connection ceiling. Live and finished connection ids share one
//! mutex, taken only for registry bookkeeping, never across a blocking
//! call.

use crate::config::Config;
use crate::connection;
use crate::metrics::{
    CONNECTIONS_ACCEPTED, CONNECTIONS_ACTIVE, CONNECTIONS_REJECTED,
};
use crate::pool::ThreadPool;
use kiln_cache::ThreadSafeCache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause between accept attempts when the listener has nothing ready.
const ACCEPT_RETRY: Duration = Duration::from_millis(50);

/// Connection ids currently being served, plus the ones whose task has
/// finished since the acceptor last looked.
#[derive(Default)]
struct Registry {
    live: HashSet<u64>,
    finished: Vec<u64>,
}

struct Inner {
    running: AtomicBool,
    cache: ThreadSafeCache,
    pool: ThreadPool,
    workers: Mutex<Registry>,
    max_connections: usize,
    read_timeout: Duration,
}

/// The cache server: an accept thread feeding a worker pool.
///
/// # Example
///
/// ```no_run
/// use kiln_cache::ThreadSafeCache;
/// use kiln_server::{Config, Server};
///
/// let config = Config::default();
/// let cache = ThreadSafeCache::new(config.cache.max_bytes);
/// let server = Server::start(&config, cache).unwrap();
/// // ... serve traffic ...
/// server.stop();
/// ```
pub struct Server {
    inner: Arc<Inner>,
    local_addr: SocketAddr,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Bind the listener and start accepting.
    ///
    /// Bind, listen, or socket-setup failures abort startup and are
    /// returned to the caller.
    pub fn start(config: &Config, cache: ThreadSafeCache) -> io::Result<Server> {
        let listener = TcpListener::bind(config.listener.address)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let pool = ThreadPool::new(
            config.low_watermark(),
            config.pool.high_watermark,
            config.pool.max_queue,
            config.idle_timeout(),
        );

        let inner = Arc::new(Inner {
            running: AtomicBool::new(true),
            cache,
            pool,
            workers: Mutex::new(Registry::default()),
            max_connections: config.limits.max_connections,
            read_timeout: config.read_timeout(),
        });

        info!(address = %local_addr, "listening");

        let accept_thread = {
            let inner = inner.clone();
            thread::Builder::new()
                .name("acceptor".to_string())
                .spawn(move || accept_loop(&inner, &listener))
                .expect("failed to spawn acceptor thread")
        };

        Ok(Server {
            inner,
            local_addr,
            accept_thread: Mutex::new(Some(accept_thread)),
        })
    }

    /// The bound listen address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight requests finish, and join every
    /// thread. Safe to call repeatedly; later calls are no-ops.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("stopping server");

        // Connections observe the cleared flag at their next read or
        // timeout; the pool stop waits for them.
        self.inner.pool.stop(true);

        if let Some(handle) = self.accept_thread.lock().take() {
            let _ = handle.join();
        }
        info!("server stopped");
    }

    /// Connections currently being served.
    pub fn live_connections(&self) -> usize {
        self.inner.workers.lock().live.len()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(inner: &Arc<Inner>, listener: &TcpListener) {
    let mut next_id: u64 = 0;

    while inner.running.load(Ordering::Acquire) {
        drain_finished(inner);

        match listener.accept() {
            Ok((stream, peer)) => {
                CONNECTIONS_ACCEPTED.increment();
                let id = next_id;
                next_id += 1;

                let admitted = {
                    let mut registry = inner.workers.lock();
                    if registry.live.len() < inner.max_connections {
                        registry.live.insert(id);
                        true
                    } else {
                        false
                    }
                };
                if !admitted {
                    CONNECTIONS_REJECTED.increment();
                    warn!(%peer, "connection limit reached, closing socket");
                    continue;
                }

                if let Err(e) = stream.set_read_timeout(Some(inner.read_timeout)) {
                    error!(%peer, error = %e, "failed to configure client socket");
                    inner.workers.lock().live.remove(&id);
                    continue;
                }
                let _ = stream.set_nodelay(true);

                CONNECTIONS_ACTIVE.increment();
                debug!(%peer, id, "accepted connection");

                let task = {
                    let inner = inner.clone();
                    move || {
                        connection::serve(stream, peer, &inner.cache, &inner.running);
                        CONNECTIONS_ACTIVE.decrement();
                        inner.workers.lock().finished.push(id);
                    }
                };
                if !inner.pool.submit(task) {
                    // The task was dropped, closing the socket.
                    CONNECTIONS_ACTIVE.decrement();
                    CONNECTIONS_REJECTED.increment();
                    inner.workers.lock().live.remove(&id);
                    warn!(%peer, "worker pool refused connection");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_RETRY);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                if inner.running.load(Ordering::Acquire) {
                    error!(error = %e, "accept failed");
                }
                break;
            }
        }
    }

    drain_finished(inner);
    debug!("acceptor stopped");
}

/// Forget connections whose task has completed.
fn drain_finished(inner: &Inner) {
    let mut registry = inner.workers.lock();
    let Registry { live, finished } = &mut *registry;
    for id in finished.drain(..) {
        live.remove(&id);
    }
}

/// Run a server until `shutdown` is observed, then stop it.
pub fn run(
    config: &Config,
    cache: ThreadSafeCache,
    shutdown: Arc<AtomicBool>,
) -> io::Result<()> {
    let server = Server::start(config, cache)?;
    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }
    server.stop();
    Ok(())
}
