//! Top-level wiring: configuration in, a running request/response server
//! out.
//!
//! Grounded on `xjj::Server`'s constructor/`run` pair (`include/server.hpp`
//! / `src/server.cpp`), which owns the listening socket, the epoll
//! instance, and the thread pool. The database pool is deliberately not
//! owned here: the source builds its `MySQLConnectionPool` singleton
//! independently of the server object and hands connections to business
//! code through free functions, so a caller here builds its own
//! `Arc<DbPool>` and captures it into the handler closure instead.

use std::thread;

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::BusinessHandler;
use crate::reactor::{Reactor, ShutdownHandle};
use crate::workerpool::WorkerPool;

/// A bound, not-yet-running server: a worker pool and a reactor wired
/// together, waiting for [`Server::run`].
pub struct Server {
    pool: WorkerPool,
    reactor: Reactor,
    handler: BusinessHandler,
}

impl Server {
    /// Binds the listening socket from `config` and builds the worker pool
    /// `config` describes. `handler` is invoked once per reassembled
    /// message, on whichever worker thread drains the connection.
    pub fn new(config: &Config, handler: BusinessHandler) -> Result<Self, ServerError> {
        let mut pool = WorkerPool::new(config.thread_pool_size, config.thread_pool_overload);
        pool.start()
            .expect("a freshly constructed pool is never already running");

        let reactor = Reactor::new(config)?;

        Ok(Self {
            pool,
            reactor,
            handler,
        })
    }

    /// The address the server is actually listening on. Differs from the
    /// configured port when the config asked for port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.reactor.local_addr()
    }

    /// A handle that can be used from another thread to stop [`Server::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.reactor.shutdown_handle()
    }

    /// Runs the reactor loop on the calling thread until shutdown is
    /// requested or an unrecoverable poll error occurs, then drains the
    /// worker pool before returning.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let result = self.reactor.run(&self.pool, self.handler.clone());
        self.pool.terminate(true);
        result
    }

    /// Spawns [`Server::run`] on a background thread, returning its
    /// [`JoinHandle`](thread::JoinHandle) alongside a shutdown handle.
    ///
    /// Useful for tests and embedders that want the server driven
    /// off-thread rather than blocking the caller.
    pub fn spawn(mut self) -> (thread::JoinHandle<Result<(), ServerError>>, ShutdownHandle) {
        let shutdown = self.shutdown_handle();
        let join = thread::spawn(move || self.run());
        (join, shutdown)
    }
}
