//! Edge-triggered readiness loop: accept, one-shot arm, dispatch a read job
//! to the worker pool, re-arm or close.
//!
//! Grounded on `xjj::Server::edgeTriggerEventFunc`/`addFd`/`resetOneShot`
//! (`src/server.cpp`) and on the accept-loop/slab/`Poll` plumbing of
//! `rask`'s own `Listener` (`src/listener.rs`). Unlike epoll's own
//! `EPOLLONESHOT`, mio's `Poll`/`Registry` never disarms a registration
//! after delivering an event — it only ORs in `EPOLLET`, so a connection
//! stays armed and can report readable again while a worker is still
//! inside [`ConnShared::drain`]. One-shot semantics are therefore emulated
//! explicitly here: [`Reactor::dispatch_read`] deregisters the connection's
//! stream from the poll set *before* handing the read off to a worker, and
//! [`Reactor::rearm`] re-registers it only once that worker's job reports
//! back over the completion channel. Between those two points the fd is
//! not polled at all, so a burst of new data arriving mid-drain cannot
//! produce a second concurrent dispatch for the same connection.
//!
//! The completion channel + `Waker` pair (a worker reports "re-arm" or
//! "close" for a token, then wakes the reactor) is the same pattern
//! `rask`'s `Listener`/`Worker` use to hand control back across the
//! accept/worker thread boundary, swapped here onto this crate's own
//! [`WorkerPool`] instead of a bare `crossbeam_channel` worker loop.

use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use crate::config::Config;
use crate::connection::{ConnShared, DrainOutcome};
use crate::error::ServerError;
use crate::handler::BusinessHandler;
use crate::workerpool::WorkerPool;

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKE_TOKEN: Token = Token(usize::MAX - 1);
const POLL_EVENT_CAPACITY: usize = 1024;

enum Completion {
    Rearm(Token),
    Close(Token),
}

/// A handle that can ask a running [`Reactor`] to stop its poll loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<mio::Waker>,
}

impl ShutdownHandle {
    /// Requests that the reactor's `run` loop return after its current
    /// poll iteration.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

/// The reactor thread's state: the listening socket, the poll registry, and
/// the table of live connections.
pub struct Reactor {
    listener: TcpListener,
    poll: Poll,
    connections: Slab<Arc<ConnShared>>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    waker: Arc<mio::Waker>,
    shutdown_requested: Arc<AtomicBool>,
    max_message_len: u32,
}

impl Reactor {
    /// Binds the listening socket from `config` and registers it
    /// edge-triggered, without one-shot, so it keeps accepting forever.
    pub fn new(config: &Config) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.ip, config.port);
        let socket_addr = addr.parse().map_err(|_| ServerError::Bind {
            addr: addr.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "invalid ip:port"),
        })?;

        let mut listener = TcpListener::bind(socket_addr).map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::Poll)?;

        let waker =
            Arc::new(mio::Waker::new(poll.registry(), WAKE_TOKEN).map_err(ServerError::Poll)?);

        let (completions_tx, completions_rx) = unbounded();

        Ok(Self {
            listener,
            poll,
            connections: Slab::new(),
            completions_tx,
            completions_rx,
            waker,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            max_message_len: config.max_message_len,
        })
    }

    /// A cloneable handle other threads can use to stop [`Reactor::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            requested: self.shutdown_requested.clone(),
            waker: self.waker.clone(),
        }
    }

    /// The local address the listener is bound to. Useful in tests that
    /// bind to port 0 and need to learn the OS-assigned port.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the poll loop until [`ShutdownHandle::request`] is called or an
    /// unrecoverable poll error occurs.
    pub fn run(&mut self, pool: &WorkerPool, handler: BusinessHandler) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(POLL_EVENT_CAPACITY);

        loop {
            self.poll.poll(&mut events, None).map_err(ServerError::Poll)?;

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => {
                        if let Err(e) = self.accept() {
                            warn!("accept loop failed: {e}");
                        }
                    }
                    WAKE_TOKEN => {
                        self.process_completions();
                        if self.shutdown_requested.load(Ordering::SeqCst) {
                            return Ok(());
                        }
                    }
                    token if event.is_readable() => {
                        self.dispatch_read(token, pool, handler.clone());
                    }
                    _ => {}
                }
            }
        }
    }

    fn accept(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let entry = self.connections.vacant_entry();
                    let token = Token(entry.key());

                    if self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                        .is_err()
                    {
                        continue;
                    }

                    debug!("accepted connection {peer} as token {}", token.0);
                    entry.insert(Arc::new(ConnShared::new(token, stream, self.max_message_len)));
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn dispatch_read(&mut self, token: Token, pool: &WorkerPool, handler: BusinessHandler) {
        let Some(conn) = self.connections.get(token.0) else {
            return;
        };
        let conn = conn.clone();

        // Claim the connection for the duration of the drain by removing it
        // from the poll set entirely. mio does not arm `EPOLLONESHOT` on our
        // behalf, so without this a second readable event for the same
        // token could arrive (and get dispatched) while this job is still
        // running, letting two `drain` calls race on the same connection.
        {
            let mut stream = conn.stream.lock().unwrap();
            if self.poll.registry().deregister(&mut *stream).is_err() {
                drop(stream);
                self.close_connection(token);
                return;
            }
        }

        let tx = self.completions_tx.clone();
        let waker = self.waker.clone();

        let job: Box<dyn FnOnce() + Send> = Box::new(move || {
            let completion = match conn.drain(&handler) {
                DrainOutcome::WouldBlock => Completion::Rearm(token),
                DrainOutcome::Close => Completion::Close(token),
            };
            let _ = tx.send(completion);
            let _ = waker.wake();
        });

        if pool.add_task(job, -1).is_err() {
            // Admission control rejected the job. The connection is already
            // deregistered above, so closing rather than re-arming avoids a
            // busy-loop; see the design notes.
            warn!("worker pool rejected job for token {}, closing", token.0);
            self.close_connection(token);
        }
    }

    fn process_completions(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            match completion {
                Completion::Rearm(token) => self.rearm(token),
                Completion::Close(token) => self.close_connection(token),
            }
        }
    }

    fn rearm(&mut self, token: Token) {
        let Some(conn) = self.connections.get(token.0) else {
            return;
        };
        let mut stream = conn.stream.lock().unwrap();
        // The connection was deregistered in `dispatch_read` before the
        // worker ran, not merely left armed, so re-adding it is a fresh
        // `register`, not a `reregister`.
        if self
            .poll
            .registry()
            .register(&mut *stream, token, Interest::READABLE)
            .is_err()
        {
            drop(stream);
            self.close_connection(token);
        }
    }

    fn close_connection(&mut self, token: Token) {
        if self.connections.contains(token.0) {
            let conn = self.connections.remove(token.0);
            let mut stream = conn.stream.lock().unwrap();
            // Already deregistered by `dispatch_read` on every normal path;
            // this is a best-effort cleanup for any future caller that
            // reaches a still-registered connection.
            let _ = self.poll.registry().deregister(&mut *stream);
            debug!("closed connection, token {}", token.0);
        }
    }
}
