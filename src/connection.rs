//! Per-connection shared state: the socket itself and its framing state
//! machine, reachable from both the reactor thread (accept/rearm/close)
//! and whichever worker thread currently owns the connection's one-shot
//! read turn.
//!
//! Grounded on `xjj::Server::PacketProcessor` owning its buffer and on the
//! per-fd write mutex the source's `Response` class keys off of
//! (`include/server.hpp`). Both the read-side framing state and the
//! write-side socket access live behind the *same* lock here: one-shot
//! arming already guarantees a connection's read side is never touched by
//! two threads at once, so a single `Mutex<TcpStream>` — locked briefly per
//! `recv`/`send` call, never held across a handler invocation — gives the
//! write serialization the source implements with a second, separate map.

use std::io::Read;
use std::sync::{Arc, Mutex};

use mio::net::TcpStream;
use mio::Token;

use crate::error::ProtocolError;
use crate::framing::FramingState;
use crate::handler::{BusinessHandler, Request, Response};

/// Outcome of draining everything currently readable on a connection.
pub enum DrainOutcome {
    /// `recv` returned `WouldBlock`; re-arm the one-shot registration.
    WouldBlock,
    /// The peer closed the connection, a read failed, or a protocol
    /// violation was detected. The connection should be closed.
    Close,
}

/// Shared per-connection state, reached through an `Arc` by both the
/// reactor thread and whichever worker currently holds the read turn.
pub struct ConnShared {
    pub(crate) token: Token,
    pub(crate) stream: Mutex<TcpStream>,
    framing: Mutex<FramingState>,
}

impl ConnShared {
    pub(crate) fn new(token: Token, stream: TcpStream, max_message_len: u32) -> Self {
        Self {
            token,
            stream: Mutex::new(stream),
            framing: Mutex::new(FramingState::new(max_message_len)),
        }
    }

    /// Drains every byte currently readable on the connection, invoking
    /// `handler` once per reassembled message, until the kernel reports
    /// `WouldBlock` or the connection needs to close.
    pub(crate) fn drain(self: &Arc<Self>, handler: &BusinessHandler) -> DrainOutcome {
        loop {
            let read_result = {
                let mut stream = self.stream.lock().unwrap();
                let mut framing = self.framing.lock().unwrap();
                let buf = framing.read_buf_mut();
                stream.read(buf)
            };

            let n = match read_result {
                Ok(0) => return DrainOutcome::Close,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return DrainOutcome::WouldBlock,
                Err(_) => return DrainOutcome::Close,
            };

            let messages = {
                let mut framing = self.framing.lock().unwrap();
                framing.ingest(n)
            };

            let messages = match messages {
                Ok(messages) => messages,
                Err(ProtocolError::NegativeLength(_)) | Err(ProtocolError::TooLarge { .. }) => {
                    return DrainOutcome::Close
                }
            };

            for body in messages {
                let request = Request::new(body);
                let response = Response::new(self.clone());
                (handler)(&request, response);
            }
        }
    }
}
