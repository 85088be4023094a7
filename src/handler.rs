//! Value types exposed to the business handler, and per-connection write
//! serialization.
//!
//! Grounded on `xjj::Server::Request`/`xjj::Server::Response`
//! (`include/server.hpp` / `src/server.cpp`). The source keys a
//! process-wide `unordered_map<int, shared_ptr<Mutex>>` by raw socket fd;
//! here the write lock lives directly on the connection's shared state
//! (see [`crate::connection::ConnShared`]), reached through the `Response`'s
//! `Arc` clone, which sidesteps the source's documented accept/teardown
//! race on that map.

use std::io::{self, Write};
use std::str::{self, Utf8Error};
use std::sync::Arc;

use crate::connection::ConnShared;
use crate::framing::encode_length;

/// A single complete, reassembled message body handed to the business
/// handler.
#[derive(Debug, Clone)]
pub struct Request {
    body: Vec<u8>,
}

impl Request {
    pub(crate) fn new(body: Vec<u8>) -> Self {
        Self { body }
    }

    /// The message body as received, with no interpretation applied.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The message body interpreted as UTF-8 text, for handlers that expect
    /// a JSON or other text payload.
    pub fn body_str(&self) -> Result<&str, Utf8Error> {
        str::from_utf8(&self.body)
    }
}

/// A handle for writing a length-prefixed reply back on the connection a
/// [`Request`] arrived on.
pub struct Response {
    conn: Arc<ConnShared>,
}

impl Response {
    pub(crate) fn new(conn: Arc<ConnShared>) -> Self {
        Self { conn }
    }

    /// Prepends a 4-byte little-endian length prefix to `body` and writes
    /// the whole frame, retrying on partial writes until it is fully sent
    /// or an unrecoverable I/O error occurs.
    ///
    /// The write is serialized against any other `send` on the same
    /// connection by the connection's shared stream lock, so two replies
    /// can never interleave on the wire.
    pub fn send(&self, body: &[u8]) -> io::Result<()> {
        assert!(
            u32::try_from(body.len()).is_ok(),
            "response body of {} bytes exceeds u32::MAX",
            body.len()
        );

        let mut packet = Vec::with_capacity(4 + body.len());
        packet.extend_from_slice(&encode_length(body.len() as u32));
        packet.extend_from_slice(body);

        let mut stream = self.conn.stream.lock().unwrap();
        write_all_retrying(&mut *stream, &packet)
    }
}

fn write_all_retrying(stream: &mut impl Write, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole response frame",
                ))
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// A user-supplied business handler invoked once per reassembled message.
pub type BusinessHandler = Arc<dyn Fn(&Request, Response) + Send + Sync>;
