//! Byte-stream to message-stream converter using a 4-byte little-endian
//! length prefix.
//!
//! Grounded on `xjj::Server::PacketProcessor` (`include/server.hpp` /
//! `src/server.cpp`): `generatePacket`/`getPacketLen`/`cutPacketStream`
//! become [`FramingState::ingest`], [`FramingState::learn_length`] and
//! [`FramingState::cut`] below. Two deliberate departures from the source,
//! both called out in the design notes:
//!
//! - the state is kept per-connection rather than constructed fresh for
//!   every worker dispatch, so a message whose tail arrives after a
//!   re-arm isn't lost;
//! - `learn_length` accumulates into `len_buf` for *any* short read, not
//!   just a read that follows an already-partial prefix — the source's
//!   version assumes the very first read of a message carries at least 4
//!   bytes, which a sufficiently chopped-up stream (e.g. a 2-byte then a
//!   2-byte write) violates.

use crate::error::ProtocolError;

/// Size of the scratch buffer each `recv` fills. Matches the source's
/// `BUFFER_SIZE` exactly for fidelity — a production deployment would use
/// something in the 4–64 KiB range instead; this is kept small and named so
/// it's trivially tunable.
pub const READ_BUF_LEN: usize = 20;

/// Per-connection length-prefix framing state machine.
pub struct FramingState {
    read_buf: [u8; READ_BUF_LEN],
    body: Vec<u8>,
    len: Option<u32>,
    len_buf: Vec<u8>,
    max_message_len: u32,
}

impl FramingState {
    /// Builds an empty framing state that rejects messages longer than
    /// `max_message_len`.
    pub fn new(max_message_len: u32) -> Self {
        Self {
            read_buf: [0; READ_BUF_LEN],
            body: Vec::new(),
            len: None,
            len_buf: Vec::new(),
            max_message_len,
        }
    }

    /// The scratch buffer a caller should `recv` into before calling
    /// [`FramingState::ingest`].
    pub fn read_buf_mut(&mut self) -> &mut [u8; READ_BUF_LEN] {
        &mut self.read_buf
    }

    /// Feeds `n` freshly-read bytes from [`FramingState::read_buf_mut`]
    /// through the state machine, returning every message completed as a
    /// result (zero, one, or several if more than one message landed in
    /// this read).
    pub fn ingest(&mut self, n: usize) -> Result<Vec<Vec<u8>>, ProtocolError> {
        if self.len.is_none() {
            self.learn_length(n)?;
        } else {
            self.body.extend_from_slice(&self.read_buf[..n]);
        }

        let mut messages = Vec::new();
        while let Some(len) = self.len {
            let len = len as usize;
            if self.body.len() < len {
                break;
            }

            messages.push(self.body[..len].to_vec());
            self.cut()?;
        }

        Ok(messages)
    }

    fn learn_length(&mut self, n: usize) -> Result<(), ProtocolError> {
        let needed = 4 - self.len_buf.len();

        if n < needed {
            self.len_buf.extend_from_slice(&self.read_buf[..n]);
            return Ok(());
        }

        self.len_buf.extend_from_slice(&self.read_buf[..needed]);
        let len = decode_length(&self.len_buf, self.max_message_len)?;
        self.len_buf.clear();
        self.len = Some(len);
        self.body.extend_from_slice(&self.read_buf[needed..n]);
        Ok(())
    }

    fn cut(&mut self) -> Result<(), ProtocolError> {
        let len = self.len.expect("cut called with no current message length") as usize;
        let diff = self.body.len() - len;

        if diff >= 4 {
            let new_len = decode_length(&self.body[len..len + 4], self.max_message_len)?;
            self.body = self.body[len + 4..].to_vec();
            self.len = Some(new_len);
        } else {
            if diff > 0 {
                self.len_buf = self.body[len..].to_vec();
            }
            self.body.clear();
            self.len = None;
        }

        Ok(())
    }
}

fn decode_length(bytes: &[u8], max_message_len: u32) -> Result<u32, ProtocolError> {
    let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if raw < 0 {
        return Err(ProtocolError::NegativeLength(raw));
    }
    let len = raw as u32;
    if len > max_message_len {
        return Err(ProtocolError::TooLarge {
            got: len,
            max: max_message_len,
        });
    }
    Ok(len)
}

/// Encodes `len` as the wire's 4-byte little-endian length prefix.
pub fn encode_length(len: u32) -> [u8; 4] {
    len.to_le_bytes()
}
