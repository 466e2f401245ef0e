//! Length-prefixed packet framing.
//!
//! A packet on the wire is `VarInt(length) || payload[length]`, where VarInt
//! is the 7-bits-per-byte, continuation-bit-terminated little-endian encoding
//! capped at 5 bytes (32-bit value space). The decoder is a pure function
//! over an accumulated buffer: it emits complete frames, retains the
//! incomplete tail for the next read, and never blocks. Hostile inputs
//! (overlong VarInts, out-of-bounds declared lengths, a client that streams
//! bytes without ever completing a frame) are rejected so the connection
//! can be closed.

use std::fmt;

/// Upper bound on a declared frame length. Handshake and login packets are
/// tiny; anything near this is a hostile or confused client.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Upper bound on buffered-but-undecoded bytes per connection.
pub const MAX_BUFFERED: usize = 2 * MAX_FRAME_LEN;

#[derive(Debug)]
pub enum ProtocolError {
    Malformed(String),
    /// Declared length was negative or exceeded `MAX_FRAME_LEN`.
    Oversized(i64),
    /// The connection buffered more undecoded bytes than allowed.
    BufferLimit(usize),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(msg) => write!(f, "malformed packet: {msg}"),
            ProtocolError::Oversized(len) => write!(f, "declared length {len} out of bounds"),
            ProtocolError::BufferLimit(n) => write!(f, "buffered {n} undecoded bytes"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Append a VarInt encoding of `value`.
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut remaining = value as u32;
    loop {
        let byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Decode a VarInt from the front of `buf`.
///
/// `Ok(None)` means the buffer ends mid-VarInt and more bytes are needed;
/// `Ok(Some((value, width)))` is the decoded value and its encoded width.
pub fn read_varint(buf: &[u8]) -> Result<Option<(i32, usize)>, ProtocolError> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate().take(5) {
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if i == 4 && byte & 0xf0 != 0 {
                return Err(ProtocolError::Malformed("VarInt exceeds 32 bits".into()));
            }
            return Ok(Some((value as i32, i + 1)));
        }
    }
    if buf.len() >= 5 {
        return Err(ProtocolError::Malformed("VarInt longer than 5 bytes".into()));
    }
    Ok(None)
}

/// Restartable frame decoder over an arbitrarily fragmented byte source.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes, enforcing the undecoded-buffer cap.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if self.buf.len() + bytes.len() > MAX_BUFFERED {
            return Err(ProtocolError::BufferLimit(self.buf.len() + bytes.len()));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Pop the next complete frame payload, retaining any incomplete tail.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let (length, width) = match read_varint(&self.buf)? {
            Some(header) => header,
            None => return Ok(None),
        };
        if length < 0 || length as usize > MAX_FRAME_LEN {
            return Err(ProtocolError::Oversized(i64::from(length)));
        }
        let total = width + length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let frame = self.buf[width..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(frame))
    }
}
