//! Packet payload reading and writing.
//!
//! A frame payload starts with a VarInt packet id followed by the packet's
//! fields. `PacketReader` is a cursor over one decoded frame; the write
//! helpers assemble a full frame (length prefix included) ready to send.

use crate::codec::{ProtocolError, read_varint, write_varint};

pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Self { buf: frame, pos: 0 }
    }

    pub fn read_varint(&mut self) -> Result<i32, ProtocolError> {
        match read_varint(&self.buf[self.pos..])? {
            Some((value, width)) => {
                self.pos += width;
                Ok(value)
            }
            None => Err(ProtocolError::Malformed("truncated VarInt field".into())),
        }
    }

    /// Length-prefixed UTF-8 string, rejecting lengths beyond `max_chars`.
    pub fn read_string(&mut self, max_chars: usize) -> Result<String, ProtocolError> {
        let length = self.read_varint()?;
        if length < 0 || length as usize > max_chars * 4 {
            return Err(ProtocolError::Malformed(format!(
                "string length {length} out of bounds"
            )));
        }
        let length = length as usize;
        let end = self.pos + length;
        if end > self.buf.len() {
            return Err(ProtocolError::Malformed("truncated string field".into()));
        }
        let text = std::str::from_utf8(&self.buf[self.pos..end])
            .map_err(|_| ProtocolError::Malformed("string is not UTF-8".into()))?;
        if text.chars().count() > max_chars {
            return Err(ProtocolError::Malformed(format!(
                "string exceeds {max_chars} characters"
            )));
        }
        self.pos = end;
        Ok(text.to_string())
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let end = self.pos + 2;
        if end > self.buf.len() {
            return Err(ProtocolError::Malformed("truncated u16 field".into()));
        }
        let value = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos = end;
        Ok(value)
    }

    /// Everything left in the frame (the status ping's 8-byte nonce).
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

pub fn write_string(buf: &mut Vec<u8>, text: &str) {
    write_varint(buf, text.len() as i32);
    buf.extend_from_slice(text.as_bytes());
}

/// Assemble a complete frame: `VarInt(len) || VarInt(packet_id) || payload`.
pub fn write_frame(packet_id: i32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 5);
    write_varint(&mut body, packet_id);
    body.extend_from_slice(payload);

    let mut frame = Vec::with_capacity(body.len() + 5);
    write_varint(&mut frame, body.len() as i32);
    frame.extend_from_slice(&body);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_walks_handshake_fields() {
        let mut payload = Vec::new();
        write_varint(&mut payload, 767);
        write_string(&mut payload, "skyblock.play.example.net");
        payload.extend_from_slice(&25565u16.to_be_bytes());
        write_varint(&mut payload, 2);

        let mut reader = PacketReader::new(&payload);
        assert_eq!(reader.read_varint().unwrap(), 767);
        assert_eq!(reader.read_string(255).unwrap(), "skyblock.play.example.net");
        assert_eq!(reader.read_u16().unwrap(), 25565);
        assert_eq!(reader.read_varint().unwrap(), 2);
        assert!(reader.remaining().is_empty());
    }

    #[test]
    fn truncated_string_is_malformed() {
        let mut payload = Vec::new();
        write_varint(&mut payload, 20);
        payload.extend_from_slice(b"short");
        let mut reader = PacketReader::new(&payload);
        assert!(reader.read_string(255).is_err());
    }

    #[test]
    fn oversized_string_is_malformed() {
        let mut payload = Vec::new();
        write_string(&mut payload, &"x".repeat(40));
        let mut reader = PacketReader::new(&payload);
        assert!(reader.read_string(16).is_err());
    }

    #[test]
    fn frame_wraps_id_and_payload() {
        let frame = write_frame(0x01, &[1, 2, 3, 4, 5, 6, 7, 8]);
        // length 9 (1-byte id + 8-byte payload), id 0x01
        assert_eq!(frame[0], 9);
        assert_eq!(frame[1], 0x01);
        assert_eq!(&frame[2..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
