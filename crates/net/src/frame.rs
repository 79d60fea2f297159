//! Wire frame codec (§4.3, §6.2): `{cookie, flags, size, req, xid}` header
//! followed by `size` bytes of payload, little-endian.
//!
//! Grounded in the original's `rpcinternal.h` frame header and
//! `wire/json/envelope.rs`'s length-prefixed framing approach (read a fixed
//! header, then exactly `size` more bytes) generalized from JSON-over-HTTP
//! framing to a raw binary header, since §6.2 fixes the header shape.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use gaia_core::{Error, Result};
use std::io::{Cursor, Read, Write};

/// Frame header magic (§6.2 "`cookie = 0xbebe`").
pub const COOKIE: u32 = 0xbebe;

/// Byte length of the frame header (5 little-endian `u32`s).
pub const HEADER_LEN: usize = 20;

/// Maximum payload size accepted from a peer, guarding against a corrupt
/// or hostile `size` field driving an unbounded allocation.
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// High 16 bits of `flags`: which registered server dispatch table handles
/// this call (§4.3).
pub fn handler_id(flags: u32) -> u16 {
    (flags >> 16) as u16
}

/// Low 16 bits of `flags`: control flags, opaque to the framing layer.
pub fn control_flags(flags: u32) -> u16 {
    (flags & 0xffff) as u16
}

/// Packs a handler id and control flags into one `flags` word.
pub fn pack_flags(handler_id: u16, control: u16) -> u32 {
    ((handler_id as u32) << 16) | control as u32
}

/// One framed RPC message: header fields plus payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Packed `(handler_id, control_flags)` — see [`handler_id`]/[`control_flags`].
    pub flags: u32,
    /// RPC number within the handler's dispatch table.
    pub req: u32,
    /// Client-assigned id, unique per client, used to demux replies.
    pub xid: u32,
    /// Marshalled request/response body.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame with the given fields.
    pub fn new(flags: u32, req: u32, xid: u32, payload: Vec<u8>) -> Self {
        Frame { flags, req, xid, payload }
    }

    /// Encodes this frame's header + payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() as u64 > MAX_PAYLOAD_LEN as u64 {
            return Err(Error::NoMemory);
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.write_u32::<LittleEndian>(COOKIE)?;
        out.write_u32::<LittleEndian>(self.flags)?;
        out.write_u32::<LittleEndian>(self.payload.len() as u32)?;
        out.write_u32::<LittleEndian>(self.req)?;
        out.write_u32::<LittleEndian>(self.xid)?;
        out.write_all(&self.payload)?;
        Ok(out)
    }

    /// Decodes exactly one frame's header from `bytes` (which must hold at
    /// least [`HEADER_LEN`] bytes), returning the header fields and the
    /// payload length still to be read. Callers (the server/client receive
    /// loops) use this to learn how many more bytes to buffer before
    /// calling [`Frame::decode_body`].
    pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader> {
        let mut cur = Cursor::new(bytes);
        let cookie = cur.read_u32::<LittleEndian>()?;
        if cookie != COOKIE {
            return Err(Error::Serialization(format!("bad frame cookie {cookie:#x}")));
        }
        let flags = cur.read_u32::<LittleEndian>()?;
        let size = cur.read_u32::<LittleEndian>()?;
        if size > MAX_PAYLOAD_LEN {
            return Err(Error::Serialization(format!("frame payload too large: {size}")));
        }
        let req = cur.read_u32::<LittleEndian>()?;
        let xid = cur.read_u32::<LittleEndian>()?;
        Ok(FrameHeader { flags, size, req, xid })
    }

    /// Completes a frame given its header and exactly `header.size` bytes
    /// of payload.
    pub fn decode_body(header: FrameHeader, mut payload_src: impl Read) -> Result<Frame> {
        let mut payload = vec![0u8; header.size as usize];
        payload_src.read_exact(&mut payload)?;
        Ok(Frame { flags: header.flags, req: header.req, xid: header.xid, payload })
    }
}

/// Decoded frame header, before the (possibly not-yet-fully-received)
/// payload.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Packed handler id + control flags.
    pub flags: u32,
    /// Payload length in bytes.
    pub size: u32,
    /// RPC number.
    pub req: u32,
    /// Client-assigned correlation id.
    pub xid: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_frame() {
        let frame = Frame::new(pack_flags(3, 1), 9, 42, b"hello".to_vec());
        let bytes = frame.encode().unwrap();
        let header = Frame::decode_header(&bytes[..HEADER_LEN]).unwrap();
        assert_eq!(header.size, 5);
        assert_eq!(handler_id(header.flags), 3);
        assert_eq!(control_flags(header.flags), 1);
        let decoded = Frame::decode_body(header, &bytes[HEADER_LEN..]).unwrap();
        assert_eq!(decoded.payload, b"hello");
        assert_eq!(decoded.req, 9);
        assert_eq!(decoded.xid, 42);
    }

    #[test]
    fn rejects_bad_cookie() {
        let mut bytes = Frame::new(0, 0, 0, vec![]).encode().unwrap();
        bytes[0] ^= 0xff;
        assert!(Frame::decode_header(&bytes).is_err());
    }

    #[test]
    fn rejects_oversized_payload_len() {
        let mut bytes = vec![0u8; HEADER_LEN];
        (&mut bytes[0..4]).write_u32::<LittleEndian>(COOKIE).unwrap();
        (&mut bytes[8..12]).write_u32::<LittleEndian>(MAX_PAYLOAD_LEN + 1).unwrap();
        assert!(Frame::decode_header(&bytes).is_err());
    }
}
