use std::io::{Cursor, Read};

use bytes::{BufMut, BytesMut};

use super::coding::OpCode;
use crate::error::{Error, ProtocolError, Result};

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const MASK_BIT: u8 = 0x80;

/// A struct representing a WebSocket frame header.
///
/// The payload length is not part of the header value: it is returned next to it by
/// [`FrameHeader::parse`] and passed to [`FrameHeader::format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Indicates that the frame is the last one of a possibly fragmented message.
    pub is_final: bool,
    /// WebSocket protocol opcode.
    pub opcode: OpCode,
    /// A frame mask, if any.
    pub mask: Option<[u8; 4]>,
}

impl Default for FrameHeader {
    fn default() -> Self {
        FrameHeader {
            is_final: true,
            opcode: OpCode::Close,
            mask: None,
        }
    }
}

impl FrameHeader {
    /// > The longest possible header is 14 bytes, which would represent a message sent from
    /// > the client to the server with a payload greater than 64KB.
    pub(crate) const MAX_SIZE: usize = 14;

    /// Creates a final, unmasked header for the given opcode.
    pub fn new(opcode: OpCode) -> Self {
        FrameHeader {
            opcode,
            ..FrameHeader::default()
        }
    }

    /// Parses a header from the bytes at the cursor position.
    ///
    /// Returns `Ok(None)` and leaves the cursor untouched when the buffer does not hold the
    /// complete header yet. On success the cursor is advanced past the header (including the
    /// mask key) and the payload length is returned along with the header.
    pub fn parse(cursor: &mut Cursor<impl AsRef<[u8]>>) -> Result<Option<(Self, u64)>> {
        let initial = cursor.position();
        match Self::parse_internal(cursor) {
            ret @ Ok(None) => {
                cursor.set_position(initial);
                ret
            }
            ret => ret,
        }
    }

    /// Get the size of the header formatted with given payload length.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self, length: u64) -> usize {
        2 + LengthFormat::for_length(length).extra_bytes() + if self.mask.is_some() { 4 } else { 0 }
    }

    /// Appends the header to `dst`, in wire format.
    pub fn format(&self, length: u64, dst: &mut BytesMut) {
        // Only the low nibble is the opcode; anything above would set the reserved bits.
        let code = u8::from(self.opcode) & 0x0F;
        let one = code | if self.is_final { FIN_BIT } else { 0 };

        let lenfmt = LengthFormat::for_length(length);
        let two = lenfmt.length_byte() | if self.mask.is_some() { MASK_BIT } else { 0 };

        dst.reserve(self.len(length));
        dst.put_slice(&[one, two]);
        match lenfmt {
            LengthFormat::U8(_) => (),
            LengthFormat::U16 => dst.put_u16(length as u16),
            LengthFormat::U64 => dst.put_u64(length),
        }

        if let Some(ref mask) = self.mask {
            dst.put_slice(mask);
        }
    }

    fn parse_internal(cursor: &mut impl Read) -> Result<Option<(Self, u64)>> {
        let (first, second) = {
            let mut head = [0u8; 2];
            if read_up_to(cursor, &mut head)? != 2 {
                return Ok(None);
            }
            (head[0], head[1])
        };

        log::trace!("Parsed headers {first:#010b} {second:#010b}");

        // MUST be 0 unless an extension is negotiated that defines meanings for non-zero
        // values. (RFC 6455)
        if first & RSV_BITS != 0 {
            return Err(Error::Protocol(ProtocolError::NonZeroReservedBits));
        }

        let is_final = first & FIN_BIT != 0;
        let opcode = OpCode::from(first);
        let masked = second & MASK_BIT != 0;

        let length = {
            let length_byte = second & 0x7F;
            let length_length = LengthFormat::for_byte(length_byte).extra_bytes();
            if length_length > 0 {
                let mut buf = [0u8; 8];
                if read_up_to(cursor, &mut buf[8 - length_length..])? != length_length {
                    return Ok(None);
                }
                // The most significant bit of a 64-bit length is not checked.
                u64::from_be_bytes(buf)
            } else {
                u64::from(length_byte)
            }
        };

        let mask = if masked {
            let mut mask_bytes = [0u8; 4];
            if read_up_to(cursor, &mut mask_bytes)? != 4 {
                return Ok(None);
            }
            Some(mask_bytes)
        } else {
            None
        };

        let header = FrameHeader {
            is_final,
            opcode,
            mask,
        };

        Ok(Some((header, length)))
    }
}

/// `Read::read_exact` without the error on a short buffer.
fn read_up_to(src: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Handling of the length format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LengthFormat {
    U8(u8),
    U16,
    U64,
}

impl LengthFormat {
    /// Get the length format for a given data size.
    #[inline]
    pub(crate) fn for_length(length: u64) -> Self {
        if length < 126 {
            LengthFormat::U8(length as u8)
        } else if length < 65536 {
            LengthFormat::U16
        } else {
            LengthFormat::U64
        }
    }

    /// Get the size of the length encoding.
    #[inline]
    pub(crate) fn extra_bytes(&self) -> usize {
        match *self {
            LengthFormat::U8(_) => 0,
            LengthFormat::U16 => 2,
            LengthFormat::U64 => 8,
        }
    }

    /// Encode the given length.
    #[inline]
    pub(crate) fn length_byte(&self) -> u8 {
        match *self {
            LengthFormat::U8(b) => b,
            LengthFormat::U16 => 126,
            LengthFormat::U64 => 127,
        }
    }

    /// Get the length format from the length byte.
    #[inline]
    pub(crate) fn for_byte(byte: u8) -> Self {
        match byte & 0x7F {
            126 => LengthFormat::U16,
            127 => LengthFormat::U64,
            b => LengthFormat::U8(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted(header: FrameHeader, length: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        header.format(length, &mut buf);
        assert_eq!(buf.len(), header.len(length));
        buf.to_vec()
    }

    #[test]
    fn parse() {
        let mut raw: Cursor<Vec<u8>> = Cursor::new(vec![0x82, 0x07, 0x01, 0x02, 0x03]);
        let (header, length) = FrameHeader::parse(&mut raw).unwrap().unwrap();
        assert!(header.is_final);
        assert_eq!(header.opcode, OpCode::Binary);
        assert_eq!(header.mask, None);
        assert_eq!(length, 7);
        assert_eq!(raw.position(), 2);
    }

    #[test]
    fn parse_masked_extended_length() {
        let mut raw = Cursor::new(vec![0x81, 0xFE, 0x01, 0x00, 0xA1, 0xB2, 0xC3, 0xD4, 0xFF]);
        let (header, length) = FrameHeader::parse(&mut raw).unwrap().unwrap();
        assert_eq!(header.opcode, OpCode::Text);
        assert_eq!(header.mask, Some([0xA1, 0xB2, 0xC3, 0xD4]));
        assert_eq!(length, 256);
        assert_eq!(raw.position(), 8);
    }

    #[test]
    fn parse_64bit_length() {
        let mut raw = Cursor::new(vec![0x82, 0x7F, 0, 0, 0, 1, 0, 0, 0, 0]);
        let (_, length) = FrameHeader::parse(&mut raw).unwrap().unwrap();
        assert_eq!(length, 1 << 32);
    }

    #[test]
    fn parse_incomplete_keeps_position() {
        for raw in [
            vec![0x82],
            vec![0x82, 0x7E, 0x01],
            vec![0x82, 0x7F, 0, 0, 0, 0],
            vec![0x82, 0x85, 0x01, 0x02],
        ] {
            let mut cursor = Cursor::new(raw);
            assert!(FrameHeader::parse(&mut cursor).unwrap().is_none());
            assert_eq!(cursor.position(), 0);
        }
    }

    #[test]
    fn parse_rejects_reserved_bits() {
        for first in [0xC1u8, 0xA1, 0x91, 0xF1] {
            let mut raw = Cursor::new(vec![first, 0x00]);
            assert!(matches!(
                FrameHeader::parse(&mut raw),
                Err(Error::Protocol(ProtocolError::NonZeroReservedBits))
            ));
        }
    }

    #[test]
    fn format() {
        let header = FrameHeader::new(OpCode::Ping);
        assert_eq!(formatted(header, 2), vec![0x89, 0x02]);
    }

    #[test]
    fn format_length_boundaries() {
        let header = FrameHeader::new(OpCode::Binary);

        assert_eq!(formatted(header, 125), vec![0x82, 125]);
        assert_eq!(formatted(header, 126), vec![0x82, 126, 0x00, 0x7E]);
        assert_eq!(formatted(header, 65535), vec![0x82, 126, 0xFF, 0xFF]);
        assert_eq!(
            formatted(header, 65536),
            vec![0x82, 127, 0, 0, 0, 0, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn format_keeps_out_of_range_opcode_off_reserved_bits() {
        let header = FrameHeader::new(OpCode::Reserved(0x7F));
        let raw = formatted(header, 0);
        assert_eq!(raw, vec![0x8F, 0x00]);
        assert!(FrameHeader::parse(&mut Cursor::new(raw)).is_ok());
    }

    #[test]
    fn format_masked() {
        let header = FrameHeader {
            mask: Some([1, 2, 3, 4]),
            ..FrameHeader::new(OpCode::Text)
        };
        assert_eq!(formatted(header, 0), vec![0x81, 0x80, 1, 2, 3, 4]);
        assert_eq!(formatted(header, 300).len(), 8);
        assert_eq!(formatted(header, 70000).len(), 14);
    }

    #[test]
    fn format_then_parse() {
        let header = FrameHeader {
            is_final: false,
            opcode: OpCode::Pong,
            mask: Some([9, 8, 7, 6]),
        };
        let mut raw = Cursor::new(formatted(header, 1000));
        assert_eq!(FrameHeader::parse(&mut raw).unwrap(), Some((header, 1000)));
    }
}
