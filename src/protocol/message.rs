use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::coding::OpCode;
use crate::error::{Error, ProtocolError, Result};

/// A struct representing the close command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CloseFrame {
    /// The reason as a code.
    pub code: u16,
    /// The reason as text string.
    pub reason: String,
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.reason, self.code)
    }
}

/// An enum representing the various forms of a WebSocket message.
///
/// Every message travels in exactly one frame; continuation frames are not supported.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Message {
    /// A text WebSocket message
    Text(String),
    /// A binary WebSocket message
    Binary(Bytes),
    /// A ping message with the specified payload
    ///
    /// The payload here must have a length less than 125 bytes
    Ping(Bytes),
    /// A pong message with the specified payload
    ///
    /// The payload here must have a length less than 125 bytes
    Pong(Bytes),
    /// A close message with the optional close frame.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Create a new text WebSocket message from a stringable.
    pub fn text<S>(string: S) -> Message
    where
        S: Into<String>,
    {
        Message::Text(string.into())
    }

    /// Create a new binary WebSocket message by converting to `Bytes`.
    pub fn binary<B>(bin: B) -> Message
    where
        B: Into<Bytes>,
    {
        Message::Binary(bin.into())
    }

    /// Builds a message from the opcode and the complete, unmasked payload of one frame.
    pub(crate) fn from_frame(opcode: OpCode, payload: Vec<u8>) -> Result<Message> {
        Ok(match opcode {
            OpCode::Text => Message::Text(into_string(payload)?),
            OpCode::Binary => Message::Binary(payload.into()),
            OpCode::Ping => Message::Ping(payload.into()),
            OpCode::Pong => Message::Pong(payload.into()),
            OpCode::Close => Message::Close(parse_close(payload)?),
            OpCode::Continue => return Err(Error::Protocol(ProtocolError::UnsupportedFragmentation)),
            op @ OpCode::Reserved(_) => return Err(Error::Protocol(ProtocolError::UnknownOpCode(op))),
        })
    }

    /// Splits the message into the opcode and payload of the frame carrying it.
    pub(crate) fn into_frame(self) -> (OpCode, Bytes) {
        match self {
            Message::Text(text) => (OpCode::Text, text.into()),
            Message::Binary(data) => (OpCode::Binary, data),
            Message::Ping(data) => (OpCode::Ping, data),
            Message::Pong(data) => (OpCode::Pong, data),
            Message::Close(None) => (OpCode::Close, Bytes::new()),
            Message::Close(Some(frame)) => {
                let mut payload = BytesMut::with_capacity(2 + frame.reason.len());
                payload.put_u16(frame.code);
                payload.put_slice(frame.reason.as_bytes());
                (OpCode::Close, payload.freeze())
            }
        }
    }

    /// Indicates whether a message is a text message.
    pub fn is_text(&self) -> bool {
        matches!(*self, Message::Text(_))
    }

    /// Indicates whether a message is a binary message.
    pub fn is_binary(&self) -> bool {
        matches!(*self, Message::Binary(_))
    }

    /// Indicates whether a message is a ping message.
    pub fn is_ping(&self) -> bool {
        matches!(*self, Message::Ping(_))
    }

    /// Indicates whether a message is a pong message.
    pub fn is_pong(&self) -> bool {
        matches!(*self, Message::Pong(_))
    }

    /// Indicates whether a message is a close message.
    pub fn is_close(&self) -> bool {
        matches!(*self, Message::Close(_))
    }

    /// Get the length of the WebSocket message.
    pub fn len(&self) -> usize {
        match *self {
            Message::Text(ref string) => string.len(),
            Message::Binary(ref data) | Message::Ping(ref data) | Message::Pong(ref data) => {
                data.len()
            }
            Message::Close(ref data) => data.as_ref().map(|d| d.reason.len() + 2).unwrap_or(0),
        }
    }

    /// Returns true if the WebSocket message has no content.
    /// For example, if the other side of the connection sent an empty string.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the WebSocket and return it as binary data.
    pub fn into_data(self) -> Bytes {
        self.into_frame().1
    }
}

impl From<String> for Message {
    #[inline]
    fn from(string: String) -> Self {
        Message::text(string)
    }
}

impl<'s> From<&'s str> for Message {
    #[inline]
    fn from(string: &'s str) -> Self {
        Message::text(string)
    }
}

impl From<Bytes> for Message {
    #[inline]
    fn from(data: Bytes) -> Self {
        Message::binary(data)
    }
}

impl From<Vec<u8>> for Message {
    #[inline]
    fn from(data: Vec<u8>) -> Self {
        Message::binary(data)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::Text(text) => write!(f, "{text}"),
            Message::Close(Some(frame)) => write!(f, "<close frame: {frame}>"),
            Message::Close(None) => write!(f, "<close frame>"),
            other => write!(f, "Binary Data<length={}>", other.len()),
        }
    }
}

fn into_string(payload: Vec<u8>) -> Result<String> {
    simdutf8::compat::from_utf8(&payload)?;
    // SAFETY: validated right above.
    Ok(unsafe { String::from_utf8_unchecked(payload) })
}

fn parse_close(payload: Vec<u8>) -> Result<Option<CloseFrame>> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(Error::Protocol(ProtocolError::InvalidCloseSequence)),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            let reason = into_string(payload[2..].to_vec())?;
            Ok(Some(CloseFrame { code, reason }))
        }
    }
}
