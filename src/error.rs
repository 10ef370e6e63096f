//! Error handling.

use std::{io, result};

use thiserror::Error;

use crate::protocol::frame::coding::OpCode;

/// Result type of all WebSocket client calls.
pub type Result<T, E = Error> = result::Result<T, E>;

/// Possible WebSocket errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Trying to work with a connection whose transport already failed.
    ///
    /// Returned after an I/O or protocol error left the connection in an unknown state. The only
    /// sensible thing to do with such a connection is to close it.
    #[error("Trying to work with closed connection")]
    AlreadyClosed,
    /// Input-output error. Apart from WouldBlock, these are generally errors with the
    /// underlying connection and the connection must be abandoned.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// TLS error.
    ///
    /// Note that this error variant is enabled unconditionally even if no TLS feature is enabled,
    /// to provide a feature-agnostic API surface.
    #[error("TLS error: {0}")]
    Tls(Box<dyn std::error::Error + Send + Sync>),
    /// - When reading: the frame or handshake response exceeds the configured bound.
    /// - When writing: the handshake request exceeds the configured bound.
    #[error("Space limit exceeded: {0}")]
    Capacity(#[from] CapacityError),
    /// Protocol violation.
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// UTF coding error.
    #[error("UTF-8 encoding error: {0}")]
    Utf8(String),
    /// Invalid URL.
    #[error("URL error: {0}")]
    Url(#[from] UrlError),
    /// HTTP format error.
    #[error("HTTP format error: {0}")]
    HttpFormat(#[from] http::Error),
}

impl From<simdutf8::compat::Utf8Error> for Error {
    fn from(err: simdutf8::compat::Utf8Error) -> Self {
        Error::Utf8(err.to_string())
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Error::HttpFormat(err.into())
    }
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        match err {
            httparse::Error::TooManyHeaders => Error::Capacity(CapacityError::TooManyHeaders),
            e => Error::Protocol(ProtocolError::HttpParse(e)),
        }
    }
}

/// Indicates the specific type/cause of a capacity error.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CapacityError {
    /// The serialized handshake request does not fit into the request buffer.
    #[error("Handshake request too long: {size} > {max_size}")]
    RequestTooLong {
        /// The size of the serialized request.
        size: usize,
        /// The maximum allowed request size.
        max_size: usize,
    },
    /// The handshake response head did not end within the response buffer.
    #[error("Handshake response too long: no end of headers within {max_size} bytes")]
    ResponseTooLong {
        /// The maximum allowed response head size.
        max_size: usize,
    },
    /// Too many headers in the handshake response.
    #[error("Too many headers")]
    TooManyHeaders,
    /// Received a message that exceeds the configured limit.
    #[error("Message too long: {size} > {max_size}")]
    MessageTooLong {
        /// The size of the message.
        size: u64,
        /// The maximum allowed message size. Without a configured limit this is the largest
        /// buffer that can be allocated.
        max_size: usize,
    },
}

/// Indicates the specific type/cause of a protocol error.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    /// The server answered with anything but `101 Switching Protocols`.
    #[error("Handshake rejected by server: {0}")]
    HandshakeRejected(String),
    /// The stream ended before the handshake response was complete.
    #[error("Handshake not finished")]
    HandshakeIncomplete,
    /// The handshake response could not be parsed.
    #[error("httparse error: {0}")]
    HttpParse(#[from] httparse::Error),
    /// A header or request line contains characters that cannot be sent.
    #[error("Invalid value for header or request line: {0}")]
    InvalidHeader(String),
    /// The `Sec-WebSocket-Accept` header is missing from the response.
    #[error("No \"Sec-WebSocket-Accept\" header in the handshake response")]
    MissingAcceptHeader,
    /// The `Sec-WebSocket-Accept` header does not match the key we sent.
    #[error("Key mismatch in \"Sec-WebSocket-Accept\" header")]
    AcceptKeyMismatch,
    /// Reserved bits in frame header are non-zero.
    #[error("Reserved bits are non-zero")]
    NonZeroReservedBits,
    /// A fragmented message or a continuation frame was received.
    #[error("Fragmented messages are not supported")]
    UnsupportedFragmentation,
    /// The frame carries an opcode this client does not know how to turn into a message.
    #[error("Unknown opcode: {0}")]
    UnknownOpCode(OpCode),
    /// Received a close frame with a one byte payload.
    #[error("Invalid close sequence")]
    InvalidCloseSequence,
}

/// Indicates the specific type/cause of URL error.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum UrlError {
    /// TLS is used despite not being compiled with the TLS feature enabled.
    #[error("TLS support not compiled in")]
    TlsFeatureNotEnabled,
    /// The URL does not include a host name.
    #[error("No host name in the URL")]
    NoHostName,
    /// The URL host name, though included, is empty.
    #[error("URL host name is empty")]
    EmptyHostName,
    /// The URL scheme was not `ws` or `wss`.
    #[error("URL scheme not supported")]
    UnsupportedUrlScheme,
}
