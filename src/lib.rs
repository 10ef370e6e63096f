//! Minimal client-side WebSocket (RFC 6455) for the [`monoio`](https://github.com/bytedance/monoio)
//! runtime: an HTTP/1.1 upgrade handshake followed by a streaming frame codec.
//!
//! Frames are read into caller buffers as they arrive, so payloads larger than the buffer are
//! delivered in pieces (see [`WebSocket::receive`] and [`WebSocket::receive_more`]). Every
//! outbound frame is masked with a key drawn from a [`RandomSource`].

#![deny(
    missing_docs,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub mod error;
pub use error::{Error, Result};

pub mod client;
pub mod handshake;
pub mod protocol;
pub mod random;
pub mod tls;

// re-export bytes since used in `Message` API.
pub use bytes::Bytes;
pub use http;

pub use crate::{
    client::{ClientRequestBuilder, client, connect},
    handshake::client::{Request, client_handshake},
    protocol::{
        Message, Received, WebSocket, WebSocketConfig,
        frame::coding::OpCode,
    },
    random::RandomSource,
};
