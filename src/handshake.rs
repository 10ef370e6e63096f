//! WebSocket handshake control.

pub mod client;

use sha1::{Digest, Sha1};

use crate::random::RandomSource;

/// The GUID every `Sec-WebSocket-Accept` value is derived with (RFC 6455).
const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derives the `Sec-WebSocket-Accept` response header from a `Sec-WebSocket-Key` request header.
pub fn derive_accept_key(request_key: &[u8]) -> String {
    // ... field is constructed by concatenating /key/ ...
    // ... with the string "258EAFA5-E914-47DA-95CA-C5AB0DC85B11" (RFC 6455)
    let mut sha1 = Sha1::default();
    sha1.update(request_key);
    sha1.update(WS_GUID);
    data_encoding::BASE64.encode(&sha1.finalize())
}

/// Generates a random key for the `Sec-WebSocket-Key` header.
pub fn generate_key<R: RandomSource + ?Sized>(rng: &mut R) -> String {
    // a base64-encoded (see Section 4 of [RFC4648]) value that,
    // when decoded, is 16 bytes in length (RFC 6455)
    let mut nonce = [0u8; 16];
    rng.fill(&mut nonce);
    data_encoding::BASE64.encode(&nonce)
}
