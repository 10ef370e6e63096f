#![no_main]

use libfuzzer_sys::fuzz_target;
use monoio_wsclient::handshake::client::verify_response;

fuzz_target!(|data: &[u8]| {
    verify_response(data, "dGhlIHNhbXBsZSBub25jZQ==").ok();
});
