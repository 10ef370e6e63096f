#![no_main]

use libfuzzer_sys::fuzz_target;
use monoio_wsclient::{WebSocket, WebSocketConfig};

mod shared;
use shared::{InputStream, RUNTIME};

fuzz_target!(|data: &[u8]| {
    RUNTIME.with(|runtime| {
        runtime.borrow_mut().block_on(async {
            let config = WebSocketConfig::default().max_message_size(Some(1 << 16));
            let mut socket = WebSocket::from_raw_socket(InputStream(data), Some(config));

            // Alternate partial reads and whole messages until the input is exhausted.
            let mut buf = [0u8; 7];
            loop {
                if socket.receive(&mut buf).await.is_err() {
                    break;
                }
                if socket.read_message().await.is_err() {
                    break;
                }
            }
        });
    });
});
