//! Client handshake over in-memory transports.

mod support;

use monoio_wsclient::{
    Error, OpCode, Request, WebSocketConfig, client_handshake,
    error::{CapacityError, ProtocolError},
    handshake::derive_accept_key,
};
use support::{Counter, ScriptedStream, server_frame};

/// The key a fresh [`Counter`] produces: base64 of the bytes 0 to 15.
const COUNTER_KEY: &str = "AAECAwQFBgcICQoLDA0ODw==";

fn accepting_response() -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        derive_accept_key(COUNTER_KEY.as_bytes())
    )
}

#[monoio::test]
async fn handshake_and_first_frame() {
    let mut input = accepting_response().into_bytes();
    input.extend(server_frame(0x81, b"welcome"));
    let (stream, written) = ScriptedStream::new(input);

    let request = Request::new("example.com:8080", "/chat").with_header("Origin", "http://a.b");
    let (mut socket, response) =
        client_handshake(request, stream.read_size(7), Counter::default(), None)
            .await
            .unwrap();

    assert_eq!(response.status(), monoio_wsclient::http::StatusCode::SWITCHING_PROTOCOLS);
    assert_eq!(
        String::from_utf8(written.borrow().clone()).unwrap(),
        format!(
            "GET /chat HTTP/1.1\r\n\
             Host: example.com:8080\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {COUNTER_KEY}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             Origin: http://a.b\r\n\
             \r\n"
        )
    );

    // Frame bytes that arrived with the response are not lost.
    let mut buf = [0u8; 16];
    let received = socket.receive(&mut buf).await.unwrap();
    assert_eq!(received.opcode, OpCode::Text);
    assert_eq!(&buf[..received.len], b"welcome");

    // The counter continues after the key, so the first mask is 16..=19.
    written.borrow_mut().clear();
    socket.send_text("").await.unwrap();
    assert_eq!(&written.borrow()[..], &[0x81, 0x80, 16, 17, 18, 19]);
}

#[monoio::test]
async fn accept_header_name_is_case_insensitive() {
    let response = accepting_response().replace("Sec-WebSocket-Accept", "sec-websocket-accept");
    let (stream, _) = ScriptedStream::new(response);

    let request = Request::new("localhost", "/");
    assert!(
        client_handshake(request, stream, Counter::default(), None)
            .await
            .is_ok()
    );
}

#[monoio::test]
async fn rejected_handshake() {
    let (stream, _) = ScriptedStream::new("HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n");

    let request = Request::new("localhost", "/");
    match client_handshake(request, stream, Counter::default(), None).await {
        Err(Error::Protocol(ProtocolError::HandshakeRejected(head))) => {
            assert!(head.starts_with("HTTP/1.1 403 Forbidden"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[monoio::test]
async fn missing_accept_header() {
    let (stream, _) = ScriptedStream::new(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
    );

    let request = Request::new("localhost", "/");
    assert!(matches!(
        client_handshake(request, stream, Counter::default(), None).await,
        Err(Error::Protocol(ProtocolError::MissingAcceptHeader))
    ));
}

#[monoio::test]
async fn wrong_accept_header() {
    let (stream, _) = ScriptedStream::new(
        "HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
    );

    let request = Request::new("localhost", "/");
    assert!(matches!(
        client_handshake(request, stream, Counter::default(), None).await,
        Err(Error::Protocol(ProtocolError::AcceptKeyMismatch))
    ));
}

#[monoio::test]
async fn connection_closed_during_response() {
    let (stream, _) = ScriptedStream::new("HTTP/1.1 101 Switching Protocols\r\nUpgr");

    let request = Request::new("localhost", "/");
    assert!(matches!(
        client_handshake(request, stream, Counter::default(), None).await,
        Err(Error::Protocol(ProtocolError::HandshakeIncomplete))
    ));
}

#[monoio::test]
async fn request_too_long() {
    let (stream, written) = ScriptedStream::new(accepting_response());

    let request = Request::new("localhost", "/").with_header("X-Padding", "x".repeat(200));
    let config = WebSocketConfig::default().max_request_size(128);
    match client_handshake(request, stream, Counter::default(), Some(config)).await {
        Err(Error::Capacity(CapacityError::RequestTooLong { size, max_size })) => {
            assert!(size > 128);
            assert_eq!(max_size, 128);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(written.borrow().is_empty());
}

#[monoio::test]
async fn response_too_long() {
    let mut response = String::from("HTTP/1.1 101 Switching Protocols\r\n");
    for i in 0..100 {
        response.push_str(&format!("X-Filler-{i}: some value\r\n"));
    }
    response.push_str("\r\n");
    let (stream, _) = ScriptedStream::new(response);

    let request = Request::new("localhost", "/");
    let config = WebSocketConfig::default().max_response_size(256);
    assert!(matches!(
        client_handshake(request, stream.read_size(64), Counter::default(), Some(config)).await,
        Err(Error::Capacity(CapacityError::ResponseTooLong { max_size: 256 }))
    ));
}

#[monoio::test]
async fn header_injection_is_refused() {
    let (stream, written) = ScriptedStream::new(accepting_response());

    let request = Request::new("localhost", "/").with_header("X-Evil", "a\r\nInjected: yes");
    assert!(matches!(
        client_handshake(request, stream, Counter::default(), None).await,
        Err(Error::Protocol(ProtocolError::InvalidHeader(_)))
    ));
    assert!(written.borrow().is_empty());
}

#[monoio::test]
async fn refusal_cut_short_is_rejected() {
    let (stream, _) = ScriptedStream::new("HTTP/1.1 403 Forbidden\r\nContent-Type: text/plain\r\n");

    let request = Request::new("localhost", "/");
    match client_handshake(request, stream, Counter::default(), None).await {
        Err(Error::Protocol(ProtocolError::HandshakeRejected(head))) => {
            assert!(head.starts_with("HTTP/1.1 403 Forbidden"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[monoio::test]
async fn oversized_refusal_is_rejected() {
    let mut response = String::from("HTTP/1.1 400 Bad Request\r\n");
    for i in 0..300 {
        response.push_str(&format!("X-Filler-{i}: some value\r\n"));
    }
    response.push_str("\r\n");
    let (stream, _) = ScriptedStream::new(response);

    let request = Request::new("localhost", "/");
    match client_handshake(request, stream.read_size(512), Counter::default(), None).await {
        Err(Error::Protocol(ProtocolError::HandshakeRejected(head))) => {
            assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
            assert!(head.len() <= WebSocketConfig::default().max_response_size);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
