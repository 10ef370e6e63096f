//! Connects to a minimal WebSocket server on loopback and exchanges a frame each way.

use monoio::{
    io::{AsyncReadRent, AsyncWriteRentExt},
    net::{TcpListener, TcpStream},
};
use monoio_wsclient::{
    ClientRequestBuilder, Message, connect,
    handshake::derive_accept_key,
    http::Uri,
    protocol::frame::apply_mask,
    tls::Mode,
};

/// Reads until the end of the request head, returning the head and any bytes after it.
async fn read_request(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut data = Vec::new();
    loop {
        let (res, buf) = stream.read(Vec::with_capacity(1024)).await;
        assert!(res.unwrap() > 0, "client hung up during the handshake");
        data.extend_from_slice(&buf);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = data.split_off(pos + 4);
            return (String::from_utf8(data).unwrap(), rest);
        }
    }
}

async fn read_at_least(stream: &mut TcpStream, mut data: Vec<u8>, len: usize) -> Vec<u8> {
    while data.len() < len {
        let (res, buf) = stream.read(Vec::with_capacity(1024)).await;
        assert!(res.unwrap() > 0, "client hung up");
        data.extend_from_slice(&buf);
    }
    data
}

#[monoio::test]
async fn echo_over_loopback() {
    let server =
        TcpListener::bind(("127.0.0.1", 3031)).expect("Can't listen, is port already in use?");

    let server_conn = monoio::spawn(async move {
        let (mut stream, _) = server.accept().await.unwrap();
        let (head, rest) = read_request(&mut stream).await;

        assert!(head.starts_with("GET /echo?x=1 HTTP/1.1\r\n"));
        assert!(head.contains("Host: 127.0.0.1:3031\r\n"));
        assert!(head.contains("Authorization: Bearer t0ken\r\n"));
        let key = head
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap();

        let mut response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            derive_accept_key(key.as_bytes())
        )
        .into_bytes();
        response.extend_from_slice(&[0x81, 0x05]);
        response.extend_from_slice(b"hello");
        let (res, _) = stream.write_all(response).await;
        res.unwrap();

        // A masked text frame carrying "back".
        let frame = read_at_least(&mut stream, rest, 2 + 4 + 4).await;
        assert_eq!(&frame[..2], &[0x81, 0x84]);
        let mask = [frame[2], frame[3], frame[4], frame[5]];
        let mut payload = frame[6..10].to_vec();
        apply_mask(&mut payload, mask, 0);
        assert_eq!(payload, b"back");

        // The empty close frame sent on close.
        let frame = read_at_least(&mut stream, frame[10..].to_vec(), 6).await;
        assert_eq!(&frame[..2], &[0x88, 0x80]);
    });

    let uri: Uri = "ws://127.0.0.1:3031/echo?x=1".parse().unwrap();
    let request = ClientRequestBuilder::new(uri).with_header("Authorization", "Bearer t0ken");
    let (mut socket, response) = connect(request).await.unwrap();
    assert_eq!(response.status(), 101);
    assert_eq!(socket.get_ref().mode(), Mode::Plain);

    assert_eq!(socket.read_message().await.unwrap(), Message::text("hello"));
    socket.send_text("back").await.unwrap();
    socket.close().await;

    server_conn.await;
}

#[monoio::test]
async fn unsupported_scheme() {
    assert!(matches!(
        connect("http://127.0.0.1:3032/").await,
        Err(monoio_wsclient::Error::Url(
            monoio_wsclient::error::UrlError::UnsupportedUrlScheme
        ))
    ));
}
