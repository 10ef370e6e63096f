use monoio_wsclient::{Message, connect};

#[monoio::main]
async fn main() {
    env_logger::init();

    let (mut socket, response) = connect("ws://localhost:3012/")
        .await
        .expect("Failed to connect");

    println!("Connected to the server");
    println!("Response HTTP code: {}", response.status());
    println!("Response contains the following headers:");
    for (header, _value) in response.headers() {
        println!("* {header}");
    }

    socket
        .write_message(Message::Text("Hello WebSocket".into()))
        .await
        .expect("Error writing message");

    // Payloads larger than the buffer arrive in several pieces.
    let mut buf = [0u8; 16];
    let mut received = socket.receive(&mut buf).await.expect("Error reading frame");
    print!("Received {}: ", received.opcode);
    loop {
        print!("{}", String::from_utf8_lossy(&buf[..received.len]));
        match socket.receive_more(&mut buf).await.expect("Error reading frame") {
            Some(more) => received = more,
            None => break,
        }
    }
    println!();

    socket.close().await;
}
