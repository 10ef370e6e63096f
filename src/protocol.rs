//! WebSocket protocol implementation.

pub mod frame;

mod message;
pub use message::{CloseFrame, Message};

mod websocket;
pub use websocket::{Received, WebSocket, WebSocketConfig};
