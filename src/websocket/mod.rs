//! WebSocket module for stream connection management

mod client;
mod connection;

pub use client::WebSocketClient;
pub use connection::{
    ConnectionPhase, ConnectionState, ConnectionStateCell, ResyncHandle, StreamConnection,
    StreamEvent,
};
