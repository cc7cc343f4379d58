//! mowa-server: REST and WebSocket transport in front of the session engine.

pub mod http;
pub mod settings;
pub mod websocket;
