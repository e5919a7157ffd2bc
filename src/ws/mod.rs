//! WebSocket gateway: wire protocol, connection registry and per-socket sessions

pub mod connections;
pub mod dispatch;
pub mod handler;
pub mod protocol;
