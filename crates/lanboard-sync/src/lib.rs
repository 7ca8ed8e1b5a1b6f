//! The event-channel client: one WebSocket connection with bounded
//! reconnect, multi-subscriber event fan-out, and an outbound command sink.

pub mod connection;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
