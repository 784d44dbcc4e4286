//! WebSocket layer: connection lifecycle, rooms and client commands.
//!
//! The endpoint at `/ws` authenticates the client, binds it to its
//! personal room and then pushes every outbound message routed to the
//! rooms it has joined. [`ConnectionHub`] is the transport the dispatch
//! bridge delivers through.

pub mod binder;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod messages;
pub mod subscription;

pub use binder::{ConnectionAck, SessionBinder};
pub use hub::ConnectionHub;
