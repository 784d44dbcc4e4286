//! Domain layer: events, payload schemas, audiences and the event bus.
//!
//! Nothing in here touches sockets. Producers depend on this module only,
//! and everything they publish is validated by [`SchemaRegistry`] before
//! the dispatch bridge turns it into [`OutboundMessage`]s.

pub mod connection_id;
pub mod event;
pub mod event_bus;
pub mod outbound;
pub mod room;
pub mod schema;

pub use connection_id::ConnectionId;
pub use event::{DomainEvent, EventEnvelope, EventKind};
pub use event_bus::{EventBus, EventListener};
pub use outbound::{DeliveryReport, MessageName, OutboundMessage};
pub use room::{AdminTopic, Audience, Destination, RoomName, RoomRouter};
pub use schema::SchemaRegistry;
