//! Service layer: event dispatch orchestration.
//!
//! [`DispatchBridge`] consumes the [`super::domain::EventBus`], validates
//! each event and hands the routed messages to a [`Transport`].

pub mod dispatch;
pub mod routes;

pub use dispatch::{DispatchBridge, DispatchSnapshot, DispatchStats, Transport};
pub use routes::{CatalogEntry, EVENT_CATALOG, route};
