//! The event engine: spec.md §2 core B, fully specified in §4.2.

mod engine;
mod session;
mod types;

pub use engine::EventEngine;
pub use session::Session;
pub use types::{
    Event, EventDestroyCallback, EventTypeId, Formatter, Listener, SessionCallback,
    SessionCallbackReason,
};

/// Derive a stable [`EventTypeId`] from a human-readable name, e.g.
/// `event_type_id("connection.opened")`.
pub fn event_type_id(name: &str) -> EventTypeId {
    crate::strid::strid(name)
}
