//! # murmur-protocol — wire contract for murmur nodes
//!
//! Shared types used by every layer that talks to a broadcast node. It has
//! no runtime dependencies (no tokio), so it can be consumed as a pure
//! contract crate by substrates and by the typed-event layer alike.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed ID wrappers (EventId, NodeId, PeerId)
//! - [`event`] — Raw `Event` and `ReceivedEvent` records produced by a node
//! - [`value`] — JSON value space with structural equality and hashing
//! - [`envelope`] — The `{type, data, version}` envelope codec
//! - [`ports`] — The node boundary consumed by higher layers
//! - [`error`] — NodeError, NodeResult

pub mod envelope;
pub mod error;
pub mod event;
pub mod ids;
pub mod ports;
pub mod value;

pub use envelope::{DATA_KEY, ENVELOPE_VERSION, Envelope, TYPE_KEY, VERSION_KEY};
pub use error::{NodeError, NodeResult};
pub use event::{Event, ReceivedEvent};
pub use ids::{EventId, NodeId, PeerId};
pub use ports::{GossipNodePort, ReceivedEventStream};
pub use value::{JsonObject, Structural, deep_eq, deep_eq_objects, object_hash, structural_hash};
