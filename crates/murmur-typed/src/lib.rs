//! # murmur-typed — typed events over murmur nodes
//!
//! Applications define strongly-typed event variants, register them by a
//! stable wire type id, broadcast them through a node, and consume them back
//! out of the node's raw received-event stream.
//!
//! ## Module Overview
//!
//! - [`contract`] — `TypedEvent`, structural equality/hash, downcasting
//! - [`metadata`] — `EventMetadata` (createdAt + bag) and validation helpers
//! - [`registry`] — `TypeRegistry`, `VariantTag`, registry stats
//! - [`transform`] — explicit, registered and multi-type stream transformers
//! - [`node`] — `TypedNode`: typed broadcast and subscriptions
//! - [`error`] — TypedEventError, ValidationError, SerializationError

pub mod contract;
pub mod error;
pub mod metadata;
pub mod node;
pub mod registry;
pub mod transform;

#[cfg(test)]
pub(crate) mod fixtures;

pub use contract::{AsAny, TypedEvent, downcast_event, event_hash, events_equal, fields_from_serde};
pub use error::{BoxError, SerializationError, TypedEventError, TypedEventResult, ValidationError};
pub use metadata::{
    CREATED_AT_KEY, DataPolicy, EventMetadata, METADATA_KEY, RESERVED_KEYS, decode_fields,
    require_in_range, require_min_len, require_non_empty, validate_base,
};
pub use node::{TypedEventReceipt, TypedNode};
pub use registry::{EventFactory, RegistryStats, TypeRegistry, VariantTag};
pub use transform::{
    DecodeContext, ErrorCallback, Factory, MultiTypeTransformer, ReceivedEventStreamExt,
    RegisteredEventTransformer, TransformOptions, TransformerKind, TypeFilter, TypedEventStream,
    TypedEventTransformer,
};

pub use murmur_protocol::{Envelope, JsonObject};
