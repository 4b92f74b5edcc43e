//! The node boundary consumed by the typed-event layer.
//!
//! Only two capabilities are required of a substrate: turn a payload into an
//! event, and expose the stream of events it receives. Ordering, causal
//! delivery, deduplication and retry all live behind this port.
//!
//! Object-safety note:
//! - The trait uses `async-trait` for async dyn-dispatch.
//! - Streaming uses boxed trait objects (`ReceivedEventStream`).

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::NodeResult;
use crate::event::{Event, ReceivedEvent};
use crate::ids::NodeId;
use crate::value::JsonObject;

/// Unbounded stream of events received by a node.
pub type ReceivedEventStream = BoxStream<'static, ReceivedEvent>;

#[async_trait]
pub trait GossipNodePort: Send + Sync {
    /// Identity of the local node.
    fn node_id(&self) -> &NodeId;

    /// Create (and broadcast) an event carrying `payload`.
    async fn create_event(&self, payload: JsonObject) -> NodeResult<Event>;

    /// A fresh subscription to the events this node receives.
    ///
    /// Each call returns an independent stream.
    fn received_events(&self) -> ReceivedEventStream;
}
