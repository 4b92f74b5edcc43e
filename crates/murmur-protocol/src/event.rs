//! Raw events as produced and delivered by a broadcast node.
//!
//! These are the substrate's records. The typed-event layer never builds them
//! directly; it hands a payload to [`GossipNodePort::create_event`] and reads
//! them back from the received-event stream.
//!
//! [`GossipNodePort::create_event`]: crate::ports::GossipNodePort::create_event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, NodeId, PeerId};
use crate::value::JsonObject;

/// An opaque event as created by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub node_id: NodeId,
    /// Time the owning node accepted the event.
    pub timestamp: DateTime<Utc>,
    /// Time the payload was handed to the node.
    pub creation_timestamp: DateTime<Utc>,
    pub payload: JsonObject,
}

impl Event {
    /// Build an event owned by `node_id` with both timestamps set to now.
    pub fn new(node_id: NodeId, payload: JsonObject) -> Self {
        let now = Utc::now();
        Self {
            id: EventId::default(),
            node_id,
            timestamp: now,
            creation_timestamp: now,
            payload,
        }
    }
}

/// An event delivered to this node, with sender metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedEvent {
    pub event: Event,
    pub from_peer: PeerId,
    pub received_at: DateTime<Utc>,
}

impl ReceivedEvent {
    pub fn new(event: Event, from_peer: PeerId) -> Self {
        Self {
            event,
            from_peer,
            received_at: Utc::now(),
        }
    }

    /// Shorthand for the raw payload carried by the event.
    pub fn payload(&self) -> &JsonObject {
        &self.event.payload
    }
}
