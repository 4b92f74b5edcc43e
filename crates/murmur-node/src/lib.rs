use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, future};
use murmur_protocol::{
    Event, GossipNodePort, JsonObject, NodeId, NodeResult, PeerId, ReceivedEvent,
    ReceivedEventStream,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { buffer: 1024 }
    }
}

/// Shared broadcast medium. Every node attached to the same hub sees every
/// event published on it.
#[derive(Clone, Debug)]
pub struct EventStreamHub {
    sender: broadcast::Sender<Event>,
}

impl EventStreamHub {
    pub fn new(config: HubConfig) -> Self {
        let (sender, _) = broadcast::channel(config.buffer.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl Default for EventStreamHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Node backed by an [`EventStreamHub`] and an in-memory event log.
///
/// Delivery is best-effort: no ordering, dedup or retry beyond what the
/// broadcast channel gives.
#[derive(Debug)]
pub struct InMemoryNode {
    node_id: NodeId,
    hub: EventStreamHub,
    log: Mutex<Vec<Event>>,
    loopback: bool,
}

impl InMemoryNode {
    pub fn new(node_id: impl Into<NodeId>, hub: EventStreamHub) -> Self {
        Self {
            node_id: node_id.into(),
            hub,
            log: Mutex::new(Vec::new()),
            loopback: false,
        }
    }

    /// Also deliver this node's own events on its received stream.
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn hub(&self) -> &EventStreamHub {
        &self.hub
    }

    /// Events created by this node, oldest first.
    pub fn created_events(&self) -> Vec<Event> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl GossipNodePort for InMemoryNode {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    #[instrument(skip(self, payload), fields(node_id = %self.node_id))]
    async fn create_event(&self, payload: JsonObject) -> NodeResult<Event> {
        let event = Event::new(self.node_id.clone(), payload);
        self.log.lock().push(event.clone());
        self.hub.publish(event.clone());
        debug!(event_id = %event.id, "event created");
        Ok(event)
    }

    fn received_events(&self) -> ReceivedEventStream {
        let node_id = self.node_id.clone();
        let loopback = self.loopback;
        self.hub
            .subscribe_stream()
            .filter_map(move |item| {
                let received = match item {
                    Ok(event) if loopback || event.node_id != node_id => {
                        let from_peer = PeerId::from(&event.node_id);
                        Some(ReceivedEvent::new(event, from_peer))
                    }
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(node_id = %node_id, skipped, "received-event stream lagged");
                        None
                    }
                };
                future::ready(received)
            })
            .boxed()
    }
}
