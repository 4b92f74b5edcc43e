//! Typed broadcast and subscription over a [`GossipNodePort`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, future};
use murmur_protocol::{Envelope, Event, GossipNodePort, JsonObject, NodeId, PeerId, ReceivedEvent};
use tracing::{debug, instrument, warn};

use crate::contract::TypedEvent;
use crate::error::{BoxError, TypedEventError, TypedEventResult};
use crate::registry::TypeRegistry;
use crate::transform::{
    MultiTypeTransformer, RegisteredEventTransformer, TransformOptions, TypeFilter,
    TypedEventStream, TypedEventTransformer,
};

/// A received envelope, unpacked but not decoded.
#[derive(Debug, Clone)]
pub struct TypedEventReceipt {
    pub envelope: Envelope,
    pub from_peer: PeerId,
    pub received_at: DateTime<Utc>,
    pub raw: ReceivedEvent,
}

#[derive(Clone)]
pub struct TypedNode {
    node: Arc<dyn GossipNodePort>,
    registry: Arc<TypeRegistry>,
}

impl TypedNode {
    pub fn new(node: Arc<dyn GossipNodePort>, registry: Arc<TypeRegistry>) -> Self {
        Self { node, registry }
    }

    /// Use the process-wide default registry.
    pub fn with_global_registry(node: Arc<dyn GossipNodePort>) -> Self {
        Self::new(node, TypeRegistry::global())
    }

    pub fn node_id(&self) -> &NodeId {
        self.node.node_id()
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Validate, envelope, and hand the event to the node.
    ///
    /// Validation runs first; a failing rule aborts before anything reaches
    /// the node. Every failure surfaces as [`TypedEventError::Broadcast`].
    #[instrument(
        skip(self, event),
        fields(type_id = %event.event_type(), node_id = %self.node.node_id())
    )]
    pub async fn broadcast_typed_event<E>(&self, event: &E) -> TypedEventResult<Event>
    where
        E: TypedEvent + ?Sized,
    {
        let type_id = event.event_type();
        let broadcast_error = |source: BoxError| TypedEventError::Broadcast {
            type_id: type_id.to_owned(),
            source,
        };

        if let Err(error) = event.validate() {
            warn!(error = %error, "typed event failed validation");
            return Err(broadcast_error(Box::new(error)));
        }
        let data = event
            .to_data()
            .map_err(|error| broadcast_error(Box::new(error)))?;
        let payload = Envelope::encode(type_id, data).into_payload();
        let created = self
            .node
            .create_event(payload)
            .await
            .map_err(|error| broadcast_error(Box::new(error)))?;
        debug!(event_id = %created.id, "typed event broadcast");
        Ok(created)
    }

    /// Broadcast events one by one, stopping at the first failure.
    pub async fn broadcast_typed_events<I>(&self, events: I) -> TypedEventResult<Vec<Event>>
    where
        I: IntoIterator,
        I::Item: AsRef<dyn TypedEvent>,
    {
        let mut created = Vec::new();
        for event in events {
            match self.broadcast_typed_event(event.as_ref()).await {
                Ok(record) => created.push(record),
                Err(error) => {
                    warn!(completed = created.len(), error = %error, "batch broadcast aborted");
                    return Err(error);
                }
            }
        }
        Ok(created)
    }

    /// Decode `type_id` envelopes with an explicit factory.
    pub fn on_typed_event<T, F>(
        &self,
        type_id: impl Into<String>,
        factory: F,
        options: TransformOptions,
    ) -> TypedEventStream<T>
    where
        T: Send + 'static,
        F: Fn(&JsonObject) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        TypedEventTransformer::new(type_id, factory)
            .with_options(options)
            .bind(self.node.received_events())
    }

    /// Decode `T` using its registered type id and factory.
    ///
    /// Fails immediately with [`TypedEventError::UnregisteredType`] when `T`
    /// is not registered.
    pub fn on_registered_typed_event<T: TypedEvent>(
        &self,
        options: TransformOptions,
    ) -> TypedEventResult<TypedEventStream<Arc<T>>> {
        let transformer = RegisteredEventTransformer::<T>::new(self.registry.clone(), options)?;
        Ok(transformer.bind(self.node.received_events()))
    }

    /// Decode every registered type that passes `filter`.
    pub fn on_registered_events(
        &self,
        filter: TypeFilter,
        options: TransformOptions,
    ) -> TypedEventStream<Arc<dyn TypedEvent>> {
        MultiTypeTransformer::new(self.registry.clone(), filter, options)
            .bind(self.node.received_events())
    }

    /// Every envelope received, unpacked without invoking any factory.
    pub fn on_any_typed_event(&self) -> BoxStream<'static, TypedEventReceipt> {
        self.node
            .received_events()
            .filter_map(|raw| {
                let receipt = Envelope::decode(raw.payload()).map(|envelope| TypedEventReceipt {
                    envelope,
                    from_peer: raw.from_peer.clone(),
                    received_at: raw.received_at,
                    raw,
                });
                future::ready(receipt)
            })
            .boxed()
    }
}

impl std::fmt::Debug for TypedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedNode")
            .field("node_id", self.node.node_id())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;
    use futures_util::stream;
    use murmur_protocol::{NodeError, NodeResult, ReceivedEventStream};
    use serde_json::json;

    use super::*;
    use crate::error::{SerializationError, ValidationError};
    use crate::fixtures::{Note, OrderCreated};

    /// Passes validation but cannot render its fields.
    #[derive(Debug)]
    struct Unrenderable;

    impl TypedEvent for Unrenderable {
        fn event_type(&self) -> &str {
            "unrenderable"
        }

        fn fields(&self) -> Result<JsonObject, SerializationError> {
            Err(SerializationError::custom("cannot render fields"))
        }
    }

    /// Records created payloads; optionally refuses them.
    #[derive(Default)]
    struct RecordingNode {
        node_id: NodeId,
        calls: AtomicUsize,
        created: parking_lot::Mutex<Vec<JsonObject>>,
        reject: bool,
        inbox: Vec<ReceivedEvent>,
    }

    #[async_trait]
    impl GossipNodePort for RecordingNode {
        fn node_id(&self) -> &NodeId {
            &self.node_id
        }

        async fn create_event(&self, payload: JsonObject) -> NodeResult<Event> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(NodeError::Unavailable("offline".into()));
            }
            self.created.lock().push(payload.clone());
            Ok(Event::new(self.node_id.clone(), payload))
        }

        fn received_events(&self) -> ReceivedEventStream {
            stream::iter(self.inbox.clone()).boxed()
        }
    }

    fn typed(node: RecordingNode) -> (Arc<RecordingNode>, TypedNode) {
        let node = Arc::new(node);
        let typed = TypedNode::new(node.clone(), Arc::new(TypeRegistry::new()));
        (node, typed)
    }

    #[tokio::test]
    async fn broadcast_wraps_event_in_envelope() -> Result<()> {
        let (node, typed) = typed(RecordingNode::default());
        let created = typed.broadcast_typed_event(&OrderCreated::new("o1", 10)).await?;

        assert_eq!(created.payload["type"], "order_created");
        assert_eq!(created.payload["version"], "1.0");
        assert_eq!(created.payload["data"], json!({"orderId": "o1", "amount": 10}));
        assert_eq!(node.created.lock().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_node() {
        let (node, typed) = typed(RecordingNode::default());
        let err = typed.broadcast_typed_event(&Note::new("ab")).await.unwrap_err();

        assert_eq!(err.type_id(), Some("note"));
        let TypedEventError::Broadcast { source, .. } = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(source.downcast_ref::<ValidationError>().is_some());
        assert_eq!(node.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn serialization_failure_becomes_broadcast_error() {
        let (node, typed) = typed(RecordingNode::default());
        let err = typed.broadcast_typed_event(&Unrenderable).await.unwrap_err();
        match err {
            TypedEventError::Broadcast { type_id, source } => {
                assert_eq!(type_id, "unrenderable");
                let cause = source.downcast_ref::<SerializationError>();
                assert!(cause.is_some_and(|c| c.to_string().contains("cannot render fields")));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(node.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn node_failure_becomes_broadcast_error() {
        let (_node, typed) = typed(RecordingNode {
            reject: true,
            ..RecordingNode::default()
        });
        let err = typed
            .broadcast_typed_event(&OrderCreated::new("o1", 1))
            .await
            .unwrap_err();
        match err {
            TypedEventError::Broadcast { type_id, source } => {
                assert_eq!(type_id, "order_created");
                assert!(source.downcast_ref::<NodeError>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure() {
        let (node, typed) = typed(RecordingNode::default());
        let events: Vec<Arc<dyn TypedEvent>> = vec![
            Arc::new(OrderCreated::new("o1", 1)),
            Arc::new(OrderCreated::new("", 2)),
            Arc::new(OrderCreated::new("o3", 3)),
        ];
        let err = typed.broadcast_typed_events(&events).await.unwrap_err();
        assert!(matches!(err, TypedEventError::Broadcast { .. }));
        assert_eq!(node.created.lock().len(), 1);

        let ok: Vec<Arc<dyn TypedEvent>> = vec![
            Arc::new(OrderCreated::new("o1", 1)),
            Arc::new(Note::new("hello")),
        ];
        let created = typed.broadcast_typed_events(ok).await.unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn registered_subscription_requires_registration() {
        let (_node, typed) = typed(RecordingNode::default());
        let result = typed.on_registered_typed_event::<OrderCreated>(TransformOptions::default());
        assert!(matches!(result, Err(TypedEventError::UnregisteredType { .. })));
    }

    #[tokio::test]
    async fn any_typed_event_unpacks_without_factories() -> Result<()> {
        let peer = PeerId::from_string("peer-9");
        let inbox = [
            json!({"type": "never_registered", "data": {"x": 1}}),
            json!({"not": "an envelope"}),
        ]
        .into_iter()
        .map(|payload| {
            let payload = payload.as_object().cloned().unwrap_or_default();
            ReceivedEvent::new(Event::new(NodeId::from_string("peer-9"), payload), peer.clone())
        })
        .collect();
        let (_node, typed) = typed(RecordingNode {
            inbox,
            ..RecordingNode::default()
        });

        let receipts: Vec<_> = typed.on_any_typed_event().collect().await;
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].envelope.event_type, "never_registered");
        assert_eq!(receipts[0].envelope.version, "1.0");
        assert_eq!(receipts[0].from_peer, peer);
        assert_eq!(receipts[0].raw.event.payload["data"]["x"], 1);
        Ok(())
    }
}
