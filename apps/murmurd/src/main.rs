use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use futures_util::StreamExt;
use murmur_node::{EventStreamHub, HubConfig, InMemoryNode};
use murmur_protocol::JsonObject;
use murmur_typed::{
    BoxError, DataPolicy, SerializationError, TransformOptions, TypeFilter, TypeRegistry,
    TypedEvent, TypedNode, ValidationError, decode_fields, fields_from_serde, require_in_range,
    require_non_empty, validate_base,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "murmurd")]
#[command(about = "Murmur typed-event demo daemon")]
struct Cli {
    /// Nodes attached to the shared hub.
    #[arg(long, default_value_t = 3)]
    peers: usize,
    /// Orders broadcast by the first node.
    #[arg(long, default_value_t = 5)]
    orders: usize,
    /// Hub channel capacity.
    #[arg(long, default_value_t = 1024)]
    buffer: usize,
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderPlaced {
    order_id: String,
    amount: i64,
}

impl OrderPlaced {
    fn from_data(data: &JsonObject) -> Result<Self, BoxError> {
        Ok(decode_fields(data)?)
    }
}

impl TypedEvent for OrderPlaced {
    fn event_type(&self) -> &str {
        "order_placed"
    }

    fn fields(&self) -> Result<JsonObject, SerializationError> {
        fields_from_serde(self)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_base(self, DataPolicy::default())?;
        require_non_empty("orderId", &self.order_id)?;
        require_in_range("amount", self.amount, 1..=10_000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerJoined {
    peer: String,
}

impl PeerJoined {
    fn from_data(data: &JsonObject) -> Result<Self, BoxError> {
        Ok(decode_fields(data)?)
    }
}

impl TypedEvent for PeerJoined {
    fn event_type(&self) -> &str {
        "peer_joined"
    }

    fn fields(&self) -> Result<JsonObject, SerializationError> {
        fields_from_serde(self)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();

    if cli.peers < 2 {
        bail!("--peers must be at least 2, got {}", cli.peers);
    }

    let registry = TypeRegistry::global();
    registry.register_variant("order_placed", OrderPlaced::from_data)?;
    registry.register_variant("peer_joined", PeerJoined::from_data)?;
    let stats = serde_json::to_string(&registry.stats())?;
    info!(stats = %stats, "registry ready");

    let hub = EventStreamHub::new(HubConfig { buffer: cli.buffer });
    let nodes: Vec<TypedNode> = (0..cli.peers)
        .map(|index| {
            let node = InMemoryNode::new(format!("peer-{index}"), hub.clone()).into_shared();
            TypedNode::with_global_registry(node)
        })
        .collect();
    let (origin, observers) = match nodes.split_first() {
        Some(split) => split,
        None => bail!("no nodes started"),
    };

    let mut tasks = Vec::new();
    for observer in observers {
        let node_id = observer.node_id().clone();
        let mut orders =
            observer.on_registered_typed_event::<OrderPlaced>(TransformOptions::default())?;
        tasks.push(tokio::spawn(async move {
            while let Some(order) = orders.next().await {
                match order {
                    Ok(order) => {
                        info!(%node_id, order_id = %order.order_id, amount = order.amount, "order received");
                    }
                    Err(error) => warn!(%node_id, %error, "order stream failed"),
                }
            }
        }));
    }

    let Some(watcher) = observers.last() else {
        bail!("no observer nodes");
    };
    let watcher_id = watcher.node_id().clone();
    let mut everything = watcher.on_registered_events(
        TypeFilter::all().exclude(["order_placed"]),
        TransformOptions::default().on_error(|raw, error, context| {
            warn!(from_peer = %raw.from_peer, transformer = ?context.transformer, %error, "dropped event");
        }),
    );
    tasks.push(tokio::spawn(async move {
        while let Some(Ok(event)) = everything.next().await {
            if let Some(joined) = event.downcast_ref::<PeerJoined>() {
                info!(node_id = %watcher_id, peer = %joined.peer, "peer joined");
            }
        }
    }));

    let mut receipts = watcher.on_any_typed_event();
    tasks.push(tokio::spawn(async move {
        while let Some(receipt) = receipts.next().await {
            info!(
                type_id = %receipt.envelope.event_type,
                version = %receipt.envelope.version,
                from_peer = %receipt.from_peer,
                "envelope.received"
            );
        }
    }));

    let joins: Vec<Arc<dyn TypedEvent>> = nodes
        .iter()
        .map(|node| {
            Arc::new(PeerJoined {
                peer: node.node_id().to_string(),
            }) as Arc<dyn TypedEvent>
        })
        .collect();
    let created = origin.broadcast_typed_events(&joins).await?;
    info!(count = created.len(), "membership announced");

    for index in 0..cli.orders {
        let order = OrderPlaced {
            order_id: format!("order-{index}"),
            amount: (index % 400) as i64 * 25 + 25,
        };
        let event = origin.broadcast_typed_event(&order).await?;
        info!(event_id = %event.id, order_id = %order.order_id, "order broadcast");
    }

    let rejected = OrderPlaced {
        order_id: String::new(),
        amount: 0,
    };
    if let Err(error) = origin.broadcast_typed_event(&rejected).await {
        info!(%error, "invalid order refused before reaching the node");
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    for task in tasks {
        task.abort();
        match task.await {
            Err(error) if !error.is_cancelled() => warn!(%error, "subscriber task stopped"),
            _ => {}
        }
    }

    Ok(())
}
