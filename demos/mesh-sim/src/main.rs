//! Mesh simulation binary
//!
//! Runs several in-process replicas that edit a shared set of orders and
//! talk over a simulated broadcast that loses, duplicates and reorders
//! messages, then checks that every replica reports the same state.

mod config;

use anyhow::Context;
use config::SimConfig;
use order_mesh_core::environment::SystemClock;
use order_mesh_core::{DeviceId, OrderId};
use order_mesh_replica::envelope::join_batch_message;
use order_mesh_replica::metrics::register_metrics;
use order_mesh_replica::{
    EventPayload, LineItem, LocalEvent, Money, OrderFields, ReplicaConfig, ReplicatedCache,
    SharedReplica,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MENU: [(&str, &str, i64); 4] = [
    ("soup", "Soup of the day", 650),
    ("pie", "Apple pie", 450),
    ("tea", "Mint tea", 300),
    ("bread", "Sourdough", 250),
];

struct Peer {
    device_id: DeviceId,
    replica: SharedReplica,
}

#[derive(Debug, Default)]
struct NetStats {
    sent: usize,
    dropped: usize,
    duplicated: usize,
}

/// Simulated broadcast medium with one inbox per peer.
struct Network {
    rng: StdRng,
    drop_rate: f64,
    duplicate_rate: f64,
    inboxes: Vec<Vec<Vec<u8>>>,
    stats: NetStats,
}

impl Network {
    fn new(peers: usize, config: &SimConfig, rng: StdRng) -> Self {
        Self {
            rng,
            drop_rate: config.drop_rate,
            duplicate_rate: config.duplicate_rate,
            inboxes: vec![Vec::new(); peers],
            stats: NetStats::default(),
        }
    }

    /// Queue `envelope` for every peer except the sender.
    fn broadcast(&mut self, from: usize, envelope: &[u8], lossy: bool) {
        for (to, inbox) in self.inboxes.iter_mut().enumerate() {
            if to == from {
                continue;
            }
            self.stats.sent += 1;
            if lossy && self.rng.gen_bool(self.drop_rate) {
                self.stats.dropped += 1;
                continue;
            }
            inbox.push(envelope.to_vec());
            if lossy && self.rng.gen_bool(self.duplicate_rate) {
                self.stats.duplicated += 1;
                inbox.push(envelope.to_vec());
            }
        }
    }

    /// Take every inbox, shuffled.
    fn drain(&mut self) -> Vec<Vec<Vec<u8>>> {
        let mut drained: Vec<_> = self.inboxes.iter_mut().map(std::mem::take).collect();
        for inbox in &mut drained {
            inbox.shuffle(&mut self.rng);
        }
        drained
    }
}

/// Deliver pending messages to all peers concurrently, one bridge batch
/// message per peer.
async fn deliver(peers: &[Peer], network: &mut Network) -> anyhow::Result<usize> {
    let mut tasks = Vec::new();
    for (peer, inbox) in peers.iter().zip(network.drain()) {
        if inbox.is_empty() {
            continue;
        }
        let message = join_batch_message(&inbox)?;
        let replica = peer.replica.clone();
        tasks.push(tokio::spawn(async move { replica.ingest_message(&message).await }));
    }

    let mut added = 0;
    for task in tasks {
        let report = task.await.context("delivery task failed")??;
        added += report.events_added;
    }
    Ok(added)
}

fn random_fields(rng: &mut StdRng) -> OrderFields {
    let mut fields = OrderFields::empty();
    if rng.gen_bool(0.5) {
        fields = fields.with_quantity(rng.gen_range(1..=6));
    }
    if rng.gen_bool(0.3) {
        fields = fields.with_name(format!("Table {}", rng.gen_range(1..=12)));
    }
    if rng.gen_bool(0.4) {
        let count = rng.gen_range(1..=3);
        let chosen: Vec<_> = MENU.choose_multiple(rng, count).copied().collect();
        let items = chosen
            .into_iter()
            .map(|(id, name, cents)| {
                LineItem::new(
                    id.to_string(),
                    name.to_string(),
                    rng.gen_range(1..=3),
                    Money::from_cents(cents),
                )
            })
            .collect();
        fields = fields.with_items(items);
    }
    if fields.is_empty() || rng.gen_bool(0.2) {
        fields = fields.with_note(format!("edit {}", rng.gen_range(100..1000)));
    }
    fields
}

/// Perform one local edit on `order_id` and return the outbound envelope.
async fn local_edit(rng: &mut StdRng, peer: &Peer, order_id: &OrderId) -> anyhow::Result<Vec<u8>> {
    let payload = match peer.replica.last_event(order_id).await {
        None => EventPayload::Created(random_fields(rng)),
        Some(last) => {
            tracing::debug!(
                device_id = %peer.device_id,
                order_id = %order_id,
                after_device = %last.device_id,
                after_sequence = %last.sequence,
                "Building follow-up event"
            );
            let terminal = peer.replica.snapshot(order_id).await?.is_terminal();
            match rng.gen_range(0..10) {
                0 if !terminal => EventPayload::Completed,
                1 if !terminal => EventPayload::Cancelled {
                    reason: Some("customer left".to_string()),
                },
                _ => EventPayload::Modified(random_fields(rng)),
            }
        },
    };

    let envelope = peer
        .replica
        .record_local_events(order_id, vec![LocalEvent::new(payload)])
        .await?;
    Ok(envelope)
}

async fn converged(peers: &[Peer]) -> bool {
    let Some((first, rest)) = peers.split_first() else {
        return true;
    };
    let expected = first.replica.snapshot_all().await;
    for peer in rest {
        if peer.replica.snapshot_all().await != expected {
            return false;
        }
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mesh_sim=info,order_mesh_replica=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    register_metrics();

    let config = SimConfig::from_env();
    let base = ReplicaConfig::from_env().context("invalid ORDER_MESH_* configuration")?;
    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    tracing::info!(
        peers = config.peers,
        orders = config.orders,
        steps = config.steps,
        drop_rate = config.drop_rate,
        duplicate_rate = config.duplicate_rate,
        seed,
        codec = %base.codec,
        "Starting mesh simulation"
    );

    let peers: Vec<Peer> = (0..config.peers)
        .map(|i| {
            let device_id = DeviceId::new(format!("peer-{i}"));
            let replica_config = ReplicaConfig {
                device_id: device_id.clone(),
                ..base.clone()
            };
            Peer {
                device_id,
                replica: SharedReplica::new(ReplicatedCache::new(
                    replica_config,
                    Arc::new(SystemClock),
                )),
            }
        })
        .collect();
    let orders: Vec<OrderId> = (1..=config.orders.max(1))
        .map(|n| OrderId::new(format!("order-{n}")))
        .collect();

    let mut network = Network::new(peers.len(), &config, StdRng::seed_from_u64(seed ^ 0x5eed));

    println!("=== Mesh Simulation: {} peers, seed {seed} ===\n", peers.len());

    // Edit phase: every step one peer edits one order; messages are delivered
    // in bursts so that peers frequently act on stale views.
    for step in 0..config.steps {
        let from = rng.gen_range(0..peers.len());
        let order_id = &orders[rng.gen_range(0..orders.len())];
        let envelope = local_edit(&mut rng, &peers[from], order_id).await?;
        network.broadcast(from, &envelope, true);

        if step % 3 == 2 {
            deliver(&peers, &mut network).await?;
        }
    }
    deliver(&peers, &mut network).await?;

    println!(
        "Edits done. Network: {} sent, {} dropped, {} duplicated",
        network.stats.sent, network.stats.dropped, network.stats.duplicated
    );
    println!("Converged before resync: {}\n", converged(&peers).await);

    // Anti-entropy: lossy rounds, then one reliable repair round.
    for round in 0..=config.resync_rounds {
        let lossy = round < config.resync_rounds;
        for (from, peer) in peers.iter().enumerate() {
            for envelope in peer.replica.sync_envelopes().await {
                network.broadcast(from, &envelope, lossy);
            }
        }
        let added = deliver(&peers, &mut network).await?;
        tracing::info!(round, lossy, added, "Resync round complete");
        if added == 0 && converged(&peers).await {
            break;
        }
    }

    let snapshots = peers[0].replica.snapshot_all().await;
    println!("{:<10} {:<10} {:<10} {:>4} {:>9} {:>7}", "order", "status", "name", "qty", "total", "events");
    for (order_id, state) in &snapshots {
        println!(
            "{:<10} {:<10} {:<10} {:>4} {:>9} {:>7}",
            order_id.as_str(),
            format!("{:?}", state.status).to_lowercase(),
            state.name.as_deref().unwrap_or("-"),
            state.quantity.map_or_else(|| "-".to_string(), |q| q.to_string()),
            state.total.to_string(),
            state.event_count,
        );
    }

    if config.show_cache {
        for peer in &peers {
            println!("\n--- cache of {} ---", peer.device_id);
            println!("{}", peer.replica.inspect().await.to_json_pretty()?);
        }
    }

    if !converged(&peers).await {
        anyhow::bail!("replicas diverged after resync (seed {seed})");
    }

    println!("\nAll {} replicas report identical state.", peers.len());
    Ok(())
}
