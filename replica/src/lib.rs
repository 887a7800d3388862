//! # Order Mesh Replica
//!
//! Replicated order-state engine for peer devices that exchange order events
//! over an unreliable broadcast mesh.
//!
//! Each device keeps a per-order append-only event log. Peers broadcast
//! envelopes of events; receivers merge them idempotently and derive the
//! current state of each order by folding its log in canonical order. Any two
//! devices that have heard the same set of events report identical state,
//! regardless of arrival order, duplication or delay.
//!
//! ## Layers
//!
//! - [`log_store`]: ground truth, deduplicated canonical logs per order
//! - [`reducer`]: pure fold of a canonical log into an [`OrderState`]
//! - [`cache`]: orchestrates ingestion, local recording and snapshots
//! - [`envelope`]: transport units and their codecs
//! - [`shared`]: async handle for hosts that share one replica across tasks
//!
//! ## Example
//!
//! ```
//! use order_mesh_core::environment::SystemClock;
//! use order_mesh_replica::{OrderFields, ReplicaConfig, ReplicatedCache};
//! use order_mesh_core::{DeviceId, OrderId};
//! use std::sync::Arc;
//!
//! let mut till = ReplicatedCache::new(
//!     ReplicaConfig::new(DeviceId::new("till-1")),
//!     Arc::new(SystemClock),
//! );
//! let mut kitchen = ReplicatedCache::new(
//!     ReplicaConfig::new(DeviceId::new("kitchen")),
//!     Arc::new(SystemClock),
//! );
//!
//! let order = OrderId::new("order-42");
//! let outbound = till
//!     .create_order(&order, OrderFields::empty().with_name("Table 4").with_quantity(2))
//!     .unwrap();
//!
//! let report = kitchen.ingest([outbound]);
//! assert!(report.changed());
//! assert_eq!(kitchen.snapshot_all(), till.snapshot_all());
//! ```

pub mod cache;
pub mod config;
pub mod envelope;
pub mod log_store;
pub mod metrics;
pub mod reducer;
pub mod shared;
pub mod types;

pub use cache::{CacheDump, CacheError, IngestReport, LocalEvent, RecordError, ReplicatedCache};
pub use config::{ConfigError, ReplicaConfig};
pub use envelope::{CodecKind, Envelope, EnvelopeCodec, EnvelopeError, HexJsonCodec, JsonCodec};
pub use log_store::{CanonicalKey, EventLog, EventLogStore, MergeResult};
pub use reducer::{FoldError, OrderReducer};
pub use shared::SharedReplica;
pub use types::{
    EventId, EventKind, EventPayload, LineItem, Money, OrderEvent, OrderFields, OrderState,
    OrderStatus,
};
