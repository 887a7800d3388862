//! Metric names and descriptions.
//!
//! The engine only records through the `metrics` facade; installing an
//! exporter is up to the embedding application. Without a recorder every
//! call is a no-op.

use ::metrics::{describe_counter, describe_gauge};

/// Envelopes dropped because they could not be decoded or validated.
pub const ENVELOPES_MALFORMED: &str = "order_mesh.envelopes.malformed";

/// Envelopes successfully decoded and merged.
pub const ENVELOPES_ACCEPTED: &str = "order_mesh.envelopes.accepted";

/// Events newly added to a log.
pub const EVENTS_ADDED: &str = "order_mesh.events.added";

/// Events discarded as duplicates.
pub const EVENTS_DUPLICATE: &str = "order_mesh.events.duplicate";

/// Snapshots recomputed instead of served from the memo table.
pub const SNAPSHOTS_REFOLDED: &str = "order_mesh.snapshots.refolded";

/// Number of orders known to the replica.
pub const ORDERS_KNOWN: &str = "order_mesh.orders.known";

/// Register descriptions for all metrics with the installed recorder.
pub fn register_metrics() {
    describe_counter!(
        ENVELOPES_MALFORMED,
        "Envelopes dropped because they could not be decoded or validated"
    );
    describe_counter!(ENVELOPES_ACCEPTED, "Envelopes decoded and merged");
    describe_counter!(EVENTS_ADDED, "Events newly added to an order log");
    describe_counter!(EVENTS_DUPLICATE, "Events discarded as duplicates");
    describe_counter!(
        SNAPSHOTS_REFOLDED,
        "Order snapshots recomputed from the event log"
    );
    describe_gauge!(ORDERS_KNOWN, "Orders known to this replica");
}
