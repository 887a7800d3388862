//! Per-order append-only event logs with identity-based deduplication.
//!
//! The log store is the ground truth of the engine. For every order it keeps
//! the set of events heard so far, indexed by **canonical order**:
//!
//! 1. `timestamp` ascending
//! 2. `device_id` ascending (lexicographic)
//! 3. `sequence` ascending
//! 4. the bincode bytes of the payload, so that the order is total
//!
//! Every peer holding the same event set computes the same canonical sequence,
//! which is what makes folding convergent.
//!
//! Membership only grows. Re-delivering an event whose identity
//! `(order_id, device_id, sequence)` is already present is a no-op.

use crate::types::OrderEvent;
use chrono::{DateTime, Utc};
use order_mesh_core::event::Event;
use order_mesh_core::identity::{DeviceId, OrderId, Sequence};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Sort key implementing canonical order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalKey {
    timestamp: DateTime<Utc>,
    device_id: DeviceId,
    sequence: Sequence,
    body: Vec<u8>,
}

impl CanonicalKey {
    /// Compute the canonical key of an event.
    #[must_use]
    pub fn of(event: &OrderEvent) -> Self {
        // bincode cannot fail on payload types; an empty body only weakens the
        // final tie-break, which identity dedup already makes unreachable.
        let body = event.payload.to_bytes().unwrap_or_default();
        Self {
            timestamp: event.timestamp,
            device_id: event.device_id.clone(),
            sequence: event.sequence,
            body,
        }
    }
}

/// Outcome of a [`EventLogStore::merge`] call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Events newly inserted
    pub added_count: usize,
    /// Events discarded because their identity was already present
    pub duplicate_count: usize,
    /// Events discarded because they belong to a different order
    pub rejected_count: usize,
}

impl MergeResult {
    /// True if the merge changed the log.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.added_count > 0
    }
}

/// The canonical, deduplicated event log of one order.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    by_key: BTreeMap<CanonicalKey, OrderEvent>,
    ids: HashMap<(DeviceId, Sequence), CanonicalKey>,
}

impl EventLog {
    /// Insert an event unless its identity is already present.
    ///
    /// Returns `true` if the event was added.
    pub fn insert(&mut self, event: OrderEvent) -> bool {
        let identity = (event.device_id.clone(), event.sequence);
        if let Some(existing) = self.ids.get(&identity) {
            if self.by_key.get(existing) != Some(&event) {
                tracing::warn!(
                    event_id = %event.id(),
                    event_type = event.payload.event_type(),
                    "Conflicting redelivery: identity already present with different content, keeping first copy"
                );
            }
            return false;
        }

        let key = CanonicalKey::of(&event);
        self.ids.insert(identity, key.clone());
        self.by_key.insert(key, event);
        true
    }

    /// Number of events in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// True if the log holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Events in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &OrderEvent> {
        self.by_key.values()
    }

    /// The canonically last event.
    #[must_use]
    pub fn last(&self) -> Option<&OrderEvent> {
        self.by_key.values().next_back()
    }

    /// Highest sequence `device_id` has authored in this log.
    #[must_use]
    pub fn max_sequence(&self, device_id: &DeviceId) -> Sequence {
        self.ids
            .keys()
            .filter(|(device, _)| device == device_id)
            .map(|(_, sequence)| *sequence)
            .max()
            .unwrap_or(Sequence::INITIAL)
    }
}

/// Mapping from order ID to its event log.
#[derive(Clone, Debug, Default)]
pub struct EventLogStore {
    logs: HashMap<OrderId, EventLog>,
}

impl EventLogStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `events` into the log of `order_id`.
    ///
    /// Events whose identity is already present are discarded, as are events
    /// addressed to another order. Never fails. Merging nothing does not
    /// create a log.
    pub fn merge<I>(&mut self, order_id: &OrderId, events: I) -> MergeResult
    where
        I: IntoIterator<Item = OrderEvent>,
    {
        let mut result = MergeResult::default();
        let mut accepted = Vec::new();

        for event in events {
            if event.order_id == *order_id {
                accepted.push(event);
            } else {
                tracing::warn!(
                    order_id = %order_id,
                    event_order_id = %event.order_id,
                    "Rejecting event addressed to a different order"
                );
                result.rejected_count += 1;
            }
        }

        if accepted.is_empty() {
            return result;
        }

        let log = self.logs.entry(order_id.clone()).or_default();
        for event in accepted {
            if log.insert(event) {
                result.added_count += 1;
            } else {
                result.duplicate_count += 1;
            }
        }

        tracing::trace!(
            order_id = %order_id,
            added = result.added_count,
            duplicates = result.duplicate_count,
            log_len = log.len(),
            "Merged events"
        );

        result
    }

    /// The full log of `order_id` in canonical order (empty if unknown).
    #[must_use]
    pub fn log_for(&self, order_id: &OrderId) -> Vec<OrderEvent> {
        self.logs
            .get(order_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Borrow the log of `order_id`.
    #[must_use]
    pub fn log(&self, order_id: &OrderId) -> Option<&EventLog> {
        self.logs.get(order_id)
    }

    /// Iterate over every order and its log, in no particular order.
    pub fn logs(&self) -> impl Iterator<Item = (&OrderId, &EventLog)> {
        self.logs.iter()
    }

    /// Snapshot of the known order identifiers.
    #[must_use]
    pub fn all_order_ids(&self) -> BTreeSet<OrderId> {
        self.logs.keys().cloned().collect()
    }

    /// The canonically last event of `order_id`.
    #[must_use]
    pub fn last_event(&self, order_id: &OrderId) -> Option<&OrderEvent> {
        self.logs.get(order_id).and_then(EventLog::last)
    }

    /// Number of events known for `order_id`.
    #[must_use]
    pub fn len(&self, order_id: &OrderId) -> usize {
        self.logs.get(order_id).map_or(0, EventLog::len)
    }

    /// Number of known orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.logs.len()
    }

    /// Number of events across all orders.
    #[must_use]
    pub fn total_events(&self) -> usize {
        self.logs.values().map(EventLog::len).sum()
    }

    /// Highest sequence `device_id` has authored for `order_id`.
    #[must_use]
    pub fn max_sequence(&self, order_id: &OrderId, device_id: &DeviceId) -> Sequence {
        self.logs
            .get(order_id)
            .map_or(Sequence::INITIAL, |log| log.max_sequence(device_id))
    }
}
