//! The replicated cache: orchestrates the log store and the reducer.
//!
//! The cache is the only component that mutates the event logs. It
//!
//! - ingests inbound envelope batches from the transport,
//! - records events originated on this device and encodes them for sending,
//! - serves snapshots of every known order to the presentation layer.
//!
//! Batch processing never fails as a whole: a malformed envelope is counted,
//! logged and dropped while its siblings are merged.

use crate::config::ReplicaConfig;
use crate::envelope::{Envelope, EnvelopeCodec, EnvelopeError, split_batch_message};
use crate::log_store::{EventLog, EventLogStore, MergeResult};
use crate::metrics;
use crate::reducer::{FoldError, OrderReducer};
use crate::types::{EventPayload, OrderEvent, OrderFields, OrderState};
use chrono::{DateTime, Duration, Utc};
use order_mesh_core::environment::Clock;
use order_mesh_core::identity::{DeviceId, OrderId, Sequence};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Errors from snapshot queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Folding failed (strict mode only).
    #[error(transparent)]
    Fold(#[from] FoldError),
}

/// Errors from recording locally originated events.
#[derive(Error, Debug)]
pub enum RecordError {
    /// A local event's sequence does not move past the last one this device
    /// issued for the order, either because an explicit sequence lags or
    /// because `u64::MAX` was already issued. The local sequence generator is
    /// broken; callers should treat this as fatal.
    #[error(
        "Sequence {got} for order {order_id} on device {device_id} is not greater than last issued {last}"
    )]
    OutOfRangeSequence {
        /// Order being recorded
        order_id: OrderId,
        /// This device
        device_id: DeviceId,
        /// Last sequence issued for the order
        last: Sequence,
        /// Sequence the caller supplied, or `last` when none can follow it
        got: Sequence,
    },

    /// The order's last event sits at the end of the representable time
    /// range, so no local event can sort after it.
    #[error("No timestamp after {after} is representable for order {order_id}")]
    TimestampOverflow {
        /// Order being recorded
        order_id: OrderId,
        /// Timestamp the new event would have to follow
        after: DateTime<Utc>,
    },

    /// Nothing to record.
    #[error("No events to record for order {0}")]
    NoEvents(OrderId),

    /// The outbound envelope could not be encoded.
    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] EnvelopeError),
}

/// An event this device wants to originate.
///
/// The sequence is normally left to the cache; an explicit sequence is
/// validated against what this device already issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalEvent {
    /// What happened
    pub payload: EventPayload,
    /// Explicit sequence, if the caller manages its own generator
    pub sequence: Option<Sequence>,
}

impl LocalEvent {
    /// A local event with an automatically assigned sequence
    #[must_use]
    pub const fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            sequence: None,
        }
    }

    /// Use an explicit sequence
    #[must_use]
    pub const fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// Summary of one [`ReplicatedCache::ingest`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Raw envelopes in the batch
    pub envelopes: usize,
    /// Envelopes decoded and merged
    pub accepted: usize,
    /// Envelopes dropped as malformed
    pub malformed: usize,
    /// Events newly added across all orders
    pub events_added: usize,
    /// Events discarded as duplicates
    pub duplicates: usize,
    /// Orders whose log grew
    pub touched: BTreeSet<OrderId>,
}

impl IngestReport {
    /// True if any log grew, i.e. the presentation layer should refresh.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.events_added > 0
    }
}

/// Raw view of the cache for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDump {
    /// Device owning the cache
    pub device_id: DeviceId,
    /// Every known order with its canonical log
    pub orders: BTreeMap<OrderId, Vec<OrderEvent>>,
}

impl CacheDump {
    /// Pretty JSON rendering for a debug screen.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

struct MemoEntry {
    log_len: usize,
    state: OrderState,
}

/// The replicated order cache of one device.
///
/// Created empty; grows monotonically for its whole lifetime.
pub struct ReplicatedCache {
    config: ReplicaConfig,
    store: EventLogStore,
    reducer: OrderReducer,
    codec: Box<dyn EnvelopeCodec>,
    clock: Arc<dyn Clock>,
    issued: HashMap<OrderId, Sequence>,
    memo: Mutex<HashMap<OrderId, MemoEntry>>,
}

impl ReplicatedCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: ReplicaConfig, clock: Arc<dyn Clock>) -> Self {
        let codec = config.codec.codec();
        Self::with_codec(config, clock, codec)
    }

    /// Create an empty cache with a custom codec.
    #[must_use]
    pub fn with_codec(
        config: ReplicaConfig,
        clock: Arc<dyn Clock>,
        codec: Box<dyn EnvelopeCodec>,
    ) -> Self {
        tracing::debug!(
            device_id = %config.device_id,
            codec = codec.name(),
            strict_folds = config.strict_folds,
            "Created replicated cache"
        );
        Self {
            config,
            store: EventLogStore::new(),
            reducer: OrderReducer::new(),
            codec,
            clock,
            issued: HashMap::new(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// This device's identity.
    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        &self.config.device_id
    }

    /// The configuration this cache was built with.
    #[must_use]
    pub const fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Read access to the underlying log store.
    #[must_use]
    pub const fn store(&self) -> &EventLogStore {
        &self.store
    }

    /// Number of known orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.store.order_count()
    }

    /// Ingest a batch of raw envelopes from the transport.
    ///
    /// Each envelope is decoded independently; failures are counted and
    /// skipped. The whole batch is applied before this returns.
    pub fn ingest<I, B>(&mut self, batch: I) -> IngestReport
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut report = IngestReport::default();

        for raw in batch {
            report.envelopes += 1;
            let envelope = match self.decode(raw.as_ref()) {
                Ok(envelope) => envelope,
                Err(error) => {
                    report.malformed += 1;
                    ::metrics::counter!(metrics::ENVELOPES_MALFORMED).increment(1);
                    tracing::warn!(
                        device_id = %self.config.device_id,
                        error = %error,
                        "Dropping malformed envelope"
                    );
                    continue;
                },
            };

            report.accepted += 1;
            ::metrics::counter!(metrics::ENVELOPES_ACCEPTED).increment(1);

            let order_id = envelope.order_id.clone();
            let merged = self.merge_envelope(envelope);
            report.events_added += merged.added_count;
            report.duplicates += merged.duplicate_count;
            if merged.changed() {
                report.touched.insert(order_id);
            }
        }

        ::metrics::gauge!(metrics::ORDERS_KNOWN).set(self.store.order_count() as f64);

        tracing::debug!(
            device_id = %self.config.device_id,
            envelopes = report.envelopes,
            accepted = report.accepted,
            malformed = report.malformed,
            added = report.events_added,
            duplicates = report.duplicates,
            "Ingested batch"
        );

        report
    }

    /// Ingest a batch message as delivered by the mobile bridge: a JSON array
    /// of envelope strings.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MalformedBatch`] if the outer array cannot be
    /// parsed; nothing is ingested in that case. Malformed elements are
    /// handled like in [`ReplicatedCache::ingest`].
    pub fn ingest_message(&mut self, message: &str) -> Result<IngestReport, EnvelopeError> {
        let envelopes = split_batch_message(message).inspect_err(|error| {
            ::metrics::counter!(metrics::ENVELOPES_MALFORMED).increment(1);
            tracing::warn!(error = %error, "Dropping malformed batch message");
        })?;
        Ok(self.ingest(envelopes))
    }

    /// Merge an already decoded envelope.
    pub fn merge_envelope(&mut self, envelope: Envelope) -> MergeResult {
        let Envelope { order_id, events } = envelope;
        let merged = self.store.merge(&order_id, events);

        if merged.changed() {
            self.memo.lock().remove(&order_id);
            ::metrics::counter!(metrics::EVENTS_ADDED).increment(merged.added_count as u64);
        }
        if merged.duplicate_count > 0 {
            ::metrics::counter!(metrics::EVENTS_DUPLICATE)
                .increment(merged.duplicate_count as u64);
        }

        merged
    }

    /// Current state of every known order.
    #[must_use]
    pub fn snapshot_all(&self) -> BTreeMap<OrderId, OrderState> {
        self.store
            .logs()
            .map(|(order_id, log)| {
                let state = self.materialize(order_id, log).unwrap_or_else(|error| {
                    tracing::error!(order_id = %order_id, error = %error, "Fold failed");
                    OrderState::unknown(order_id.clone())
                });
                (order_id.clone(), state)
            })
            .collect()
    }

    /// Current state of one order.
    ///
    /// # Errors
    ///
    /// For an order with no events, returns [`CacheError::Fold`] in strict
    /// mode; otherwise the [`OrderState::unknown`] placeholder is returned.
    pub fn snapshot(&self, order_id: &OrderId) -> Result<OrderState, CacheError> {
        let result = match self.store.log(order_id) {
            Some(log) => self.materialize(order_id, log),
            None => Err(FoldError::EmptyLog(order_id.clone())),
        };

        match result {
            Ok(state) => Ok(state),
            Err(error) if self.config.strict_folds => Err(error.into()),
            Err(error) => {
                tracing::error!(
                    order_id = %order_id,
                    error = %error,
                    "Queried order has no events, returning placeholder"
                );
                Ok(OrderState::unknown(order_id.clone()))
            },
        }
    }

    /// The canonically last event of an order, used to build follow-up
    /// events.
    #[must_use]
    pub fn last_event(&self, order_id: &OrderId) -> Option<OrderEvent> {
        self.store.last_event(order_id).cloned()
    }

    /// The canonical log of one order.
    #[must_use]
    pub fn log_for(&self, order_id: &OrderId) -> Vec<OrderEvent> {
        self.store.log_for(order_id)
    }

    /// Raw view of every order and its canonical log.
    #[must_use]
    pub fn inspect(&self) -> CacheDump {
        let orders = self
            .store
            .all_order_ids()
            .into_iter()
            .map(|order_id| {
                let log = self.store.log_for(&order_id);
                (order_id, log)
            })
            .collect();

        CacheDump {
            device_id: self.config.device_id.clone(),
            orders,
        }
    }

    /// Record events originated on this device.
    ///
    /// Assigns or validates sequences, stamps the device ID and a timestamp
    /// that sorts after the order's current last event, merges the events so
    /// the local view updates immediately, and returns the encoded envelope
    /// for the transport to broadcast.
    ///
    /// Either every event is recorded or none is.
    ///
    /// # Errors
    ///
    /// - [`RecordError::NoEvents`] if `events` is empty
    /// - [`RecordError::OutOfRangeSequence`] if a sequence does not exceed the
    ///   last one issued
    /// - [`RecordError::TimestampOverflow`] if the order's last event leaves no
    ///   later timestamp
    /// - [`RecordError::Encode`] if the envelope cannot be encoded
    pub fn record_local_events(
        &mut self,
        order_id: &OrderId,
        events: Vec<LocalEvent>,
    ) -> Result<Vec<u8>, RecordError> {
        if events.is_empty() {
            return Err(RecordError::NoEvents(order_id.clone()));
        }

        let device_id = self.config.device_id.clone();
        let mut last = self.last_issued(order_id);
        let mut after = self.store.last_event(order_id).map(|event| event.timestamp);

        let mut stamped = Vec::with_capacity(events.len());
        for local in events {
            let next = match local.sequence {
                Some(got) => (got > last).then_some(got).ok_or(got),
                None => last.checked_next().ok_or(last),
            };
            let sequence = next.map_err(|got| {
                tracing::error!(
                    order_id = %order_id,
                    device_id = %device_id,
                    last = %last,
                    got = %got,
                    "Local sequence generator cannot advance"
                );
                RecordError::OutOfRangeSequence {
                    order_id: order_id.clone(),
                    device_id: device_id.clone(),
                    last,
                    got,
                }
            })?;
            last = sequence;

            let timestamp = self.local_timestamp(order_id, after)?;
            after = Some(timestamp);

            stamped.push(OrderEvent::new(
                order_id.clone(),
                device_id.clone(),
                sequence,
                timestamp,
                local.payload,
            ));
        }

        let envelope = Envelope::new(order_id.clone(), stamped);
        let encoded = self.codec.encode(&envelope)?;
        let merged = self.merge_envelope(envelope);
        self.issued.insert(order_id.clone(), last);

        tracing::info!(
            order_id = %order_id,
            device_id = %device_id,
            added = merged.added_count,
            last_sequence = %last,
            "Recorded local events"
        );

        Ok(encoded)
    }

    /// Originate a new order with a single `Created` event.
    ///
    /// # Errors
    ///
    /// See [`ReplicatedCache::record_local_events`].
    pub fn create_order(
        &mut self,
        order_id: &OrderId,
        fields: OrderFields,
    ) -> Result<Vec<u8>, RecordError> {
        self.record_local_events(order_id, vec![LocalEvent::new(EventPayload::Created(fields))])
    }

    /// Originate a `Modified` event that follows the order's current last
    /// event.
    ///
    /// # Errors
    ///
    /// See [`ReplicatedCache::record_local_events`].
    pub fn update_order(
        &mut self,
        order_id: &OrderId,
        fields: OrderFields,
    ) -> Result<Vec<u8>, RecordError> {
        self.record_local_events(order_id, vec![LocalEvent::new(EventPayload::Modified(fields))])
    }

    /// Envelopes carrying the full log of every known order, for periodic
    /// re-broadcast so peers that missed messages converge.
    ///
    /// Orders whose envelope cannot be encoded are skipped and logged.
    #[must_use]
    pub fn sync_envelopes(&self) -> Vec<Vec<u8>> {
        self.store
            .all_order_ids()
            .into_iter()
            .filter_map(|order_id| {
                let events = self.store.log_for(&order_id);
                let envelope = Envelope::new(order_id, events);
                match self.codec.encode(&envelope) {
                    Ok(bytes) => Some(bytes),
                    Err(error) => {
                        tracing::warn!(
                            order_id = %envelope.order_id,
                            error = %error,
                            "Skipping order in resync"
                        );
                        None
                    },
                }
            })
            .collect()
    }

    fn decode(&self, raw: &[u8]) -> Result<Envelope, EnvelopeError> {
        if raw.len() > self.config.max_envelope_bytes {
            return Err(EnvelopeError::TooLarge {
                size: raw.len(),
                limit: self.config.max_envelope_bytes,
            });
        }
        self.codec.decode(raw)
    }

    fn last_issued(&self, order_id: &OrderId) -> Sequence {
        let from_log = self.store.max_sequence(order_id, &self.config.device_id);
        let from_generator = self
            .issued
            .get(order_id)
            .copied()
            .unwrap_or(Sequence::INITIAL);
        from_log.max(from_generator)
    }

    /// `now`, bumped to sort strictly after `after` (the event this one
    /// follows) when the clock lags behind it.
    fn local_timestamp(
        &self,
        order_id: &OrderId,
        after: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, RecordError> {
        let now = self.clock.now();
        let Some(after) = after else {
            return Ok(now);
        };
        let floor = after
            .checked_add_signed(Duration::milliseconds(1))
            .ok_or_else(|| {
                tracing::error!(
                    order_id = %order_id,
                    after = %after,
                    "No representable timestamp after the order's last event"
                );
                RecordError::TimestampOverflow {
                    order_id: order_id.clone(),
                    after,
                }
            })?;
        Ok(now.max(floor))
    }

    fn materialize(&self, order_id: &OrderId, log: &EventLog) -> Result<OrderState, FoldError> {
        if self.config.memoize_snapshots {
            if let Some(entry) = self.memo.lock().get(order_id) {
                if entry.log_len == log.len() {
                    return Ok(entry.state.clone());
                }
            }
        }

        let state = self.reducer.fold_order(order_id, log.iter())?;
        ::metrics::counter!(metrics::SNAPSHOTS_REFOLDED).increment(1);

        if self.config.memoize_snapshots {
            self.memo.lock().insert(
                order_id.clone(),
                MemoEntry {
                    log_len: log.len(),
                    state: state.clone(),
                },
            );
        }

        Ok(state)
    }
}

impl std::fmt::Debug for ReplicatedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedCache")
            .field("device_id", &self.config.device_id)
            .field("codec", &self.codec.name())
            .field("orders", &self.store.order_count())
            .field("events", &self.store.total_events())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::envelope::{CodecKind, JsonCodec};
    use crate::types::OrderStatus;
    use chrono::TimeZone;

    struct FrozenClock(DateTime<Utc>);

    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_735_689_600, 0).unwrap()
    }

    fn cache(device: &str) -> ReplicatedCache {
        ReplicatedCache::new(
            ReplicaConfig::new(DeviceId::new(device)).with_codec(CodecKind::Json),
            Arc::new(FrozenClock(t0())),
        )
    }

    fn raw(order: &str, device: &str, seq: u64, payload: EventPayload) -> Vec<u8> {
        let event = OrderEvent::new(
            OrderId::new(order),
            DeviceId::new(device),
            Sequence::new(seq),
            t0(),
            payload,
        );
        JsonCodec
            .encode(&Envelope::new(OrderId::new(order), vec![event]))
            .unwrap()
    }

    #[test]
    fn ingest_reports_added_and_duplicates() {
        let mut cache = cache("local");
        let envelope = raw("o-1", "D1", 1, EventPayload::Created(OrderFields::empty()));

        let first = cache.ingest([envelope.clone()]);
        let second = cache.ingest([envelope]);

        assert_eq!(first.events_added, 1);
        assert!(first.changed());
        assert_eq!(second.events_added, 0);
        assert_eq!(second.duplicates, 1);
        assert!(!second.changed());
        assert!(second.touched.is_empty());
    }

    #[test]
    fn oversized_envelopes_are_malformed() {
        let mut cache = ReplicatedCache::new(
            ReplicaConfig::new(DeviceId::new("local"))
                .with_codec(CodecKind::Json)
                .with_max_envelope_bytes(8),
            Arc::new(FrozenClock(t0())),
        );

        let report = cache.ingest([raw("o-1", "D1", 1, EventPayload::Completed)]);

        assert_eq!(report.malformed, 1);
        assert_eq!(cache.order_count(), 0);
    }

    #[test]
    fn local_events_get_increasing_sequences_and_timestamps() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");

        cache
            .create_order(&order, OrderFields::empty().with_quantity(1))
            .unwrap();
        cache
            .update_order(&order, OrderFields::empty().with_quantity(2))
            .unwrap();

        let log = cache.log_for(&order);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sequence, Sequence::new(1));
        assert_eq!(log[1].sequence, Sequence::new(2));
        assert!(log[1].timestamp > log[0].timestamp);
        assert_eq!(cache.snapshot(&order).unwrap().quantity, Some(2));
    }

    #[test]
    fn local_update_sorts_after_a_peer_event_from_the_future() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");
        let ahead = t0() + Duration::hours(1);
        let peer_event = OrderEvent::new(
            order.clone(),
            DeviceId::new("zz-peer"),
            Sequence::new(1),
            ahead,
            EventPayload::Created(OrderFields::empty().with_quantity(1)),
        );
        cache.merge_envelope(Envelope::new(order.clone(), vec![peer_event]));

        cache
            .update_order(&order, OrderFields::empty().with_quantity(3))
            .unwrap();

        let last = cache.last_event(&order).unwrap();
        assert_eq!(last.device_id, DeviceId::new("local"));
        assert!(last.timestamp > ahead);
        assert_eq!(cache.snapshot(&order).unwrap().quantity, Some(3));
    }

    #[test]
    fn explicit_sequence_must_advance() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");
        cache.create_order(&order, OrderFields::empty()).unwrap();

        let err = cache
            .record_local_events(
                &order,
                vec![
                    LocalEvent::new(EventPayload::Modified(OrderFields::empty().with_quantity(4)))
                        .with_sequence(Sequence::new(1)),
                ],
            )
            .unwrap_err();

        assert!(matches!(
            err,
            RecordError::OutOfRangeSequence { last, got, .. }
                if last == Sequence::new(1) && got == Sequence::new(1)
        ));
        assert_eq!(cache.log_for(&order).len(), 1);
    }

    #[test]
    fn failed_batch_records_nothing() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");

        let result = cache.record_local_events(
            &order,
            vec![
                LocalEvent::new(EventPayload::Created(OrderFields::empty())).with_sequence(Sequence::new(5)),
                LocalEvent::new(EventPayload::Completed).with_sequence(Sequence::new(5)),
            ],
        );

        assert!(result.is_err());
        assert_eq!(cache.order_count(), 0);
    }

    #[test]
    fn explicit_sequence_may_skip_ahead() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");

        cache
            .record_local_events(
                &order,
                vec![LocalEvent::new(EventPayload::Created(OrderFields::empty()))
                    .with_sequence(Sequence::new(10))],
            )
            .unwrap();
        cache.update_order(&order, OrderFields::empty()).unwrap();

        let sequences: Vec<u64> = cache
            .log_for(&order)
            .iter()
            .map(|e| e.sequence.value())
            .collect();
        assert_eq!(sequences, vec![10, 11]);
    }

    #[test]
    fn sequences_continue_after_own_events_echo_back() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");
        cache.ingest([raw("o-1", "local", 7, EventPayload::Created(OrderFields::empty()))]);

        cache.update_order(&order, OrderFields::empty()).unwrap();

        assert_eq!(cache.last_event(&order).unwrap().sequence, Sequence::new(8));
    }

    #[test]
    fn sequence_exhaustion_is_rejected_not_dropped() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");
        cache
            .record_local_events(
                &order,
                vec![LocalEvent::new(EventPayload::Created(OrderFields::empty()))
                    .with_sequence(Sequence::new(u64::MAX))],
            )
            .unwrap();

        let err = cache
            .update_order(&order, OrderFields::empty().with_quantity(9))
            .unwrap_err();

        assert!(matches!(
            err,
            RecordError::OutOfRangeSequence { last, got, .. }
                if last == Sequence::new(u64::MAX) && got == Sequence::new(u64::MAX)
        ));
        assert_eq!(cache.log_for(&order).len(), 1);
        assert_eq!(cache.snapshot(&order).unwrap().quantity, None);
    }

    #[test]
    fn peer_event_at_end_of_time_does_not_panic_local_update() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");
        let last_instant = DateTime::<Utc>::MAX_UTC;
        let peer_event = OrderEvent::new(
            order.clone(),
            DeviceId::new("peer"),
            Sequence::new(1),
            last_instant,
            EventPayload::Created(OrderFields::empty().with_quantity(1)),
        );
        let raw = JsonCodec
            .encode(&Envelope::new(order.clone(), vec![peer_event]))
            .unwrap();
        let report = cache.ingest([raw]);
        assert_eq!(report.events_added, 1);

        let err = cache
            .update_order(&order, OrderFields::empty().with_quantity(2))
            .unwrap_err();

        assert!(matches!(
            err,
            RecordError::TimestampOverflow { after, .. } if after == last_instant
        ));
        assert_eq!(cache.log_for(&order).len(), 1);
        assert_eq!(cache.snapshot(&order).unwrap().quantity, Some(1));
    }

    #[test]
    fn empty_local_batch_is_rejected() {
        let mut cache = cache("local");
        let err = cache
            .record_local_events(&OrderId::new("o-1"), Vec::new())
            .unwrap_err();
        assert!(matches!(err, RecordError::NoEvents(_)));
    }

    #[test]
    fn strict_mode_fails_on_unknown_order() {
        let cache = ReplicatedCache::new(
            ReplicaConfig::new(DeviceId::new("local")).with_strict_folds(true),
            Arc::new(FrozenClock(t0())),
        );
        let result = cache.snapshot(&OrderId::new("ghost"));
        assert_eq!(
            result,
            Err(CacheError::Fold(FoldError::EmptyLog(OrderId::new("ghost"))))
        );
    }

    #[test]
    fn relaxed_mode_returns_placeholder() {
        let cache = ReplicatedCache::new(
            ReplicaConfig::new(DeviceId::new("local")).with_strict_folds(false),
            Arc::new(FrozenClock(t0())),
        );
        let state = cache.snapshot(&OrderId::new("ghost")).unwrap();
        assert_eq!(state.status, OrderStatus::Unknown);
        assert_eq!(cache.order_count(), 0);
    }

    #[test]
    fn memoized_snapshot_is_refreshed_after_growth() {
        let mut cache = cache("local");
        let order = OrderId::new("o-1");
        cache.create_order(&order, OrderFields::empty().with_quantity(1)).unwrap();

        let before = cache.snapshot_all();
        let again = cache.snapshot_all();
        assert_eq!(before, again);

        cache.update_order(&order, OrderFields::empty().with_quantity(9)).unwrap();
        assert_eq!(cache.snapshot_all()[&order].quantity, Some(9));
    }

    #[test]
    fn memoization_can_be_disabled() {
        let mut cache = ReplicatedCache::new(
            ReplicaConfig::new(DeviceId::new("local")).with_memoize_snapshots(false),
            Arc::new(FrozenClock(t0())),
        );
        let order = OrderId::new("o-1");
        cache.create_order(&order, OrderFields::empty().with_quantity(1)).unwrap();

        assert_eq!(cache.snapshot_all()[&order].quantity, Some(1));
        assert!(cache.memo.lock().is_empty());
    }

    #[test]
    fn inspect_lists_canonical_logs() {
        let mut cache = cache("local");
        cache.ingest([
            raw("o-2", "D1", 1, EventPayload::Created(OrderFields::empty())),
            raw("o-1", "D1", 1, EventPayload::Created(OrderFields::empty())),
        ]);

        let dump = cache.inspect();
        assert_eq!(dump.device_id, DeviceId::new("local"));
        assert_eq!(
            dump.orders.keys().cloned().collect::<Vec<_>>(),
            vec![OrderId::new("o-1"), OrderId::new("o-2")]
        );
        assert!(dump.to_json_pretty().unwrap().contains("\"orderId\""));
    }

    #[test]
    fn sync_envelopes_carry_full_logs() {
        let mut source = cache("a");
        let order = OrderId::new("o-1");
        source.create_order(&order, OrderFields::empty().with_quantity(1)).unwrap();
        source.update_order(&order, OrderFields::empty().with_quantity(2)).unwrap();

        let mut target = cache("b");
        let report = target.ingest(source.sync_envelopes());

        assert_eq!(report.events_added, 2);
        assert_eq!(target.snapshot_all(), source.snapshot_all());
    }

    #[test]
    fn ingest_message_splits_bridge_batches() {
        let mut cache = cache("local");
        let envelope = String::from_utf8(raw(
            "o-1",
            "D1",
            1,
            EventPayload::Created(OrderFields::empty()),
        ))
        .unwrap();
        let message = serde_json::to_string(&vec![envelope, "garbage".to_string()]).unwrap();

        let report = cache.ingest_message(&message).unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.malformed, 1);
        assert!(cache.ingest_message("not json").is_err());
    }
}
