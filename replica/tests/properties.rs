//! Convergence properties over arbitrary histories and deliveries

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use order_mesh_core::{DeviceId, OrderId};
use order_mesh_replica::{
    Envelope, EnvelopeCodec, EventLogStore, HexJsonCodec, OrderEvent, OrderReducer,
    ReplicaConfig, ReplicatedCache,
};
use order_mesh_testing::properties::{arb_delivery, arb_history};
use order_mesh_testing::test_clock;
use proptest::prelude::*;
use std::sync::Arc;

fn order() -> OrderId {
    OrderId::new("order-p")
}

fn replica(device: &str) -> ReplicatedCache {
    ReplicatedCache::new(
        ReplicaConfig::new(DeviceId::new(device)),
        Arc::new(test_clock()),
    )
}

fn one_envelope_per_event(events: &[OrderEvent]) -> Vec<Vec<u8>> {
    events
        .iter()
        .map(|event| {
            HexJsonCodec
                .encode(&Envelope::new(event.order_id.clone(), vec![event.clone()]))
                .unwrap()
        })
        .collect()
}

proptest! {
    #[test]
    fn merging_twice_equals_merging_once(history in arb_history(order(), 12)) {
        let mut once = EventLogStore::new();
        once.merge(&order(), history.clone());

        let mut twice = EventLogStore::new();
        twice.merge(&order(), history.clone());
        let again = twice.merge(&order(), history.clone());

        prop_assert_eq!(again.added_count, 0);
        prop_assert_eq!(again.duplicate_count, history.len());
        prop_assert_eq!(once.log_for(&order()), twice.log_for(&order()));
    }

    #[test]
    fn delivery_order_and_duplication_do_not_matter((history, delivery) in arb_delivery(order(), 12)) {
        let mut reference = replica("reference");
        reference.ingest(one_envelope_per_event(&history));

        let mut shuffled = replica("shuffled");
        shuffled.ingest(one_envelope_per_event(&delivery));

        prop_assert_eq!(shuffled.log_for(&order()), reference.log_for(&order()));
        prop_assert_eq!(shuffled.snapshot_all(), reference.snapshot_all());
        prop_assert_eq!(shuffled.last_event(&order()), reference.last_event(&order()));
    }

    #[test]
    fn logs_only_grow(history in arb_history(order(), 12)) {
        let mut store = EventLogStore::new();
        let mut previous: Vec<OrderEvent> = Vec::new();

        for event in history {
            store.merge(&order(), vec![event]);
            let current = store.log_for(&order());
            prop_assert!(current.len() >= previous.len());
            prop_assert!(previous.iter().all(|e| current.contains(e)));
            previous = current;
        }
    }

    #[test]
    fn fold_is_deterministic(history in arb_history(order(), 12)) {
        let mut store = EventLogStore::new();
        store.merge(&order(), history);
        let log = store.log_for(&order());

        let first = OrderReducer.fold_order(&order(), &log).unwrap();
        let second = OrderReducer.fold_order(&order(), &log).unwrap();

        prop_assert_eq!(first.event_count, log.len());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn quantity_is_the_last_written_in_canonical_order(history in arb_history(order(), 12)) {
        let mut store = EventLogStore::new();
        store.merge(&order(), history);
        let log = store.log_for(&order());

        let expected = log
            .iter()
            .filter_map(|event| event.payload.fields().and_then(|fields| fields.quantity))
            .next_back();
        let state = OrderReducer.fold_order(&order(), &log).unwrap();

        prop_assert_eq!(state.quantity, expected);
    }
}
