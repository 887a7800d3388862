//! # Order Mesh Testing
//!
//! Testing utilities and helpers for the order-mesh replicated engine.
//!
//! This crate provides:
//! - Deterministic clocks
//! - Event builders for hand-written histories
//! - A Given-When-Then tester for reducers
//! - proptest strategies for histories and their deliveries
//!
//! ## Example
//!
//! ```
//! use order_mesh_replica::{OrderFields, OrderReducer, OrderStatus};
//! use order_mesh_testing::{EventFactory, FoldTest};
//!
//! let till = EventFactory::new("order-1", "till-1");
//!
//! FoldTest::new(OrderReducer)
//!     .given_events(vec![till.created(1, 0, OrderFields::empty().with_quantity(2))])
//!     .when_event(till.completed(2, 5))
//!     .then_state(|state| assert_eq!(state.status, OrderStatus::Completed))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use order_mesh_core::environment::Clock;

pub mod fold_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use order_mesh_testing::mocks::FixedClock;
    /// use order_mesh_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every reading.
    ///
    /// Useful to give each locally recorded event a distinct, predictable
    /// timestamp.
    #[derive(Debug)]
    pub struct SteppingClock {
        start: DateTime<Utc>,
        step_millis: i64,
        ticks: AtomicI64,
    }

    impl SteppingClock {
        /// Clock starting at `start`, advancing `step_millis` per reading
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step_millis: i64) -> Self {
            Self {
                start,
                step_millis,
                ticks: AtomicI64::new(0),
            }
        }

        /// Number of readings so far
        #[must_use]
        pub fn readings(&self) -> i64 {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            self.start + chrono::Duration::milliseconds(tick.saturating_mul(self.step_millis))
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// The instant every helper in this crate measures offsets from
    /// (2025-01-01 00:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

/// Builders for hand-written event histories.
pub mod helpers {
    use super::mocks::epoch;
    use chrono::{DateTime, Duration, Utc};
    use order_mesh_core::identity::{DeviceId, OrderId, Sequence};
    use order_mesh_replica::{EventPayload, OrderEvent, OrderFields};

    /// Timestamp `secs` seconds after [`epoch`].
    #[must_use]
    pub fn at(secs: i64) -> DateTime<Utc> {
        epoch() + Duration::seconds(secs)
    }

    /// Builds events for one order as authored by one device.
    ///
    /// Timestamps are given as seconds after [`epoch`].
    #[derive(Debug, Clone)]
    pub struct EventFactory {
        order_id: OrderId,
        device_id: DeviceId,
    }

    impl EventFactory {
        /// Factory for events of `order_id` authored by `device_id`
        #[must_use]
        pub fn new(order_id: impl Into<String>, device_id: impl Into<String>) -> Self {
            Self {
                order_id: OrderId::new(order_id),
                device_id: DeviceId::new(device_id),
            }
        }

        /// The order this factory builds events for
        #[must_use]
        pub const fn order_id(&self) -> &OrderId {
            &self.order_id
        }

        /// Same order, different author
        #[must_use]
        pub fn on_device(&self, device_id: impl Into<String>) -> Self {
            Self {
                order_id: self.order_id.clone(),
                device_id: DeviceId::new(device_id),
            }
        }

        /// Event with an arbitrary payload
        #[must_use]
        pub fn event(&self, sequence: u64, secs: i64, payload: EventPayload) -> OrderEvent {
            OrderEvent::new(
                self.order_id.clone(),
                self.device_id.clone(),
                Sequence::new(sequence),
                at(secs),
                payload,
            )
        }

        /// `Created` event
        #[must_use]
        pub fn created(&self, sequence: u64, secs: i64, fields: OrderFields) -> OrderEvent {
            self.event(sequence, secs, EventPayload::Created(fields))
        }

        /// `Modified` event
        #[must_use]
        pub fn modified(&self, sequence: u64, secs: i64, fields: OrderFields) -> OrderEvent {
            self.event(sequence, secs, EventPayload::Modified(fields))
        }

        /// `Completed` event
        #[must_use]
        pub fn completed(&self, sequence: u64, secs: i64) -> OrderEvent {
            self.event(sequence, secs, EventPayload::Completed)
        }

        /// `Cancelled` event
        #[must_use]
        pub fn cancelled(&self, sequence: u64, secs: i64, reason: Option<&str>) -> OrderEvent {
            self.event(sequence, secs, EventPayload::Cancelled {
                reason: reason.map(str::to_string),
            })
        }
    }
}

/// Property-based testing utilities using proptest.
///
/// Histories use few devices and coarse timestamps on purpose so that
/// timestamp and device ties are common and the full tie-break chain gets
/// exercised.
pub mod properties {
    use super::helpers::at;
    use order_mesh_core::identity::{DeviceId, OrderId, Sequence};
    use order_mesh_replica::{EventPayload, LineItem, Money, OrderEvent, OrderFields};
    use proptest::collection::vec;
    use proptest::option;
    use proptest::prelude::*;
    use std::collections::HashSet;

    /// Devices histories are drawn from
    pub const DEVICES: [&str; 3] = ["D1", "D2", "D3"];

    /// A line item
    pub fn arb_line_item() -> impl Strategy<Value = LineItem> {
        ("[a-c]", 1u32..4, 0i64..2_000).prop_map(|(product, quantity, cents)| {
            LineItem::new(
                format!("p-{product}"),
                format!("Product {product}"),
                quantity,
                Money::from_cents(cents),
            )
        })
    }

    /// A partial field update
    pub fn arb_fields() -> impl Strategy<Value = OrderFields> {
        (
            option::of("[A-Z][a-z]{0,6}"),
            option::of(1u32..10),
            option::of(vec(arb_line_item(), 0..3)),
            option::of("[a-z ]{0,10}"),
        )
            .prop_map(|(name, quantity, items, note)| OrderFields {
                name,
                quantity,
                items,
                note,
            })
    }

    /// Any payload
    pub fn arb_payload() -> impl Strategy<Value = EventPayload> {
        prop_oneof![
            3 => arb_fields().prop_map(EventPayload::Created),
            5 => arb_fields().prop_map(EventPayload::Modified),
            1 => Just(EventPayload::Completed),
            1 => option::of("[a-z]{1,8}").prop_map(|reason| EventPayload::Cancelled { reason }),
        ]
    }

    /// One event of `order_id`
    pub fn arb_event(order_id: OrderId) -> impl Strategy<Value = OrderEvent> {
        (0..DEVICES.len(), 1u64..20, 0i64..10, arb_payload()).prop_map(
            move |(device, sequence, secs, payload)| {
                OrderEvent::new(
                    order_id.clone(),
                    DeviceId::new(DEVICES[device]),
                    Sequence::new(sequence),
                    at(secs),
                    payload,
                )
            },
        )
    }

    /// A non-empty history of `order_id` with unique event identities
    pub fn arb_history(order_id: OrderId, max_len: usize) -> impl Strategy<Value = Vec<OrderEvent>> {
        vec(arb_event(order_id), 1..=max_len.max(1)).prop_map(|events| {
            let mut seen = HashSet::new();
            events
                .into_iter()
                .filter(|event| seen.insert((event.device_id.clone(), event.sequence)))
                .collect()
        })
    }

    /// A history together with an unreliable delivery of it: every event at
    /// least once, some twice, in arbitrary order.
    pub fn arb_delivery(
        order_id: OrderId,
        max_len: usize,
    ) -> impl Strategy<Value = (Vec<OrderEvent>, Vec<OrderEvent>)> {
        arb_history(order_id, max_len)
            .prop_flat_map(|history| {
                let len = history.len();
                (Just(history), vec(0..len, 0..=len))
            })
            .prop_flat_map(|(history, repeats)| {
                let mut delivery = history.clone();
                delivery.extend(repeats.into_iter().map(|i| history[i].clone()));
                (Just(history), Just(delivery).prop_shuffle())
            })
    }
}

// Re-export commonly used items
pub use fold_test::FoldTest;
pub use helpers::{EventFactory, at};
pub use mocks::{FixedClock, SteppingClock, epoch, test_clock};

/// Install a test subscriber that prints `tracing` output for failing tests.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
