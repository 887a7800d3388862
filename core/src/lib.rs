//! # Order Mesh Core
//!
//! Core traits and types for the order-mesh replicated order-state engine.
//!
//! Orders are synchronized peer-to-peer with no central server. Every peer
//! keeps the full event history of every order it has heard about and derives
//! the current state of an order by folding that history in a canonical order
//! that all peers agree on.
//!
//! ## Core Concepts
//!
//! - **Identity**: `OrderId`, `DeviceId` and `Sequence` newtypes
//! - **Event**: Immutable fact with a stable, versioned type name
//! - **Reducer**: Pure fold `(State, Event) → State` over a canonical sequence
//! - **Environment**: Injected dependencies (the `Clock`)
//!
//! ## Example
//!
//! ```
//! use order_mesh_core::reducer::Reducer;
//!
//! struct Sum;
//!
//! impl Reducer for Sum {
//!     type State = i64;
//!     type Event = i64;
//!
//!     fn init(&self, first: &i64) -> i64 {
//!         *first
//!     }
//!
//!     fn apply(&self, state: &mut i64, event: &i64) {
//!         *state += event;
//!     }
//! }
//!
//! assert_eq!(Sum.fold(&[1, 2, 3]), Some(6));
//! assert_eq!(Sum.fold(&[]), None);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod event;
pub mod identity;

pub use identity::{DeviceId, OrderId, ParseIdError, Sequence};

/// Reducer module - pure folds over event sequences
///
/// Reducers turn an ordered sequence of events into a state value. They are
/// deterministic: folding the same sequence any number of times yields the
/// same state. They never observe arrival order, only the sequence they are
/// handed.
pub mod reducer {
    /// The Reducer trait - folds a sequence of events into state
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state produced by the fold
    /// - `Event`: The event type consumed by the fold
    ///
    /// There is no empty state: the first event of a sequence seeds the state
    /// through [`Reducer::init`] and every later event goes through
    /// [`Reducer::apply`]. Folding an empty sequence therefore yields `None`.
    pub trait Reducer {
        /// The state type this reducer produces
        type State;

        /// The event type this reducer consumes
        type Event;

        /// Build the initial state from the first event of a sequence.
        fn init(&self, first: &Self::Event) -> Self::State;

        /// Apply one event to the running state.
        fn apply(&self, state: &mut Self::State, event: &Self::Event);

        /// Fold a whole sequence.
        ///
        /// Returns `None` if the sequence is empty.
        fn fold<'a, I>(&self, events: I) -> Option<Self::State>
        where
            I: IntoIterator<Item = &'a Self::Event>,
            Self::Event: 'a,
        {
            let mut iter = events.into_iter();
            let first = iter.next()?;
            let mut state = self.init(first);
            for event in iter {
                self.apply(&mut state, event);
            }
            Some(state)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies of the engine are abstracted behind traits and
/// injected at construction time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use order_mesh_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by the operating system.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
