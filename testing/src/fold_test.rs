//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing folds with readable
//! Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // FoldTest is the natural name

use order_mesh_core::reducer::Reducer;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// The history given plus the events added with `when_event` are folded in
/// the order supplied, exactly as a canonical log would be.
///
/// # Example
///
/// ```
/// use order_mesh_replica::{OrderFields, OrderReducer};
/// use order_mesh_testing::{EventFactory, FoldTest};
///
/// let till = EventFactory::new("order-1", "till-1");
///
/// FoldTest::new(OrderReducer)
///     .given_events(vec![till.created(1, 0, OrderFields::empty().with_quantity(2))])
///     .when_event(till.modified(2, 1, OrderFields::empty().with_quantity(5)))
///     .then_state(|state| {
///         assert_eq!(state.quantity, Some(5));
///         assert_eq!(state.event_count, 2);
///     })
///     .run();
/// ```
pub struct FoldTest<R>
where
    R: Reducer,
{
    reducer: R,
    history: Vec<R::Event>,
    state_assertions: Vec<StateAssertion<R::State>>,
    expect_empty: bool,
}

impl<R> FoldTest<R>
where
    R: Reducer,
{
    /// Create a new fold test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            history: Vec::new(),
            state_assertions: Vec::new(),
            expect_empty: false,
        }
    }

    /// Set the prior history (Given)
    #[must_use]
    pub fn given_events(mut self, events: Vec<R::Event>) -> Self {
        self.history = events;
        self
    }

    /// Append an event to fold (When)
    #[must_use]
    pub fn when_event(mut self, event: R::Event) -> Self {
        self.history.push(event);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the fold to produce no state (Then)
    #[must_use]
    pub const fn then_empty(mut self) -> Self {
        self.expect_empty = true;
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the fold result does not match `then_empty`, or if any
    /// assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    pub fn run(self) {
        let folded = self.reducer.fold(&self.history);

        match (folded, self.expect_empty) {
            (None, true) => {},
            (Some(_), true) => panic!("Expected an empty fold, but a state was produced"),
            (None, false) => panic!("Fold produced no state; set events with given_events()"),
            (Some(state), false) => {
                for assertion in self.state_assertions {
                    assertion(&state);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Tally {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum Step {
        Increment,
        Decrement,
    }

    struct TallyReducer;

    impl Reducer for TallyReducer {
        type State = Tally;
        type Event = Step;

        fn init(&self, first: &Step) -> Tally {
            let mut state = Tally { count: 0 };
            self.apply(&mut state, first);
            state
        }

        fn apply(&self, state: &mut Tally, event: &Step) {
            match event {
                Step::Increment => state.count += 1,
                Step::Decrement => state.count -= 1,
            }
        }
    }

    #[test]
    fn folds_given_and_when() {
        FoldTest::new(TallyReducer)
            .given_events(vec![Step::Increment, Step::Increment])
            .when_event(Step::Decrement)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .run();
    }

    #[test]
    fn empty_history_can_be_expected() {
        FoldTest::new(TallyReducer).then_empty().run();
    }

    #[test]
    #[should_panic(expected = "Fold produced no state")]
    fn empty_history_fails_state_assertions() {
        FoldTest::new(TallyReducer)
            .then_state(|_| {})
            .run();
    }
}
