//! Order reducer folding a canonical event log into an [`OrderState`].
//!
//! Folding semantics:
//!
//! - The canonically first event seeds the state. A well-formed log starts
//!   with `Created`; any other first event synthesizes the creation from its
//!   own payload and flags the state with `synthesized_creation`.
//! - `Created` (when not first) and `Modified` overwrite every field they
//!   carry. Later canonical position wins.
//! - `Completed` and `Cancelled` set a terminal status; the later one in
//!   canonical order wins. Field values stay inspectable, and field updates
//!   that sort after a terminal event still apply without reopening the order.

use crate::types::{EventPayload, OrderEvent, OrderState, OrderStatus};
use order_mesh_core::identity::OrderId;
use order_mesh_core::reducer::Reducer;
use thiserror::Error;

/// Errors produced while folding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FoldError {
    /// Asked to fold an order with no events. The store never holds empty
    /// logs, so this means the caller queried an order it never recorded.
    #[error("No events to fold for order {0}")]
    EmptyLog(OrderId),
}

/// Reducer implementing the order folding rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderReducer;

impl OrderReducer {
    /// Creates a new order reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fold the canonical log of `order_id`.
    ///
    /// The events must already be deduplicated and in canonical order, which
    /// is what [`crate::log_store::EventLogStore`] hands out.
    ///
    /// # Errors
    ///
    /// Returns [`FoldError::EmptyLog`] if `events` is empty.
    pub fn fold_order<'a, I>(&self, order_id: &OrderId, events: I) -> Result<OrderState, FoldError>
    where
        I: IntoIterator<Item = &'a OrderEvent>,
    {
        self.fold(events)
            .ok_or_else(|| FoldError::EmptyLog(order_id.clone()))
    }

    fn terminate(state: &mut OrderState, payload: &EventPayload) {
        match payload {
            EventPayload::Completed => {
                state.status = OrderStatus::Completed;
                state.cancel_reason = None;
            },
            EventPayload::Cancelled { reason } => {
                state.status = OrderStatus::Cancelled;
                state.cancel_reason.clone_from(reason);
            },
            EventPayload::Created(_) | EventPayload::Modified(_) => {},
        }
    }
}

impl Reducer for OrderReducer {
    type State = OrderState;
    type Event = OrderEvent;

    fn init(&self, first: &OrderEvent) -> OrderState {
        let mut state = OrderState::new(first.order_id.clone());
        state.created_by = Some(first.device_id.clone());
        state.created_at = Some(first.timestamp);
        state.updated_at = Some(first.timestamp);
        state.event_count = 1;

        match &first.payload {
            EventPayload::Created(fields) => state.merge_fields(fields),
            EventPayload::Modified(fields) => {
                tracing::debug!(
                    order_id = %first.order_id,
                    device_id = %first.device_id,
                    sequence = %first.sequence,
                    "Log does not start with CREATED, synthesizing creation from MODIFIED"
                );
                state.synthesized_creation = true;
                state.merge_fields(fields);
            },
            payload @ (EventPayload::Completed | EventPayload::Cancelled { .. }) => {
                tracing::debug!(
                    order_id = %first.order_id,
                    kind = %payload.kind(),
                    "Log starts with a terminal event, synthesizing empty creation"
                );
                state.synthesized_creation = true;
                Self::terminate(&mut state, payload);
            },
        }

        state
    }

    fn apply(&self, state: &mut OrderState, event: &OrderEvent) {
        state.event_count += 1;
        state.updated_at = Some(event.timestamp);

        match &event.payload {
            EventPayload::Created(fields) | EventPayload::Modified(fields) => {
                state.merge_fields(fields);
            },
            payload @ (EventPayload::Completed | EventPayload::Cancelled { .. }) => {
                Self::terminate(state, payload);
            },
        }
    }
}
