//! Event trait and related types for event sourcing.
//!
//! Events represent facts about things that have happened in the past and are
//! immutable. Every event kind carries a stable, versioned type name and can be
//! turned into a compact binary form with `bincode`.
//!
//! The binary form is not the wire format between peers (that is the
//! envelope, which is JSON). It is used where the engine needs a stable byte
//! representation of an event body, such as the last tie-break of canonical
//! ordering.
//!
//! # Example
//!
//! ```
//! use order_mesh_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum TicketEvent {
//!     Opened { title: String },
//!     Closed,
//! }
//!
//! impl Event for TicketEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             TicketEvent::Opened { .. } => "TicketOpened.v1",
//!             TicketEvent::Closed => "TicketClosed.v1",
//!         }
//!     }
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),
}

/// An immutable fact that can be folded into state.
///
/// # Event Naming Convention
///
/// `event_type()` returns a stable identifier that includes a version number,
/// for example `"OrderCreated.v1"`. Peers running different builds must agree
/// on these names.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` so logs can live behind shared
/// handles.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use order_mesh_core::event::Event;
    /// # use serde::{Serialize, Deserialize};
    /// # #[derive(Clone, Debug, Serialize, Deserialize)]
    /// # enum TicketEvent { Closed }
    /// # impl Event for TicketEvent {
    /// #     fn event_type(&self) -> &'static str { "TicketClosed.v1" }
    /// # }
    ///
    /// let bytes = TicketEvent::Closed.to_bytes().expect("serialization should succeed");
    /// assert!(!bytes.is_empty());
    /// ```
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum TestEvent {
        Created { id: String, value: i32 },
        Updated { id: String, new_value: i32 },
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "TestEvent.Created.v1",
                TestEvent::Updated { .. } => "TestEvent.Updated.v1",
            }
        }
    }

    #[test]
    fn event_type_returns_correct_identifier() {
        let event = TestEvent::Created {
            id: "test-1".to_string(),
            value: 42,
        };
        assert_eq!(event.event_type(), "TestEvent.Created.v1");
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn bytes_are_stable_for_equal_events() {
        let a = TestEvent::Updated {
            id: "test-1".to_string(),
            new_value: 7,
        };
        let b = a.clone();
        assert_eq!(
            a.to_bytes().expect("serialization should succeed"),
            b.to_bytes().expect("serialization should succeed")
        );
    }
}
