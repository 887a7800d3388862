//! Core domain types for replicated orders.
//!
//! An order's history is a set of [`OrderEvent`]s authored by one or more
//! devices. Each event carries a tagged [`EventPayload`]; the current
//! [`OrderState`] is derived from the history and never stored on its own.

use chrono::{DateTime, Utc};
use order_mesh_core::event::Event;
use order_mesh_core::identity::{DeviceId, OrderId, Sequence};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single line item in an order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Product identifier
    pub product_id: String,
    /// Product name for display
    pub name: String,
    /// Quantity ordered
    pub quantity: u32,
    /// Price per unit in cents
    pub unit_price: Money,
}

impl LineItem {
    /// Creates a new line item
    #[must_use]
    pub const fn new(product_id: String, name: String, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            name,
            quantity,
            unit_price,
        }
    }

    /// Calculates the total price for this line item
    #[must_use]
    pub const fn total(&self) -> Money {
        Money(self.unit_price.0.saturating_mul(self.quantity as i64))
    }
}

/// Money amount in cents (to avoid floating point issues)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new money amount from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a new money amount from whole currency units (converted to cents)
    #[must_use]
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// Returns the value in cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value in dollars (as floating point)
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // i64 to f64 precision loss is acceptable for display
    pub fn dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.dollars())
    }
}

/// Order fields carried by `Created` and `Modified` events.
///
/// Every field is optional. A field that is `None` is simply not written by
/// the event; a field that is `Some` overwrites the running value when the
/// event is folded (last writer wins).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderFields {
    /// Display name of the order (table, customer, ...)
    pub name: Option<String>,
    /// Headline quantity
    pub quantity: Option<u32>,
    /// Full list of line items; replaces the previous list as a whole
    pub items: Option<Vec<LineItem>>,
    /// Free-form note
    pub note: Option<String>,
}

impl OrderFields {
    /// Fields with nothing set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            name: None,
            quantity: None,
            items: None,
            note: None,
        }
    }

    /// Set the order name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the headline quantity.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Replace the line items.
    #[must_use]
    pub fn with_items(mut self, items: Vec<LineItem>) -> Self {
        self.items = Some(items);
        self
    }

    /// Set the note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// True if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none() && self.items.is_none() && self.note.is_none()
    }
}

/// The closed set of event kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// The order was created
    Created,
    /// One or more fields changed
    Modified,
    /// The order was completed
    Completed,
    /// The order was cancelled
    Cancelled,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Kind-specific event body.
///
/// On the wire this is `{"kind": "CREATED", "data": {...}}`; `COMPLETED`
/// carries no data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Initial fields of a new order
    Created(OrderFields),
    /// Fields overwritten by an update
    Modified(OrderFields),
    /// Terminal: order fulfilled
    Completed,
    /// Terminal: order abandoned
    Cancelled {
        /// Why the order was cancelled
        reason: Option<String>,
    },
}

impl EventPayload {
    /// The discriminant of this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Modified(_) => EventKind::Modified,
            Self::Completed => EventKind::Completed,
            Self::Cancelled { .. } => EventKind::Cancelled,
        }
    }

    /// Field values written by this payload, if any.
    #[must_use]
    pub const fn fields(&self) -> Option<&OrderFields> {
        match self {
            Self::Created(fields) | Self::Modified(fields) => Some(fields),
            Self::Completed | Self::Cancelled { .. } => None,
        }
    }
}

impl Event for EventPayload {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => "OrderCreated.v1",
            Self::Modified(_) => "OrderModified.v1",
            Self::Completed => "OrderCompleted.v1",
            Self::Cancelled { .. } => "OrderCancelled.v1",
        }
    }
}

/// Identity of an event: re-delivery of the same identity is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    /// Order the event belongs to
    pub order_id: OrderId,
    /// Authoring device
    pub device_id: DeviceId,
    /// Sequence assigned by the authoring device
    pub sequence: Sequence,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.order_id, self.device_id, self.sequence)
    }
}

/// An immutable fact about one order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    /// Order this event belongs to
    pub order_id: OrderId,
    /// Peer that authored the event
    pub device_id: DeviceId,
    /// Sequence assigned by the authoring device, unique per (device, order)
    pub sequence: Sequence,
    /// Authoring time; first key of canonical ordering
    pub timestamp: DateTime<Utc>,
    /// Kind-specific body
    pub payload: EventPayload,
}

impl OrderEvent {
    /// Creates a new event
    #[must_use]
    pub const fn new(
        order_id: OrderId,
        device_id: DeviceId,
        sequence: Sequence,
        timestamp: DateTime<Utc>,
        payload: EventPayload,
    ) -> Self {
        Self {
            order_id,
            device_id,
            sequence,
            timestamp,
            payload,
        }
    }

    /// The identity of this event.
    #[must_use]
    pub fn id(&self) -> EventId {
        EventId {
            order_id: self.order_id.clone(),
            device_id: self.device_id.clone(),
            sequence: self.sequence,
        }
    }

    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Lifecycle status of an order
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Open and editable
    Active,
    /// Fulfilled
    Completed,
    /// Abandoned
    Cancelled,
    /// Placeholder for an order with no known events
    Unknown,
}

impl OrderStatus {
    /// True for `Completed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Materialized view of one order.
///
/// Produced by folding the order's event log in canonical order; fully
/// recomputable from the log alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    /// Order identifier
    pub order_id: OrderId,
    /// Current lifecycle status
    pub status: OrderStatus,
    /// Display name
    pub name: Option<String>,
    /// Headline quantity
    pub quantity: Option<u32>,
    /// Current line items
    pub items: Vec<LineItem>,
    /// Free-form note
    pub note: Option<String>,
    /// Sum of line item totals
    pub total: Money,
    /// Device that authored the canonically first event
    pub created_by: Option<DeviceId>,
    /// Timestamp of the canonically first event
    pub created_at: Option<DateTime<Utc>>,
    /// Timestamp of the canonically last event
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of events folded
    pub event_count: usize,
    /// Reason given by the winning cancellation, if cancelled
    pub cancel_reason: Option<String>,
    /// True when the log did not start with a `Created` event and creation
    /// was synthesized from the first event
    pub synthesized_creation: bool,
}

impl OrderState {
    /// Fresh state for an order, before any field is written.
    #[must_use]
    pub const fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: OrderStatus::Active,
            name: None,
            quantity: None,
            items: Vec::new(),
            note: None,
            total: Money::from_cents(0),
            created_by: None,
            created_at: None,
            updated_at: None,
            event_count: 0,
            cancel_reason: None,
            synthesized_creation: false,
        }
    }

    /// Placeholder shown for an order the engine has no events for.
    #[must_use]
    pub const fn unknown(order_id: OrderId) -> Self {
        let mut state = Self::new(order_id);
        state.status = OrderStatus::Unknown;
        state
    }

    /// Overwrite every field that `fields` sets.
    pub fn merge_fields(&mut self, fields: &OrderFields) {
        if let Some(name) = &fields.name {
            self.name = Some(name.clone());
        }
        if let Some(quantity) = fields.quantity {
            self.quantity = Some(quantity);
        }
        if let Some(items) = &fields.items {
            self.items.clone_from(items);
            self.total = Self::calculate_total(items);
        }
        if let Some(note) = &fields.note {
            self.note = Some(note.clone());
        }
    }

    /// True once the order is completed or cancelled.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn calculate_total(items: &[LineItem]) -> Money {
        let total_cents = items
            .iter()
            .fold(0_i64, |acc, item| acc.saturating_add(item.total().cents()));
        Money::from_cents(total_cents)
    }
}
