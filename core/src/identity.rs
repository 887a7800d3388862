//! Identifier types for orders, devices and per-device event sequences.
//!
//! An event's identity is the triple `(OrderId, DeviceId, Sequence)`: the
//! order it belongs to, the peer that authored it, and the sequence number
//! that peer assigned. Re-delivery of the same triple is a duplicate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid identifier: {0}")]
pub struct ParseIdError(String);

/// Opaque identifier of an order, stable for the order's lifetime.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty or blank strings)
/// - `From::from()` and `new()`: No validation (for trusted input)
///
/// Use `FromStr` when parsing external input.
///
/// # Examples
///
/// ```
/// use order_mesh_core::identity::OrderId;
///
/// let order_id = OrderId::new("order-12345");
/// assert_eq!(order_id.as_str(), "order-12345");
///
/// let parsed: OrderId = "order-abc".parse().unwrap();
/// assert_eq!(parsed, OrderId::new("order-abc"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new `OrderId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the order ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `OrderId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseIdError("Order ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of the peer device that authored an event.
///
/// Device IDs take part in canonical ordering, so their `Ord` is plain
/// lexicographic ordering of the underlying string.
///
/// # Examples
///
/// ```
/// use order_mesh_core::identity::DeviceId;
///
/// let a = DeviceId::new("device-a");
/// let b = DeviceId::new("device-b");
/// assert!(a < b);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new `DeviceId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the device ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseIdError("Device ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Per-device, per-order event sequence number.
///
/// Sequences are assigned by the authoring device and strictly increase for a
/// given `(DeviceId, OrderId)` pair. The first event a device authors for an
/// order carries sequence 1; [`Sequence::INITIAL`] (0) means "nothing issued
/// yet".
///
/// # Examples
///
/// ```
/// use order_mesh_core::identity::Sequence;
///
/// let s0 = Sequence::INITIAL;
/// let s1 = s0.next();
/// assert_eq!(s1, Sequence::new(1));
/// assert!(s1 > s0);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// Nothing issued yet.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Sequence` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the sequence number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next sequence (current + 1).
    ///
    /// Saturates at `u64::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The next sequence, or `None` once `u64::MAX` has been issued.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Sequence> for u64 {
    fn from(sequence: Sequence) -> Self {
        sequence.0
    }
}
