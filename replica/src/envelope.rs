//! Envelopes: the unit of transmission between peers.
//!
//! An envelope carries one order's identifier plus the events being sent in
//! one transport message:
//!
//! ```json
//! {"orderId": "order-1", "events": [ ... ]}
//! ```
//!
//! How envelopes become bytes is a transport concern, abstracted behind
//! [`EnvelopeCodec`]. The mobile bridge sends hex-encoded JSON and hands
//! inbound messages back as a JSON array of plain-JSON envelope strings, so
//! [`HexJsonCodec`] encodes to hex and decodes either form.

use crate::types::OrderEvent;
use order_mesh_core::identity::OrderId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons an envelope cannot be used. All of them are recoverable: the
/// envelope is dropped and the rest of the batch proceeds.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Transport encoding (hex) is invalid.
    #[error("Invalid envelope encoding: {0}")]
    Encoding(String),

    /// JSON is invalid or a required field is missing.
    #[error("Invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope carries no events.
    #[error("Envelope for order {0} carries no events")]
    Empty(OrderId),

    /// An event inside the envelope belongs to another order.
    #[error("Envelope for order {envelope} contains an event for order {event}")]
    OrderMismatch {
        /// Order named by the envelope
        envelope: OrderId,
        /// Order named by the offending event
        event: OrderId,
    },

    /// The raw envelope exceeds the configured size limit.
    #[error("Envelope of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size of the raw envelope
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// The outer batch message is not a JSON array of strings.
    #[error("Malformed batch message: {0}")]
    MalformedBatch(String),
}

/// One order's events in one transport message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Order the events belong to
    pub order_id: OrderId,
    /// Events being transmitted
    pub events: Vec<OrderEvent>,
}

impl Envelope {
    /// Creates a new envelope
    #[must_use]
    pub const fn new(order_id: OrderId, events: Vec<OrderEvent>) -> Self {
        Self { order_id, events }
    }

    /// Check the structural rules that JSON decoding alone cannot express.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::Empty`] if there are no events
    /// - [`EnvelopeError::OrderMismatch`] if an event names another order
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.events.is_empty() {
            return Err(EnvelopeError::Empty(self.order_id.clone()));
        }
        if let Some(stray) = self.events.iter().find(|e| e.order_id != self.order_id) {
            return Err(EnvelopeError::OrderMismatch {
                envelope: self.order_id.clone(),
                event: stray.order_id.clone(),
            });
        }
        Ok(())
    }
}

/// Turns envelopes into transport bytes and back.
///
/// `decode` must fail explicitly on malformed input and must validate the
/// decoded envelope.
pub trait EnvelopeCodec: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Encode an envelope for transmission.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope cannot be serialized.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError>;

    /// Decode and validate a received envelope.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid encoding, invalid JSON, missing fields,
    /// or an envelope that fails [`Envelope::validate`].
    fn decode(&self, bytes: &[u8]) -> Result<Envelope, EnvelopeError>;
}

/// Plain JSON envelopes.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl EnvelopeCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(envelope)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
        let envelope: Envelope = serde_json::from_slice(bytes.trim_ascii())?;
        envelope.validate()?;
        Ok(envelope)
    }
}

/// Hex-encoded JSON envelopes, as sent by the mobile bridge.
///
/// Decoding also accepts bare JSON (input starting with `{`), which is how the
/// bridge delivers envelopes after stripping the hex transport encoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct HexJsonCodec;

impl EnvelopeCodec for HexJsonCodec {
    fn name(&self) -> &'static str {
        "hex-json"
    }

    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
        let json = serde_json::to_vec(envelope)?;
        Ok(hex::encode(json).into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
        let trimmed = bytes.trim_ascii();
        if trimmed.first() == Some(&b'{') {
            return JsonCodec.decode(trimmed);
        }
        let json = hex::decode(trimmed).map_err(|e| EnvelopeError::Encoding(e.to_string()))?;
        JsonCodec.decode(&json)
    }
}

/// Codec selection for configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    /// [`JsonCodec`]
    Json,
    /// [`HexJsonCodec`]
    #[default]
    HexJson,
}

impl CodecKind {
    /// Instantiate the selected codec.
    #[must_use]
    pub fn codec(self) -> Box<dyn EnvelopeCodec> {
        match self {
            Self::Json => Box::new(JsonCodec),
            Self::HexJson => Box::new(HexJsonCodec),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::HexJson => write!(f, "hex-json"),
        }
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "hex-json" | "hex" | "hexjson" => Ok(Self::HexJson),
            other => Err(format!("unknown codec '{other}', expected 'json' or 'hex-json'")),
        }
    }
}

/// Split a batch message from the mobile bridge into raw envelopes.
///
/// The bridge delivers a JSON array whose elements are envelope strings.
///
/// # Errors
///
/// Returns [`EnvelopeError::MalformedBatch`] if the message is not a JSON
/// array of strings.
pub fn split_batch_message(message: &str) -> Result<Vec<String>, EnvelopeError> {
    serde_json::from_str::<Vec<String>>(message)
        .map_err(|e| EnvelopeError::MalformedBatch(e.to_string()))
}

/// Build a batch message from raw envelopes (inverse of
/// [`split_batch_message`]); used by simulated transports.
///
/// # Errors
///
/// Returns [`EnvelopeError::MalformedBatch`] if an envelope is not UTF-8.
pub fn join_batch_message(envelopes: &[Vec<u8>]) -> Result<String, EnvelopeError> {
    let parts = envelopes
        .iter()
        .map(|raw| {
            std::str::from_utf8(raw).map_err(|e| EnvelopeError::MalformedBatch(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_string(&parts)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::types::{EventPayload, OrderFields};
    use chrono::{TimeZone, Utc};
    use order_mesh_core::identity::{DeviceId, Sequence};

    fn sample(order: &str) -> Envelope {
        Envelope::new(
            OrderId::new(order),
            vec![OrderEvent::new(
                OrderId::new(order),
                DeviceId::new("D1"),
                Sequence::new(1),
                Utc.timestamp_opt(1_735_689_600, 0).unwrap(),
                EventPayload::Created(OrderFields::empty().with_quantity(2)),
            )],
        )
    }

    #[test]
    fn hex_codec_encodes_as_hex_text() {
        let bytes = HexJsonCodec.encode(&sample("o-1")).unwrap();
        assert!(bytes.iter().all(u8::is_ascii_hexdigit));
        assert_eq!(HexJsonCodec.decode(&bytes).unwrap(), sample("o-1"));
    }

    #[test]
    fn hex_codec_accepts_bare_json() {
        let json = JsonCodec.encode(&sample("o-1")).unwrap();
        assert_eq!(HexJsonCodec.decode(&json).unwrap(), sample("o-1"));
    }

    #[test]
    fn invalid_hex_is_an_encoding_error() {
        let result = HexJsonCodec.decode(b"zz-not-hex");
        assert!(matches!(result, Err(EnvelopeError::Encoding(_))));
    }

    #[test]
    fn missing_fields_are_json_errors() {
        let result = JsonCodec.decode(br#"{"orderId": "o-1"}"#);
        assert!(matches!(result, Err(EnvelopeError::Json(_))));
    }

    #[test]
    fn empty_envelope_is_rejected() {
        let result = JsonCodec.decode(br#"{"orderId": "o-1", "events": []}"#);
        assert!(matches!(result, Err(EnvelopeError::Empty(_))));
    }

    #[test]
    fn stray_event_is_rejected() {
        let mut envelope = sample("o-1");
        envelope.events[0].order_id = OrderId::new("o-2");
        let bytes = JsonCodec.encode(&envelope).unwrap();

        let result = JsonCodec.decode(&bytes);
        assert!(matches!(result, Err(EnvelopeError::OrderMismatch { .. })));
    }

    #[test]
    fn codec_kind_parses_aliases() {
        assert_eq!("json".parse::<CodecKind>(), Ok(CodecKind::Json));
        assert_eq!("HEX".parse::<CodecKind>(), Ok(CodecKind::HexJson));
        assert!("xml".parse::<CodecKind>().is_err());
        assert_eq!(CodecKind::default().codec().name(), "hex-json");
    }

    #[test]
    fn batch_message_round_trip() {
        let raw = vec![b"{\"a\":1}".to_vec(), b"abc".to_vec()];
        let message = join_batch_message(&raw).unwrap();
        let parts = split_batch_message(&message).unwrap();
        assert_eq!(parts, vec!["{\"a\":1}".to_string(), "abc".to_string()]);
    }

    #[test]
    fn batch_message_must_be_array_of_strings() {
        assert!(matches!(
            split_batch_message("{\"orderId\": 1}"),
            Err(EnvelopeError::MalformedBatch(_))
        ));
        assert!(matches!(
            split_batch_message("[1, 2]"),
            Err(EnvelopeError::MalformedBatch(_))
        ));
    }
}
