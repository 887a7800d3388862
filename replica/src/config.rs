//! Replica configuration.
//!
//! Loads configuration from environment variables with sensible defaults:
//!
//! | Variable                        | Default                     |
//! |---------------------------------|-----------------------------|
//! | `ORDER_MESH_DEVICE_ID`          | `device-<random hex>`       |
//! | `ORDER_MESH_CODEC`              | `hex-json`                  |
//! | `ORDER_MESH_MAX_ENVELOPE_BYTES` | `1048576`                   |
//! | `ORDER_MESH_STRICT_FOLDS`       | on in debug builds          |
//! | `ORDER_MESH_MEMOIZE`            | `true`                      |

use crate::envelope::CodecKind;
use order_mesh_core::identity::DeviceId;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Default upper bound for a single raw envelope.
pub const DEFAULT_MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

/// Invalid configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    /// Variable name
    pub key: String,
    /// Offending value
    pub value: String,
    /// What was expected
    pub reason: String,
}

/// Configuration of one replica (one device's engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Identity this device stamps on locally originated events
    pub device_id: DeviceId,
    /// Envelope codec used for outbound envelopes and inbound decoding
    pub codec: CodecKind,
    /// Raw envelopes larger than this are dropped as malformed
    pub max_envelope_bytes: usize,
    /// Querying an unknown order fails instead of returning a placeholder
    pub strict_folds: bool,
    /// Reuse folded snapshots for logs that have not grown
    pub memoize_snapshots: bool,
}

impl ReplicaConfig {
    /// Configuration with defaults for the given device.
    #[must_use]
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            codec: CodecKind::default(),
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
            strict_folds: cfg!(debug_assertions),
            memoize_snapshots: true,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is present but unparseable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_id = match lookup("ORDER_MESH_DEVICE_ID") {
            Some(raw) => raw.parse::<DeviceId>().map_err(|e| ConfigError {
                key: "ORDER_MESH_DEVICE_ID".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DeviceId::new(format!("device-{:08x}", rand::random::<u32>())),
        };

        let mut config = Self::new(device_id);

        if let Some(raw) = lookup("ORDER_MESH_CODEC") {
            config.codec = raw.parse().map_err(|reason| ConfigError {
                key: "ORDER_MESH_CODEC".to_string(),
                value: raw.clone(),
                reason,
            })?;
        }
        if let Some(raw) = lookup("ORDER_MESH_MAX_ENVELOPE_BYTES") {
            config.max_envelope_bytes = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or_else(|| ConfigError {
                    key: "ORDER_MESH_MAX_ENVELOPE_BYTES".to_string(),
                    value: raw.clone(),
                    reason: "expected a positive integer".to_string(),
                })?;
        }
        if let Some(raw) = lookup("ORDER_MESH_STRICT_FOLDS") {
            config.strict_folds = parse_flag("ORDER_MESH_STRICT_FOLDS", &raw)?;
        }
        if let Some(raw) = lookup("ORDER_MESH_MEMOIZE") {
            config.memoize_snapshots = parse_flag("ORDER_MESH_MEMOIZE", &raw)?;
        }

        Ok(config)
    }

    /// Set the envelope codec
    #[must_use]
    pub const fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Set the envelope size limit
    #[must_use]
    pub const fn with_max_envelope_bytes(mut self, limit: usize) -> Self {
        self.max_envelope_bytes = limit;
        self
    }

    /// Set strict fold mode
    #[must_use]
    pub const fn with_strict_folds(mut self, strict: bool) -> Self {
        self.strict_folds = strict;
        self
    }

    /// Enable or disable snapshot memoization
    #[must_use]
    pub const fn with_memoize_snapshots(mut self, memoize: bool) -> Self {
        self.memoize_snapshots = memoize;
        self
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean flag".to_string(),
        }),
    }
}
