//! Simulation configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Parameters of one simulated mesh run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of peer devices
    pub peers: usize,
    /// Number of distinct orders
    pub orders: usize,
    /// Local edits performed across the mesh
    pub steps: usize,
    /// Probability that a message to one peer is lost
    pub drop_rate: f64,
    /// Probability that a delivered message arrives twice
    pub duplicate_rate: f64,
    /// Anti-entropy rounds after the edits stop
    pub resync_rounds: usize,
    /// RNG seed, random when unset
    pub seed: Option<u64>,
    /// Print every peer's raw cache at the end
    pub show_cache: bool,
}

impl SimConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to defaults, as do non-finite rates;
    /// rates are clamped to `0.0..=1.0`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            peers: lookup("MESH_SIM_PEERS")
                .and_then(|s| s.parse().ok())
                .filter(|peers| *peers >= 2)
                .unwrap_or(3),
            orders: lookup("MESH_SIM_ORDERS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            steps: lookup("MESH_SIM_STEPS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(24),
            drop_rate: rate(lookup("MESH_SIM_DROP_RATE"), 0.25),
            duplicate_rate: rate(lookup("MESH_SIM_DUPLICATE_RATE"), 0.2),
            resync_rounds: lookup("MESH_SIM_RESYNC_ROUNDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            seed: lookup("MESH_SIM_SEED").and_then(|s| s.parse().ok()),
            show_cache: lookup("MESH_SIM_SHOW_CACHE")
                .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
        }
    }
}

fn rate(raw: Option<String>, default: f64) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|rate| rate.is_finite())
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}
