//! Engine configuration from environment variables

use crate::resonance::ResonanceConfig;
use std::env;

/// Runtime configuration for the signal engine
///
/// Loaded from environment variables with sensible defaults; malformed
/// values fall back to the default rather than failing startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ingestion channel buffer size (raw observations)
    pub channel_buffer: usize,

    /// Per-source signal ring buffer capacity
    pub signal_capacity: usize,

    /// Most-recent-signals window handed to `summarize`
    pub summarize_window: usize,

    /// Stream processor buffer length triggering an immediate flush
    pub stream_buffer_size: usize,

    /// Stream processor flush deadline in milliseconds
    pub flush_interval_ms: u64,

    /// Resonance co-occurrence window in seconds
    pub resonance_window_secs: i64,

    /// Resonance insight sampling rate, [0, 1]
    pub resonance_sample_rate: f64,

    /// Resonance healthcheck period in milliseconds
    pub healthcheck_interval_ms: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SIGFLOW_CHANNEL_BUFFER` (default: 10000)
    /// - `SIGFLOW_SIGNAL_CAPACITY` (default: 500)
    /// - `SIGFLOW_SUMMARIZE_WINDOW` (default: 100)
    /// - `SIGFLOW_BUFFER_SIZE` (default: 10)
    /// - `SIGFLOW_FLUSH_INTERVAL_MS` (default: 1000)
    /// - `SIGFLOW_RESONANCE_WINDOW_SECS` (default: 300)
    /// - `SIGFLOW_RESONANCE_SAMPLE_RATE` (default: 0.05)
    /// - `SIGFLOW_HEALTHCHECK_INTERVAL_MS` (default: 60000)
    pub fn from_env() -> Self {
        Self {
            channel_buffer: parse_env("SIGFLOW_CHANNEL_BUFFER", 10_000),
            signal_capacity: parse_env("SIGFLOW_SIGNAL_CAPACITY", 500),
            summarize_window: parse_env("SIGFLOW_SUMMARIZE_WINDOW", 100),
            stream_buffer_size: parse_env("SIGFLOW_BUFFER_SIZE", 10),
            flush_interval_ms: parse_env("SIGFLOW_FLUSH_INTERVAL_MS", 1_000),
            resonance_window_secs: parse_env("SIGFLOW_RESONANCE_WINDOW_SECS", 300),
            resonance_sample_rate: parse_env("SIGFLOW_RESONANCE_SAMPLE_RATE", 0.05),
            healthcheck_interval_ms: parse_env("SIGFLOW_HEALTHCHECK_INTERVAL_MS", 60_000),
        }
    }

    /// Resonance scanner settings derived from this config (unseeded)
    pub fn resonance_config(&self) -> ResonanceConfig {
        ResonanceConfig {
            buffer_capacity: self.signal_capacity,
            window_secs: self.resonance_window_secs,
            sample_rate: self.resonance_sample_rate,
            healthcheck_interval_ms: self.healthcheck_interval_ms,
            seed: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 10_000,
            signal_capacity: 500,
            summarize_window: 100,
            stream_buffer_size: 10,
            flush_interval_ms: 1_000,
            resonance_window_secs: 300,
            resonance_sample_rate: 0.05,
            healthcheck_interval_ms: 60_000,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Install the env_logger backend for the `log` facade.
///
/// Returns whether this call installed the logger (false when one was
/// already set). Nothing is initialized at module load; consumers opt in.
pub fn init_logging() -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .is_ok()
}
