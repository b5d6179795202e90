//! Adapter capability contract
//!
//! Source-specific adapters live outside this crate; the engine depends only
//! on this trait. `ingest` must be deterministic given the raw payload and
//! clock, and `summarize` must be pure given the signal slice — an empty
//! slice yields the adapter's documented default signature.

use crate::model::{Signal, Signature};
use async_trait::async_trait;

/// Raw observation payload handed to an adapter. Shape is adapter-defined.
pub type RawInput = serde_json::Value;

#[derive(Debug)]
pub enum AdapterError {
    /// Raw payload did not match the adapter's expected shape
    Malformed(String),
    /// Adapter-internal failure (I/O, upstream lookup)
    Internal(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::Malformed(msg) => write!(f, "malformed raw input: {}", msg),
            AdapterError::Internal(msg) => write!(f, "adapter failure: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Capability interface for converting raw observations into canonical
/// signals and summarizing signal windows into signatures.
///
/// Calls may be I/O-bound; the batch processor awaits them concurrently
/// within a chunk, so implementations must be `Send + Sync`.
#[async_trait]
pub trait SignalAdapter: Send + Sync {
    /// Source tag stamped onto produced signals
    fn source(&self) -> &str;

    /// Normalize one raw observation into a canonical signal
    async fn ingest(&self, raw: RawInput) -> Result<Signal, AdapterError>;

    /// Summarize a window of signals into a signature.
    ///
    /// Must accept an empty slice and return the default signature for it.
    async fn summarize(&self, signals: &[Signal]) -> Result<Signature, AdapterError>;
}
