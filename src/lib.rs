//! # sigflow - Signal Ingestion and Pattern Resonance Engine
//!
//! Ingests heterogeneous numeric observations from many independent sources,
//! normalizes them into canonical signals, derives per-source statistical
//! signatures, and searches a growing corpus of historical signatures for
//! the most similar prior cases.
//!
//! # Architecture
//!
//! ```text
//! RawInput → SignalAdapter::ingest → Signal
//!     ↓                                 ↓
//! BatchProcessor / StreamProcessor   ResonanceScanner (±window cross-source scan)
//!     ↓                                 ↓
//! per-source ring buffers           resonance:insight / resonance:healthcheck
//!     ↓
//! SignalAdapter::summarize → Signature → signature:extracted
//!     ↓
//! PatternIndex search (weighted similarity) → pattern:matched / pattern:notfound
//!     ↓
//! outcome probabilities + match confidence
//! ```
//!
//! All progress, lifecycle, and insight events flow through the in-process
//! [`bus::EventBus`]; producers never depend on their consumers. Source-
//! specific adapters implement [`adapter::SignalAdapter`] outside this
//! crate.


pub mod adapter;
pub mod batch;
pub mod bus;
pub mod config;
pub mod engine;
pub mod matcher;
pub mod model;
pub mod resonance;
pub mod ring;
pub mod stream;

pub use adapter::{AdapterError, RawInput, SignalAdapter};
pub use batch::{
    aggregate_results, BatchConfig, BatchError, BatchInput, BatchProcessor, BatchProgress,
    BatchResult, BatchSummary,
};
pub use bus::{events, BusEvent, EventBus, Subscription};
pub use config::{init_logging, EngineConfig};
pub use engine::SignalEngine;
pub use matcher::{
    match_confidence, most_likely_outcome, outcome_probabilities, search, similarity,
    similarity_weighted, MatchError, PatternIndex, PatternMatch, PatternSearchCriteria,
    SimilarityWeights,
};
pub use model::{
    FlowDirection, PatternRecord, Quadrant, QuadrantProfile, Signal, Signature, TemporalFlow,
    Trend,
};
pub use resonance::{ResonanceConfig, ResonanceInsight, ResonanceScanner};
pub use ring::RingBuffer;
pub use stream::{StreamConfig, StreamProcessor};
