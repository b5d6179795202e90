//! Canonical signal and signature value types
//!
//! Every source-specific adapter normalizes its raw observations into the
//! `Signal` struct defined here, and summarizes a window of signals into a
//! `Signature`. Both are immutable after construction: a new summarization
//! supersedes the previous signature rather than editing it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One normalized observation from one source at one instant.
///
/// Only `intensity` and `phase` are guaranteed bounded; the remaining fields
/// are adapter-defined but must be finite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Identifier of the originating adapter
    pub source: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    /// Magnitude of the observation, [0, 1]
    pub intensity: f64,
    /// Oscillation / velocity proxy, >= 0
    pub frequency: f64,
    /// Positional / state proxy, [0, 2π)
    pub phase: f64,
    /// Auxiliary derived features, ordered
    pub harmonics: Vec<f64>,
    /// Original unnormalized values, kept for re-derivation
    pub raw: Vec<f64>,
}

/// Four-way quadrant weighting of a signature, plus an optional center weight.
///
/// When derived from non-empty input, q1..q4 are non-negative and sum to 1.
/// Derived from empty input, the profile is the uniform 0.25 split.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuadrantProfile {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
    pub q4: f64,
    pub center: Option<f64>,
}

impl QuadrantProfile {
    pub fn uniform() -> Self {
        Self {
            q1: 0.25,
            q2: 0.25,
            q3: 0.25,
            q4: 0.25,
            center: None,
        }
    }

    /// Normalize raw per-quadrant magnitudes into a profile summing to 1.
    ///
    /// An empty or all-zero input yields the uniform default.
    pub fn from_weights(weights: &[(Quadrant, f64)]) -> Self {
        let mut sums: HashMap<Quadrant, f64> = HashMap::new();
        for (q, w) in weights {
            *sums.entry(*q).or_insert(0.0) += w.max(0.0);
        }

        let total: f64 = sums.values().sum();
        if total <= 0.0 {
            return Self::uniform();
        }

        Self {
            q1: sums.get(&Quadrant::Q1).copied().unwrap_or(0.0) / total,
            q2: sums.get(&Quadrant::Q2).copied().unwrap_or(0.0) / total,
            q3: sums.get(&Quadrant::Q3).copied().unwrap_or(0.0) / total,
            q4: sums.get(&Quadrant::Q4).copied().unwrap_or(0.0) / total,
            center: None,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.q1, self.q2, self.q3, self.q4]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    Q1,
    Q2,
    Q3,
    Q4,
}

/// Categorical trend over a signature's window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    #[serde(rename = "STABLE")]
    Stable,
    #[serde(rename = "ACCELERATING")]
    Accelerating,
    #[serde(rename = "DECLINING")]
    Declining,
    #[serde(rename = "VOLATILE")]
    Volatile,
}

/// Direction of activity flow across the window. `Chaotic` is the
/// indeterminate category and earns reduced credit in similarity scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDirection {
    #[serde(rename = "RISING")]
    Rising,
    #[serde(rename = "FALLING")]
    Falling,
    #[serde(rename = "STEADY")]
    Steady,
    #[serde(rename = "CHAOTIC")]
    Chaotic,
}

impl FlowDirection {
    pub fn is_chaotic(&self) -> bool {
        matches!(self, FlowDirection::Chaotic)
    }
}

/// Early/mid/late distribution of activity within a window.
///
/// The three weights are non-negative and sum to ~1; `momentum` is clamped
/// to [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalFlow {
    pub early: f64,
    pub mid: f64,
    pub late: f64,
    pub trend: Trend,
    pub momentum: f64,
}

impl TemporalFlow {
    pub fn new(early: f64, mid: f64, late: f64, trend: Trend, momentum: f64) -> Self {
        Self {
            early,
            mid,
            late,
            trend,
            momentum: momentum.clamp(-1.0, 1.0),
        }
    }

    /// Derive the early/mid/late split and momentum from a signal window.
    ///
    /// The window is split into thirds by position; each third's weight is
    /// its share of total intensity. Momentum is the late-vs-early intensity
    /// delta, clamped to [-1, 1]. Empty input yields a uniform split with
    /// zero momentum.
    pub fn from_signals(signals: &[Signal]) -> Self {
        if signals.is_empty() {
            return Self::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, Trend::Stable, 0.0);
        }

        let third = (signals.len() as f64 / 3.0).ceil() as usize;
        let mut thirds = [0.0f64; 3];
        for (i, signal) in signals.iter().enumerate() {
            let bucket = (i / third).min(2);
            thirds[bucket] += signal.intensity;
        }

        let total: f64 = thirds.iter().sum();
        let (early, mid, late) = if total > 0.0 {
            (thirds[0] / total, thirds[1] / total, thirds[2] / total)
        } else {
            (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
        };

        let momentum = (late - early).clamp(-1.0, 1.0);
        let trend = classify_trend(early, mid, late);

        Self::new(early, mid, late, trend, momentum)
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.early, self.mid, self.late]
    }
}

fn classify_trend(early: f64, mid: f64, late: f64) -> Trend {
    let spread = [early, mid, late]
        .iter()
        .fold(0.0f64, |acc, w| acc.max((w - 1.0 / 3.0).abs()));

    if spread < 0.1 {
        Trend::Stable
    } else if late > mid && mid >= early {
        Trend::Accelerating
    } else if late < mid && mid <= early {
        Trend::Declining
    } else {
        Trend::Volatile
    }
}

/// Statistical summary of a bounded recent window of signals for one source.
///
/// Created by `SignalAdapter::summarize`; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub source: String,
    /// Unix timestamp (seconds) of extraction
    pub extracted_at: i64,
    /// Categorical label attached by the adapter
    pub archetype: String,
    pub quadrant_profile: QuadrantProfile,
    pub temporal_flow: TemporalFlow,
    pub flow_direction: FlowDirection,
    pub intensity: f64,
    pub volatility: f64,
    pub dominant_frequency: f64,
    pub harmonic_resonance: f64,
    pub phase_alignment: f64,
}

/// A persisted (signature, outcome) pair forming the searchable corpus.
///
/// Append-only: created once, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: String,
    pub signature: Signature,
    pub outcome: String,
    pub metadata: serde_json::Value,
}
