//! Signature similarity, ranked corpus search, and outcome estimation
//!
//! Similarity is a weighted sum of five independently bounded sub-scores.
//! Every sub-term is symmetric and equals 1 when both sides are identical,
//! so similarity is reflexive and symmetric by construction. The default
//! weights carry no claimed predictive meaning; callers may substitute
//! their own as long as they sum to 1.

use crate::bus::{events, EventBus};
use crate::model::{PatternRecord, Signature};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Partial credit for a non-matching archetype
const ARCHETYPE_PARTIAL_CREDIT: f64 = 0.5;
/// Flow-direction credit when either side is the indeterminate category
const FLOW_CHAOTIC_CREDIT: f64 = 0.3;
/// Flow-direction credit for a plain mismatch
const FLOW_MISMATCH_CREDIT: f64 = 0.5;

// Sub-weights of the temporal slice
const TEMPORAL_PHASE_WEIGHT: f64 = 0.5;
const TEMPORAL_MOMENTUM_WEIGHT: f64 = 0.3;
const TEMPORAL_TREND_WEIGHT: f64 = 0.2;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub archetype: f64,
    pub quadrant: f64,
    pub temporal: f64,
    pub intensity: f64,
    pub flow_direction: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            archetype: 0.25,
            quadrant: 0.25,
            temporal: 0.25,
            intensity: 0.15,
            flow_direction: 0.10,
        }
    }
}

impl SimilarityWeights {
    fn validate(&self) -> Result<(), MatchError> {
        let components = [
            self.archetype,
            self.quadrant,
            self.temporal,
            self.intensity,
            self.flow_direction,
        ];
        if components.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(MatchError::InvalidWeights(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = components.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MatchError::InvalidWeights(format!(
                "weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum MatchError {
    InvalidWeights(String),
    InvalidCriteria(String),
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchError::InvalidWeights(msg) => write!(f, "invalid similarity weights: {}", msg),
            MatchError::InvalidCriteria(msg) => write!(f, "invalid search criteria: {}", msg),
        }
    }
}

impl std::error::Error for MatchError {}

#[derive(Debug, Clone)]
pub struct PatternSearchCriteria {
    /// Matches below this similarity are dropped, [0, 1]
    pub min_similarity: f64,
    /// Maximum number of matches returned
    pub limit: usize,
    pub archetype_filter: Option<Vec<String>>,
    pub outcome_filter: Option<Vec<String>>,
}

impl Default for PatternSearchCriteria {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            limit: 10,
            archetype_filter: None,
            outcome_filter: None,
        }
    }
}

impl PatternSearchCriteria {
    fn validate(&self) -> Result<(), MatchError> {
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(MatchError::InvalidCriteria(format!(
                "min_similarity must be in [0, 1], got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub record: PatternRecord,
    pub similarity: f64,
}

/// Weighted similarity between two signatures with default weights, [0, 1]
pub fn similarity(a: &Signature, b: &Signature) -> f64 {
    // Default weights always validate
    similarity_weighted(a, b, &SimilarityWeights::default()).unwrap()
}

/// Weighted similarity with caller-supplied weights; weights must sum to 1
pub fn similarity_weighted(
    a: &Signature,
    b: &Signature,
    weights: &SimilarityWeights,
) -> Result<f64, MatchError> {
    weights.validate()?;

    let score = weights.archetype * archetype_score(a, b)
        + weights.quadrant * quadrant_score(a, b)
        + weights.temporal * temporal_score(a, b)
        + weights.intensity * intensity_score(a, b)
        + weights.flow_direction * flow_direction_score(a, b);

    Ok(score.clamp(0.0, 1.0))
}

fn archetype_score(a: &Signature, b: &Signature) -> f64 {
    if a.archetype == b.archetype {
        1.0
    } else {
        ARCHETYPE_PARTIAL_CREDIT
    }
}

/// L1 distance over the four quadrant weights, normalized by its maximum
/// possible value of 4
fn quadrant_score(a: &Signature, b: &Signature) -> f64 {
    let qa = a.quadrant_profile.as_array();
    let qb = b.quadrant_profile.as_array();
    let l1: f64 = qa.iter().zip(qb.iter()).map(|(x, y)| (x - y).abs()).sum();
    1.0 - l1 / 4.0
}

fn temporal_score(a: &Signature, b: &Signature) -> f64 {
    let fa = a.temporal_flow.as_array();
    let fb = b.temporal_flow.as_array();
    let l1: f64 = fa.iter().zip(fb.iter()).map(|(x, y)| (x - y).abs()).sum();
    let phase_closeness = 1.0 - l1 / 3.0;

    let momentum_closeness = 1.0 - (a.temporal_flow.momentum - b.temporal_flow.momentum).abs() / 2.0;
    let trend_match = if a.temporal_flow.trend == b.temporal_flow.trend {
        1.0
    } else {
        0.0
    };

    (TEMPORAL_PHASE_WEIGHT * phase_closeness
        + TEMPORAL_MOMENTUM_WEIGHT * momentum_closeness
        + TEMPORAL_TREND_WEIGHT * trend_match)
        .clamp(0.0, 1.0)
}

fn intensity_score(a: &Signature, b: &Signature) -> f64 {
    1.0 - (a.intensity - b.intensity).abs()
}

fn flow_direction_score(a: &Signature, b: &Signature) -> f64 {
    if a.flow_direction == b.flow_direction {
        1.0
    } else if a.flow_direction.is_chaotic() || b.flow_direction.is_chaotic() {
        FLOW_CHAOTIC_CREDIT
    } else {
        FLOW_MISMATCH_CREDIT
    }
}

/// Ranked similarity search over a corpus.
///
/// Categorical filters run first, then similarity against the survivors;
/// matches at or above `min_similarity` are sorted descending (ties keep
/// corpus order) and truncated to `limit`.
pub fn search(
    target: &Signature,
    corpus: &[PatternRecord],
    criteria: &PatternSearchCriteria,
) -> Result<Vec<PatternMatch>, MatchError> {
    criteria.validate()?;

    let mut matches: Vec<PatternMatch> = corpus
        .iter()
        .filter(|record| {
            criteria
                .archetype_filter
                .as_ref()
                .map_or(true, |f| f.contains(&record.signature.archetype))
        })
        .filter(|record| {
            criteria
                .outcome_filter
                .as_ref()
                .map_or(true, |f| f.contains(&record.outcome))
        })
        .map(|record| PatternMatch {
            similarity: similarity(target, &record.signature),
            record: record.clone(),
        })
        .filter(|m| m.similarity >= criteria.min_similarity)
        .collect();

    // Stable sort keeps corpus order for equal similarities
    matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
    matches.truncate(criteria.limit);

    Ok(matches)
}

/// Similarity-weighted probability per distinct outcome label.
/// Empty input yields an empty map.
pub fn outcome_probabilities(matches: &[PatternMatch]) -> HashMap<String, f64> {
    let total: f64 = matches.iter().map(|m| m.similarity).sum();
    if total <= 0.0 {
        return HashMap::new();
    }

    let mut weighted: HashMap<String, f64> = HashMap::new();
    for m in matches {
        *weighted.entry(m.record.outcome.clone()).or_insert(0.0) += m.similarity;
    }
    weighted.values_mut().for_each(|v| *v /= total);
    weighted
}

/// Argmax over outcome probabilities; `None` when there are no matches.
/// Probability ties resolve to the lexicographically smallest label so the
/// result is deterministic.
pub fn most_likely_outcome(matches: &[PatternMatch]) -> Option<(String, f64)> {
    let probabilities = outcome_probabilities(matches);
    probabilities
        .into_iter()
        .max_by(|(label_a, p_a), (label_b, p_b)| {
            p_a.partial_cmp(p_b)
                .unwrap()
                .then_with(|| label_b.cmp(label_a))
        })
}

/// Confidence in a match set: weighted blend of sample-size coverage, mean
/// similarity, and homogeneity (1 − diversity). Weights 0.3/0.4/0.3.
pub fn match_confidence(matches: &[PatternMatch], min_sample_size: usize) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }

    let n = matches.len() as f64;
    let sample_score = (n / min_sample_size.max(1) as f64).min(1.0);
    let mean_similarity = matches.iter().map(|m| m.similarity).sum::<f64>() / n;

    let archetypes: HashSet<&str> = matches
        .iter()
        .map(|m| m.record.signature.archetype.as_str())
        .collect();
    let outcomes: HashSet<&str> = matches.iter().map(|m| m.record.outcome.as_str()).collect();
    let diversity = (archetypes.len() as f64 / n + outcomes.len() as f64 / n) / 2.0;

    (0.3 * sample_score + 0.4 * mean_similarity + 0.3 * (1.0 - diversity)).clamp(0.0, 1.0)
}

/// Append-only in-memory corpus with search that reports through the bus
pub struct PatternIndex {
    records: Vec<PatternRecord>,
    bus: Option<EventBus>,
}

impl PatternIndex {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            bus: None,
        }
    }

    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            records: Vec::new(),
            bus: Some(bus),
        }
    }

    pub fn add_record(&mut self, record: PatternRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PatternRecord] {
        &self.records
    }

    pub fn search(
        &self,
        target: &Signature,
        criteria: &PatternSearchCriteria,
    ) -> Result<Vec<PatternMatch>, MatchError> {
        search(target, &self.records, criteria)
    }

    /// Search and publish `pattern:matched` or `pattern:notfound`
    pub fn search_and_publish(
        &self,
        target: &Signature,
        criteria: &PatternSearchCriteria,
    ) -> Result<Vec<PatternMatch>, MatchError> {
        let matches = self.search(target, criteria)?;

        if let Some(ref bus) = self.bus {
            if matches.is_empty() {
                bus.publish(
                    events::PATTERN_NOTFOUND,
                    json!({ "source": target.source, "corpus_size": self.records.len() }),
                );
            } else {
                let estimate = most_likely_outcome(&matches);
                bus.publish(
                    events::PATTERN_MATCHED,
                    json!({
                        "source": target.source,
                        "match_count": matches.len(),
                        "top_similarity": matches[0].similarity,
                        "likely_outcome": estimate.as_ref().map(|(label, _)| label.clone()),
                        "outcome_probability": estimate.map(|(_, p)| p),
                    }),
                );
            }
        }

        Ok(matches)
    }
}

impl Default for PatternIndex {
    fn default() -> Self {
        Self::new()
    }
}
