//! Cross-source temporal-correlation ("resonance") scanner
//!
//! Keeps one bounded ring buffer per source. Each new event is appended to
//! its source's buffer and then joined against every sibling buffer within
//! a fixed time window. Qualifying co-occurrences are emitted as
//! `resonance:insight` events, sampled at a configurable rate through an
//! injected seedable RNG so the output stream stays bounded and tests stay
//! reproducible. A periodic ticker publishes `resonance:healthcheck`
//! summaries; `start()`/`stop()` own its lifecycle and nothing runs at
//! construction time.

use crate::bus::{events, EventBus};
use crate::model::Signal;
use crate::ring::RingBuffer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Known source pairings with a human-readable pattern description.
/// Unlisted pairs fall back to the generic temporal-alignment wording.
const PAIR_DESCRIPTIONS: &[((&str, &str), &str)] = &[
    (
        ("price", "volume"),
        "price and volume channels moving in lockstep",
    ),
    (
        ("price", "sentiment"),
        "sentiment shift coinciding with price activity",
    ),
    (
        ("volume", "sentiment"),
        "crowd attention tracking volume surges",
    ),
    (
        ("onchain", "price"),
        "on-chain activity preceding price movement",
    ),
];

#[derive(Debug, Clone)]
pub struct ResonanceConfig {
    /// Per-source ring buffer capacity
    pub buffer_capacity: usize,
    /// Co-occurrence window, seconds
    pub window_secs: i64,
    /// Probability of emitting an insight per qualifying occurrence
    pub sample_rate: f64,
    /// Healthcheck ticker period
    pub healthcheck_interval_ms: u64,
    /// RNG seed for reproducible sampling; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 500,
            window_secs: 300,
            sample_rate: 0.05,
            healthcheck_interval_ms: 60_000,
            seed: None,
        }
    }
}

/// Emitted correlation insight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResonanceInsight {
    /// Co-occurring sources, triggering source first
    pub sources: Vec<String>,
    pub description: String,
    /// Timestamp of the triggering event (unix seconds)
    pub timestamp: i64,
}

struct ScannerState {
    /// Event timestamps per source; only timestamps participate in the scan
    buffers: HashMap<String, RingBuffer<i64>>,
    rng: StdRng,
    insights_emitted: u64,
}

pub struct ResonanceScanner {
    state: Arc<Mutex<ScannerState>>,
    config: ResonanceConfig,
    bus: EventBus,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl ResonanceScanner {
    pub fn new(bus: EventBus, config: ResonanceConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            state: Arc::new(Mutex::new(ScannerState {
                buffers: HashMap::new(),
                rng,
                insights_emitted: 0,
            })),
            config,
            bus,
            ticker: Mutex::new(None),
        }
    }

    /// Append a signal to its source's buffer, then scan sibling buffers for
    /// events within the configured window. Returns the insight when one was
    /// emitted (co-occurrence found and the sample drawn).
    pub fn record_signal(&self, signal: &Signal) -> Option<ResonanceInsight> {
        self.record_event(&signal.source, signal.timestamp)
    }

    pub fn record_event(&self, source: &str, timestamp: i64) -> Option<ResonanceInsight> {
        let mut state = self.state.lock().unwrap();

        let capacity = self.config.buffer_capacity;
        state
            .buffers
            .entry(source.to_string())
            .or_insert_with(|| RingBuffer::new(capacity))
            .push(timestamp);

        // Join against every sibling buffer within ±window_secs
        let window = self.config.window_secs;
        let mut co_occurring: Vec<String> = state
            .buffers
            .iter()
            .filter(|(sibling, _)| sibling.as_str() != source)
            .filter(|(_, buffer)| buffer.iter().any(|t| (t - timestamp).abs() <= window))
            .map(|(sibling, _)| sibling.clone())
            .collect();

        if co_occurring.is_empty() {
            return None;
        }
        co_occurring.sort();

        // A non-finite rate never samples; gen_bool rejects anything
        // outside [0, 1]
        let rate = self.config.sample_rate;
        let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
        if !state.rng.gen_bool(rate) {
            return None;
        }
        state.insights_emitted += 1;
        drop(state);

        let mut sources = vec![source.to_string()];
        sources.extend(co_occurring);
        let description = describe_pattern(&sources);

        let insight = ResonanceInsight {
            sources,
            description,
            timestamp,
        };

        log::info!(
            "🔗 resonance insight: {} [{}]",
            insight.description,
            insight.sources.join(", ")
        );
        self.bus.publish(
            events::RESONANCE_INSIGHT,
            serde_json::to_value(&insight).unwrap_or_default(),
        );

        Some(insight)
    }

    /// Spawn the periodic healthcheck ticker. Idempotent while running.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap();
        if ticker.is_some() {
            return;
        }

        let state = Arc::clone(&self.state);
        let bus = self.bus.clone();
        let period = self.config.healthcheck_interval_ms;
        *ticker = Some(tokio::spawn(async move {
            let mut timer = interval(Duration::from_millis(period));
            // First tick fires immediately; skip it so the first report
            // lands one full period after start
            timer.tick().await;
            loop {
                timer.tick().await;

                let (active_sources, insights_emitted) = {
                    let state = state.lock().unwrap();
                    let active = state.buffers.values().filter(|b| !b.is_empty()).count();
                    (active, state.insights_emitted)
                };

                log::info!(
                    "💓 resonance health: {} active sources, {} insights emitted",
                    active_sources,
                    insights_emitted
                );
                bus.publish(
                    events::RESONANCE_HEALTHCHECK,
                    json!({
                        "active_sources": active_sources,
                        "insights_emitted": insights_emitted,
                    }),
                );
            }
        }));
    }

    /// Cancel the healthcheck ticker. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn insights_emitted(&self) -> u64 {
        self.state.lock().unwrap().insights_emitted
    }

    pub fn buffer_len(&self, source: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .buffers
            .get(source)
            .map_or(0, |b| b.len())
    }
}

impl Drop for ResonanceScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn describe_pattern(sources: &[String]) -> String {
    if sources.len() == 2 {
        let (a, b) = (sources[0].as_str(), sources[1].as_str());
        for ((x, y), description) in PAIR_DESCRIPTIONS {
            if (a == *x && b == *y) || (a == *y && b == *x) {
                return (*description).to_string();
            }
        }
    }
    format!("{} showing temporal alignment", sources.join(" + "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner_with(config: ResonanceConfig) -> (ResonanceScanner, EventBus) {
        let bus = EventBus::new();
        let scanner = ResonanceScanner::new(bus.clone(), config);
        (scanner, bus)
    }

    fn always_sampling() -> ResonanceConfig {
        ResonanceConfig {
            sample_rate: 1.0,
            seed: Some(42),
            ..ResonanceConfig::default()
        }
    }

    #[test]
    fn test_buffers_respect_capacity() {
        let (scanner, _bus) = scanner_with(ResonanceConfig {
            buffer_capacity: 10,
            sample_rate: 0.0,
            seed: Some(1),
            ..ResonanceConfig::default()
        });

        for i in 0..50 {
            scanner.record_event("price", 1000 + i);
        }
        assert_eq!(scanner.buffer_len("price"), 10);
    }

    #[test]
    fn test_co_occurrence_within_window_emits_insight() {
        let (scanner, bus) = scanner_with(always_sampling());

        assert!(scanner.record_event("price", 1000).is_none());
        let insight = scanner.record_event("volume", 1100).unwrap();

        assert_eq!(insight.sources, vec!["volume", "price"]);
        assert_eq!(insight.description, "price and volume channels moving in lockstep");
        assert_eq!(scanner.insights_emitted(), 1);
        assert_eq!(bus.history(Some(events::RESONANCE_INSIGHT)).len(), 1);
    }

    #[test]
    fn test_events_outside_window_do_not_correlate() {
        let (scanner, bus) = scanner_with(always_sampling());

        scanner.record_event("price", 1000);
        // 301s later, outside the 300s window
        assert!(scanner.record_event("volume", 1301).is_none());
        assert!(bus.history(Some(events::RESONANCE_INSIGHT)).is_empty());
    }

    #[test]
    fn test_same_source_never_self_correlates() {
        let (scanner, _bus) = scanner_with(always_sampling());

        scanner.record_event("price", 1000);
        assert!(scanner.record_event("price", 1001).is_none());
    }

    #[test]
    fn test_zero_sample_rate_suppresses_emission() {
        let (scanner, bus) = scanner_with(ResonanceConfig {
            sample_rate: 0.0,
            seed: Some(7),
            ..ResonanceConfig::default()
        });

        scanner.record_event("price", 1000);
        assert!(scanner.record_event("volume", 1010).is_none());
        assert_eq!(scanner.insights_emitted(), 0);
        assert!(bus.history(Some(events::RESONANCE_INSIGHT)).is_empty());
    }

    #[test]
    fn test_non_finite_sample_rate_never_emits() {
        let (scanner, bus) = scanner_with(ResonanceConfig {
            sample_rate: f64::NAN,
            seed: Some(9),
            ..ResonanceConfig::default()
        });

        scanner.record_event("price", 1000);
        // Co-occurrence exists, but a non-finite rate must not panic or emit
        assert!(scanner.record_event("volume", 1010).is_none());
        assert_eq!(scanner.insights_emitted(), 0);
        assert!(bus.history(Some(events::RESONANCE_INSIGHT)).is_empty());
    }

    #[test]
    fn test_generic_description_for_unknown_pair() {
        let (scanner, _bus) = scanner_with(always_sampling());

        scanner.record_event("alpha", 1000);
        let insight = scanner.record_event("beta", 1005).unwrap();
        assert_eq!(insight.description, "beta + alpha showing temporal alignment");
    }

    #[test]
    fn test_multi_source_alignment_lists_all() {
        let (scanner, _bus) = scanner_with(always_sampling());

        scanner.record_event("price", 1000);
        scanner.record_event("volume", 1010);
        let insight = scanner.record_event("sentiment", 1020).unwrap();

        assert_eq!(insight.sources, vec!["sentiment", "price", "volume"]);
        assert!(insight.description.ends_with("showing temporal alignment"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthcheck_ticker_lifecycle() {
        let (scanner, bus) = scanner_with(ResonanceConfig {
            healthcheck_interval_ms: 1000,
            sample_rate: 0.0,
            seed: Some(3),
            ..ResonanceConfig::default()
        });

        scanner.record_event("price", 1000);
        scanner.start();
        scanner.start(); // idempotent while running

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let reports = bus.history(Some(events::RESONANCE_HEALTHCHECK));
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].payload["active_sources"], 1);

        scanner.stop();
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(bus.history(Some(events::RESONANCE_HEALTHCHECK)).len(), 2);
    }
}
