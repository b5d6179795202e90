//! Engine orchestration: ingest → buffer → summarize → match → resonate
//!
//! `SignalEngine` ties the pieces together the way a consumer would wire
//! them: raw observations go through the adapter into per-source bounded
//! signal buffers and the resonance scanner; summarization snapshots the
//! most recent window per source and publishes the extracted signature;
//! extracted signatures are matched against the pattern corpus.
//!
//! `run_ingestion` is the channel-fed runtime loop: raw observations arrive
//! on an mpsc channel and a periodic timer drives summarization, with a
//! final pass when the channel closes.

use crate::adapter::{AdapterError, RawInput, SignalAdapter};
use crate::bus::{events, EventBus};
use crate::config::EngineConfig;
use crate::matcher::{MatchError, PatternIndex, PatternMatch, PatternSearchCriteria};
use crate::model::{PatternRecord, Signal, Signature};
use crate::resonance::{ResonanceConfig, ResonanceScanner};
use crate::ring::RingBuffer;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

pub struct SignalEngine {
    adapter: Arc<dyn SignalAdapter>,
    bus: EventBus,
    scanner: ResonanceScanner,
    index: Mutex<PatternIndex>,
    buffers: Mutex<HashMap<String, RingBuffer<Signal>>>,
    summarize_window: usize,
    signal_capacity: usize,
    search_criteria: PatternSearchCriteria,
}

impl SignalEngine {
    pub fn new(adapter: Arc<dyn SignalAdapter>, bus: EventBus, config: &EngineConfig) -> Self {
        let resonance = config.resonance_config();
        Self::with_resonance_config(adapter, bus, config, resonance)
    }

    /// Construct with explicit resonance settings (seeded RNG in tests)
    pub fn with_resonance_config(
        adapter: Arc<dyn SignalAdapter>,
        bus: EventBus,
        config: &EngineConfig,
        resonance: ResonanceConfig,
    ) -> Self {
        Self {
            adapter,
            scanner: ResonanceScanner::new(bus.clone(), resonance),
            index: Mutex::new(PatternIndex::with_bus(bus.clone())),
            bus,
            buffers: Mutex::new(HashMap::new()),
            summarize_window: config.summarize_window,
            signal_capacity: config.signal_capacity,
            search_criteria: PatternSearchCriteria::default(),
        }
    }

    /// Ingest one raw observation: normalize, buffer under its source, and
    /// feed the resonance scanner.
    pub async fn process_raw(&self, raw: RawInput) -> Result<Signal, AdapterError> {
        let signal = self.adapter.ingest(raw).await?;

        {
            let mut buffers = self.buffers.lock().unwrap();
            buffers
                .entry(signal.source.clone())
                .or_insert_with(|| RingBuffer::new(self.signal_capacity))
                .push(signal.clone());
        }
        self.scanner.record_signal(&signal);

        Ok(signal)
    }

    /// Summarize the most recent window of buffered signals for a source
    /// and publish `signature:extracted`. An unknown source summarizes the
    /// empty slice, yielding the adapter's default signature.
    pub async fn extract_signature(&self, source: &str) -> Result<Signature, AdapterError> {
        let window: Vec<Signal> = {
            let buffers = self.buffers.lock().unwrap();
            buffers.get(source).map_or_else(Vec::new, |buffer| {
                buffer.recent(self.summarize_window).into_iter().cloned().collect()
            })
        };

        let signature = self.adapter.summarize(&window).await?;

        self.bus.publish(
            events::SIGNATURE_EXTRACTED,
            json!({
                "source": signature.source,
                "archetype": signature.archetype,
                "extracted_at": signature.extracted_at,
                "window_len": window.len(),
            }),
        );

        Ok(signature)
    }

    /// Search the corpus for the given signature, publishing
    /// `pattern:matched` / `pattern:notfound`.
    pub fn match_patterns(
        &self,
        target: &Signature,
        criteria: Option<&PatternSearchCriteria>,
    ) -> Result<Vec<PatternMatch>, MatchError> {
        let index = self.index.lock().unwrap();
        index.search_and_publish(target, criteria.unwrap_or(&self.search_criteria))
    }

    pub fn add_pattern(&self, record: PatternRecord) {
        self.index.lock().unwrap().add_record(record);
    }

    pub fn corpus_len(&self) -> usize {
        self.index.lock().unwrap().len()
    }

    /// Sources with at least one buffered signal
    pub fn sources(&self) -> Vec<String> {
        let buffers = self.buffers.lock().unwrap();
        buffers
            .iter()
            .filter(|(_, b)| !b.is_empty())
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub fn buffered(&self, source: &str) -> usize {
        self.buffers.lock().unwrap().get(source).map_or(0, |b| b.len())
    }

    /// Start the resonance healthcheck ticker
    pub fn start(&self) {
        self.scanner.start();
    }

    /// Stop background work; idempotent
    pub fn stop(&self) {
        self.scanner.stop();
    }

    /// Channel-fed ingestion loop.
    ///
    /// Receives raw observations, periodically summarizes every active
    /// source (matching each signature against the corpus when one exists),
    /// and performs a final summarization pass when the channel closes.
    pub async fn run_ingestion(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<RawInput>,
        summarize_interval_ms: u64,
    ) {
        log::info!(
            "🚀 starting signal ingestion (summarize every {}ms)",
            summarize_interval_ms
        );

        let mut timer = interval(Duration::from_millis(summarize_interval_ms));
        // interval fires immediately; the first summarization should land
        // one full period in
        timer.tick().await;

        let mut ingested = 0u64;
        loop {
            tokio::select! {
                maybe_raw = rx.recv() => {
                    match maybe_raw {
                        Some(raw) => match self.process_raw(raw).await {
                            Ok(_) => ingested += 1,
                            Err(e) => log::warn!("⚠️  dropped raw observation: {}", e),
                        },
                        None => {
                            log::info!("🔄 channel closed, final summarization pass");
                            self.summarize_all().await;
                            break;
                        }
                    }
                }

                _ = timer.tick() => {
                    self.summarize_all().await;
                }
            }
        }

        log::info!("✅ signal ingestion stopped ({} observations)", ingested);
    }

    async fn summarize_all(&self) {
        let mut sources = self.sources();
        sources.sort();

        for source in sources {
            match self.extract_signature(&source).await {
                Ok(signature) => {
                    if self.corpus_len() > 0 {
                        if let Err(e) = self.match_patterns(&signature, None) {
                            log::warn!("pattern search failed for {}: {}", source, e);
                        }
                    }
                }
                Err(e) => log::warn!("summarization failed for {}: {}", source, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::testing::StaticAdapter;
    use serde_json::json;

    fn engine_with_seeded_resonance() -> (Arc<SignalEngine>, EventBus) {
        let bus = EventBus::new();
        let adapter = Arc::new(StaticAdapter::new("feed"));
        let config = EngineConfig::default();
        let resonance = ResonanceConfig {
            sample_rate: 1.0,
            seed: Some(11),
            ..config.resonance_config()
        };
        let engine = Arc::new(SignalEngine::with_resonance_config(
            adapter,
            bus.clone(),
            &config,
            resonance,
        ));
        (engine, bus)
    }

    fn raw(source: &str, value: f64, timestamp: i64) -> RawInput {
        json!({ "source": source, "value": value, "timestamp": timestamp })
    }

    #[tokio::test]
    async fn test_process_raw_buffers_by_source() {
        let (engine, _bus) = engine_with_seeded_resonance();

        engine.process_raw(raw("price", 0.5, 1000)).await.unwrap();
        engine.process_raw(raw("price", 0.6, 1001)).await.unwrap();
        engine.process_raw(raw("volume", 0.7, 1002)).await.unwrap();

        assert_eq!(engine.buffered("price"), 2);
        assert_eq!(engine.buffered("volume"), 1);

        let mut sources = engine.sources();
        sources.sort();
        assert_eq!(sources, vec!["price", "volume"]);
    }

    #[tokio::test]
    async fn test_process_raw_feeds_resonance() {
        let (engine, bus) = engine_with_seeded_resonance();

        engine.process_raw(raw("price", 0.5, 1000)).await.unwrap();
        engine.process_raw(raw("volume", 0.6, 1010)).await.unwrap();

        assert_eq!(bus.history(Some(events::RESONANCE_INSIGHT)).len(), 1);
    }

    #[tokio::test]
    async fn test_extract_signature_unknown_source_is_default() {
        let (engine, bus) = engine_with_seeded_resonance();

        let signature = engine.extract_signature("nothing_here").await.unwrap();
        assert_eq!(signature.quadrant_profile, crate::model::QuadrantProfile::uniform());
        assert_eq!(signature.intensity, 0.0);

        let extracted = bus.history(Some(events::SIGNATURE_EXTRACTED));
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].payload["window_len"], 0);
    }

    #[tokio::test]
    async fn test_extract_and_match_roundtrip() {
        let (engine, bus) = engine_with_seeded_resonance();

        for i in 0..20 {
            engine
                .process_raw(raw("feed", 0.4 + 0.01 * i as f64, 1000 + i))
                .await
                .unwrap();
        }

        let signature = engine.extract_signature("feed").await.unwrap();

        // Empty corpus: not-found published
        engine.match_patterns(&signature, None).unwrap();
        assert_eq!(bus.history(Some(events::PATTERN_NOTFOUND)).len(), 1);

        // Exact record now matches with similarity 1.0
        engine.add_pattern(PatternRecord {
            id: "r1".to_string(),
            signature: signature.clone(),
            outcome: "GROWTH".to_string(),
            metadata: json!({}),
        });
        let matches = engine.match_patterns(&signature, None).unwrap();
        assert_eq!(matches.len(), 1);
        assert!((matches[0].similarity - 1.0).abs() < 1e-9);
        assert_eq!(bus.history(Some(events::PATTERN_MATCHED)).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ingestion_summarizes_periodically() {
        let (engine, bus) = engine_with_seeded_resonance();
        let (tx, rx) = mpsc::channel(64);

        let handle = tokio::spawn(Arc::clone(&engine).run_ingestion(rx, 1000));

        for i in 0..5 {
            tx.send(raw("price", 0.5, 2000 + i)).await.unwrap();
        }
        // Malformed raw is dropped, not fatal
        tx.send(json!({ "no_value": true })).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(bus.history(Some(events::SIGNATURE_EXTRACTED)).len(), 1);
        assert_eq!(engine.buffered("price"), 5);

        drop(tx);
        handle.await.unwrap();

        // Final pass on shutdown
        assert_eq!(bus.history(Some(events::SIGNATURE_EXTRACTED)).len(), 2);
    }
}
