//! Bounded-concurrency batch pipeline over an adapter
//!
//! Inputs are stable-sorted by descending priority, partitioned into chunks
//! of `concurrency`, and each chunk is dispatched with every adapter future
//! created before any is awaited. Awaiting the whole chunk is the single
//! suspension point of the pipeline (plus the optional inter-chunk delay),
//! so raising `concurrency` only helps I/O-bound adapters.
//!
//! Lifecycle and progress events are published on the bus after each chunk;
//! a per-item failure is captured in its `BatchResult` unless
//! `continue_on_error` is off, in which case the first failure aborts the
//! remaining chunks.

use crate::adapter::{RawInput, SignalAdapter};
use crate::bus::{events, EventBus};
use crate::model::Signal;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInput {
    pub id: String,
    pub data: RawInput,
    /// Higher priority is processed first; ties keep arrival order
    #[serde(default)]
    pub priority: i32,
}

impl BatchInput {
    pub fn new(id: impl Into<String>, data: RawInput) -> Self {
        Self {
            id: id.into(),
            data,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Exactly one result per input; `signal` is set on success, `error` on
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub id: String,
    pub success: bool,
    pub signal: Option<Signal>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    /// Items processed so far (successes and failures)
    pub completed: usize,
    pub failed: usize,
    pub percentage: f64,
    /// Remaining items × running average processing time
    pub estimated_remaining_ms: u64,
}

pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

#[derive(Clone)]
pub struct BatchConfig {
    /// Chunk size for concurrent dispatch, >= 1
    pub concurrency: usize,
    /// Capture per-item failures and keep going (default), or abort the
    /// batch on the first failure
    pub continue_on_error: bool,
    /// Sleep between chunks, not between items within a chunk
    pub item_delay_ms: u64,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            continue_on_error: true,
            item_delay_ms: 0,
            on_progress: None,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<(), BatchError> {
        if self.concurrency < 1 {
            return Err(BatchError::InvalidConfig(
                "concurrency must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum BatchError {
    /// Malformed configuration, rejected before any work starts
    InvalidConfig(String),
    /// First item failure when `continue_on_error` is off
    ItemFailed { id: String, message: String },
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::InvalidConfig(msg) => write!(f, "invalid batch config: {}", msg),
            BatchError::ItemFailed { id, message } => {
                write!(f, "batch aborted at item '{}': {}", id, message)
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// Summary over a finished batch, computed by [`aggregate_results`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_processing_time_ms: u64,
    pub average_processing_time_ms: f64,
    /// Count per source tag over successful results only
    pub source_distribution: HashMap<String, usize>,
}

pub struct BatchProcessor {
    adapter: Arc<dyn SignalAdapter>,
    bus: EventBus,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(adapter: Arc<dyn SignalAdapter>, bus: EventBus) -> Self {
        Self {
            adapter,
            bus,
            config: BatchConfig::default(),
        }
    }

    /// Construct with an explicit config; malformed configs are rejected
    /// here rather than surfacing mid-batch.
    pub fn with_config(
        adapter: Arc<dyn SignalAdapter>,
        bus: EventBus,
        config: BatchConfig,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self {
            adapter,
            bus,
            config,
        })
    }

    /// Process a batch, returning one result per input in priority-sorted
    /// processing order.
    ///
    /// With `continue_on_error` the returned length always equals the input
    /// length; otherwise the first failure aborts and already-completed
    /// results are discarded.
    pub async fn process_batch(
        &self,
        inputs: Vec<BatchInput>,
    ) -> Result<Vec<BatchResult>, BatchError> {
        self.config.validate()?;

        let total = inputs.len();
        let batch_start = Instant::now();

        self.bus
            .publish(events::BATCH_STARTED, json!({ "total": total }));

        // Stable sort: equal priorities keep arrival order
        let mut sorted = inputs;
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut results: Vec<BatchResult> = Vec::with_capacity(total);
        let mut failed = 0usize;
        let mut elapsed_total_ms = 0u64;

        let chunk_count = sorted.len().div_ceil(self.config.concurrency).max(1);
        for (chunk_idx, chunk) in sorted.chunks(self.config.concurrency).enumerate() {
            // Create every future before awaiting any of them
            let futures: Vec<_> = chunk.iter().map(|input| self.process_item(input)).collect();
            let chunk_results = join_all(futures).await;

            for result in chunk_results {
                if !result.success {
                    failed += 1;
                    if !self.config.continue_on_error {
                        let message = result
                            .error
                            .clone()
                            .unwrap_or_else(|| "unknown failure".to_string());
                        self.bus.publish(
                            events::ERROR_BATCH,
                            json!({ "id": result.id, "error": message }),
                        );
                        return Err(BatchError::ItemFailed {
                            id: result.id,
                            message,
                        });
                    }
                }
                elapsed_total_ms += result.processing_time_ms;
                results.push(result);
            }

            self.report_progress(total, results.len(), failed, elapsed_total_ms);

            if self.config.item_delay_ms > 0 && chunk_idx + 1 < chunk_count {
                sleep(Duration::from_millis(self.config.item_delay_ms)).await;
            }
        }

        self.bus.publish(
            events::BATCH_COMPLETED,
            json!({
                "total": total,
                "succeeded": total - failed,
                "failed": failed,
                "elapsed_ms": batch_start.elapsed().as_millis() as u64,
            }),
        );

        Ok(results)
    }

    async fn process_item(&self, input: &BatchInput) -> BatchResult {
        let start = Instant::now();
        match self.adapter.ingest(input.data.clone()).await {
            Ok(signal) => BatchResult {
                id: input.id.clone(),
                success: true,
                signal: Some(signal),
                error: None,
                processing_time_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => BatchResult {
                id: input.id.clone(),
                success: false,
                signal: None,
                error: Some(e.to_string()),
                processing_time_ms: start.elapsed().as_millis() as u64,
            },
        }
    }

    fn report_progress(&self, total: usize, completed: usize, failed: usize, elapsed_ms: u64) {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            100.0
        };
        let average_ms = if completed > 0 {
            elapsed_ms as f64 / completed as f64
        } else {
            0.0
        };
        let remaining = total - completed;
        let progress = BatchProgress {
            total,
            completed,
            failed,
            percentage,
            estimated_remaining_ms: (remaining as f64 * average_ms) as u64,
        };

        log::debug!(
            "batch progress: {}/{} ({:.1}%), {} failed",
            completed,
            total,
            percentage,
            failed
        );

        self.bus.publish(
            events::BATCH_PROGRESS,
            serde_json::to_value(&progress).unwrap_or_default(),
        );
        if let Some(ref callback) = self.config.on_progress {
            callback(&progress);
        }
    }
}

/// Compute success/failure counts, timing totals, and the per-source
/// distribution over successful results.
pub fn aggregate_results(results: &[BatchResult]) -> BatchSummary {
    let success_count = results.iter().filter(|r| r.success).count();
    let failure_count = results.len() - success_count;
    let total_processing_time_ms: u64 = results.iter().map(|r| r.processing_time_ms).sum();
    let average_processing_time_ms = if results.is_empty() {
        0.0
    } else {
        total_processing_time_ms as f64 / results.len() as f64
    };

    let mut source_distribution: HashMap<String, usize> = HashMap::new();
    for result in results.iter().filter(|r| r.success) {
        if let Some(ref signal) = result.signal {
            *source_distribution.entry(signal.source.clone()).or_insert(0) += 1;
        }
    }

    BatchSummary {
        success_count,
        failure_count,
        total_processing_time_ms,
        average_processing_time_ms,
        source_distribution,
    }
}
