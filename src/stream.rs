//! Size-or-time buffered stream wrapper over the batch processor
//!
//! Items accumulate in a buffer; reaching `buffer_size` flushes immediately
//! and cancels any armed timer. Otherwise the first push since the last
//! flush arms a one-shot flush timer — later pushes never reset it, so the
//! clock starts with the oldest buffered item. Concurrency defaults low (3)
//! for fairness against other tasks on the runtime.

use crate::adapter::SignalAdapter;
use crate::batch::{BatchConfig, BatchError, BatchInput, BatchProcessor, BatchResult};
use crate::bus::EventBus;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

pub type FlushCallback = Arc<dyn Fn(&[BatchResult]) + Send + Sync>;

#[derive(Clone)]
pub struct StreamConfig {
    /// Buffer length that triggers an immediate flush
    pub buffer_size: usize,
    /// Time-based flush deadline measured from the first buffered item
    pub flush_interval_ms: u64,
    /// Concurrency handed to the underlying batch processor
    pub concurrency: usize,
    pub on_flush: Option<FlushCallback>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10,
            flush_interval_ms: 1000,
            concurrency: 3,
            on_flush: None,
        }
    }
}

struct StreamState {
    buffer: Vec<BatchInput>,
    /// Whether a flush timer task is in flight for the current cycle
    timer_armed: bool,
    /// Bumped on every flush; an armed timer whose captured generation no
    /// longer matches has been superseded and must not touch the buffer
    generation: u64,
}

struct StreamInner {
    processor: BatchProcessor,
    config: StreamConfig,
    state: Mutex<StreamState>,
}

#[derive(Clone)]
pub struct StreamProcessor {
    inner: Arc<StreamInner>,
}

impl StreamProcessor {
    pub fn new(adapter: Arc<dyn SignalAdapter>, bus: EventBus, config: StreamConfig) -> Result<Self, BatchError> {
        let batch_config = BatchConfig {
            concurrency: config.concurrency,
            ..BatchConfig::default()
        };
        let processor = BatchProcessor::with_config(adapter, bus, batch_config)?;

        Ok(Self {
            inner: Arc::new(StreamInner {
                processor,
                config,
                state: Mutex::new(StreamState {
                    buffer: Vec::new(),
                    timer_armed: false,
                    generation: 0,
                }),
            }),
        })
    }

    /// Buffer an item. Returns the flush results when this push filled the
    /// buffer, `None` otherwise.
    pub async fn push(&self, item: BatchInput) -> Result<Option<Vec<BatchResult>>, BatchError> {
        let should_flush = {
            let mut state = self.inner.state.lock().unwrap();
            state.buffer.push(item);

            if state.buffer.len() >= self.inner.config.buffer_size {
                true
            } else {
                if !state.timer_armed {
                    state.timer_armed = true;
                    Self::arm_timer(&self.inner, state.generation);
                }
                false
            }
        };

        if should_flush {
            return Ok(Some(Self::flush_inner(&self.inner).await?));
        }
        Ok(None)
    }

    /// Flush the buffer now, cancelling any armed timer. Flushing an empty
    /// buffer is a no-op returning an empty list.
    pub async fn flush(&self) -> Result<Vec<BatchResult>, BatchError> {
        Self::flush_inner(&self.inner).await
    }

    /// Final flush; behavior of `push` after close is undefined.
    pub async fn close(&self) -> Result<Vec<BatchResult>, BatchError> {
        Self::flush_inner(&self.inner).await
    }

    pub fn buffered(&self) -> usize {
        self.inner.state.lock().unwrap().buffer.len()
    }

    fn arm_timer(inner: &Arc<StreamInner>, armed_generation: u64) {
        let inner = Arc::clone(inner);
        let interval = inner.config.flush_interval_ms;
        tokio::spawn(async move {
            sleep(Duration::from_millis(interval)).await;

            // Only flush if no other flush ran since this timer was armed;
            // a stale timer belongs to an already-completed cycle
            let snapshot = {
                let mut state = inner.state.lock().unwrap();
                if state.generation != armed_generation {
                    return;
                }
                state.generation += 1;
                state.timer_armed = false;
                std::mem::take(&mut state.buffer)
            };

            if let Err(e) = Self::process_snapshot(&inner, snapshot).await {
                log::error!("timed stream flush failed: {}", e);
            }
        });
    }

    async fn flush_inner(inner: &Arc<StreamInner>) -> Result<Vec<BatchResult>, BatchError> {
        // Snapshot under the lock, delegate outside it. Bumping the
        // generation invalidates any armed timer for this cycle.
        let snapshot = {
            let mut state = inner.state.lock().unwrap();
            state.generation += 1;
            state.timer_armed = false;
            std::mem::take(&mut state.buffer)
        };

        Self::process_snapshot(inner, snapshot).await
    }

    async fn process_snapshot(
        inner: &Arc<StreamInner>,
        snapshot: Vec<BatchInput>,
    ) -> Result<Vec<BatchResult>, BatchError> {
        if snapshot.is_empty() {
            return Ok(Vec::new());
        }

        log::debug!("flushing {} buffered items", snapshot.len());
        let results = inner.processor.process_batch(snapshot).await?;

        if let Some(ref callback) = inner.config.on_flush {
            callback(&results);
        }
        Ok(results)
    }
}
