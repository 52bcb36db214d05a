/// Debounced, coalescing webhook queue.
///
/// The queue is a three-state machine — Idle, Debouncing, Processing. Each
/// enqueue appends to the pending slice and re-arms the debounce timer;
/// when the timer fires (or [`WebhookQueue::flush`] forces it), the pending
/// slice is atomically swapped for an empty one and handed to the batch
/// processor as one batch. Enqueues arriving during processing start a new
/// pending slice, so batches never overlap and execute serially.
///
/// Timer re-arming is generation-based: every enqueue bumps a counter and
/// spawns a sleep carrying the observed value; a sleeper whose generation
/// went stale simply does nothing.
use super::WebhookRequest;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// One queued webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookWorkItem {
    /// Target plugin.
    pub plugin_name: String,
    /// Path below the plugin's webhook namespace.
    pub path: String,
    /// Originating request parts.
    pub request: WebhookRequest,
    /// Raw body bytes.
    pub raw_body: Vec<u8>,
    /// Parsed JSON body.
    pub parsed_body: JsonValue,
}

/// Consumes swapped-in batches.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Process one batch, in enqueue order.
    async fn process(&self, batch: Vec<WebhookWorkItem>);
}

struct QueueInner {
    pending: StdMutex<Vec<WebhookWorkItem>>,
    generation: AtomicU64,
    debounce: Duration,
    processor: StdMutex<Option<Arc<dyn BatchProcessor>>>,
    /// Held while a batch runs; serializes batches.
    processing: AsyncMutex<()>,
}

/// The coalescing queue.
#[derive(Clone)]
pub struct WebhookQueue {
    inner: Arc<QueueInner>,
}

impl WebhookQueue {
    /// Create a queue with the default debounce window.
    pub fn new() -> Self {
        Self::with_debounce(DEFAULT_DEBOUNCE)
    }

    /// Create a queue with a custom debounce window.
    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: StdMutex::new(Vec::new()),
                generation: AtomicU64::new(0),
                debounce,
                processor: StdMutex::new(None),
                processing: AsyncMutex::new(()),
            }),
        }
    }

    /// Install the batch processor. Must be called before traffic arrives;
    /// batches swapped while no processor is installed are dropped with a
    /// warning.
    pub fn set_processor(&self, processor: Arc<dyn BatchProcessor>) {
        *self.inner.processor.lock().expect("queue poisoned") = Some(processor);
    }

    /// Append a work item and (re)arm the debounce timer.
    ///
    /// Synchronous and cheap; the caller can respond 202 immediately.
    pub fn enqueue(&self, item: WebhookWorkItem) {
        {
            let mut pending = self.inner.pending.lock().expect("queue poisoned");
            pending.push(item);
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(queue.inner.debounce).await;
            if queue.inner.generation.load(Ordering::SeqCst) == generation {
                queue.flush().await;
            }
        });
    }

    /// Force an immediate swap-and-process of the pending slice.
    ///
    /// Also invalidates any armed timer. Used by tests and shutdown.
    pub async fn flush(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let batch: Vec<WebhookWorkItem> = {
            let mut pending = self.inner.pending.lock().expect("queue poisoned");
            std::mem::take(&mut *pending)
        };
        if batch.is_empty() {
            return;
        }

        let processor = self
            .inner
            .processor
            .lock()
            .expect("queue poisoned")
            .clone();
        let Some(processor) = processor else {
            tracing::warn!(dropped = batch.len(), "webhook batch dropped: no processor");
            return;
        };

        let _serial = self.inner.processing.lock().await;
        debug!(size = batch.len(), "processing webhook batch");
        processor.process(batch).await;
    }

    /// Number of items waiting for the next batch.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().expect("queue poisoned").len()
    }

    /// Drop pending items and invalidate timers.
    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.pending.lock().expect("queue poisoned").clear();
    }
}

impl Default for WebhookQueue {
    fn default() -> Self {
        Self::new()
    }
}
