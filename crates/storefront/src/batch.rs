//! Generic request coalescing.
//!
//! [`BatchProcessor`] groups many independent "add one item, get one
//! result" calls into fewer upstream calls, bounded by batch size or
//! wait time. One instance per coalescing boundary (e.g. one for
//! release lookups), constructed explicitly and passed by handle -
//! there is no ambient/global queue state.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Errors the batch function can return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type BatchFuture<R> = Pin<Box<dyn Future<Output = Result<Vec<R>, BoxError>> + Send>>;
type BatchFn<T, R> = Box<dyn Fn(Vec<T>) -> BatchFuture<R> + Send + Sync>;

/// Error resolving a batched item.
///
/// A batch failure is shared: every caller whose item was in the failed
/// batch receives a clone of the same error.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// The batch function failed; no item in the batch succeeded.
    #[error("batch call failed: {0}")]
    Failed(Arc<BoxError>),

    /// The batch function broke its positional contract by returning the
    /// wrong number of results.
    #[error("batch function returned {got} results for {expected} items")]
    ResultCountMismatch { expected: usize, got: usize },

    /// The processor was dropped before this item's batch ran.
    #[error("batch processor closed before the batch ran")]
    Closed,
}

/// Batch processor configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush.
    pub max_batch_size: usize,
    /// How long the first queued item waits before a flush is forced.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_wait: Duration::from_millis(1000),
        }
    }
}

struct State<T, R> {
    pending: Vec<(T, oneshot::Sender<Result<R, BatchError>>)>,
    flush_in_flight: bool,
    /// Bumped whenever the queue is snapshotted so a stale wait timer
    /// cannot trigger a second flush for a batch that already ran.
    timer_generation: u64,
}

struct Inner<T, R> {
    config: BatchConfig,
    batch_fn: BatchFn<T, R>,
    state: Mutex<State<T, R>>,
}

/// Coalesces concurrent single-item requests into batched upstream calls.
///
/// Items accumulate in an ordered queue. The queue is flushed the moment
/// it reaches `max_batch_size`; otherwise a single deferred timer,
/// started on the first enqueue into an empty queue, flushes it after
/// `max_wait`. At most one flush runs at a time - items enqueued during
/// an in-flight flush form the next batch, which runs immediately after
/// the current one completes.
///
/// The batch function receives the queue snapshot in enqueue order and
/// must return one result per item, positionally. Callers abandoning
/// their future does not cancel the batch; the upstream call may be
/// shared with other still-interested callers.
pub struct BatchProcessor<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Clone for BatchProcessor<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R> BatchProcessor<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Create a processor around a batch function.
    ///
    /// The i-th result of `batch_fn` must correspond to the i-th item of
    /// the batch it was called with; returning a different number of
    /// results fails the whole batch with
    /// [`BatchError::ResultCountMismatch`].
    pub fn new<F, Fut>(config: BatchConfig, batch_fn: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>, BoxError>> + Send + 'static,
    {
        let inner = Arc::new(Inner {
            config,
            batch_fn: Box::new(move |items| Box::pin(batch_fn(items))),
            state: Mutex::new(State {
                pending: Vec::new(),
                flush_in_flight: false,
                timer_generation: 0,
            }),
        });

        Self { inner }
    }

    /// Enqueue one item and wait for the result of the batch containing it.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] if the batch function fails, breaks its
    /// positional contract, or the processor is dropped first.
    pub async fn add(&self, item: T) -> Result<R, BatchError> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.pending.push((item, tx));

            if state.pending.len() >= self.inner.config.max_batch_size {
                if !state.flush_in_flight {
                    state.flush_in_flight = true;
                    tokio::spawn(run_flushes(Arc::clone(&self.inner)));
                }
            } else if state.pending.len() == 1 && !state.flush_in_flight {
                // First item into an empty queue arms the wait timer.
                state.timer_generation += 1;
                let generation = state.timer_generation;
                tokio::spawn(wait_then_flush(Arc::clone(&self.inner), generation));
            }
        }

        rx.await.map_err(|_| BatchError::Closed)?
    }
}

/// Timer task: flush whatever is queued once `max_wait` elapses, unless
/// a size-triggered flush already took the batch.
async fn wait_then_flush<T, R>(inner: Arc<Inner<T, R>>, generation: u64)
where
    T: Send + 'static,
    R: Send + 'static,
{
    tokio::time::sleep(inner.config.max_wait).await;

    let start = {
        let mut state = inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let still_current = state.timer_generation == generation;
        if still_current && !state.flush_in_flight && !state.pending.is_empty() {
            state.flush_in_flight = true;
            true
        } else {
            false
        }
    };

    if start {
        run_flushes(inner).await;
    }
}

/// Drain the queue one snapshot at a time until it is empty.
///
/// Invariant: the caller has already set `flush_in_flight`; this task is
/// the only flusher until it clears the flag.
async fn run_flushes<T, R>(inner: Arc<Inner<T, R>>)
where
    T: Send + 'static,
    R: Send + 'static,
{
    loop {
        let batch: Vec<(T, oneshot::Sender<Result<R, BatchError>>)> = {
            let mut state = inner
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            // Invalidate any armed timer; its batch is being taken now.
            state.timer_generation += 1;
            std::mem::take(&mut state.pending)
        };

        if batch.is_empty() {
            let mut state = inner
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            state.flush_in_flight = false;
            return;
        }

        debug!(batch_size = batch.len(), "flushing batch");

        let (items, senders): (Vec<T>, Vec<_>) = batch.into_iter().unzip();
        let expected = senders.len();

        match (inner.batch_fn)(items).await {
            Ok(results) if results.len() == expected => {
                for (sender, result) in senders.into_iter().zip(results) {
                    // A caller may have dropped its receiver; the batch
                    // still ran for everyone else.
                    let _ = sender.send(Ok(result));
                }
            }
            Ok(results) => {
                let err = BatchError::ResultCountMismatch {
                    expected,
                    got: results.len(),
                };
                for sender in senders {
                    let _ = sender.send(Err(err.clone()));
                }
            }
            Err(e) => {
                let shared = Arc::new(e);
                for sender in senders {
                    let _ = sender.send(Err(BatchError::Failed(Arc::clone(&shared))));
                }
            }
        }

        let mut state = inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.pending.is_empty() {
            state.flush_in_flight = false;
            return;
        }
        // Items arrived during the flush; take them immediately.
        drop(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doubling_processor(
        config: BatchConfig,
        calls: Arc<AtomicUsize>,
        batches: Arc<Mutex<Vec<Vec<i64>>>>,
    ) -> BatchProcessor<i64, i64> {
        BatchProcessor::new(config, move |items: Vec<i64>| {
            let calls = Arc::clone(&calls);
            let batches = Arc::clone(&batches);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                batches
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(items.clone());
                Ok(items.into_iter().map(|i| i * 2).collect())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_triggered_flush_is_one_call_with_positional_results() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let processor = doubling_processor(
            BatchConfig {
                max_batch_size: 3,
                max_wait: Duration::from_secs(60),
            },
            Arc::clone(&calls),
            Arc::clone(&batches),
        );

        let (a, b, c) = tokio::join!(processor.add(1), processor.add(2), processor.add(3));

        assert_eq!(a.expect("a"), 2);
        assert_eq!(b.expect("b"), 4);
        assert_eq!(c.expect("c"), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *batches
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
            vec![vec![1, 2, 3]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_triggered_flush_below_max_size() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let processor = doubling_processor(
            BatchConfig {
                max_batch_size: 10,
                max_wait: Duration::from_millis(1000),
            },
            Arc::clone(&calls),
            Arc::clone(&batches),
        );

        let started = tokio::time::Instant::now();
        let (a, b) = tokio::join!(processor.add(5), processor.add(7));

        assert_eq!(a.expect("a"), 10);
        assert_eq!(b.expect("b"), 14);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Nothing resolved before the wait timer fired.
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_failure_rejects_every_caller_with_same_error() {
        let processor: BatchProcessor<i64, i64> =
            BatchProcessor::new(BatchConfig::default(), |_items: Vec<i64>| async {
                Err::<Vec<i64>, BoxError>("upstream exploded".into())
            });

        let (a, b) = tokio::join!(processor.add(1), processor.add(2));

        let a_err = a.expect_err("a should fail").to_string();
        let b_err = b.expect_err("b should fail").to_string();
        assert_eq!(a_err, "batch call failed: upstream exploded");
        assert_eq!(a_err, b_err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_count_mismatch_fails_batch() {
        let processor: BatchProcessor<i64, i64> =
            BatchProcessor::new(BatchConfig::default(), |_items: Vec<i64>| async {
                Ok(vec![1]) // wrong: batch has two items
            });

        let (a, b) = tokio::join!(processor.add(1), processor.add(2));

        assert!(matches!(
            a.expect_err("a"),
            BatchError::ResultCountMismatch { expected: 2, got: 1 }
        ));
        assert!(matches!(
            b.expect_err("b"),
            BatchError::ResultCountMismatch { expected: 2, got: 1 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_during_in_flight_flush_form_next_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let slow_calls = Arc::clone(&calls);
        let slow_batches = Arc::clone(&batches);

        let processor: BatchProcessor<i64, i64> = BatchProcessor::new(
            BatchConfig {
                max_batch_size: 2,
                max_wait: Duration::from_secs(60),
            },
            move |items: Vec<i64>| {
                let calls = Arc::clone(&slow_calls);
                let batches = Arc::clone(&slow_batches);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    batches
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .push(items.clone());
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(items.into_iter().map(|i| i * 2).collect())
                }
            },
        );

        let late = {
            let processor = processor.clone();
            async move {
                // Arrives while the first flush is in flight.
                tokio::time::sleep(Duration::from_millis(10)).await;
                processor.add(3).await
            }
        };

        let (a, b, c) = tokio::join!(processor.add(1), processor.add(2), late);

        assert_eq!(a.expect("a"), 2);
        assert_eq!(b.expect("b"), 4);
        assert_eq!(c.expect("c"), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *batches
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
            vec![vec![1, 2], vec![3]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_item_waits_full_timer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(Mutex::new(Vec::new()));
        let processor = doubling_processor(
            BatchConfig {
                max_batch_size: 10,
                max_wait: Duration::from_millis(250),
            },
            Arc::clone(&calls),
            batches,
        );

        let started = tokio::time::Instant::now();
        let result = processor.add(21).await.expect("result");
        assert_eq!(result, 42);
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
