//! Subscription loop and per-stream workers.
//!
//! ```text
//! EventSource ──▶ pump ──┬─▶ worker("votes")       ──┐
//!                        ├─▶ worker("reveals")     ──┼─▶ ProposalLocks ─▶ Reconciler::apply
//!                        └─▶ worker("delegations") ──┘       (spawn_blocking)
//! ```
//!
//! Each stream is applied strictly in order by its own worker; streams run
//! concurrently. A reveal that arrives before its commitment is retried with
//! backoff, waking early whenever any worker makes progress. When retries
//! run out the whole subscription is torn down and re-established from the
//! persisted cursors, so the ledger redelivers everything not yet applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinSet;
use tracing::Instrument;

use agora_store::GovernanceStore;
use agora_types::{StreamName, SyncCursor};

use crate::ledger_event::LedgerEvent;
use crate::locks::{LockKey, ProposalLocks};
use crate::metrics::ReconcilerMetrics;
use crate::reconciler::{ApplyOutcome, Reconciler};
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownController;
use crate::tracing_spans::{stream_worker_span, subscription_span};
use crate::NodeError;

/// The ledger side of the reconciler.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start delivering events that follow `cursors` (and any stream not
    /// listed, from its beginning). The channel closing means the
    /// subscription ended.
    async fn subscribe(
        &self,
        cursors: Vec<SyncCursor>,
    ) -> Result<mpsc::Receiver<LedgerEvent>, NodeError>;

    /// Whether a closed channel means "no more events" rather than a lost
    /// transport.
    fn is_finite(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PumpEnd {
    Shutdown,
    SourceClosed,
    Resubscribe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerExit {
    Drained,
    Stopped,
    RetryExhausted,
}

pub struct ReconcilerService<S> {
    reconciler: Arc<Reconciler<S>>,
    locks: Arc<ProposalLocks>,
    retry: RetryPolicy,
    resubscribe: RetryPolicy,
    progress: Arc<Notify>,
    metrics: Option<Arc<ReconcilerMetrics>>,
}

impl<S> ReconcilerService<S>
where
    S: GovernanceStore + Send + Sync + 'static,
{
    pub fn new(reconciler: Reconciler<S>, max_concurrent: usize) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            locks: Arc::new(ProposalLocks::new(max_concurrent)),
            retry: RetryPolicy::default(),
            resubscribe: RetryPolicy::default(),
            progress: Arc::new(Notify::new()),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_resubscribe(mut self, resubscribe: RetryPolicy) -> Self {
        self.resubscribe = resubscribe;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ReconcilerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn reconciler(&self) -> &Arc<Reconciler<S>> {
        &self.reconciler
    }

    /// Reconcile until shutdown, a fatal store error, or the end of a
    /// finite source.
    pub async fn run<E>(&self, source: &E, shutdown: &ShutdownController) -> Result<(), NodeError>
    where
        E: EventSource + ?Sized,
    {
        let mut backoff = self.resubscribe.backoff();
        let mut attempt: u64 = 0;

        while !shutdown.is_triggered() {
            attempt += 1;
            let span = subscription_span(attempt);
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.resubscriptions.inc();
                }
            }

            let cursors = self.reconciler.store().list_cursors()?;
            let events = match source.subscribe(cursors).instrument(span.clone()).await {
                Ok(events) => events,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(error = %e, attempt, "subscribe failed");
                    if sleep_or_shutdown(backoff.next_delay(), shutdown).await {
                        break;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let progress = Arc::new(AtomicU64::new(0));
            let end = self.pump(events, shutdown, &progress).instrument(span).await?;
            let progressed = progress.load(Ordering::SeqCst) > 0;
            if progressed {
                backoff.reset();
            }

            match end {
                PumpEnd::Shutdown => break,
                PumpEnd::SourceClosed if source.is_finite() => {
                    tracing::info!("event source exhausted");
                    break;
                }
                PumpEnd::SourceClosed => {
                    tracing::warn!(attempt, "event subscription lost");
                    if sleep_or_shutdown(backoff.next_delay(), shutdown).await {
                        break;
                    }
                }
                PumpEnd::Resubscribe if source.is_finite() && !progressed => {
                    tracing::warn!("out-of-order events remain unresolved, stopping");
                    break;
                }
                PumpEnd::Resubscribe => {
                    tracing::info!("resubscribing from persisted cursors");
                }
            }
        }

        self.locks.cleanup().await;
        tracing::info!("reconciler stopped");
        Ok(())
    }

    /// Route one subscription's events to stream workers until it ends.
    async fn pump(
        &self,
        mut events: mpsc::Receiver<LedgerEvent>,
        shutdown: &ShutdownController,
        progress: &Arc<AtomicU64>,
    ) -> Result<PumpEnd, NodeError> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut queues: HashMap<StreamName, mpsc::UnboundedSender<LedgerEvent>> = HashMap::new();
        let mut workers: JoinSet<Result<WorkerExit, NodeError>> = JoinSet::new();
        let mut shutdown_rx = shutdown.subscribe();
        if shutdown.is_triggered() {
            return Ok(PumpEnd::Shutdown);
        }

        let mut end = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break PumpEnd::Shutdown,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    match flatten(joined) {
                        Ok(WorkerExit::RetryExhausted) => break PumpEnd::Resubscribe,
                        Ok(_) => {}
                        Err(e) => {
                            stop_tx.send_replace(true);
                            while workers.join_next().await.is_some() {}
                            return Err(e);
                        }
                    }
                }
                next = events.recv() => match next {
                    Some(event) => {
                        let queue = queues.entry(event.stream.clone()).or_insert_with(|| {
                            self.spawn_worker(&event.stream, &mut workers, stop_rx.clone(), progress)
                        });
                        // A send only fails once the worker has exited; its exit
                        // is reported through the join set.
                        let _ = queue.send(event);
                    }
                    None => break PumpEnd::SourceClosed,
                },
            }
        };

        if end != PumpEnd::SourceClosed {
            stop_tx.send_replace(true);
        }
        // Closing the queues lets workers finish what they already received.
        drop(queues);

        let mut failure = None;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv(), if end != PumpEnd::Shutdown => {
                    stop_tx.send_replace(true);
                    end = PumpEnd::Shutdown;
                }
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(joined) => match flatten(joined) {
                        Ok(WorkerExit::RetryExhausted) => {
                            if end == PumpEnd::SourceClosed {
                                end = PumpEnd::Resubscribe;
                            }
                            stop_tx.send_replace(true);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            stop_tx.send_replace(true);
                            failure.get_or_insert(e);
                        }
                    },
                },
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(end),
        }
    }

    fn spawn_worker(
        &self,
        stream: &StreamName,
        workers: &mut JoinSet<Result<WorkerExit, NodeError>>,
        stop: watch::Receiver<bool>,
        progress: &Arc<AtomicU64>,
    ) -> mpsc::UnboundedSender<LedgerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = StreamWorker {
            reconciler: Arc::clone(&self.reconciler),
            locks: Arc::clone(&self.locks),
            retry: self.retry.clone(),
            wake: Arc::clone(&self.progress),
            progress: Arc::clone(progress),
            metrics: self.metrics.clone(),
        };
        tracing::debug!(stream = %stream, "starting stream worker");
        workers.spawn(worker.run(rx, stop).instrument(stream_worker_span(stream)));
        tx
    }
}

struct StreamWorker<S> {
    reconciler: Arc<Reconciler<S>>,
    locks: Arc<ProposalLocks>,
    retry: RetryPolicy,
    /// Shared by every worker; notified after each committed event.
    wake: Arc<Notify>,
    /// Committed events during the current subscription.
    progress: Arc<AtomicU64>,
    metrics: Option<Arc<ReconcilerMetrics>>,
}

impl<S> StreamWorker<S>
where
    S: GovernanceStore + Send + Sync + 'static,
{
    async fn run(
        self,
        mut queue: mpsc::UnboundedReceiver<LedgerEvent>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<WorkerExit, NodeError> {
        loop {
            if *stop.borrow() {
                return Ok(WorkerExit::Stopped);
            }
            let event = tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        return Ok(WorkerExit::Stopped);
                    }
                    continue;
                }
                next = queue.recv() => match next {
                    Some(event) => event,
                    None => return Ok(WorkerExit::Drained),
                },
            };
            if let Some(exit) = self.apply_with_retry(event, &mut stop).await? {
                return Ok(exit);
            }
        }
    }

    async fn apply_with_retry(
        &self,
        event: LedgerEvent,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<WorkerExit>, NodeError> {
        let key = LockKey::for_event(&event);
        let mut attempt = 0;
        loop {
            let reconciler = Arc::clone(&self.reconciler);
            let owned = event.clone();
            let outcome = self.locks.run(key, move || reconciler.apply(&owned)).await??;

            match outcome {
                ApplyOutcome::Applied { .. } | ApplyOutcome::Rejected { .. } => {
                    self.progress.fetch_add(1, Ordering::SeqCst);
                    self.wake.notify_waiters();
                    return Ok(None);
                }
                ApplyOutcome::Skipped => return Ok(None),
                ApplyOutcome::OutOfOrder => {
                    attempt += 1;
                    if attempt > self.retry.max_attempts {
                        tracing::warn!(
                            sequence = event.sequence,
                            attempts = attempt - 1,
                            "out-of-order event not resolved, requesting redelivery"
                        );
                        return Ok(Some(WorkerExit::RetryExhausted));
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.out_of_order_retries.inc();
                    }
                    let delay = self.retry.delay(attempt);
                    tracing::debug!(sequence = event.sequence, attempt, ?delay, "retrying out-of-order event");

                    let woken = self.wake.notified();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = woken => {}
                        _ = stop.changed() => return Ok(Some(WorkerExit::Stopped)),
                    }
                }
            }
        }
    }
}

fn flatten(
    joined: Result<Result<WorkerExit, NodeError>, tokio::task::JoinError>,
) -> Result<WorkerExit, NodeError> {
    joined.map_err(|e| NodeError::Fatal(format!("stream worker failed: {e}")))?
}

/// Sleep for `delay`; returns true if shutdown fired first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &ShutdownController) -> bool {
    let mut rx = shutdown.subscribe();
    if shutdown.is_triggered() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = rx.recv() => true,
    }
}
