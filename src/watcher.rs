//! Per-collection capture loop.
//!
//! The core state machine: resume a change stream from the last
//! checkpoint, normalize and accumulate each event, advance the
//! checkpoint after every event, and export on the time window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::BatchAccumulator;
use crate::checkpoint::CheckpointStore;
use crate::emit;
use crate::error::{CheckpointSnafu, StreamSnafu, WatcherError};
use crate::export::BlobExporter;
use crate::metrics::events::{
    BatchExported, BatchStatus, CheckpointsSaved, EventsProcessed, StopReason, WatcherStopped,
};
use crate::normalize;
use crate::stream::EventSource;

/// Lifecycle states of a collection watcher. Flushing happens inside
/// `Streaming`, not as a separate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Streaming,
    Stopped,
}

impl WatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherState::Starting => "starting",
            WatcherState::Streaming => "streaming",
            WatcherState::Stopped => "stopped",
        }
    }
}

/// Terminal report for one watcher, collected by the supervisor.
#[derive(Debug)]
pub struct WatcherOutcome {
    pub collection: String,
    pub events_processed: u64,
    pub batches_exported: u64,
    pub result: Result<(), WatcherError>,
}

/// Watches one collection's change stream and drives it through
/// normalize, accumulate, checkpoint, and export.
pub struct CollectionWatcher<S> {
    collection: String,
    source: S,
    checkpoints: Arc<dyn CheckpointStore>,
    exporter: BlobExporter,
    accumulator: BatchAccumulator,
    state: WatcherState,
    shutdown: CancellationToken,
    events_processed: u64,
    batches_exported: u64,
}

impl<S: EventSource> CollectionWatcher<S> {
    pub fn new(
        collection: String,
        source: S,
        checkpoints: Arc<dyn CheckpointStore>,
        exporter: BlobExporter,
        flush_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            collection,
            source,
            checkpoints,
            exporter,
            accumulator: BatchAccumulator::new(flush_interval, Instant::now()),
            state: WatcherState::Starting,
            shutdown,
            events_processed: 0,
            batches_exported: 0,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    fn transition(&mut self, next: WatcherState) {
        debug!(
            collection = %self.collection,
            from = self.state.as_str(),
            to = next.as_str(),
            "Watcher state change"
        );
        self.state = next;
    }

    /// Drive the watcher to its terminal state, returning the outcome.
    ///
    /// Fatal errors are captured in the outcome rather than propagated, so
    /// the supervisor can keep sibling watchers running.
    pub async fn run(mut self) -> WatcherOutcome {
        let result = self.watch().await;
        self.transition(WatcherState::Stopped);

        let reason = match &result {
            Ok(()) if self.shutdown.is_cancelled() => StopReason::Shutdown,
            Ok(()) => StopReason::StreamEnded,
            Err(_) => StopReason::Error,
        };
        emit!(WatcherStopped { reason });

        match &result {
            Ok(()) => info!(
                collection = %self.collection,
                events = self.events_processed,
                "Watcher stopped"
            ),
            Err(e) => error!(
                collection = %self.collection,
                error = %e,
                events = self.events_processed,
                "Watcher stopped on fatal error"
            ),
        }

        WatcherOutcome {
            collection: self.collection,
            events_processed: self.events_processed,
            batches_exported: self.batches_exported,
            result,
        }
    }

    async fn watch(&mut self) -> Result<(), WatcherError> {
        let resume_after = self
            .checkpoints
            .get(&self.collection)
            .await
            .context(CheckpointSnafu)?;

        match &resume_after {
            Some(_) => info!(
                collection = %self.collection,
                "Resuming change stream after stored checkpoint"
            ),
            None => info!(
                collection = %self.collection,
                "No checkpoint found, tailing from current position"
            ),
        }

        let mut events = self
            .source
            .open(resume_after)
            .await
            .context(StreamSnafu)?;
        self.transition(WatcherState::Streaming);
        // The batch window starts when streaming begins, not at spawn.
        self.accumulator.restart_window(Instant::now());

        loop {
            // The only suspension point: waiting for the next event.
            // Cancellation is honored here, never mid-event.
            let next = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!(collection = %self.collection, "Shutdown requested, stopping watcher");
                    break;
                }

                next = events.next() => next,
            };

            let Some(event) = next else {
                warn!(collection = %self.collection, "Change stream ended");
                break;
            };
            let event = event.context(StreamSnafu)?;

            // The record must be queued before the token is stored:
            // checkpointing first could advance past an uncaptured event.
            let record = normalize::normalize(&event);
            self.accumulator.append(record);

            self.checkpoints
                .put(&self.collection, event.resume_token)
                .await
                .context(CheckpointSnafu)?;

            self.events_processed += 1;
            emit!(EventsProcessed { count: 1 });
            emit!(CheckpointsSaved { count: 1 });

            if self.accumulator.should_flush(Instant::now()) {
                self.flush().await;
            }
        }

        // Best-effort flush of the partial window: these events are
        // already checkpointed, so dropping them on a clean stop would be
        // a real gap, not a delay.
        if !self.accumulator.is_empty() {
            self.flush().await;
        }

        Ok(())
    }

    /// Take the open batch and hand it to the exporter.
    ///
    /// Export failure never stalls capture: the batch is logged and
    /// dropped, and the window restarts either way.
    async fn flush(&mut self) {
        let batch = self.accumulator.take_and_reset(Instant::now());
        if batch.is_empty() {
            return;
        }

        debug!(collection = %self.collection, rows = batch.len(), "Flushing batch");
        match self.exporter.export(&self.collection, &batch).await {
            Ok(()) => {
                self.batches_exported += 1;
                emit!(BatchExported {
                    status: BatchStatus::Success
                });
            }
            Err(e) => {
                warn!(
                    collection = %self.collection,
                    error = %e,
                    rows = batch.len(),
                    "Export failed, dropping batch"
                );
                emit!(BatchExported {
                    status: BatchStatus::Failed
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CheckpointError, StreamError};
    use crate::storage::BlobStore;
    use crate::stream::{ChangeEvent, EventStream};
    use async_trait::async_trait;
    use mongodb::change_stream::event::ResumeToken;

    /// Source whose stream never yields; used to park a watcher on its
    /// suspension point.
    struct NeverSource;

    #[async_trait]
    impl EventSource for NeverSource {
        async fn open(
            &self,
            _resume_after: Option<ResumeToken>,
        ) -> Result<EventStream, StreamError> {
            Ok(futures::stream::pending::<Result<ChangeEvent, StreamError>>().boxed())
        }
    }

    struct NoopStore;

    #[async_trait]
    impl CheckpointStore for NoopStore {
        async fn get(&self, _collection: &str) -> Result<Option<ResumeToken>, CheckpointError> {
            Ok(None)
        }

        async fn put(&self, _collection: &str, _token: ResumeToken) -> Result<(), CheckpointError> {
            Ok(())
        }
    }

    fn parked_watcher(shutdown: CancellationToken) -> CollectionWatcher<NeverSource> {
        CollectionWatcher::new(
            "orders".to_string(),
            NeverSource,
            Arc::new(NoopStore),
            BlobExporter::new(Arc::new(BlobStore::in_memory())),
            Duration::from_secs(300),
            shutdown,
        )
    }

    #[test]
    fn test_watcher_starts_in_starting_state() {
        let watcher = parked_watcher(CancellationToken::new());
        assert_eq!(watcher.state(), WatcherState::Starting);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_the_wait_for_events() {
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(parked_watcher(shutdown.clone()).run());

        shutdown.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should stop promptly")
            .expect("watcher task should not panic");
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.events_processed, 0);
    }
}
