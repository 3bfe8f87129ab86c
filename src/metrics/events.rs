//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the forwarder.
//! Events implement the `InternalEvent` trait which records the
//! corresponding Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when change events are consumed from a stream.
pub struct EventsProcessed {
    pub count: u64,
}

impl InternalEvent for EventsProcessed {
    fn emit(self) {
        trace!(count = self.count, "Change events processed");
        counter!("millrace_events_processed_total").increment(self.count);
    }
}

/// Event emitted after a resume token is durably stored.
pub struct CheckpointsSaved {
    pub count: u64,
}

impl InternalEvent for CheckpointsSaved {
    fn emit(self) {
        trace!(count = self.count, "Checkpoints saved");
        counter!("millrace_checkpoints_saved_total").increment(self.count);
    }
}

/// Event emitted when records land in an exported object.
pub struct RecordsExported {
    pub count: u64,
}

impl InternalEvent for RecordsExported {
    fn emit(self) {
        trace!(count = self.count, "Records exported");
        counter!("millrace_records_exported_total").increment(self.count);
    }
}

/// Event emitted when bytes are written to the sink.
pub struct BytesWritten {
    pub bytes: u64,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(bytes = self.bytes, "Bytes written");
        counter!("millrace_bytes_written_total").increment(self.bytes);
    }
}

/// Outcome of a batch flush.
#[derive(Debug, Clone, Copy)]
pub enum BatchStatus {
    Success,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Success => "success",
            BatchStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a batch flush completes (either way).
pub struct BatchExported {
    pub status: BatchStatus,
}

impl InternalEvent for BatchExported {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Batch exported");
        counter!("millrace_batches_exported_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Why a watcher reached its terminal state.
#[derive(Debug, Clone, Copy)]
pub enum StopReason {
    Shutdown,
    StreamEnded,
    Error,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Shutdown => "shutdown",
            StopReason::StreamEnded => "stream_ended",
            StopReason::Error => "error",
        }
    }
}

/// Event emitted when a collection watcher stops.
pub struct WatcherStopped {
    pub reason: StopReason,
}

impl InternalEvent for WatcherStopped {
    fn emit(self) {
        trace!(reason = self.reason.as_str(), "Watcher stopped");
        counter!("millrace_watchers_stopped_total", "reason" => self.reason.as_str()).increment(1);
    }
}

/// Gauge of watchers currently running.
pub struct ActiveWatchers {
    pub count: usize,
}

impl InternalEvent for ActiveWatchers {
    fn emit(self) {
        gauge!("millrace_active_watchers").set(self.count as f64);
    }
}

/// Storage operation type.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Put,
    Get,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Put => "put",
            StorageOperation::Get => "get",
            StorageOperation::List => "list",
        }
    }
}

/// Result status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted for each storage request.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        counter!(
            "millrace_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the duration of a storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "millrace_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_values() {
        assert_eq!(BatchStatus::Success.as_str(), "success");
        assert_eq!(BatchStatus::Failed.as_str(), "failed");
        assert_eq!(StopReason::StreamEnded.as_str(), "stream_ended");
        assert_eq!(StorageOperation::Put.as_str(), "put");
        assert_eq!(RequestStatus::Error.as_str(), "error");
    }
}
