//! Error types for millrace using snafu.
//!
//! Each pipeline concern gets its own error enum with context selectors;
//! `ForwarderError` aggregates them at the top level.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during blob storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Sink URL did not match any supported backend.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage setup.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// Local filesystem configuration error.
    #[snafu(display("Local storage configuration error"))]
    LocalConfig { source: object_store::Error },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// MongoDB URI is empty.
    #[snafu(display("MongoDB URI cannot be empty"))]
    EmptyUri,

    /// Database name is empty.
    #[snafu(display("Database name cannot be empty"))]
    EmptyDatabase,

    /// Sink path is empty.
    #[snafu(display("Sink path cannot be empty"))]
    EmptySinkPath,

    /// Flush interval is zero.
    #[snafu(display("Flush interval must be greater than zero"))]
    ZeroFlushInterval,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Checkpoint Errors ============

/// Errors that can occur while loading or saving resume positions.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Reading the stored token failed.
    #[snafu(display("Failed to load checkpoint for '{collection}'"))]
    Load {
        collection: String,
        source: mongodb::error::Error,
    },

    /// Upserting the token failed. Fatal to the calling watcher: continuing
    /// without checkpoints risks masking an unprocessed gap.
    #[snafu(display("Failed to save checkpoint for '{collection}'"))]
    Save {
        collection: String,
        source: mongodb::error::Error,
    },
}

// ============ Stream Errors ============

/// Errors from the change-stream transport.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StreamError {
    /// Opening the stream failed: insufficient privileges, change streams
    /// unsupported, or a resume token that aged out of the oplog window.
    #[snafu(display("Failed to open change stream for '{collection}'"))]
    Open {
        collection: String,
        source: mongodb::error::Error,
    },

    /// The open stream returned an error mid-flight.
    #[snafu(display("Change stream for '{collection}' failed"))]
    Receive {
        collection: String,
        source: mongodb::error::Error,
    },
}

// ============ Export Errors ============

/// Errors that can occur while serializing and uploading a batch.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExportError {
    /// CSV encoding failed.
    #[snafu(display("Failed to encode batch for '{collection}'"))]
    Encode {
        collection: String,
        source: csv::Error,
    },

    /// Writing the batch object to the sink failed.
    #[snafu(display("Failed to write batch object for '{collection}'"))]
    Write {
        collection: String,
        source: StorageError,
    },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Watcher Errors ============

/// Fatal errors that end one collection's watch loop.
///
/// Captured in the watcher's outcome rather than propagated as a task
/// fault, so one collection's failure never takes down its siblings.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WatcherError {
    /// Checkpoint store failure (fail-fast; see [`CheckpointError`]).
    #[snafu(display("Checkpoint failure"))]
    Checkpoint { source: CheckpointError },

    /// Transport setup or runtime failure.
    #[snafu(display("Stream failure"))]
    Stream { source: StreamError },
}

// ============ Forwarder Error (top-level) ============

/// Top-level errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ForwarderError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error"))]
    ForwarderStorage { source: StorageError },

    /// Failed to connect to MongoDB.
    #[snafu(display("Failed to connect to MongoDB"))]
    Connect { source: mongodb::error::Error },

    /// Failed to enumerate collections.
    #[snafu(display("Failed to enumerate collections"))]
    ListCollections { source: mongodb::error::Error },

    /// Watcher task panicked.
    #[snafu(display("Watcher task join error"))]
    TaskJoin { source: tokio::task::JoinError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}
