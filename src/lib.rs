//! millrace: forwards MongoDB change streams to object storage.
//!
//! Watches live collections, durably checkpoints a resume token per
//! collection after every event, accumulates mutations in time windows,
//! and exports each window as a CSV object namespaced by collection and
//! flush timestamp.
//!
//! # Example
//!
//! ```ignore
//! use millrace::{error::ForwarderError, run_forwarder, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ForwarderError> {
//!     let config = Config::from_file("config.yaml")?;
//!     let stats = run_forwarder(config).await?;
//!     println!("Processed {} events", stats.events_processed);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod normalize;
pub mod signal;
pub mod storage;
pub mod stream;
pub mod supervisor;
pub mod watcher;

// Re-export main types
pub use config::Config;
pub use storage::BlobStore;
pub use supervisor::{run_forwarder, StreamSupervisor, SupervisorStats};
