//! Fan-out and lifecycle supervision of collection watchers.
//!
//! Enumerates the database's collections once at startup, excludes the
//! denylist, and runs one watcher task per remaining collection on the
//! runtime. Collections created later are picked up on restart.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::Document;
use mongodb::{Client, Database};
use snafu::prelude::*;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, MongoCheckpointStore};
use crate::config::Config;
use crate::emit;
use crate::error::{
    ConnectSnafu, ForwarderError, ForwarderStorageSnafu, ListCollectionsSnafu, TaskJoinSnafu,
};
use crate::export::BlobExporter;
use crate::metrics::events::ActiveWatchers;
use crate::signal;
use crate::storage::BlobStore;
use crate::stream::MongoEventSource;
use crate::watcher::{CollectionWatcher, WatcherOutcome};

/// Summary of a completed supervision run.
#[derive(Debug, Clone, Default)]
pub struct SupervisorStats {
    pub watchers_started: usize,
    pub watchers_failed: usize,
    pub events_processed: u64,
    pub batches_exported: u64,
}

/// Collections that get a watcher: everything enumerated, minus the
/// denylist.
fn watchable_collections(names: Vec<String>, denylist: &HashSet<String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| !denylist.contains(name))
        .collect()
}

/// Owns the watcher fleet for one database.
pub struct StreamSupervisor {
    database: Database,
    checkpoints: Arc<dyn CheckpointStore>,
    exporter: BlobExporter,
    flush_interval: Duration,
    denylist: HashSet<String>,
    shutdown: CancellationToken,
}

impl StreamSupervisor {
    /// Create a supervisor. The checkpoint collection is always added to
    /// the denylist so the store never watches itself.
    pub fn new(
        database: Database,
        checkpoints: Arc<dyn CheckpointStore>,
        exporter: BlobExporter,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Self {
        let mut denylist: HashSet<String> = config.forwarder.denylist.iter().cloned().collect();
        denylist.insert(config.mongo.checkpoint_collection.clone());

        Self {
            database,
            checkpoints,
            exporter,
            flush_interval: config.forwarder.flush_interval(),
            denylist,
            shutdown,
        }
    }

    /// Start one watcher per watchable collection and wait for all of
    /// them to stop.
    pub async fn run(self) -> Result<SupervisorStats, ForwarderError> {
        let names = self
            .database
            .list_collection_names()
            .await
            .context(ListCollectionsSnafu)?;
        let watchable = watchable_collections(names, &self.denylist);

        info!(
            count = watchable.len(),
            excluded = self.denylist.len(),
            "Starting collection watchers"
        );

        let mut tasks: JoinSet<WatcherOutcome> = JoinSet::new();
        for name in &watchable {
            let source = MongoEventSource::new(self.database.collection::<Document>(name));
            let watcher = CollectionWatcher::new(
                name.clone(),
                source,
                self.checkpoints.clone(),
                self.exporter.clone(),
                self.flush_interval,
                self.shutdown.clone(),
            );
            tasks.spawn(watcher.run());
        }

        let mut stats = SupervisorStats {
            watchers_started: watchable.len(),
            ..Default::default()
        };
        emit!(ActiveWatchers { count: tasks.len() });

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.context(TaskJoinSnafu)?;
            emit!(ActiveWatchers { count: tasks.len() });

            stats.events_processed += outcome.events_processed;
            stats.batches_exported += outcome.batches_exported;

            match &outcome.result {
                Ok(()) => info!(
                    collection = %outcome.collection,
                    events = outcome.events_processed,
                    "Watcher finished"
                ),
                Err(e) => {
                    stats.watchers_failed += 1;
                    warn!(
                        collection = %outcome.collection,
                        error = %e,
                        "Watcher failed"
                    );
                }
            }
        }

        info!(
            started = stats.watchers_started,
            failed = stats.watchers_failed,
            "All watchers stopped"
        );
        Ok(stats)
    }
}

/// Run the forwarder with the given configuration.
///
/// Connects to the database and the sink, wires up the shared context
/// (no ambient globals), installs the shutdown signal handler, and
/// supervises the watcher fleet until every stream stops.
pub async fn run_forwarder(config: Config) -> Result<SupervisorStats, ForwarderError> {
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            signal::shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let client = Client::with_uri_str(&config.mongo.uri)
        .await
        .context(ConnectSnafu)?;
    let database = client.database(&config.mongo.database);

    let store = BlobStore::for_url_with_options(&config.sink.path, config.sink.storage_options.clone())
        .await
        .context(ForwarderStorageSnafu)?;
    let exporter = BlobExporter::new(Arc::new(store));

    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MongoCheckpointStore::new(
        &database,
        &config.mongo.checkpoint_collection,
    ));

    let supervisor = StreamSupervisor::new(database, checkpoints, exporter, &config, shutdown);
    supervisor.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_denylisted_collections_are_excluded() {
        let denylist: HashSet<String> =
            names(&["resume_tokens", "internal_audit"]).into_iter().collect();
        let watchable = watchable_collections(
            names(&["orders", "internal_audit", "users", "resume_tokens"]),
            &denylist,
        );
        assert_eq!(watchable, names(&["orders", "users"]));
    }

    #[test]
    fn test_empty_denylist_keeps_everything() {
        let watchable = watchable_collections(names(&["a", "b"]), &HashSet::new());
        assert_eq!(watchable, names(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_checkpoint_collection_is_always_denylisted() {
        let config: Config = serde_yaml::from_str(
            r#"
mongo:
  uri: "mongodb://localhost:27017"
  database: staging
  checkpoint_collection: positions
sink:
  path: "s3://cdc-exports"
forwarder:
  denylist: [scratch]
"#,
        )
        .unwrap();

        // The client connects lazily, so building one without a server is
        // fine for inspecting supervisor wiring.
        let client = Client::with_uri_str(&config.mongo.uri).await.unwrap();
        let supervisor = StreamSupervisor::new(
            client.database(&config.mongo.database),
            Arc::new(MongoCheckpointStore::new(
                &client.database(&config.mongo.database),
                &config.mongo.checkpoint_collection,
            )),
            BlobExporter::new(Arc::new(BlobStore::in_memory())),
            &config,
            CancellationToken::new(),
        );

        assert!(supervisor.denylist.contains("positions"));
        assert!(supervisor.denylist.contains("scratch"));
        assert!(!supervisor.denylist.contains("orders"));
    }
}
