//! Durable per-collection resume positions.
//!
//! One checkpoint document per watched collection, keyed by collection
//! name, overwritten after every consumed event. The token is stored as
//! BSON verbatim so it replays directly into a resume request.

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::change_stream::event::ResumeToken;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{CheckpointError, LoadSnafu, SaveSnafu};

/// A persisted checkpoint: the last safely processed position for one
/// collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointDoc {
    #[serde(rename = "_id")]
    collection: String,
    resume_token: ResumeToken,
}

/// Store of per-collection resume positions.
///
/// `put` sits on the hot path (called after every event) and must be an
/// idempotent full replacement of any prior value.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Look up the stored token; `None` means start fresh.
    async fn get(&self, collection: &str) -> Result<Option<ResumeToken>, CheckpointError>;

    /// Upsert the token, replacing any prior value.
    async fn put(&self, collection: &str, token: ResumeToken) -> Result<(), CheckpointError>;
}

/// Checkpoint store backed by a collection in the watched database.
pub struct MongoCheckpointStore {
    checkpoints: Collection<CheckpointDoc>,
}

impl MongoCheckpointStore {
    pub fn new(database: &Database, collection_name: &str) -> Self {
        Self {
            checkpoints: database.collection(collection_name),
        }
    }
}

#[async_trait]
impl CheckpointStore for MongoCheckpointStore {
    async fn get(&self, collection: &str) -> Result<Option<ResumeToken>, CheckpointError> {
        let doc = self
            .checkpoints
            .find_one(doc! { "_id": collection })
            .await
            .context(LoadSnafu { collection })?;
        Ok(doc.map(|d| d.resume_token))
    }

    async fn put(&self, collection: &str, token: ResumeToken) -> Result<(), CheckpointError> {
        let replacement = CheckpointDoc {
            collection: collection.to_string(),
            resume_token: token,
        };
        self.checkpoints
            .replace_one(doc! { "_id": collection }, replacement)
            .upsert(true)
            .await
            .context(SaveSnafu { collection })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, bson};

    #[test]
    fn test_checkpoint_doc_stores_token_structurally() {
        let token: ResumeToken =
            bson::from_bson(bson!({ "_data": "82648A1E..." })).unwrap();
        let doc = CheckpointDoc {
            collection: "orders".to_string(),
            resume_token: token,
        };

        let serialized = bson::to_document(&doc).unwrap();
        assert_eq!(serialized.get_str("_id").unwrap(), "orders");
        // The token round-trips as a BSON document, not a string.
        assert!(serialized.get_document("resume_token").is_ok());

        let restored: CheckpointDoc = bson::from_document(serialized).unwrap();
        assert_eq!(
            bson::to_bson(&restored.resume_token).unwrap(),
            bson!({ "_data": "82648A1E..." })
        );
    }
}
