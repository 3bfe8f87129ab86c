//! Change-stream transport.
//!
//! The transport is an opaque ordered-event source with a resume
//! capability; `EventSource` is the seam, `MongoEventSource` the
//! production implementation over MongoDB change streams.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use mongodb::bson::{doc, Document};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType, ResumeToken};
use mongodb::options::{ChangeStreamOptions, FullDocumentType};
use mongodb::Collection;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{OpenSnafu, StreamError};

/// Mutation kinds the forwarder captures. Everything else is filtered out
/// server-side by the aggregation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Replace => "replace",
            ChangeOperation::Delete => "delete",
        }
    }

    fn from_transport(op: &OperationType) -> Option<Self> {
        match op {
            OperationType::Insert => Some(ChangeOperation::Insert),
            OperationType::Update => Some(ChangeOperation::Update),
            OperationType::Replace => Some(ChangeOperation::Replace),
            OperationType::Delete => Some(ChangeOperation::Delete),
            _ => None,
        }
    }
}

/// A transport-delivered mutation. Consumed once, never persisted.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    /// Post-image of the document; absent for deletes.
    pub full_document: Option<Document>,
    /// Key of the mutated document, available even without a post-image.
    pub document_key: Option<Document>,
    /// Position to checkpoint after processing this event.
    pub resume_token: ResumeToken,
}

/// Ordered, fallible stream of change events for one collection.
pub type EventStream = BoxStream<'static, Result<ChangeEvent, StreamError>>;

/// An ordered, resumable source of change events for one collection.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open the stream, resuming strictly after `resume_after` when given,
    /// or tailing from the current position otherwise.
    ///
    /// Setup failures (insufficient privileges, expired token) surface
    /// here and are never retried by the caller's loop.
    async fn open(&self, resume_after: Option<ResumeToken>) -> Result<EventStream, StreamError>;
}

/// Production event source over a MongoDB change stream.
pub struct MongoEventSource {
    collection: Collection<Document>,
}

impl MongoEventSource {
    pub fn new(collection: Collection<Document>) -> Self {
        Self { collection }
    }

    fn match_stage() -> Document {
        doc! {
            "$match": {
                "operationType": { "$in": ["insert", "update", "delete", "replace"] }
            }
        }
    }
}

#[async_trait]
impl EventSource for MongoEventSource {
    async fn open(&self, resume_after: Option<ResumeToken>) -> Result<EventStream, StreamError> {
        let name = self.collection.name().to_string();

        let options = ChangeStreamOptions::builder()
            .full_document(Some(FullDocumentType::UpdateLookup))
            .resume_after(resume_after)
            .build();

        let stream = self
            .collection
            .watch()
            .pipeline([Self::match_stage()])
            .with_options(options)
            .await
            .context(OpenSnafu {
                collection: name.clone(),
            })?;

        let events = stream.filter_map(move |item| {
            let collection = name.clone();
            async move {
                match item {
                    Ok(event) => convert(event),
                    Err(source) => Some(Err(StreamError::Receive { collection, source })),
                }
            }
        });

        Ok(events.boxed())
    }
}

/// Map a raw transport event onto the forwarder's event type.
///
/// Operations outside the captured set should not arrive (the `$match`
/// stage excludes them); any that do are skipped without checkpointing.
fn convert(event: ChangeStreamEvent<Document>) -> Option<Result<ChangeEvent, StreamError>> {
    let Some(operation) = ChangeOperation::from_transport(&event.operation_type) else {
        debug!(operation = ?event.operation_type, "Ignoring unhandled operation type");
        return None;
    };

    Some(Ok(ChangeEvent {
        operation,
        full_document: event.full_document,
        document_key: event.document_key,
        resume_token: event.id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_mapping() {
        assert_eq!(
            ChangeOperation::from_transport(&OperationType::Insert),
            Some(ChangeOperation::Insert)
        );
        assert_eq!(
            ChangeOperation::from_transport(&OperationType::Delete),
            Some(ChangeOperation::Delete)
        );
        assert_eq!(ChangeOperation::from_transport(&OperationType::Drop), None);
        assert_eq!(
            ChangeOperation::from_transport(&OperationType::Invalidate),
            None
        );
    }

    #[test]
    fn test_match_stage_restricts_operations() {
        let stage = MongoEventSource::match_stage();
        let ops = stage
            .get_document("$match")
            .unwrap()
            .get_document("operationType")
            .unwrap()
            .get_array("$in")
            .unwrap();
        assert_eq!(ops.len(), 4);
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(ChangeOperation::Insert.as_str(), "insert");
        assert_eq!(ChangeOperation::Replace.as_str(), "replace");
    }
}
