//! CSV serialization and upload of accumulated batches.

use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::info;

use crate::emit;
use crate::error::{EncodeSnafu, ExportError, WriteSnafu};
use crate::metrics::events::{BytesWritten, RecordsExported};
use crate::normalize::NormalizedRecord;
use crate::storage::BlobStore;

/// Serializes batches to CSV and writes them to the blob sink.
///
/// Shared by all watchers; the sink client is safe for concurrent use.
#[derive(Debug, Clone)]
pub struct BlobExporter {
    store: Arc<BlobStore>,
}

impl BlobExporter {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }

    /// Serialize and upload one batch.
    ///
    /// The destination key is namespaced by collection and flush time:
    /// `{collection}/{collection}_{YYYYMMDDHHMMSS}.csv`.
    pub async fn export(
        &self,
        collection: &str,
        batch: &[NormalizedRecord],
    ) -> Result<(), ExportError> {
        let key = object_key(collection, Utc::now());
        let data = encode_csv(batch).context(EncodeSnafu { collection })?;
        let bytes = data.len();

        self.store
            .put(&key, data)
            .await
            .context(WriteSnafu { collection })?;

        emit!(RecordsExported {
            count: batch.len() as u64
        });
        emit!(BytesWritten {
            bytes: bytes as u64
        });
        info!(collection, key, rows = batch.len(), bytes, "Exported batch");
        Ok(())
    }
}

/// Deterministic, collision-resistant destination key for one flush.
fn object_key(collection: &str, flushed_at: DateTime<Utc>) -> String {
    format!(
        "{collection}/{collection}_{}.csv",
        flushed_at.format("%Y%m%d%H%M%S")
    )
}

/// Encode records as delimited text.
///
/// Header = union of field names in first-seen order across the batch,
/// one row per record, empty cells where a record lacks a column.
fn encode_csv(batch: &[NormalizedRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut columns: Vec<&str> = Vec::new();
    for record in batch {
        for (name, _) in record.fields() {
            if !columns.contains(&name) {
                columns.push(name);
            }
        }
    }

    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&columns)?;

    for record in batch {
        let row: Vec<&str> = columns
            .iter()
            .map(|column| record.get(column).unwrap_or(""))
            .collect();
        writer.write_record(&row)?;
    }

    writer.into_inner().map_err(|e| e.into_error())
}
