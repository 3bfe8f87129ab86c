//! Flattening of change events into tabular records.

use mongodb::bson::{Bson, Document};

use crate::stream::ChangeEvent;

/// Field carrying the mutation kind, present in every record.
pub const OPERATION_FIELD: &str = "operationType";

const ID_FIELD: &str = "_id";

/// A flat, ordered field-name to string-value mapping for one event.
///
/// Field sets vary record to record (sparse schemas); the exporter unions
/// them when building the header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    fields: Vec<(String, String)>,
}

impl NormalizedRecord {
    fn push(&mut self, name: impl Into<String>, value: String) {
        self.fields.push((name.into(), value));
    }

    /// The value of a field, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Convert one change event into a flat record.
///
/// Always emits `operationType` first, then every post-image field in
/// document order. A missing post-image (deletes, or updates whose lookup
/// raced a subsequent delete) degrades to a metadata-only record carrying
/// the stringified document key.
pub fn normalize(event: &ChangeEvent) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    record.push(OPERATION_FIELD, event.operation.as_str().to_string());

    match &event.full_document {
        Some(document) => {
            for (name, value) in document {
                record.push(name, stringify(value));
            }
        }
        None => {
            if let Some(id) = event.document_key.as_ref().and_then(|key| key.get(ID_FIELD)) {
                record.push(ID_FIELD, stringify(id));
            }
        }
    }

    record
}

/// Render a BSON value as a plain cell string.
///
/// Document identifiers get their canonical form (ObjectId hex); strings
/// pass through unquoted; nulls become empty cells; everything else uses
/// its BSON text rendering.
fn stringify(value: &Bson) -> String {
    match value {
        Bson::ObjectId(id) => id.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChangeOperation;
    use mongodb::bson::oid::ObjectId;
    use mongodb::bson::{self, bson, doc};
    use mongodb::change_stream::event::ResumeToken;

    fn token() -> ResumeToken {
        bson::from_bson(bson!({ "_data": "00" })).unwrap()
    }

    fn insert_event(document: Document) -> ChangeEvent {
        ChangeEvent {
            operation: ChangeOperation::Insert,
            full_document: Some(document),
            document_key: None,
            resume_token: token(),
        }
    }

    #[test]
    fn test_operation_type_comes_first() {
        let record = normalize(&insert_event(doc! { "_id": 1, "name": "a" }));
        let fields: Vec<_> = record.fields().collect();
        assert_eq!(fields[0], (OPERATION_FIELD, "insert"));
        assert_eq!(fields[1], ("_id", "1"));
        assert_eq!(fields[2], ("name", "a"));
    }

    #[test]
    fn test_object_id_uses_canonical_hex() {
        let id = ObjectId::new();
        let record = normalize(&insert_event(doc! { "_id": id, "qty": 3 }));
        assert_eq!(record.get("_id").unwrap(), id.to_hex());
        assert_eq!(record.get("qty").unwrap(), "3");
    }

    #[test]
    fn test_missing_post_image_degrades_to_key_only() {
        let event = ChangeEvent {
            operation: ChangeOperation::Delete,
            full_document: None,
            document_key: Some(doc! { "_id": 7 }),
            resume_token: token(),
        };
        let record = normalize(&event);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get(OPERATION_FIELD).unwrap(), "delete");
        assert_eq!(record.get("_id").unwrap(), "7");
        assert!(record.get("name").is_none());
    }

    #[test]
    fn test_null_renders_as_empty_cell() {
        let record = normalize(&insert_event(doc! { "_id": 1, "note": Bson::Null }));
        assert_eq!(record.get("note").unwrap(), "");
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let event = insert_event(doc! { "_id": 1, "name": "a", "qty": 2 });
        assert_eq!(normalize(&event), normalize(&event));
    }
}
