//! Blob-storage sink.
//!
//! Thin wrapper over `object_store` providing the put-object operation the
//! exporter needs. Destinations are addressed by `s3://bucket/prefix` URL
//! or a local filesystem path; an in-memory backend is available for
//! tests.

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload, RetryConfig};
use regex::Regex;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::emit;
use crate::error::{
    InvalidUrlSnafu, IoSnafu, LocalConfigSnafu, ObjectStoreSnafu, S3ConfigSnafu, StorageError,
};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<prefix>.+))?$";

fn s3_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(S3_URL).expect("S3 URL pattern must compile"))
}

/// Split an S3 URL into bucket and optional prefix.
fn parse_s3_url(url: &str) -> Option<(String, Option<String>)> {
    let caps = s3_url_pattern().captures(url)?;
    let bucket = caps.name("bucket")?.as_str().to_string();
    let prefix = caps
        .name("prefix")
        .map(|m| m.as_str().trim_end_matches('/').to_string());
    Some((bucket, prefix))
}

/// Storage sink for exported batch objects.
#[derive(Clone)]
pub struct BlobStore {
    object_store: Arc<dyn ObjectStore>,
    prefix: Option<Path>,
    canonical_url: String,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlobStore<{}>", self.canonical_url)
    }
}

impl BlobStore {
    /// Create a store for the given URL with storage options.
    ///
    /// Supports `s3://bucket/prefix` and local filesystem paths
    /// (`/some/dir` or `file:///some/dir`).
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        if let Some((bucket, prefix)) = parse_s3_url(url) {
            Self::construct_s3(bucket, prefix, options)
        } else if url.starts_with('/') || url.starts_with("file://") {
            Self::construct_local(url.trim_start_matches("file://"))
        } else {
            InvalidUrlSnafu {
                url: url.to_string(),
            }
            .fail()
        }
    }

    fn construct_s3(
        bucket: String,
        prefix: Option<String>,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&bucket);

        for (key, value) in &options {
            builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value.clone());
        }

        builder = builder.with_retry(RetryConfig::default());

        let canonical_url = match &prefix {
            Some(prefix) => format!("s3://{bucket}/{prefix}"),
            None => format!("s3://{bucket}"),
        };

        Ok(Self {
            object_store: Arc::new(builder.build().context(S3ConfigSnafu)?),
            prefix: prefix.map(Path::from),
            canonical_url,
        })
    }

    fn construct_local(path: &str) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path).context(IoSnafu)?;
        let store = LocalFileSystem::new_with_prefix(path).context(LocalConfigSnafu)?;

        Ok(Self {
            object_store: Arc::new(store),
            prefix: None,
            canonical_url: format!("file://{path}"),
        })
    }

    /// Create an in-memory store, used by tests.
    pub fn in_memory() -> Self {
        Self {
            object_store: Arc::new(InMemory::new()),
            prefix: None,
            canonical_url: "memory://".to_string(),
        }
    }

    /// The canonical URL this store writes to.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    fn qualify(&self, key: &str) -> Path {
        let path = Path::from(key);
        match &self.prefix {
            Some(prefix) => prefix.parts().chain(path.parts()).collect(),
            None => path,
        }
    }

    /// Put bytes to a key (relative to the configured prefix).
    pub async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.qualify(key);
        let payload = PutPayload::from(Bytes::from(bytes));

        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;

        let status = if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        };
        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status,
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Put,
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Get the contents of a key.
    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.qualify(key);

        let start = Instant::now();
        let result = self.object_store.get(&path).await;

        let status = if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        };
        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status,
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Get,
            duration: start.elapsed(),
        });

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// List all keys under the configured prefix, relative to it.
    pub async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let skip = self
            .prefix
            .as_ref()
            .map(|p| p.parts().count())
            .unwrap_or_default();

        let entries: Vec<_> = self
            .object_store
            .list(self.prefix.as_ref())
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;

        Ok(entries
            .into_iter()
            .map(|meta| {
                meta.location
                    .parts()
                    .skip(skip)
                    .collect::<Path>()
                    .to_string()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_url() {
        assert_eq!(
            parse_s3_url("s3://cdc-exports"),
            Some(("cdc-exports".to_string(), None))
        );
        assert_eq!(
            parse_s3_url("s3://cdc-exports/staging/"),
            Some(("cdc-exports".to_string(), Some("staging".to_string())))
        );
        assert_eq!(
            parse_s3_url("S3://bucket/a/b"),
            Some(("bucket".to_string(), Some("a/b".to_string())))
        );
        assert_eq!(parse_s3_url("/local/path"), None);
        assert_eq!(parse_s3_url("gs://bucket"), None);
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = BlobStore::in_memory();
        store
            .put("orders/orders_20260101000000.csv", b"a,b\n1,2\n".to_vec())
            .await
            .unwrap();

        let bytes = store.get("orders/orders_20260101000000.csv").await.unwrap();
        assert_eq!(&bytes[..], b"a,b\n1,2\n");

        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys, vec!["orders/orders_20260101000000.csv"]);
    }

    #[tokio::test]
    async fn test_local_store_writes_under_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();

        let store = BlobStore::for_url_with_options(root, HashMap::new())
            .await
            .unwrap();
        store.put("orders/batch.csv", b"x\n".to_vec()).await.unwrap();

        let written = std::fs::read(dir.path().join("orders/batch.csv")).unwrap();
        assert_eq!(written, b"x\n");
    }

    #[tokio::test]
    async fn test_unrecognized_url_is_rejected() {
        let err = BlobStore::for_url_with_options("gs://bucket", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidUrl { .. }));
    }
}
