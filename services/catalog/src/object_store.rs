use crate::config::S3Config;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Object store failures. There is no retry at this layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("object store request for {key} failed: {message}")]
    Unavailable { key: String, message: String },
}

/// The binary assets a project can own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Cover,
    Video,
}

impl AssetKind {
    /// Deterministic key for a project's asset.
    ///
    /// Format: `imgs/{id}.png` or `videos/{id}.mp4`
    pub fn key(self, project_id: Uuid) -> String {
        match self {
            AssetKind::Cover => format!("imgs/{project_id}.png"),
            AssetKind::Video => format!("videos/{project_id}.mp4"),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            AssetKind::Cover => "image/png",
            AssetKind::Video => "video/mp4",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Cover => f.write_str("cover"),
            AssetKind::Video => f.write_str("video"),
        }
    }
}

/// Key-value blob store holding project assets.
///
/// `put` overwrites and `delete` of a missing key succeeds, so both are safe
/// to repeat. Whether a blob is expected to exist is decided by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Where a stored object can be fetched by browsers
    fn public_url(&self, key: &str) -> String;
}

/// Join a public base URL and an object key
pub fn join_public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// S3-compatible object store (AWS, R2, MinIO)
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store client
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Custom endpoint for R2/MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            public_base_url = %config.public_base_url,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError> {
        let size_bytes = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Unavailable {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        info!(key = %key, size_bytes, "Object uploaded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        // S3 answers 204 for keys that do not exist
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Unavailable {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        debug!(key = %key, "Object deleted");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(&self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_keys_derive_from_project_id() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            AssetKind::Cover.key(id),
            "imgs/550e8400-e29b-41d4-a716-446655440000.png"
        );
        assert_eq!(
            AssetKind::Video.key(id),
            "videos/550e8400-e29b-41d4-a716-446655440000.mp4"
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(AssetKind::Cover.content_type(), "image/png");
        assert_eq!(AssetKind::Video.content_type(), "video/mp4");
    }

    #[test]
    fn test_join_public_url() {
        assert_eq!(
            join_public_url("https://media.example.org/", "imgs/a.png"),
            "https://media.example.org/imgs/a.png"
        );
        assert_eq!(
            join_public_url("https://media.example.org", "videos/a.mp4"),
            "https://media.example.org/videos/a.mp4"
        );
    }
}
