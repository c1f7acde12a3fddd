use std::time::Duration;

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;

const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// A decoded profile picture ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub extension: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// `avatars/<userId>-<unix>.<ext>`; the timestamp keeps replaced images from being cached.
pub fn avatar_key(user_id: Uuid, at: OffsetDateTime, extension: &str) -> String {
    format!("avatars/{}-{}.{}", user_id, at.unix_timestamp(), extension)
}

/// Where profile pictures live. Keys are what the `users.profile_image` column stores.
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Writes the image and returns its key.
    async fn save(&self, user_id: Uuid, image: ImageUpload, at: OffsetDateTime)
        -> anyhow::Result<String>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
    /// Short-lived URL a browser can fetch directly.
    async fn signed_url(&self, key: &str) -> anyhow::Result<String>;
}

/// S3-compatible bucket (MinIO in development).
#[derive(Clone)]
pub struct S3AvatarStore {
    client: Client,
    bucket: String,
}

impl S3AvatarStore {
    pub async fn connect(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        let store = Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        };
        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> anyhow::Result<()> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .with_context(|| format!("create bucket {}", self.bucket))?;
        info!(bucket = %self.bucket, "avatar bucket created");
        Ok(())
    }
}

#[async_trait]
impl AvatarStore for S3AvatarStore {
    async fn save(
        &self,
        user_id: Uuid,
        image: ImageUpload,
        at: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let key = avatar_key(user_id, at, &image.extension);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(Bytes::from(image.bytes)))
            .content_type(&image.content_type)
            .send()
            .await
            .context("s3 put avatar")?;
        debug!(%key, "avatar stored");
        Ok(key)
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete avatar")?;
        Ok(())
    }

    async fn signed_url(&self, key: &str) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(SIGNED_URL_TTL)?)
            .await
            .context("s3 presign avatar")?;
        Ok(presigned.uri().to_string())
    }
}
