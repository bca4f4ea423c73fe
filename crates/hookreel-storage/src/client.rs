//! R2 client implementation.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::operations::{plan_parts, public_object_url, PartRange};

/// Longest expiry S3 SigV4 presigning allows.
pub const PRESIGN_MAX_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for R2 client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL of the bucket; presigned URLs are used when unset
    pub public_url: Option<String>,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require =
            |name: &str| get(name).ok_or_else(|| StorageError::config_error(format!("{} not set", name)));

        Ok(Self {
            endpoint_url: require("R2_ENDPOINT_URL")?,
            access_key_id: require("R2_ACCESS_KEY_ID")?,
            secret_access_key: require("R2_SECRET_ACCESS_KEY")?,
            bucket_name: require("R2_BUCKET_NAME")?,
            region: get("R2_REGION").unwrap_or_else(|| "auto".to_string()),
            public_url: get("R2_PUBLIC_URL"),
        })
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_url: Option<String>,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(sdk_config);

        Ok(Self {
            client,
            bucket: config.bucket_name,
            public_url: config.public_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a file in a single request. Returns the byte count.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<u64> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        debug!(path = %path.display(), key, size, "Uploading object");

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!(path = %path.display(), key, size, "Uploaded object");
        Ok(size)
    }

    /// Upload a file as sequential multipart parts. Returns the byte count.
    ///
    /// A failed part aborts the multipart upload so no orphaned parts are
    /// left in the bucket. Empty files fall back to a single request.
    pub async fn upload_multipart(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
        chunk_size: usize,
    ) -> StorageResult<u64> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        let parts = plan_parts(size, chunk_size);
        if parts.is_empty() {
            return self.upload_file(path, key, content_type).await;
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("create multipart upload: {}", e)))?;
        let upload_id = created
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::upload_failed("No upload ID returned"))?;

        debug!(key, size, parts = parts.len(), "Started multipart upload");

        match self.send_parts(path, key, &upload_id, &parts).await {
            Ok(completed) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(completed))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| {
                        StorageError::upload_failed(format!("complete multipart upload: {}", e))
                    })?;

                info!(path = %path.display(), key, size, parts = parts.len(), "Multipart upload complete");
                Ok(size)
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn send_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        parts: &[PartRange],
    ) -> StorageResult<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut completed = Vec::with_capacity(parts.len());

        for part in parts {
            let data = read_part(&mut file, part.len).await?;

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part.number)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| {
                    StorageError::upload_failed(format!("part {}: {}", part.number, e))
                })?;

            let etag = uploaded
                .e_tag()
                .ok_or_else(|| {
                    StorageError::upload_failed(format!("No ETag returned for part {}", part.number))
                })?
                .to_string();

            debug!(key, part = part.number, bytes = part.len, "Uploaded part");
            completed.push(
                CompletedPart::builder()
                    .part_number(part.number)
                    .e_tag(etag)
                    .build(),
            );
        }

        Ok(completed)
    }

    /// Generate a presigned URL for GET (temporary, signed URL via S3 API).
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Retrieval URL for `key`: public URL when configured, else presigned.
    pub async fn locator(&self, key: &str) -> StorageResult<String> {
        match &self.public_url {
            Some(base) => Ok(public_object_url(base, key)),
            None => self.presign_get(key, PRESIGN_MAX_EXPIRY).await,
        }
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

/// Read exactly `len` bytes from the current position.
async fn read_part(file: &mut tokio::fs::File, len: usize) -> StorageResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}
