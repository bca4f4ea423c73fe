//! Publishing artifacts to remote storage with retry.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use hookreel_models::{PublicationRecord, ResourceKind};
use hookreel_storage::{
    artifact_key, ObjectStore, StorageError, StorageResult, StoredObject, Transfer, UploadRequest,
};

use crate::config::PublishConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::retry::{retry_async_if, RetryResult};

/// One artifact on its way to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub path: PathBuf,
    pub kind: ResourceKind,
    pub key: String,
    /// Attempts made so far
    pub attempts: u32,
    pub max_attempts: u32,
}

pub struct Publisher<S> {
    store: S,
    config: PublishConfig,
}

impl<S: ObjectStore> Publisher<S> {
    pub fn new(store: S, config: PublishConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// New job with a fresh collision-free key.
    pub fn job(&self, path: impl AsRef<Path>, kind: ResourceKind) -> UploadJob {
        UploadJob {
            path: path.as_ref().to_path_buf(),
            kind,
            key: artifact_key(&self.config.key_prefix, kind, Utc::now(), Uuid::new_v4()),
            attempts: 0,
            max_attempts: self.config.retry.max_attempts,
        }
    }

    /// Upload `job`, retrying transient failures with exponential backoff.
    ///
    /// Non-retryable storage errors (bad key, missing file, credentials) stop
    /// immediately. `job.attempts` is updated either way.
    pub async fn publish(&self, job: &mut UploadJob) -> WorkerResult<PublicationRecord> {
        let request = UploadRequest {
            path: job.path.clone(),
            key: job.key.clone(),
            content_type: job.kind.content_type().to_string(),
            transfer: Transfer::for_kind(job.kind, self.config.chunk_size),
        };
        let kind = job.kind;
        let operation = format!("upload_{}", kind);
        let started = Instant::now();

        info!(
            kind = %kind,
            key = %job.key,
            path = %job.path.display(),
            "Publishing artifact"
        );

        let request = &request;
        let result = retry_async_if(
            &self.config.retry,
            &operation,
            move |attempt| async move {
                let outcome = self.attempt(request).await;
                metrics::record_upload_attempt(kind, outcome.is_ok());
                debug!(kind = %kind, attempt, success = outcome.is_ok(), "Upload attempt finished");
                outcome
            },
            StorageError::is_retryable,
        )
        .await;

        job.attempts = result.attempts();

        match result {
            RetryResult::Success { value, attempts } => {
                metrics::record_upload_duration(kind, started.elapsed().as_secs_f64());
                info!(kind = %kind, url = %value.url, attempts, "Artifact published");
                Ok(PublicationRecord {
                    kind,
                    key: value.key,
                    url: value.url,
                    size: value.size,
                    attempts,
                    published_at: Utc::now(),
                })
            }
            RetryResult::Failed { error, attempts } if error.is_retryable() => {
                Err(WorkerError::UploadExhausted {
                    kind,
                    attempts,
                    last_error: error.to_string(),
                })
            }
            RetryResult::Failed { error, .. } => Err(error.into()),
        }
    }

    async fn attempt(&self, request: &UploadRequest) -> StorageResult<StoredObject> {
        match self.config.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.store.upload(request))
                .await
                .map_err(|_| {
                    StorageError::upload_failed(format!(
                        "attempt timed out after {}s",
                        limit.as_secs_f64()
                    ))
                })?,
            None => self.store.upload(request).await,
        }
    }
}
