//! The object store seam used by the publisher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use hookreel_models::ResourceKind;

use crate::error::StorageResult;

/// How bytes are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Transfer {
    /// One request carrying the whole file.
    Single,
    /// Sequential parts of `chunk_size` bytes (the last may be smaller).
    Chunked { chunk_size: usize },
}

impl Transfer {
    /// Chunked for videos, single request for images.
    pub fn for_kind(kind: ResourceKind, chunk_size: usize) -> Self {
        if kind.is_chunked() {
            Transfer::Chunked { chunk_size }
        } else {
            Transfer::Single
        }
    }
}

/// One upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub key: String,
    pub content_type: String,
    pub transfer: Transfer,
}

/// A stored object and where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    /// Bytes sent
    pub size: u64,
}

/// Remote storage that returns a retrieval URL for each upload.
///
/// Each call is a single attempt; retry belongs to the caller. Uploading to an
/// existing key overwrites it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> StorageResult<StoredObject>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_for_kind() {
        assert_eq!(
            Transfer::for_kind(ResourceKind::Video, 8 << 20),
            Transfer::Chunked { chunk_size: 8 << 20 }
        );
        assert_eq!(Transfer::for_kind(ResourceKind::Image, 8 << 20), Transfer::Single);
    }
}
