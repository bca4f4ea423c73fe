//! Artifact keys, multipart planning and the [`ObjectStore`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use hookreel_models::ResourceKind;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectStore, StoredObject, Transfer, UploadRequest};

/// S3 rejects non-final parts smaller than this.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;
/// Default chunk size for video uploads.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
/// S3 multipart part count limit.
pub const MAX_PARTS: u64 = 10_000;

/// One multipart slice of a file. Part numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub number: i32,
    pub offset: u64,
    pub len: usize,
}

/// Unique object key: `<prefix>/<kind>_<unix_ts>_<id8>.<ext>`.
pub fn artifact_key(prefix: &str, kind: ResourceKind, at: DateTime<Utc>, id: Uuid) -> String {
    let simple = id.simple().to_string();
    let name = format!(
        "{}_{}_{}.{}",
        kind,
        at.timestamp(),
        &simple[..8],
        kind.extension()
    );

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Reject keys S3 would mangle or refuse.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > 1024 {
        return Err(StorageError::invalid_key(format!(
            "key length must be 1..=1024, got {}",
            key.len()
        )));
    }
    if key.starts_with('/') || key.contains("..") || key.chars().any(char::is_control) {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// `<base>/<key>` with exactly one slash between.
pub fn public_object_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Multipart plan for `size` bytes.
///
/// The chunk size is raised to [`MIN_PART_SIZE`] and, for very large files,
/// further so the plan stays within [`MAX_PARTS`].
pub fn plan_parts(size: u64, chunk_size: usize) -> Vec<PartRange> {
    let mut chunk = chunk_size.max(MIN_PART_SIZE) as u64;
    if size.div_ceil(chunk) > MAX_PARTS {
        chunk = size.div_ceil(MAX_PARTS);
    }
    split_parts(size, chunk as usize)
}

/// Split `size` bytes into `chunk`-sized parts with a shorter final part.
pub(crate) fn split_parts(size: u64, chunk: usize) -> Vec<PartRange> {
    let chunk = chunk.max(1) as u64;
    let mut parts = Vec::new();
    let mut offset = 0u64;
    let mut number = 1i32;
    while offset < size {
        let len = chunk.min(size - offset);
        parts.push(PartRange {
            number,
            offset,
            len: len as usize,
        });
        offset += len;
        number += 1;
    }
    parts
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn upload(&self, request: &UploadRequest) -> StorageResult<StoredObject> {
        validate_key(&request.key)?;

        let size = match request.transfer {
            Transfer::Single => {
                self.upload_file(&request.path, &request.key, &request.content_type)
                    .await?
            }
            Transfer::Chunked { chunk_size } => {
                self.upload_multipart(&request.path, &request.key, &request.content_type, chunk_size)
                    .await?
            }
        };

        let url = self.locator(&request.key).await?;
        debug!(key = %request.key, url = %url, "Resolved object URL");

        Ok(StoredObject {
            key: request.key.clone(),
            url,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_key_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();

        assert_eq!(
            artifact_key("shorts", ResourceKind::Video, at, id),
            "shorts/video_1714564800_a1b2c3d4.mp4"
        );
        assert_eq!(
            artifact_key("/shorts/", ResourceKind::Image, at, id),
            "shorts/image_1714564800_a1b2c3d4.jpg"
        );
        assert_eq!(
            artifact_key("", ResourceKind::Video, at, id),
            "video_1714564800_a1b2c3d4.mp4"
        );
    }

    #[test]
    fn test_artifact_keys_are_unique_per_run() {
        let at = Utc::now();
        let a = artifact_key("shorts", ResourceKind::Video, at, Uuid::new_v4());
        let b = artifact_key("shorts", ResourceKind::Video, at, Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("shorts/video_1_abcd1234.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/leading").is_err());
        assert!(validate_key("a/../b").is_err());
    }

    #[test]
    fn test_public_object_url() {
        assert_eq!(
            public_object_url("https://cdn.example.com/", "shorts/v.mp4"),
            "https://cdn.example.com/shorts/v.mp4"
        );
    }

    #[test]
    fn test_plan_parts_default_chunk() {
        let size = 20 * 1024 * 1024 + 3;
        let parts = plan_parts(size, DEFAULT_CHUNK_SIZE);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len, DEFAULT_CHUNK_SIZE);
        assert_eq!(parts[1].offset, DEFAULT_CHUNK_SIZE as u64);
        assert_eq!(parts[2].len, 4 * 1024 * 1024 + 3);
        assert_eq!(parts.iter().map(|p| p.len as u64).sum::<u64>(), size);
        assert_eq!(parts.last().map(|p| p.number), Some(3));
    }

    #[test]
    fn test_plan_parts_enforces_minimum() {
        let parts = plan_parts(12 * 1024 * 1024, 1024);
        assert!(parts[..parts.len() - 1].iter().all(|p| p.len >= MIN_PART_SIZE));
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn test_plan_parts_respects_part_limit() {
        let size = MAX_PARTS * MIN_PART_SIZE as u64 * 2;
        let parts = plan_parts(size, MIN_PART_SIZE);
        assert!(parts.len() as u64 <= MAX_PARTS);
    }

    #[test]
    fn test_plan_parts_small_and_empty() {
        assert!(plan_parts(0, DEFAULT_CHUNK_SIZE).is_empty());
        let parts = plan_parts(1000, DEFAULT_CHUNK_SIZE);
        assert_eq!(
            parts,
            vec![PartRange {
                number: 1,
                offset: 0,
                len: 1000
            }]
        );
    }
}
