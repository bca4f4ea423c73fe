//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Single-request and multipart (chunked) file upload to R2
//! - Public or presigned retrieval URLs
//! - The [`ObjectStore`] seam the publisher retries against
//! - Collision-free artifact keys

pub mod client;
pub mod error;
pub mod operations;
pub mod store;

pub use client::{R2Client, R2Config, PRESIGN_MAX_EXPIRY};
pub use error::{StorageError, StorageResult};
pub use operations::{artifact_key, plan_parts, PartRange, DEFAULT_CHUNK_SIZE, MIN_PART_SIZE};
pub use store::{ObjectStore, StoredObject, Transfer, UploadRequest};
