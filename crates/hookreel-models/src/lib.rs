//! Shared data models for the hookreel assembly pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Assembly policies (aspect, loudness, mix duration)
//! - Encoding configuration and its validation errors
//! - Publication records

pub mod assembly;
pub mod encoding;
pub mod error;
pub mod publication;

// Re-export common types
pub use assembly::{
    AspectPolicy, AssemblyConfig, LoudnessProfile, MixDurationPolicy, PolicyParseError,
    TARGET_FPS, TARGET_HEIGHT, TARGET_SAMPLE_RATE, TARGET_WIDTH,
};
pub use encoding::EncodingConfig;
pub use error::ConfigError;
pub use publication::{PublicationRecord, PublicationSummary, ResourceKind};
