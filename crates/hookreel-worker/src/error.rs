//! Worker error types.
//!
//! Every fatal error displays as `"<stage> failed: <cause>"` so an unattended
//! run's last log line says where it stopped.

use std::fmt;
use thiserror::Error;

use hookreel_media::MediaError;
use hookreel_models::{ConfigError, ResourceKind};
use hookreel_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Pipeline stage, used to label fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configuration,
    Probe,
    InputValidation,
    DurationGate,
    GraphBuild,
    Render,
    Thumbnail,
    Publish,
    Record,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configuration => "configuration",
            Stage::Probe => "probe",
            Stage::InputValidation => "input validation",
            Stage::DurationGate => "duration gate",
            Stage::GraphBuild => "graph build",
            Stage::Render => "render",
            Stage::Thumbnail => "thumbnail",
            Stage::Publish => "publish",
            Stage::Record => "record",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration failed: {0}")]
    Config(String),

    #[error("{stage} failed: {source}")]
    Media {
        stage: Stage,
        #[source]
        source: MediaError,
    },

    #[error("publish failed: {kind} upload gave up after {attempts} attempts: {last_error}")]
    UploadExhausted {
        kind: ResourceKind,
        attempts: u32,
        last_error: String,
    },

    #[error("publish failed: {0}")]
    Storage(StorageError),

    #[error("record failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for WorkerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConfigError(msg) => WorkerError::Config(msg),
            other => WorkerError::Storage(other),
        }
    }
}

impl From<ConfigError> for WorkerError {
    fn from(err: ConfigError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach the stage a media error happened in.
    pub fn media(stage: Stage, source: MediaError) -> Self {
        Self::Media { stage, source }
    }

    /// Closure form of [`WorkerError::media`] for `map_err`.
    pub fn at(stage: Stage) -> impl FnOnce(MediaError) -> Self {
        move |source| Self::media(stage, source)
    }

    pub fn stage(&self) -> Stage {
        match self {
            WorkerError::Config(_) => Stage::Configuration,
            WorkerError::Media { stage, .. } => *stage,
            WorkerError::UploadExhausted { .. } | WorkerError::Storage(_) => Stage::Publish,
            WorkerError::Io(_) | WorkerError::Json(_) => Stage::Record,
        }
    }

}

/// Process exit code for a run result: 0 on success, 1 on any fatal failure.
pub fn exit_code<T, E>(result: &Result<T, E>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}
