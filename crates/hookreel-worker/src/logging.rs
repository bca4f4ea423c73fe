//! Structured run logging utilities.
//!
//! Every line emitted for a run carries its `run_id` and the current stage.

use tracing::{error, info, warn, Span};
use uuid::Uuid;

use crate::error::Stage;

/// Run logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
}

impl RunLogger {
    /// Logger for a fresh run with a random id.
    pub fn new() -> Self {
        Self::from_string(&Uuid::new_v4().to_string())
    }

    pub fn from_string(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(run_id = %self.run_id, "Run started: {}", message);
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: Stage, message: &str) {
        info!(run_id = %self.run_id, stage = %stage, "{}", message);
    }

    pub fn log_warning(&self, stage: Stage, message: &str) {
        warn!(run_id = %self.run_id, stage = %stage, "{}", message);
    }

    pub fn log_error(&self, stage: Stage, message: &str) {
        error!(run_id = %self.run_id, stage = %stage, "Run failed: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(run_id = %self.run_id, "Run completed: {}", message);
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Span wrapping the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id)
    }
}

impl Default for RunLogger {
    fn default() -> Self {
        Self::new()
    }
}
