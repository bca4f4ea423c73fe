//! Short-form assembly worker.
//!
//! This crate provides:
//! - Environment-driven pipeline configuration
//! - The assembly run (probe, duration gate, render, thumbnail)
//! - Publishing with retry and a local publication ledger
//! - Run-scoped structured logging and metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publication;
pub mod publisher;
pub mod retry;

pub use config::{InputPaths, PipelineConfig, PublishConfig, WorkDir};
pub use error::{exit_code, Stage, WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use pipeline::{AssemblyPipeline, RenderResult, RunSummary};
pub use publication::PublicationLedger;
pub use publisher::{Publisher, UploadJob};
pub use retry::{retry_async, retry_async_if, RetryMachine, RetryPolicy, RetryResult, RetryState};
