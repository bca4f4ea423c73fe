//! FFmpeg CLI wrapper and assembly logic for hookreel.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a [`RenderEngine`] seam
//! - `ffprobe`-backed [`MediaProber`]
//! - A declarative filter graph ([`FilterGraph`]) rendered to `-filter_complex`
//! - The duration gate, assembly graph builder and thumbnail synthesizer

pub mod builder;
pub mod command;
pub mod error;
pub mod font;
pub mod gate;
pub mod graph;
pub mod probe;
pub mod progress;
pub mod thumbnail;

pub use builder::{AssemblyGraph, FilterGraphBuilder, ROLE_HOOK, ROLE_MAIN, ROLE_MUSIC};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner, RenderEngine};
pub use error::{MediaError, MediaResult, StreamKind};
pub use font::{FontSource, LoadedFont};
pub use gate::{DurationGate, GateDecision, GateOutcome};
pub use graph::{FilterGraph, FinalizedGraph, Geometry, NodeId, Operation, StreamRef, StreamShape};
pub use probe::{probe_media, FfprobeProber, MediaAsset, MediaProber, VideoStreamInfo};
pub use progress::FfmpegProgress;
pub use thumbnail::{
    choose_text, TextTreatment, Thumbnail, ThumbnailConfig, ThumbnailSpec, ThumbnailSynthesizer,
};
