//! Assembly graph: hook + main segments with cleaned, mixed audio.

use std::path::Path;
use tracing::debug;

use hookreel_models::{
    AspectPolicy, AssemblyConfig, EncodingConfig, MixDurationPolicy, TARGET_FPS, TARGET_HEIGHT,
    TARGET_SAMPLE_RATE, TARGET_WIDTH,
};

use crate::command::FfmpegCommand;
use crate::error::{MediaResult, StreamKind};
use crate::graph::{FilterGraph, FinalizedGraph, Operation, ScaleFit, StreamRef};
use crate::probe::MediaAsset;

pub const ROLE_MAIN: &str = "main";
pub const ROLE_HOOK: &str = "hook";
pub const ROLE_MUSIC: &str = "music";

/// Output pad labels of the terminal concat node.
pub const VIDEO_OUTPUT_LABEL: &str = "outv";
pub const AUDIO_OUTPUT_LABEL: &str = "outa";

const UNSHARP_MATRIX: u8 = 5;
const UNSHARP_AMOUNT: f32 = 1.0;
const EQ_BRIGHTNESS: f32 = 0.03;
const EQ_CONTRAST: f32 = 1.1;
const EQ_SATURATION: f32 = 1.2;

/// Finalized assembly graph plus its projected output duration.
#[derive(Debug, Clone)]
pub struct AssemblyGraph {
    graph: FinalizedGraph,
    expected_duration: f64,
}

impl AssemblyGraph {
    pub fn graph(&self) -> &FinalizedGraph {
        &self.graph
    }

    /// Seconds of output the render should produce.
    pub fn expected_duration(&self) -> f64 {
        self.expected_duration
    }

    /// Full render invocation with the codec policy applied.
    pub fn to_command(&self, output: impl AsRef<Path>, encoding: &EncodingConfig) -> FfmpegCommand {
        self.graph.to_command(output, encoding.to_ffmpeg_args())
    }
}

/// Builds the assembly graph from an immutable [`AssemblyConfig`].
#[derive(Debug, Clone)]
pub struct FilterGraphBuilder {
    config: AssemblyConfig,
}

impl FilterGraphBuilder {
    pub fn new(config: AssemblyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Main and hook need video and audio; music needs audio only.
    pub fn validate_inputs(main: &MediaAsset, hook: &MediaAsset, music: &MediaAsset) -> MediaResult<()> {
        main.require_streams(ROLE_MAIN, &[StreamKind::Video, StreamKind::Audio])?;
        hook.require_streams(ROLE_HOOK, &[StreamKind::Video, StreamKind::Audio])?;
        music.require_streams(ROLE_MUSIC, &[StreamKind::Audio])
    }

    /// Aspect normalization for one segment, ending at an exact target frame.
    pub fn normalization_ops(&self) -> Vec<Operation> {
        let (width, height) = (TARGET_WIDTH, TARGET_HEIGHT);
        let mut ops = match self.config.aspect_policy {
            AspectPolicy::Letterbox => vec![
                Operation::Scale {
                    width,
                    height,
                    fit: ScaleFit::Decrease,
                },
                Operation::Pad { width, height },
            ],
            AspectPolicy::FillCrop => vec![
                Operation::Scale {
                    width,
                    height,
                    fit: ScaleFit::Increase,
                },
                Operation::Crop { width, height },
            ],
        };
        ops.push(Operation::SetSar);
        ops.push(Operation::Fps { fps: TARGET_FPS });
        ops
    }

    fn enhancement_ops(&self) -> Vec<Operation> {
        vec![
            Operation::Unsharp {
                matrix: UNSHARP_MATRIX,
                amount: UNSHARP_AMOUNT,
            },
            Operation::ColorAdjust {
                brightness: EQ_BRIGHTNESS,
                contrast: EQ_CONTRAST,
                saturation: EQ_SATURATION,
            },
        ]
    }

    /// Projected output length: hook plus the mixed main segment.
    pub fn projected_duration(&self, main: &MediaAsset, hook: &MediaAsset, music: &MediaAsset) -> f64 {
        let main_segment = match self.config.mix_duration_policy {
            MixDurationPolicy::First => main.duration(),
            MixDurationPolicy::Longest { .. } => main.duration().max(music.duration()),
        };
        hook.duration() + main_segment
    }

    /// Build and finalize the graph. Inputs are registered main, hook, music.
    pub fn build(&self, main: &MediaAsset, hook: &MediaAsset, music: &MediaAsset) -> MediaResult<AssemblyGraph> {
        Self::validate_inputs(main, hook, music)?;

        let mut graph = FilterGraph::new();
        let main_in = graph.add_input(main.path());
        let hook_in = graph.add_input(hook.path());
        let music_in = graph.add_input(music.path());

        let hook_v = graph.chain(StreamRef::video(hook_in), self.normalization_ops())?;
        let hook_a = graph.chain(
            StreamRef::audio(hook_in),
            [Operation::AudioFormat {
                sample_rate: TARGET_SAMPLE_RATE,
            }],
        )?;

        let mut main_v = graph.chain(StreamRef::video(main_in), self.normalization_ops())?;
        if self.config.enhance_main {
            main_v = graph.chain(main_v, self.enhancement_ops())?;
        }

        let voice = graph.chain(
            StreamRef::audio(main_in),
            [
                Operation::Denoise {
                    strength: self.config.denoise_strength,
                },
                Operation::Loudnorm {
                    profile: self.config.loudness_profile,
                },
            ],
        )?;
        let bed = graph.chain(
            StreamRef::audio(music_in),
            [Operation::Volume {
                gain: self.config.music_gain,
            }],
        )?;
        let mix = graph.add(
            Operation::Mix {
                duration: self.config.mix_duration_policy,
            },
            &[voice, bed],
        )?;
        let mixed = graph.chain(
            mix.out(),
            [Operation::AudioFormat {
                sample_rate: TARGET_SAMPLE_RATE,
            }],
        )?;

        let concat = graph.add(Operation::Concat { segments: 2 }, &[hook_v, hook_a, main_v, mixed])?;
        let graph = graph.finalize(&[
            (concat.pad(0), VIDEO_OUTPUT_LABEL),
            (concat.pad(1), AUDIO_OUTPUT_LABEL),
        ])?;

        debug!(
            nodes = graph.nodes().len(),
            aspect_policy = %self.config.aspect_policy,
            enhance_main = self.config.enhance_main,
            "Built assembly graph"
        );

        Ok(AssemblyGraph {
            expected_duration: self.projected_duration(main, hook, music),
            graph,
        })
    }
}
