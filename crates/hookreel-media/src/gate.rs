//! Duration gate: short main clips are time-stretched before assembly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use hookreel_models::{AssemblyConfig, EncodingConfig};

use crate::command::RenderEngine;
use crate::error::{MediaError, MediaResult};
use crate::graph::{FilterGraph, FinalizedGraph, Operation, StreamRef};
use crate::probe::{MediaAsset, MediaProber};

/// What the gate decided for a main clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    PassThrough,
    SlowMotion { factor: f64 },
}

/// Result of [`DurationGate::apply`].
#[derive(Debug, Clone)]
pub struct GateOutcome {
    /// Asset to feed into the assembly graph.
    pub asset: MediaAsset,
    pub decision: GateDecision,
    /// Duration before stretching.
    pub original_duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationGate {
    threshold_s: f64,
    factor: f64,
}

impl DurationGate {
    pub fn new(threshold_s: f64, factor: f64) -> Self {
        Self { threshold_s, factor }
    }

    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self::new(config.duration_threshold_s, config.slowmo_factor)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold_s
    }

    /// Strictly below the threshold means slow motion.
    pub fn decide(&self, asset: &MediaAsset) -> GateDecision {
        if asset.duration() < self.threshold_s {
            GateDecision::SlowMotion {
                factor: self.factor,
            }
        } else {
            GateDecision::PassThrough
        }
    }

    /// Stretch graph: `setpts=<factor>*PTS` on video, `atempo=1/<factor>` on audio.
    pub fn slow_motion_graph(&self, asset: &MediaAsset) -> MediaResult<FinalizedGraph> {
        if !asset.has_video() {
            return Err(MediaError::InvalidVideo(format!(
                "{} has no video stream to stretch",
                asset.path().display()
            )));
        }

        let mut graph = FilterGraph::new();
        let input = graph.add_input(asset.path());
        let video = graph.chain(
            StreamRef::video(input),
            [Operation::SetPts {
                factor: self.factor,
            }],
        )?;
        let mut outputs = vec![(video, "slowv")];

        if asset.has_audio() {
            let audio = graph.chain(
                StreamRef::audio(input),
                [Operation::Tempo {
                    factor: 1.0 / self.factor,
                }],
            )?;
            outputs.push((audio, "slowa"));
        }

        graph.finalize(&outputs)
    }

    /// Decide, and when needed render the stretched intermediate to `output`
    /// and probe it. The returned asset is what assembly should consume.
    pub async fn apply<P, R>(
        &self,
        asset: MediaAsset,
        output: &Path,
        encoding: &EncodingConfig,
        prober: &P,
        engine: &R,
    ) -> MediaResult<GateOutcome>
    where
        P: MediaProber + ?Sized,
        R: RenderEngine + ?Sized,
    {
        let original_duration = asset.duration();
        let decision = self.decide(&asset);

        match decision {
            GateDecision::PassThrough => {
                info!(
                    duration = original_duration,
                    threshold = self.threshold_s,
                    "Main clip long enough, no slow motion"
                );
                Ok(GateOutcome {
                    asset,
                    decision,
                    original_duration,
                })
            }
            GateDecision::SlowMotion { factor } => {
                info!(
                    duration = original_duration,
                    threshold = self.threshold_s,
                    factor,
                    output = %output.display(),
                    "Main clip below threshold, rendering slow motion"
                );
                let cmd = self
                    .slow_motion_graph(&asset)?
                    .to_command(output, encoding.to_ffmpeg_args());
                engine.render(&cmd).await?;

                let stretched = prober.probe(output).await?;
                info!(
                    original = original_duration,
                    stretched = stretched.duration(),
                    "Slow motion intermediate ready"
                );
                Ok(GateOutcome {
                    asset: stretched,
                    decision,
                    original_duration,
                })
            }
        }
    }
}

impl Default for DurationGate {
    fn default() -> Self {
        Self::from_config(&AssemblyConfig::default())
    }
}
