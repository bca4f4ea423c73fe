//! Declarative filter graph.
//!
//! Nodes live in an arena and refer to upstream streams by id, so a graph is
//! acyclic by construction: a node can only reference inputs and nodes that
//! already exist. Stream kinds and frame geometry are inferred as nodes are
//! added, which lets `concat` reject mismatched segments before anything is
//! handed to ffmpeg.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use hookreel_models::{LoudnessProfile, MixDurationPolicy};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult, StreamKind};

/// Index of an input file (`-i` order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputId(usize);

impl InputId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Index of an operation node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }

    /// First output pad of this node.
    pub fn out(self) -> StreamRef {
        self.pad(0)
    }

    /// Output pad `pad` of this node.
    pub fn pad(self, pad: usize) -> StreamRef {
        StreamRef::Node { node: self, pad }
    }
}

/// A stream consumed by a node: either an input file's stream or a node output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum StreamRef {
    Input { input: InputId, kind: StreamKind },
    Node { node: NodeId, pad: usize },
}

impl StreamRef {
    pub fn video(input: InputId) -> Self {
        StreamRef::Input {
            input,
            kind: StreamKind::Video,
        }
    }

    pub fn audio(input: InputId) -> Self {
        StreamRef::Input {
            input,
            kind: StreamKind::Audio,
        }
    }
}

/// Output frame size of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    /// Known at build time.
    Exact { width: u32, height: u32 },
    /// Depends on the source file.
    Source,
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Exact { width, height } => write!(f, "{}x{}", width, height),
            Geometry::Source => write!(f, "source-dependent"),
        }
    }
}

/// Kind and (for video) geometry of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamShape {
    Video { geometry: Geometry },
    Audio,
}

impl StreamShape {
    pub fn kind(&self) -> StreamKind {
        match self {
            StreamShape::Video { .. } => StreamKind::Video,
            StreamShape::Audio => StreamKind::Audio,
        }
    }

    pub fn geometry(&self) -> Option<Geometry> {
        match self {
            StreamShape::Video { geometry } => Some(*geometry),
            StreamShape::Audio => None,
        }
    }
}

/// How `scale` treats the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleFit {
    /// Stretch to exactly width x height.
    Exact,
    /// Fit inside the box (letterbox).
    Decrease,
    /// Cover the box (fill-crop).
    Increase,
}

/// A single filter operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Scale { width: u32, height: u32, fit: ScaleFit },
    /// Centered black padding.
    Pad { width: u32, height: u32 },
    /// Centered crop.
    Crop { width: u32, height: u32 },
    /// Square pixels.
    SetSar,
    Fps { fps: u32 },
    /// Luma-only unsharp mask.
    Unsharp { matrix: u8, amount: f32 },
    ColorAdjust { brightness: f32, contrast: f32, saturation: f32 },
    /// Timestamp remap; factor > 1 slows the video down.
    SetPts { factor: f64 },
    /// Audio tempo; factor < 1 slows the audio down.
    Tempo { factor: f64 },
    Denoise { strength: f32 },
    Loudnorm { profile: LoudnessProfile },
    Volume { gain: f32 },
    /// Common sample format/rate/layout so concat and mix inputs agree.
    AudioFormat { sample_rate: u32 },
    /// Two-input audio mix.
    Mix { duration: MixDurationPolicy },
    /// Joins `segments` (video, audio) pairs in order.
    Concat { segments: usize },
}

impl Operation {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Scale { .. } => "scale",
            Operation::Pad { .. } => "pad",
            Operation::Crop { .. } => "crop",
            Operation::SetSar => "setsar",
            Operation::Fps { .. } => "fps",
            Operation::Unsharp { .. } => "unsharp",
            Operation::ColorAdjust { .. } => "eq",
            Operation::SetPts { .. } => "setpts",
            Operation::Tempo { .. } => "atempo",
            Operation::Denoise { .. } => "afftdn",
            Operation::Loudnorm { .. } => "loudnorm",
            Operation::Volume { .. } => "volume",
            Operation::AudioFormat { .. } => "aformat",
            Operation::Mix { .. } => "amix",
            Operation::Concat { .. } => "concat",
        }
    }

    /// Stream kinds this operation consumes, in pad order.
    pub fn input_kinds(&self) -> Vec<StreamKind> {
        match self {
            Operation::Mix { .. } => vec![StreamKind::Audio, StreamKind::Audio],
            Operation::Concat { segments } => (0..*segments)
                .flat_map(|_| [StreamKind::Video, StreamKind::Audio])
                .collect(),
            op if op.is_video() => vec![StreamKind::Video],
            _ => vec![StreamKind::Audio],
        }
    }

    /// Rate factors must be finite and positive to mean anything to ffmpeg.
    fn check_operands(&self) -> MediaResult<()> {
        match self {
            Operation::SetPts { factor } | Operation::Tempo { factor }
                if !(factor.is_finite() && *factor > 0.0) =>
            {
                Err(MediaError::invalid_graph(format!(
                    "{} factor must be finite and positive, got {}",
                    self.name(),
                    factor
                )))
            }
            _ => Ok(()),
        }
    }

    fn is_video(&self) -> bool {
        matches!(
            self,
            Operation::Scale { .. }
                | Operation::Pad { .. }
                | Operation::Crop { .. }
                | Operation::SetSar
                | Operation::Fps { .. }
                | Operation::Unsharp { .. }
                | Operation::ColorAdjust { .. }
                | Operation::SetPts { .. }
        )
    }

    /// ffmpeg filter text for this node, without pad labels.
    pub fn to_filter(&self) -> String {
        match self {
            Operation::Scale { width, height, fit } => match fit {
                ScaleFit::Exact => format!("scale={}:{}", width, height),
                ScaleFit::Decrease => format!(
                    "scale={}:{}:force_original_aspect_ratio=decrease",
                    width, height
                ),
                ScaleFit::Increase => format!(
                    "scale={}:{}:force_original_aspect_ratio=increase",
                    width, height
                ),
            },
            Operation::Pad { width, height } => {
                format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2:color=black", width, height)
            }
            Operation::Crop { width, height } => {
                format!("crop={}:{}:(iw-ow)/2:(ih-oh)/2", width, height)
            }
            Operation::SetSar => "setsar=1".to_string(),
            Operation::Fps { fps } => format!("fps={}", fps),
            Operation::Unsharp { matrix, amount } => {
                format!("unsharp={m}:{m}:{a:.2}:{m}:{m}:0.0", m = matrix, a = amount)
            }
            Operation::ColorAdjust {
                brightness,
                contrast,
                saturation,
            } => format!(
                "eq=brightness={:.2}:contrast={:.2}:saturation={:.2}",
                brightness, contrast, saturation
            ),
            Operation::SetPts { factor } => format!("setpts={:.4}*PTS", factor),
            Operation::Tempo { factor } => atempo_chain(*factor),
            Operation::Denoise { strength } => format!("afftdn=nr={:.1}", strength),
            Operation::Loudnorm { profile } => match profile {
                LoudnessProfile::Simple => "loudnorm".to_string(),
                LoudnessProfile::Broadcast {
                    integrated,
                    true_peak,
                    lra,
                } => format!("loudnorm=I={:.1}:TP={:.1}:LRA={:.1}", integrated, true_peak, lra),
            },
            Operation::Volume { gain } => format!("volume={:.2}", gain),
            Operation::AudioFormat { sample_rate } => format!(
                "aformat=sample_fmts=fltp:sample_rates={}:channel_layouts=stereo",
                sample_rate
            ),
            Operation::Mix { duration } => match duration {
                MixDurationPolicy::First => "amix=inputs=2:duration=first:normalize=0".to_string(),
                MixDurationPolicy::Longest {
                    dropout_transition_s,
                } => format!(
                    "amix=inputs=2:duration=longest:dropout_transition={:.1}:normalize=0",
                    dropout_transition_s
                ),
            },
            Operation::Concat { segments } => format!("concat=n={}:v=1:a=1", segments),
        }
    }

    /// Output shapes given the shapes of the consumed streams.
    fn output_shapes(&self, inputs: &[StreamShape]) -> MediaResult<Vec<StreamShape>> {
        let shape = match self {
            Operation::Scale {
                width,
                height,
                fit: ScaleFit::Exact,
            }
            | Operation::Pad { width, height }
            | Operation::Crop { width, height } => StreamShape::Video {
                geometry: Geometry::Exact {
                    width: *width,
                    height: *height,
                },
            },
            Operation::Scale { .. } => StreamShape::Video {
                geometry: Geometry::Source,
            },
            Operation::Concat { segments } => {
                return concat_shapes(*segments, inputs);
            }
            op if op.is_video() => inputs[0],
            _ => StreamShape::Audio,
        };
        Ok(vec![shape])
    }
}

/// `atempo` only accepts 0.5..=2.0 on older ffmpeg builds, so larger changes are chained.
/// `factor` is finite and positive; [`FilterGraph::add`] rejects anything else.
fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor;
    let mut stages = Vec::new();
    while remaining < 0.5 {
        stages.push(0.5);
        remaining /= 0.5;
    }
    while remaining > 2.0 {
        stages.push(2.0);
        remaining /= 2.0;
    }
    stages.push(remaining);
    stages
        .iter()
        .map(|t| format!("atempo={:.4}", t))
        .collect::<Vec<_>>()
        .join(",")
}

/// Every segment must be (video, audio) with the same fixed geometry.
fn concat_shapes(segments: usize, inputs: &[StreamShape]) -> MediaResult<Vec<StreamShape>> {
    if segments == 0 {
        return Err(MediaError::invalid_graph("concat needs at least one segment"));
    }

    let mut reference: Option<Geometry> = None;
    for (segment, pair) in inputs.chunks(2).enumerate() {
        let geometry = match pair[0] {
            StreamShape::Video {
                geometry: geometry @ Geometry::Exact { .. },
            } => geometry,
            other => {
                return Err(MediaError::invalid_graph(format!(
                    "concat segment {} video has {} geometry; every segment must be normalized to a fixed frame",
                    segment,
                    other.geometry().map(|g| g.to_string()).unwrap_or_else(|| "no".to_string())
                )))
            }
        };
        match reference {
            None => reference = Some(geometry),
            Some(expected) if expected != geometry => {
                return Err(MediaError::invalid_graph(format!(
                    "concat segment {} is {} but segment 0 is {}",
                    segment, geometry, expected
                )))
            }
            Some(_) => {}
        }
    }

    let geometry = reference.ok_or_else(|| MediaError::invalid_graph("concat has no inputs"))?;
    Ok(vec![StreamShape::Video { geometry }, StreamShape::Audio])
}

/// An operation with its upstream references and inferred output shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub op: Operation,
    pub inputs: Vec<StreamRef>,
    pub outputs: Vec<StreamShape>,
}

/// Graph under construction.
#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    inputs: Vec<PathBuf>,
    nodes: Vec<Node>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an input file. Inputs are passed to ffmpeg in registration order.
    pub fn add_input(&mut self, path: impl AsRef<Path>) -> InputId {
        self.inputs.push(path.as_ref().to_path_buf());
        InputId(self.inputs.len() - 1)
    }

    /// Add a node consuming `inputs`.
    ///
    /// Fails if a reference is dangling, a stream kind does not match the
    /// operation, a rate factor is unusable, or (for `concat`) segment
    /// geometries disagree.
    pub fn add(&mut self, op: Operation, inputs: &[StreamRef]) -> MediaResult<NodeId> {
        op.check_operands()?;
        let expected = op.input_kinds();
        if inputs.len() != expected.len() {
            return Err(MediaError::invalid_graph(format!(
                "{} expects {} inputs, got {}",
                op.name(),
                expected.len(),
                inputs.len()
            )));
        }

        let mut shapes = Vec::with_capacity(inputs.len());
        for (idx, (stream, kind)) in inputs.iter().zip(expected.iter()).enumerate() {
            let shape = self.shape(*stream)?;
            if shape.kind() != *kind {
                return Err(MediaError::invalid_graph(format!(
                    "{} input {} must be {}, got {}",
                    op.name(),
                    idx,
                    kind,
                    shape.kind()
                )));
            }
            shapes.push(shape);
        }

        let outputs = op.output_shapes(&shapes)?;
        self.nodes.push(Node {
            op,
            inputs: inputs.to_vec(),
            outputs,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    /// Apply single-input operations one after another.
    pub fn chain<I>(&mut self, from: StreamRef, ops: I) -> MediaResult<StreamRef>
    where
        I: IntoIterator<Item = Operation>,
    {
        ops.into_iter()
            .try_fold(from, |stream, op| Ok(self.add(op, &[stream])?.out()))
    }

    /// Shape of a stream reference.
    pub fn shape(&self, stream: StreamRef) -> MediaResult<StreamShape> {
        match stream {
            StreamRef::Input { input, kind } => {
                if input.0 >= self.inputs.len() {
                    return Err(MediaError::invalid_graph(format!(
                        "unknown input {}",
                        input.0
                    )));
                }
                Ok(match kind {
                    StreamKind::Video => StreamShape::Video {
                        geometry: Geometry::Source,
                    },
                    StreamKind::Audio => StreamShape::Audio,
                })
            }
            StreamRef::Node { node, pad } => self
                .nodes
                .get(node.0)
                .and_then(|n| n.outputs.get(pad))
                .copied()
                .ok_or_else(|| {
                    MediaError::invalid_graph(format!("unknown node output n{}:{}", node.0, pad))
                }),
        }
    }

    /// Freeze the graph, naming the streams that leave it.
    ///
    /// Every node output must be consumed exactly once, either by another
    /// node or as a named graph output.
    pub fn finalize(self, outputs: &[(StreamRef, &str)]) -> MediaResult<FinalizedGraph> {
        if outputs.is_empty() {
            return Err(MediaError::invalid_graph("graph has no outputs"));
        }

        let mut labels = HashSet::new();
        let mut named = HashMap::new();
        for (stream, label) in outputs {
            if !labels.insert(*label) {
                return Err(MediaError::invalid_graph(format!(
                    "duplicate output label {}",
                    label
                )));
            }
            match stream {
                StreamRef::Node { .. } => {
                    self.shape(*stream)?;
                    named.insert(*stream, label.to_string());
                }
                StreamRef::Input { .. } => {
                    return Err(MediaError::invalid_graph(format!(
                        "output {} must come from a filter node",
                        label
                    )))
                }
            }
        }

        let mut consumers: HashMap<StreamRef, usize> = HashMap::new();
        for node in &self.nodes {
            for stream in &node.inputs {
                if matches!(stream, StreamRef::Node { .. }) {
                    *consumers.entry(*stream).or_default() += 1;
                }
            }
        }
        for stream in named.keys() {
            *consumers.entry(*stream).or_default() += 1;
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            for pad in 0..node.outputs.len() {
                let stream = NodeId(idx).pad(pad);
                match consumers.get(&stream).copied().unwrap_or(0) {
                    1 => {}
                    0 => {
                        return Err(MediaError::invalid_graph(format!(
                            "{} output n{}:{} is never consumed",
                            node.op.name(),
                            idx,
                            pad
                        )))
                    }
                    n => {
                        return Err(MediaError::invalid_graph(format!(
                            "{} output n{}:{} is consumed {} times",
                            node.op.name(),
                            idx,
                            pad,
                            n
                        )))
                    }
                }
            }
        }

        Ok(FinalizedGraph {
            inputs: self.inputs,
            nodes: self.nodes,
            outputs: outputs
                .iter()
                .map(|(stream, label)| GraphOutput {
                    stream: *stream,
                    label: label.to_string(),
                })
                .collect(),
        })
    }
}

/// A named stream leaving the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphOutput {
    pub stream: StreamRef,
    pub label: String,
}

/// Immutable, validated graph ready for the render engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedGraph {
    inputs: Vec<PathBuf>,
    nodes: Vec<Node>,
    outputs: Vec<GraphOutput>,
}

impl FinalizedGraph {
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn outputs(&self) -> &[GraphOutput] {
        &self.outputs
    }

    /// Arena position of the first node whose operation has `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.op.name() == name)
    }

    /// Shape of a node output or input stream.
    pub fn shape(&self, stream: StreamRef) -> Option<StreamShape> {
        match stream {
            StreamRef::Input { kind, .. } => Some(match kind {
                StreamKind::Video => StreamShape::Video {
                    geometry: Geometry::Source,
                },
                StreamKind::Audio => StreamShape::Audio,
            }),
            StreamRef::Node { node, pad } => {
                self.nodes.get(node.0).and_then(|n| n.outputs.get(pad)).copied()
            }
        }
    }

    fn label(&self, stream: StreamRef) -> String {
        match stream {
            StreamRef::Input { input, kind } => format!("{}:{}", input.0, kind.specifier()),
            StreamRef::Node { node, pad } => {
                if let Some(out) = self.outputs.iter().find(|o| o.stream == stream) {
                    return out.label.clone();
                }
                match self.nodes.get(node.0).map(|n| n.outputs.len()) {
                    Some(1) => format!("n{}", node.0),
                    _ => format!("n{}p{}", node.0, pad),
                }
            }
        }
    }

    /// Render as an ffmpeg `-filter_complex` argument.
    pub fn to_filter_complex(&self) -> String {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let ins: String = node
                    .inputs
                    .iter()
                    .map(|s| format!("[{}]", self.label(*s)))
                    .collect();
                let outs: String = (0..node.outputs.len())
                    .map(|pad| format!("[{}]", self.label(NodeId(idx).pad(pad))))
                    .collect();
                format!("{}{}{}", ins, node.op.to_filter(), outs)
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Build the ffmpeg invocation: inputs, graph, output maps, then `output_args`.
    pub fn to_command<I, S>(&self, output: impl AsRef<Path>, output_args: I) -> FfmpegCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd = self
            .inputs
            .iter()
            .fold(FfmpegCommand::with_output(output), |cmd, path| cmd.input(path))
            .filter_complex(self.to_filter_complex());

        self.outputs
            .iter()
            .fold(cmd, |cmd, out| cmd.map_label(&out.label))
            .output_args(output_args)
    }
}
