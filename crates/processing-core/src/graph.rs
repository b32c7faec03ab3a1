//! Composition graph: the declarative output of the compiler.
//!
//! A graph is an ordered list of nodes. Each node applies one [`Operation`]
//! to its input streams and publishes named output streams. Source streams
//! are addressed as `"{i}:v"` / `"{i}:a"` where `i` indexes
//! [`CompositionGraph::inputs`].

use serde::{Deserialize, Serialize};
use splice_project_model::{AssetId, AssetKind, ClipId, TextAlign};

/// Ordered processing graph for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionGraph {
    pub canvas_width: u32,
    pub canvas_height: u32,

    /// Length of the base canvas in seconds.
    pub duration_secs: f64,

    /// One entry per clip that consumes a source stream.
    pub inputs: Vec<GraphInput>,

    pub nodes: Vec<GraphNode>,

    /// Label of the final composited video stream.
    pub video_output: String,

    /// Label of the mixed audio stream, absent when nothing is audible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_output: Option<String>,
}

impl CompositionGraph {
    /// Stable compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Operation names in node order.
    pub fn op_names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|node| node.op.name()).collect()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_output.is_some()
    }

    /// Nodes whose outputs are folded onto the running video stream.
    pub fn fold_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.op, Operation::Overlay { .. } | Operation::DrawText(_)))
    }
}

/// A source stream feeding the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    pub asset_id: AssetId,
    pub clip_id: ClipId,
    pub kind: AssetKind,
    pub source_locator: String,
    /// Still images are looped to fill the clip window.
    pub looped: bool,
}

impl GraphInput {
    pub fn video_label(index: usize) -> String {
        format!("{index}:v")
    }

    pub fn audio_label(index: usize) -> String {
        format!("{index}:a")
    }
}

/// One processing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub inputs: Vec<String>,
    #[serde(flatten)]
    pub op: Operation,
    pub outputs: Vec<String>,
}

impl GraphNode {
    pub fn new(inputs: Vec<String>, op: Operation, output: String) -> Self {
        Self {
            inputs,
            op,
            outputs: vec![output],
        }
    }

    /// The first (and for every current operation, only) output label.
    pub fn output(&self) -> &str {
        self.outputs.first().map(String::as_str).unwrap_or_default()
    }
}

/// Which edge of the clip window a fade applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    In,
    Out,
}

/// How the mix decides its output length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MixDuration {
    /// Shorter inputs are padded with silence.
    #[default]
    Longest,
    Shortest,
    First,
}

/// Burned-in text parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawText {
    pub content: String,
    /// Anchor position in canvas pixels, before alignment.
    pub x: f64,
    pub y: f64,
    pub align: TextAlign,
    pub font_size_px: f64,
    pub font_family: String,
    pub color: String,
    /// Box fill behind the text, absent when transparent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    pub enable_start: f64,
    pub enable_end: f64,
}

impl DrawText {
    /// Left edge of the rendered text for a measured width.
    pub fn resolved_x(&self, text_width: f64) -> f64 {
        match self.align {
            TextAlign::Left => self.x,
            TextAlign::Center => self.x - text_width / 2.0,
            TextAlign::Right => self.x - text_width,
        }
    }
}

/// A single media operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Solid background stream.
    Color {
        color: String,
        width: u32,
        height: u32,
        duration_secs: f64,
    },
    /// Keep the source window `[start, end)`.
    Trim { start_secs: f64, end_secs: f64 },
    /// Restart stream timestamps at zero.
    ResetTimestamps,
    /// Delay the stream so it starts at `offset_secs`.
    ShiftTimestamps { offset_secs: f64 },
    /// Repeat a single frame indefinitely.
    LoopStill,
    /// Convert to a pixel format with an alpha plane.
    AlphaFormat,
    Scale { factor: f64 },
    /// Rotate, expanding the frame to the rotated bounds with a transparent fill.
    Rotate { degrees: f64 },
    Opacity { factor: f64 },
    Fade {
        direction: FadeDirection,
        start_secs: f64,
        duration_secs: f64,
    },
    /// Composite the second input over the first at a pixel position,
    /// active only inside `[enable_start, enable_end)`.
    Overlay {
        x: f64,
        y: f64,
        enable_start: f64,
        enable_end: f64,
    },
    DrawText(DrawText),
    AudioTrim { start_secs: f64, end_secs: f64 },
    AudioResetTimestamps,
    Volume { gain: f64 },
    AudioDelay { delay_secs: f64 },
    AudioMix { duration: MixDuration },
}

impl Operation {
    /// Stable operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Color { .. } => "color",
            Operation::Trim { .. } => "trim",
            Operation::ResetTimestamps => "reset_timestamps",
            Operation::ShiftTimestamps { .. } => "shift_timestamps",
            Operation::LoopStill => "loop_still",
            Operation::AlphaFormat => "alpha_format",
            Operation::Scale { .. } => "scale",
            Operation::Rotate { .. } => "rotate",
            Operation::Opacity { .. } => "opacity",
            Operation::Fade { .. } => "fade",
            Operation::Overlay { .. } => "overlay",
            Operation::DrawText(_) => "draw_text",
            Operation::AudioTrim { .. } => "audio_trim",
            Operation::AudioResetTimestamps => "audio_reset_timestamps",
            Operation::Volume { .. } => "volume",
            Operation::AudioDelay { .. } => "audio_delay",
            Operation::AudioMix { .. } => "audio_mix",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Operation::AudioTrim { .. }
                | Operation::AudioResetTimestamps
                | Operation::Volume { .. }
                | Operation::AudioDelay { .. }
                | Operation::AudioMix { .. }
        )
    }
}
