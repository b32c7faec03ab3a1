//! Timeline-to-graph compiler.
//!
//! # Algorithm
//!
//! 1. **Canvas:** a solid color stream sized to the canvas and lasting the
//!    timeline duration becomes the running video stream.
//! 2. **Order:** clips are folded in ascending `z_index`, ties in insertion
//!    order.
//! 3. **Fold:** video and image clips get a source chain (trim or loop,
//!    timestamp reset and shift, then scale, rotate, opacity and fades) and
//!    are overlaid onto the running stream inside their timeline window.
//!    Text clips draw directly onto the running stream.
//! 4. **Audio:** audio clips, and audible video clips, get a trim, reset,
//!    gain and delay chain. All chains feed one mix whose length is the
//!    longest input.
//!
//! Compilation is pure: the same state always yields the same graph.

use splice_project_model::{
    Clip, ClipKind, MediaAsset, TimelineState, Track, TransitionKind,
};
use tracing::{debug, warn};

use crate::graph::{
    CompositionGraph, DrawText, FadeDirection, GraphInput, GraphNode, MixDuration, Operation,
};

/// Label of the base canvas stream.
pub const BASE_LABEL: &str = "base";

/// Label of the mixed audio stream.
pub const MIX_LABEL: &str = "amix";

/// Shortest canvas the compiler emits, so empty timelines still encode.
pub const MIN_CANVAS_DURATION_SECS: f64 = 1.0;

/// Compiler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Background color of the base canvas.
    pub background_color: String,

    /// Lower bound on the canvas duration.
    pub min_duration_secs: f64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            background_color: "black".to_string(),
            min_duration_secs: MIN_CANVAS_DURATION_SECS,
        }
    }
}

/// Compiles timeline snapshots into composition graphs.
#[derive(Debug, Clone, Default)]
pub struct GraphCompiler {
    options: CompileOptions,
}

impl GraphCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Build the graph for `state`.
    pub fn compile(&self, state: &TimelineState) -> CompositionGraph {
        let canvas = &state.canvas_size;
        let duration_secs = if state.total_duration.is_finite() {
            state.total_duration.max(self.options.min_duration_secs)
        } else {
            self.options.min_duration_secs
        };

        let mut builder = GraphBuilder::new(state);
        builder.push(
            vec![],
            Operation::Color {
                color: self.options.background_color.clone(),
                width: canvas.width,
                height: canvas.height,
                duration_secs,
            },
            BASE_LABEL.to_string(),
        );

        for clip in state.fold_order() {
            builder.add_clip(clip);
        }

        let graph = builder.finish(duration_secs);
        debug!(
            nodes = graph.nodes.len(),
            inputs = graph.inputs.len(),
            audio = graph.has_audio(),
            "Composition graph compiled"
        );
        graph
    }
}

/// Compile with default options.
pub fn compile(state: &TimelineState) -> CompositionGraph {
    GraphCompiler::default().compile(state)
}

/// Accumulates nodes while folding clips.
struct GraphBuilder<'a> {
    state: &'a TimelineState,
    inputs: Vec<GraphInput>,
    nodes: Vec<GraphNode>,
    audio_chains: Vec<String>,
    current_video: String,
    next_label: usize,
    folds: usize,
}

impl<'a> GraphBuilder<'a> {
    fn new(state: &'a TimelineState) -> Self {
        Self {
            state,
            inputs: vec![],
            nodes: vec![],
            audio_chains: vec![],
            current_video: BASE_LABEL.to_string(),
            next_label: 0,
            folds: 0,
        }
    }

    fn label(&mut self) -> String {
        let label = format!("s{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn push(&mut self, inputs: Vec<String>, op: Operation, output: String) -> String {
        self.nodes.push(GraphNode::new(inputs, op, output.clone()));
        output
    }

    /// Append a single-input node with a fresh output label.
    fn chain(&mut self, input: String, op: Operation) -> String {
        let output = self.label();
        self.push(vec![input], op, output)
    }

    fn add_clip(&mut self, clip: &Clip) {
        let Some(track) = self.state.track(clip.track_id) else {
            warn!(clip_id = %clip.id, track_id = clip.track_id, "Skipping clip on unknown track");
            return;
        };

        if clip.kind == ClipKind::Text {
            if !track.is_hidden {
                self.fold_text(clip);
            }
            return;
        }

        let Some(asset) = self.state.clip_asset(clip) else {
            warn!(clip_id = %clip.id, asset_id = ?clip.asset_id, "Skipping clip with unresolved asset");
            return;
        };

        let wants_video = matches!(clip.kind, ClipKind::Video | ClipKind::Image) && !track.is_hidden;
        let wants_audio = audible(clip, asset, track);
        if !wants_video && !wants_audio {
            return;
        }

        let index = self.inputs.len();
        self.inputs.push(GraphInput {
            asset_id: asset.id.clone(),
            clip_id: clip.id.clone(),
            kind: asset.kind,
            source_locator: asset.source_locator.clone(),
            looped: clip.kind == ClipKind::Image,
        });

        if wants_video {
            self.fold_visual(clip, index);
        }
        if wants_audio {
            self.add_audio_chain(clip, index);
        }
    }

    fn fold_visual(&mut self, clip: &Clip, index: usize) {
        let source = GraphInput::video_label(index);
        let start = clip.timeline_start;
        let end = clip.timeline_end();

        let mut stream = if clip.kind == ClipKind::Image {
            let looped = self.chain(source, Operation::LoopStill);
            self.chain(
                looped,
                Operation::Trim {
                    start_secs: 0.0,
                    end_secs: clip.duration,
                },
            )
        } else {
            self.chain(
                source,
                Operation::Trim {
                    start_secs: clip.in_point,
                    end_secs: clip.in_point + clip.duration,
                },
            )
        };
        stream = self.chain(stream, Operation::ResetTimestamps);
        stream = self.chain(stream, Operation::ShiftTimestamps { offset_secs: start });
        stream = self.chain(stream, Operation::AlphaFormat);

        let transform = clip.transform;
        if transform.scale != 1.0 {
            stream = self.chain(
                stream,
                Operation::Scale {
                    factor: transform.scale,
                },
            );
        }
        if transform.rotation_degrees != 0.0 {
            stream = self.chain(
                stream,
                Operation::Rotate {
                    degrees: transform.rotation_degrees,
                },
            );
        }
        if transform.opacity < 1.0 {
            stream = self.chain(
                stream,
                Operation::Opacity {
                    factor: transform.opacity,
                },
            );
        }

        if clip.transition.kind == TransitionKind::Fade {
            let fade_in = clip.transition.in_duration_secs.min(clip.duration);
            if fade_in > 0.0 {
                stream = self.chain(
                    stream,
                    Operation::Fade {
                        direction: FadeDirection::In,
                        start_secs: start,
                        duration_secs: fade_in,
                    },
                );
            }
            let fade_out = clip.transition.out_duration_secs.min(clip.duration);
            if fade_out > 0.0 {
                stream = self.chain(
                    stream,
                    Operation::Fade {
                        direction: FadeDirection::Out,
                        start_secs: end - fade_out,
                        duration_secs: fade_out,
                    },
                );
            }
        }

        let (x, y) = self.position(clip);
        let base = self.current_video.clone();
        self.fold(
            vec![base, stream],
            Operation::Overlay {
                x,
                y,
                enable_start: start,
                enable_end: end,
            },
        );
    }

    fn fold_text(&mut self, clip: &Clip) {
        let Some(text) = &clip.text_data else {
            warn!(clip_id = %clip.id, "Skipping text clip without text data");
            return;
        };
        let (x, y) = self.position(clip);
        let base = self.current_video.clone();
        self.fold(
            vec![base],
            Operation::DrawText(DrawText {
                content: text.content.clone(),
                x,
                y,
                align: text.align,
                font_size_px: text.font_size_px,
                font_family: text.font_family.clone(),
                color: text.color.clone(),
                background_color: text.has_background().then(|| text.background_color.clone()),
                enable_start: clip.timeline_start,
                enable_end: clip.timeline_end(),
            }),
        );
    }

    /// Replace the running video stream with the output of `op`.
    fn fold(&mut self, inputs: Vec<String>, op: Operation) {
        self.folds += 1;
        let output = format!("v{}", self.folds);
        self.current_video = self.push(inputs, op, output);
    }

    fn add_audio_chain(&mut self, clip: &Clip, index: usize) {
        let source = GraphInput::audio_label(index);
        let mut stream = self.chain(
            source,
            Operation::AudioTrim {
                start_secs: clip.in_point,
                end_secs: clip.in_point + clip.duration,
            },
        );
        stream = self.chain(stream, Operation::AudioResetTimestamps);
        stream = self.chain(stream, Operation::Volume { gain: clip.volume });
        stream = self.chain(
            stream,
            Operation::AudioDelay {
                delay_secs: clip.timeline_start,
            },
        );
        self.audio_chains.push(stream);
    }

    fn position(&self, clip: &Clip) -> (f64, f64) {
        let canvas = &self.state.canvas_size;
        clip.transform.pixel_position(canvas.width, canvas.height)
    }

    fn finish(mut self, duration_secs: f64) -> CompositionGraph {
        let audio_output = if self.audio_chains.is_empty() {
            None
        } else {
            let inputs = std::mem::take(&mut self.audio_chains);
            Some(self.push(
                inputs,
                Operation::AudioMix {
                    duration: MixDuration::Longest,
                },
                MIX_LABEL.to_string(),
            ))
        };

        CompositionGraph {
            canvas_width: self.state.canvas_size.width,
            canvas_height: self.state.canvas_size.height,
            duration_secs,
            inputs: self.inputs,
            nodes: self.nodes,
            video_output: self.current_video,
            audio_output,
        }
    }
}

/// Whether a clip contributes an audio chain.
fn audible(clip: &Clip, asset: &MediaAsset, track: &Track) -> bool {
    if track.is_muted || !asset.has_audio {
        return false;
    }
    match clip.kind {
        ClipKind::Audio => true,
        ClipKind::Video => clip.volume != 0.0,
        ClipKind::Image | ClipKind::Text => false,
    }
}
