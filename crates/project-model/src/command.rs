//! Edit commands accepted by the timeline store.
//!
//! Every user action is expressed as a [`Command`]. Commands carry every id
//! they need, so applying one never has to mint identifiers.

use serde::{Deserialize, Serialize};

use crate::model::{
    AssetId, Clip, ClipId, ClipKind, MediaAsset, TextData, TrackId, Transform, Transition,
};
use crate::state::CanvasSize;

/// A single timeline edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Register an ingested asset.
    AddAsset { asset: MediaAsset },

    /// Insert a fully specified clip at its requested start. If that start
    /// collides with a clip on the same track, the clip is pushed to the
    /// next free slot.
    AddClip { clip: Clip },

    /// Insert a clip at the first free slot at or after a preferred start.
    AddClipAuto(AutoClip),

    /// Apply a partial update to an existing clip.
    UpdateClip { id: ClipId, patch: ClipPatch },

    RemoveClip { id: ClipId },

    /// Move the playhead. Negative times clamp to 0.
    SetPlayhead { time: f64 },

    TogglePlayback,

    /// Advance the playhead by one preview frame while playing.
    AdvancePlayback { delta_secs: f64 },

    SelectClip { id: Option<ClipId> },

    /// Set the zoom, clamped to `[10, 200]` pixels per second.
    SetZoom { pixels_per_second: f64 },

    UpdateTrack { id: TrackId, patch: TrackPatch },

    SetCanvasSize { canvas: CanvasSize },
}

impl Command {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddAsset { .. } => "add_asset",
            Command::AddClip { .. } => "add_clip",
            Command::AddClipAuto(_) => "add_clip_auto",
            Command::UpdateClip { .. } => "update_clip",
            Command::RemoveClip { .. } => "remove_clip",
            Command::SetPlayhead { .. } => "set_playhead",
            Command::TogglePlayback => "toggle_playback",
            Command::AdvancePlayback { .. } => "advance_playback",
            Command::SelectClip { .. } => "select_clip",
            Command::SetZoom { .. } => "set_zoom",
            Command::UpdateTrack { .. } => "update_track",
            Command::SetCanvasSize { .. } => "set_canvas_size",
        }
    }
}

/// Parameters of an auto-placed clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoClip {
    pub id: ClipId,
    pub track_id: TrackId,
    pub kind: ClipKind,
    pub duration: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<AssetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_data: Option<TextData>,
    /// Earliest acceptable start. Defaults to the playhead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_start: Option<f64>,
}

/// Partial clip update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_point: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_data: Option<TextData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl ClipPatch {
    pub fn is_empty(&self) -> bool {
        *self == ClipPatch::default()
    }

    /// Copy every present field onto `clip`.
    pub fn apply_to(&self, clip: &mut Clip) {
        if let Some(track_id) = self.track_id {
            clip.track_id = track_id;
        }
        if let Some(start) = self.timeline_start {
            clip.timeline_start = start;
        }
        if let Some(in_point) = self.in_point {
            clip.in_point = in_point;
        }
        if let Some(duration) = self.duration {
            clip.duration = duration;
        }
        if let Some(transform) = self.transform {
            clip.transform = transform;
        }
        if let Some(z_index) = self.z_index {
            clip.z_index = z_index;
        }
        if let Some(label) = &self.label {
            clip.label = label.clone();
        }
        if let Some(text_data) = &self.text_data {
            clip.text_data = Some(text_data.clone());
        }
        if let Some(transition) = self.transition {
            clip.transition = transition;
        }
        if let Some(volume) = self.volume {
            clip.volume = volume;
        }
    }
}

/// Partial track update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
}
