//! The timeline snapshot shared by every layer.

use serde::{Deserialize, Serialize};
use splice_common::config::TimelineDefaults;

use crate::model::{AssetId, Clip, ClipId, MediaAsset, Track, TrackId};

/// Trailing room kept past the last clip end, in seconds.
pub const TRAILING_MARGIN_SECS: f64 = 5.0;

/// Zoom bounds in pixels per second.
pub const MIN_PIXELS_PER_SECOND: f64 = 10.0;
pub const MAX_PIXELS_PER_SECOND: f64 = 200.0;

/// Output canvas dimensions in pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
    pub label: String,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32, label: impl Into<String>) -> Self {
        Self {
            width,
            height,
            label: label.into(),
        }
    }

    /// Encoders reject odd or zero dimensions; round down to even, minimum 2.
    pub fn sanitized(self) -> Self {
        Self {
            width: (self.width & !1).max(2),
            height: (self.height & !1).max(2),
            label: self.label,
        }
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self::new(1920, 1080, "1080p")
    }
}

/// Complete editor state. The store is its only mutator; everything else
/// reads an owned snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    pub assets: Vec<MediaAsset>,
    pub tracks: Vec<Track>,

    /// Clips in insertion order. Fold order ties are broken by this order.
    pub clips: Vec<Clip>,

    /// Lower bound of the timeline length, auto-extended by edits.
    pub total_duration: f64,

    #[serde(default)]
    pub playhead_time: f64,

    #[serde(default)]
    pub is_playing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_clip_id: Option<ClipId>,

    pub pixels_per_second: f64,

    pub canvas_size: CanvasSize,
}

impl Default for TimelineState {
    fn default() -> Self {
        Self::from_defaults(&TimelineDefaults::default())
    }
}

impl TimelineState {
    /// Empty timeline with the default track layout.
    pub fn from_defaults(defaults: &TimelineDefaults) -> Self {
        Self {
            assets: vec![],
            tracks: Track::default_layout(),
            clips: vec![],
            total_duration: defaults.total_duration_secs.max(0.0),
            playhead_time: 0.0,
            is_playing: false,
            selected_clip_id: None,
            pixels_per_second: defaults
                .pixels_per_second
                .clamp(MIN_PIXELS_PER_SECOND, MAX_PIXELS_PER_SECOND),
            canvas_size: CanvasSize::new(
                defaults.canvas_width,
                defaults.canvas_height,
                defaults.canvas_label.clone(),
            )
            .sanitized(),
        }
    }

    pub fn asset(&self, id: &str) -> Option<&MediaAsset> {
        self.assets.iter().find(|asset| asset.id == id)
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn clip(&self, id: &str) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.id == id)
    }

    pub(crate) fn clip_mut(&mut self, id: &str) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|clip| clip.id == id)
    }

    /// The asset a clip references, if it resolves.
    pub fn clip_asset(&self, clip: &Clip) -> Option<&MediaAsset> {
        clip.asset_id.as_deref().and_then(|id| self.asset(id))
    }

    /// Clips on a track, sorted by timeline start.
    pub fn clips_on_track(&self, track_id: TrackId) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self
            .clips
            .iter()
            .filter(|clip| clip.track_id == track_id)
            .collect();
        clips.sort_by(|a, b| a.timeline_start.total_cmp(&b.timeline_start));
        clips
    }

    /// Latest clip end on the timeline, 0 when empty.
    pub fn max_clip_end(&self) -> f64 {
        self.clips
            .iter()
            .map(Clip::timeline_end)
            .fold(0.0, f64::max)
    }

    /// Clips in compositing order: ascending `z_index`, ties in insertion order.
    pub fn fold_order(&self) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self.clips.iter().collect();
        // `sort_by_key` is stable, which keeps insertion order among equal z.
        clips.sort_by_key(|clip| clip.z_index);
        clips
    }

    /// Clips visible or audible at `t` on non-hidden tracks, in fold order.
    pub fn active_clips_at(&self, t: f64) -> Vec<&Clip> {
        self.fold_order()
            .into_iter()
            .filter(|clip| clip.is_active_at(t))
            .filter(|clip| self.track(clip.track_id).is_some_and(|track| !track.is_hidden))
            .collect()
    }

    /// Asset ids referenced by at least one clip, first-use order, deduplicated.
    pub fn referenced_asset_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = Vec::new();
        for clip in &self.clips {
            if let Some(id) = &clip.asset_id {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Grow `total_duration` so it covers every clip plus the trailing margin.
    pub(crate) fn extend_duration_to_fit(&mut self) {
        let needed = self.max_clip_end() + TRAILING_MARGIN_SECS;
        if needed > self.total_duration {
            self.total_duration = needed;
        }
    }
}
