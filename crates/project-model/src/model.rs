//! Timeline entities: assets, tracks, clips and their embedded values.

use serde::{Deserialize, Serialize};

/// Opaque identifier for media assets.
pub type AssetId = String;
/// Opaque identifier for clips.
pub type ClipId = String;
/// Track identifier. Also the default stacking order of clips on the track.
pub type TrackId = u32;

/// Shortest clip any edit may produce, in seconds.
pub const MIN_CLIP_DURATION_SECS: f64 = 0.1;

/// Media kind of an ingested asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

/// An ingested media source. Clips reference it by id, never own it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: AssetId,

    /// URL or local path of the source bytes.
    pub source_locator: String,

    pub kind: AssetKind,

    /// Native length in seconds. Zero for still images.
    pub duration_secs: f64,

    pub display_name: String,

    /// Whether the source carries an audio stream.
    #[serde(default = "default_true")]
    pub has_audio: bool,
}

impl MediaAsset {
    pub fn new(
        id: impl Into<AssetId>,
        source_locator: impl Into<String>,
        kind: AssetKind,
        duration_secs: f64,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_locator: source_locator.into(),
            kind,
            duration_secs: non_negative(duration_secs),
            display_name: display_name.into(),
            has_audio: kind != AssetKind::Image,
        }
    }
}

/// Lane category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Overlay,
}

/// A horizontal lane of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub name: String,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl Track {
    pub fn new(id: TrackId, kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            is_muted: false,
            is_hidden: false,
        }
    }

    /// Track set created for a fresh project. Overlay sits above the video
    /// lanes so its clips stack on top by default.
    pub fn default_layout() -> Vec<Track> {
        vec![
            Track::new(1, TrackKind::Video, "Video 1"),
            Track::new(2, TrackKind::Video, "Video 2"),
            Track::new(3, TrackKind::Overlay, "Overlay"),
            Track::new(4, TrackKind::Audio, "Audio 1"),
            Track::new(5, TrackKind::Audio, "Audio 2"),
        ]
    }
}

/// Per-clip 2D placement applied before compositing.
///
/// `x`/`y` are percentages of the canvas (origin top-left), so a clip keeps
/// its relative position when the canvas is resized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation_degrees: f64,
    pub opacity: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation_degrees: 0.0,
            opacity: 1.0,
        }
    }
}

impl Transform {
    /// Clamp fields into their valid ranges.
    pub fn sanitized(self) -> Self {
        Self {
            x: finite_or(self.x, 0.0).clamp(0.0, 100.0),
            y: finite_or(self.y, 0.0).clamp(0.0, 100.0),
            scale: if self.scale.is_finite() && self.scale > 0.0 {
                self.scale
            } else {
                1.0
            },
            rotation_degrees: finite_or(self.rotation_degrees, 0.0),
            opacity: finite_or(self.opacity, 1.0).clamp(0.0, 1.0),
        }
    }

    /// Pixel position of the top-left anchor on a canvas of the given size.
    pub fn pixel_position(&self, canvas_width: u32, canvas_height: u32) -> (f64, f64) {
        (
            self.x / 100.0 * canvas_width as f64,
            self.y / 100.0 * canvas_height as f64,
        )
    }
}

/// Horizontal anchoring of burned-in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Payload of a text clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub content: String,
    pub font_size_px: f64,
    pub font_family: String,
    /// Hex color, e.g. `#ffffff`.
    pub color: String,
    /// Hex color or `transparent`.
    pub background_color: String,
    #[serde(default)]
    pub align: TextAlign,
}

impl TextData {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn has_background(&self) -> bool {
        !self.background_color.eq_ignore_ascii_case("transparent")
    }
}

impl Default for TextData {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_size_px: 48.0,
            font_family: "sans-serif".to_string(),
            color: "#ffffff".to_string(),
            background_color: "transparent".to_string(),
            align: TextAlign::Center,
        }
    }
}

/// Transition style. Only `Fade` renders; the others are kept so projects
/// round-trip but compile to a hard cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    #[default]
    Fade,
    Wipe,
    Slide,
}

/// In/out transition carried by every clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Transition {
    pub in_duration_secs: f64,
    pub out_duration_secs: f64,
    #[serde(default)]
    pub kind: TransitionKind,
}

impl Transition {
    pub fn fade(in_duration_secs: f64, out_duration_secs: f64) -> Self {
        Self {
            in_duration_secs,
            out_duration_secs,
            kind: TransitionKind::Fade,
        }
    }

    pub fn sanitized(self) -> Self {
        Self {
            in_duration_secs: non_negative(self.in_duration_secs),
            out_duration_secs: non_negative(self.out_duration_secs),
            kind: self.kind,
        }
    }
}

/// What a clip places on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Video,
    Audio,
    Image,
    Text,
}

impl ClipKind {
    /// Clip kind matching an asset kind.
    pub fn for_asset(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Video => ClipKind::Video,
            AssetKind::Audio => ClipKind::Audio,
            AssetKind::Image => ClipKind::Image,
        }
    }

    /// Whether the source has a native length bounding `in_point + duration`.
    /// Images loop forever and text has no source at all.
    pub fn is_source_bounded(self) -> bool {
        matches!(self, ClipKind::Video | ClipKind::Audio)
    }
}

/// One placed instance of media or text on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,

    /// Absent for text clips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<AssetId>,

    pub track_id: TrackId,
    pub kind: ClipKind,

    /// Absolute start on the timeline.
    pub timeline_start: f64,

    /// Offset into the source.
    pub in_point: f64,

    pub duration: f64,

    #[serde(default)]
    pub transform: Transform,

    /// Stacking order across all tracks; higher draws later.
    pub z_index: i32,

    #[serde(default)]
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_data: Option<TextData>,

    #[serde(default)]
    pub transition: Transition,

    /// Linear gain in `[0, 1]`.
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Clip {
    /// A clip with default transform, transition and volume, stacked at its
    /// track's default z order.
    pub fn new(
        id: impl Into<ClipId>,
        kind: ClipKind,
        track_id: TrackId,
        timeline_start: f64,
        duration: f64,
    ) -> Self {
        Self {
            id: id.into(),
            asset_id: None,
            track_id,
            kind,
            timeline_start,
            in_point: 0.0,
            duration,
            transform: Transform::default(),
            z_index: track_id as i32,
            label: String::new(),
            text_data: None,
            transition: Transition::default(),
            volume: 1.0,
        }
    }

    pub fn with_asset(mut self, asset_id: impl Into<AssetId>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_text(mut self, text: TextData) -> Self {
        self.text_data = Some(text);
        self
    }

    /// Exclusive end of the clip on the timeline.
    pub fn timeline_end(&self) -> f64 {
        self.timeline_start + self.duration
    }

    /// Whether the clip is visible/audible at timeline time `t`.
    pub fn is_active_at(&self, t: f64) -> bool {
        self.timeline_start <= t && t < self.timeline_end()
    }

    /// Clamp fields into valid ranges. Source bounds need the asset, so the
    /// store applies them when a clip is added or updated.
    pub fn sanitized(mut self) -> Self {
        self.timeline_start = non_negative(self.timeline_start);
        self.in_point = non_negative(self.in_point);
        self.duration = if self.duration.is_finite() {
            self.duration.max(MIN_CLIP_DURATION_SECS)
        } else {
            MIN_CLIP_DURATION_SECS
        };
        self.transform = self.transform.sanitized();
        self.transition = self.transition.sanitized();
        self.volume = finite_or(self.volume, 1.0).clamp(0.0, 1.0);
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f64 {
    1.0
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

pub(crate) fn non_negative(value: f64) -> f64 {
    finite_or(value, 0.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_defaults_stack_at_track() {
        let clip = Clip::new("c1", ClipKind::Video, 3, 2.0, 4.0);
        assert_eq!(clip.z_index, 3);
        assert_eq!(clip.volume, 1.0);
        assert_eq!(clip.timeline_end(), 6.0);
        assert!(clip.is_active_at(2.0));
        assert!(!clip.is_active_at(6.0));
    }

    #[test]
    fn test_sanitize_clamps_ranges() {
        let mut clip = Clip::new("c1", ClipKind::Video, 1, -3.0, 0.0);
        clip.in_point = -1.0;
        clip.volume = 2.5;
        clip.transform.opacity = 1.7;
        clip.transform.x = 140.0;
        clip.transform.scale = -2.0;

        let clip = clip.sanitized();
        assert_eq!(clip.timeline_start, 0.0);
        assert_eq!(clip.in_point, 0.0);
        assert_eq!(clip.duration, MIN_CLIP_DURATION_SECS);
        assert_eq!(clip.volume, 1.0);
        assert_eq!(clip.transform.opacity, 1.0);
        assert_eq!(clip.transform.x, 100.0);
        assert_eq!(clip.transform.scale, 1.0);
    }

    #[test]
    fn test_pixel_position_uses_percentages() {
        let transform = Transform {
            x: 50.0,
            y: 25.0,
            ..Transform::default()
        };
        assert_eq!(transform.pixel_position(1920, 1080), (960.0, 270.0));
    }

    #[test]
    fn test_image_assets_have_no_audio() {
        let image = MediaAsset::new("a1", "/tmp/a.png", AssetKind::Image, 0.0, "a.png");
        let video = MediaAsset::new("a2", "/tmp/a.mp4", AssetKind::Video, 12.0, "a.mp4");
        assert!(!image.has_audio);
        assert!(video.has_audio);
    }

    #[test]
    fn test_clip_deserialization_defaults_optional_fields() {
        let json = r#"{
            "id": "t1",
            "track_id": 3,
            "kind": "text",
            "timeline_start": 1.0,
            "in_point": 0.0,
            "duration": 2.0,
            "z_index": 3
        }"#;
        let clip: Clip = serde_json::from_str(json).unwrap();
        assert!(clip.asset_id.is_none());
        assert_eq!(clip.volume, 1.0);
        assert_eq!(clip.transition, Transition::default());
        assert_eq!(clip.transform, Transform::default());
    }

    #[test]
    fn test_text_background_detection() {
        let mut text = TextData::new("hello");
        assert!(!text.has_background());
        text.background_color = "#000000".to_string();
        assert!(text.has_background());
    }
}
