//! Placement resolution: free-slot search and interactive move/trim.
//!
//! Everything here is a pure function of its inputs. The UI calls these on
//! every pointer move to preview a proposal; only the final proposal is
//! committed to the store through [`Command::UpdateClip`].
//!
//! [`Command::UpdateClip`]: crate::command::Command::UpdateClip

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::ClipPatch;
use crate::model::{Clip, Track, TrackId, MIN_CLIP_DURATION_SECS};
use crate::state::TimelineState;

/// Intervals closer than this are considered touching, not overlapping.
pub const OVERLAP_EPSILON_SECS: f64 = 1e-9;

/// Whether half-open intervals `[a_start, a_end)` and `[b_start, b_end)` intersect.
pub fn intervals_overlap(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> bool {
    a_start < b_end - OVERLAP_EPSILON_SECS && b_start < a_end - OVERLAP_EPSILON_SECS
}

/// Earliest start `>= preferred_start` where a clip of `duration` fits
/// without intersecting any of `intervals`.
///
/// `intervals` must be non-overlapping. They are sorted here, then scanned
/// once left to right: each collision pushes the candidate to the end of the
/// colliding interval and the scan continues with the next interval.
pub fn find_slot_in_intervals(intervals: &[(f64, f64)], duration: f64, preferred_start: f64) -> f64 {
    let mut sorted = intervals.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut start = preferred_start.max(0.0);
    for (clip_start, clip_end) in sorted {
        if intervals_overlap(start, start + duration, clip_start, clip_end) {
            start = clip_end;
        }
    }
    start
}

/// [`find_slot_in_intervals`] over the timeline windows of `clips`.
pub fn find_slot<'a>(
    clips: impl IntoIterator<Item = &'a Clip>,
    duration: f64,
    preferred_start: f64,
) -> f64 {
    let intervals: Vec<(f64, f64)> = clips
        .into_iter()
        .map(|clip| (clip.timeline_start, clip.timeline_end()))
        .collect();
    find_slot_in_intervals(&intervals, duration, preferred_start)
}

/// Which part of a clip the pointer is dragging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    Move,
    TrimStart,
    TrimEnd,
}

/// The per-frame input from an interactive drag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EditGesture {
    pub mode: EditMode,
    /// Pointer displacement since the drag started, in seconds.
    pub delta_secs: f64,
    /// Track under the pointer for moves; `None` keeps the current track.
    #[serde(default)]
    pub target_track: Option<TrackId>,
}

impl EditGesture {
    pub fn moved(delta_secs: f64, target_track: Option<TrackId>) -> Self {
        Self {
            mode: EditMode::Move,
            delta_secs,
            target_track,
        }
    }

    pub fn trim_start(delta_secs: f64) -> Self {
        Self {
            mode: EditMode::TrimStart,
            delta_secs,
            target_track: None,
        }
    }

    pub fn trim_end(delta_secs: f64) -> Self {
        Self {
            mode: EditMode::TrimEnd,
            delta_secs,
            target_track: None,
        }
    }
}

/// Map a pointer row (0 = top lane) to a track id, clamping to the valid rows.
pub fn track_for_row(tracks: &[Track], row: i64) -> Option<TrackId> {
    if tracks.is_empty() {
        return None;
    }
    let max_row = tracks.len() as i64 - 1;
    let index = row.clamp(0, max_row) as usize;
    Some(tracks[index].id)
}

/// Resolve a drag gesture on `clip_id` into a changeset.
///
/// Returns `None` when the clip does not exist, the gesture is not finite,
/// or no valid placement exists for it.
pub fn resolve_edit(state: &TimelineState, clip_id: &str, gesture: EditGesture) -> Option<ClipPatch> {
    let clip = state.clip(clip_id)?;
    if !gesture.delta_secs.is_finite() {
        return None;
    }

    match gesture.mode {
        EditMode::Move => resolve_move(state, clip, gesture.delta_secs, gesture.target_track),
        EditMode::TrimStart => Some(resolve_trim_start(state, clip, gesture.delta_secs)),
        EditMode::TrimEnd => Some(resolve_trim_end(state, clip, gesture.delta_secs)),
    }
}

/// Move `clip` by `delta_secs`, optionally onto `target_track`.
///
/// Each neighbour the proposal overlaps clamps it from the side the clip
/// started on: a clip that began before the neighbour stops at the
/// neighbour's start, one that began after it stops at the neighbour's end.
/// A dragged clip therefore never jumps over a neighbour. If the clamped
/// position still collides (the gap is too small) the move is rejected.
pub fn resolve_move(
    state: &TimelineState,
    clip: &Clip,
    delta_secs: f64,
    target_track: Option<TrackId>,
) -> Option<ClipPatch> {
    let track_id = match target_track {
        Some(id) if state.track(id).is_some() => id,
        Some(_) => return None,
        None => clip.track_id,
    };

    let original_start = clip.timeline_start;
    let duration = clip.duration;
    let mut start = (original_start + delta_secs).max(0.0);

    let neighbours: Vec<&Clip> = state
        .clips_on_track(track_id)
        .into_iter()
        .filter(|other| other.id != clip.id)
        .collect();

    for neighbour in &neighbours {
        if !intervals_overlap(
            start,
            start + duration,
            neighbour.timeline_start,
            neighbour.timeline_end(),
        ) {
            continue;
        }
        if original_start < neighbour.timeline_start {
            start = start.min(neighbour.timeline_start - duration);
        } else {
            start = start.max(neighbour.timeline_end());
        }
    }

    let collides = start < 0.0
        || neighbours.iter().any(|neighbour| {
            intervals_overlap(
                start,
                start + duration,
                neighbour.timeline_start,
                neighbour.timeline_end(),
            )
        });
    if collides {
        debug!(clip_id = %clip.id, track_id, start, "move rejected: no room");
        return None;
    }

    let mut patch = ClipPatch {
        timeline_start: Some(start),
        ..ClipPatch::default()
    };
    if track_id != clip.track_id {
        patch.track_id = Some(track_id);
        // A clip still at its track's default stacking follows the new track.
        if clip.z_index == clip.track_id as i32 {
            patch.z_index = Some(track_id as i32);
        }
    }
    Some(patch)
}

/// Drag the left edge of `clip` by `delta_secs`.
///
/// `in_point`, `duration` and `timeline_start` move in lockstep so the
/// source frame under the right edge stays put. The result keeps
/// `in_point >= 0`, `duration >= MIN_CLIP_DURATION_SECS`, `timeline_start >= 0`
/// and never crosses the end of the preceding clip on the track.
pub fn resolve_trim_start(state: &TimelineState, clip: &Clip, delta_secs: f64) -> ClipPatch {
    let previous_end = state
        .clips_on_track(clip.track_id)
        .into_iter()
        .filter(|other| other.id != clip.id && other.timeline_start < clip.timeline_start)
        .map(Clip::timeline_end)
        .fold(0.0, f64::max)
        .min(clip.timeline_start);

    let lower = (-clip.in_point)
        .max(-clip.timeline_start)
        .max(previous_end - clip.timeline_start);
    let upper = (clip.duration - MIN_CLIP_DURATION_SECS).max(0.0);
    let delta = delta_secs.max(lower).min(upper);

    ClipPatch {
        timeline_start: Some(clip.timeline_start + delta),
        in_point: Some((clip.in_point + delta).max(0.0)),
        duration: Some((clip.duration - delta).max(MIN_CLIP_DURATION_SECS)),
        ..ClipPatch::default()
    }
}

/// Drag the right edge of `clip` by `delta_secs`.
///
/// The duration is capped by the remaining source (`asset duration -
/// in_point`) for video and audio, by the start of the following clip on
/// the track, and floored at `MIN_CLIP_DURATION_SECS`. Images and text have
/// no source ceiling.
pub fn resolve_trim_end(state: &TimelineState, clip: &Clip, delta_secs: f64) -> ClipPatch {
    let source_ceiling = if clip.kind.is_source_bounded() {
        state
            .clip_asset(clip)
            .filter(|asset| asset.duration_secs > 0.0)
            .map(|asset| asset.duration_secs - clip.in_point)
            .unwrap_or(f64::INFINITY)
    } else {
        f64::INFINITY
    };

    let next_start = state
        .clips_on_track(clip.track_id)
        .into_iter()
        .filter(|other| other.id != clip.id && other.timeline_start > clip.timeline_start)
        .map(|other| other.timeline_start)
        .fold(f64::INFINITY, f64::min)
        .max(clip.timeline_end());
    let neighbour_ceiling = next_start - clip.timeline_start;

    let duration = (clip.duration + delta_secs)
        .min(source_ceiling)
        .min(neighbour_ceiling)
        .max(MIN_CLIP_DURATION_SECS);

    ClipPatch {
        duration: Some(duration),
        ..ClipPatch::default()
    }
}
