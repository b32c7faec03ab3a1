//! The timeline store: a pure transition function plus an owning wrapper.
//!
//! [`apply`] is total: commands that target unknown clips, tracks or
//! duplicate ids leave the state unchanged. The state after N commands is a
//! function of the initial state and the command sequence only, see
//! [`replay`].

use splice_common::clock::clamp_frame_delta;
use splice_common::ids::{IdGenerator, IdKind, SequentialIds};
use tracing::{debug, warn};

use crate::command::{AutoClip, ClipPatch, Command, TrackPatch};
use crate::model::{
    AssetId, AssetKind, Clip, ClipId, ClipKind, MediaAsset, TextData, TrackId, non_negative,
    MIN_CLIP_DURATION_SECS,
};
use crate::placement::{find_slot, resolve_edit, EditGesture};
use crate::state::{CanvasSize, TimelineState, MAX_PIXELS_PER_SECOND, MIN_PIXELS_PER_SECOND};

/// Apply one command, returning the next state.
pub fn apply(mut state: TimelineState, command: Command) -> TimelineState {
    match command {
        Command::AddAsset { asset } => {
            if state.asset(&asset.id).is_some() {
                warn!(asset_id = %asset.id, "add_asset ignored: duplicate id");
            } else {
                state.assets.push(asset);
            }
        }
        Command::AddClip { clip } => add_clip(&mut state, clip),
        Command::AddClipAuto(request) => add_clip_auto(&mut state, request),
        Command::UpdateClip { id, patch } => update_clip(&mut state, &id, &patch),
        Command::RemoveClip { id } => {
            let before = state.clips.len();
            state.clips.retain(|clip| clip.id != id);
            if state.clips.len() != before && state.selected_clip_id.as_deref() == Some(&id) {
                state.selected_clip_id = None;
            }
        }
        Command::SetPlayhead { time } => state.playhead_time = non_negative(time),
        Command::TogglePlayback => state.is_playing = !state.is_playing,
        Command::AdvancePlayback { delta_secs } => advance_playback(&mut state, delta_secs),
        Command::SelectClip { id } => match id {
            Some(id) if state.clip(&id).is_none() => {
                debug!(clip_id = %id, "select ignored: unknown clip");
            }
            other => state.selected_clip_id = other,
        },
        Command::SetZoom { pixels_per_second } => {
            if pixels_per_second.is_finite() {
                state.pixels_per_second =
                    pixels_per_second.clamp(MIN_PIXELS_PER_SECOND, MAX_PIXELS_PER_SECOND);
            }
        }
        Command::UpdateTrack { id, patch } => update_track(&mut state, id, patch),
        Command::SetCanvasSize { canvas } => state.canvas_size = canvas.sanitized(),
    }
    state
}

/// Fold a command sequence over `initial`.
pub fn replay(initial: TimelineState, commands: impl IntoIterator<Item = Command>) -> TimelineState {
    commands.into_iter().fold(initial, apply)
}

fn add_clip(state: &mut TimelineState, clip: Clip) {
    if state.clip(&clip.id).is_some() {
        warn!(clip_id = %clip.id, "add_clip ignored: duplicate id");
        return;
    }
    if state.track(clip.track_id).is_none() {
        warn!(clip_id = %clip.id, track_id = clip.track_id, "add_clip ignored: unknown track");
        return;
    }

    let mut clip = bound_to_source(state, clip.sanitized());
    let requested = clip.timeline_start;
    clip.timeline_start = find_slot(
        state.clips_on_track(clip.track_id),
        clip.duration,
        requested,
    );
    if clip.timeline_start != requested {
        debug!(
            clip_id = %clip.id,
            requested,
            placed = clip.timeline_start,
            "explicit placement pushed past collision"
        );
    }

    state.clips.push(clip);
    state.extend_duration_to_fit();
}

fn add_clip_auto(state: &mut TimelineState, request: AutoClip) {
    if state.clip(&request.id).is_some() {
        warn!(clip_id = %request.id, "add_clip_auto ignored: duplicate id");
        return;
    }
    if state.track(request.track_id).is_none() {
        warn!(
            clip_id = %request.id,
            track_id = request.track_id,
            "add_clip_auto ignored: unknown track"
        );
        return;
    }

    let mut duration = request.duration;
    if request.kind.is_source_bounded() {
        if let Some(asset) = request.asset_id.as_deref().and_then(|id| state.asset(id)) {
            if asset.duration_secs > 0.0 {
                duration = duration.min(asset.duration_secs);
            }
        }
    }

    let mut clip = Clip::new(request.id, request.kind, request.track_id, 0.0, duration);
    clip.asset_id = request.asset_id;
    clip.label = request.label;
    clip.text_data = match (request.kind, request.text_data) {
        (ClipKind::Text, None) => Some(TextData::default()),
        (_, text) => text,
    };
    let clip = bound_to_source(state, clip.sanitized());

    let preferred = non_negative(request.preferred_start.unwrap_or(state.playhead_time));
    let start = find_slot(state.clips_on_track(clip.track_id), clip.duration, preferred);
    debug!(clip_id = %clip.id, preferred, start, "auto placement resolved");

    state.clips.push(Clip {
        timeline_start: start,
        ..clip
    });
    state.extend_duration_to_fit();
}

fn update_clip(state: &mut TimelineState, id: &str, patch: &ClipPatch) {
    let Some(current) = state.clip(id) else {
        debug!(clip_id = %id, "update ignored: unknown clip");
        return;
    };

    let mut updated = current.clone();
    patch.apply_to(&mut updated);
    if state.track(updated.track_id).is_none() {
        warn!(clip_id = %id, track_id = ?patch.track_id, "update kept track: unknown track");
        updated.track_id = current.track_id;
    }
    let mut updated = bound_to_source(state, updated.sanitized());

    let neighbours = state
        .clips_on_track(updated.track_id)
        .into_iter()
        .filter(|other| other.id != id);
    let start = find_slot(neighbours, updated.duration, updated.timeline_start);
    if start != updated.timeline_start {
        debug!(
            clip_id = %id,
            requested = updated.timeline_start,
            placed = start,
            "update pushed past collision"
        );
        updated.timeline_start = start;
    }

    if let Some(clip) = state.clip_mut(id) {
        *clip = updated;
    }
    state.extend_duration_to_fit();
}

/// Keep `in_point + duration` inside the source for video and audio clips
/// whose asset has a known length.
fn bound_to_source(state: &TimelineState, mut clip: Clip) -> Clip {
    if !clip.kind.is_source_bounded() {
        return clip;
    }
    let Some(total) = state
        .clip_asset(&clip)
        .map(|asset| asset.duration_secs)
        .filter(|secs| *secs > 0.0)
    else {
        return clip;
    };

    clip.in_point = clip.in_point.min((total - MIN_CLIP_DURATION_SECS).max(0.0));
    clip.duration = clip
        .duration
        .min(total - clip.in_point)
        .max(MIN_CLIP_DURATION_SECS.min(total));
    clip
}

fn update_track(state: &mut TimelineState, id: TrackId, patch: TrackPatch) {
    let Some(track) = state.tracks.iter_mut().find(|track| track.id == id) else {
        debug!(track_id = id, "update_track ignored: unknown track");
        return;
    };
    if let Some(name) = patch.name {
        track.name = name;
    }
    if let Some(is_muted) = patch.is_muted {
        track.is_muted = is_muted;
    }
    if let Some(is_hidden) = patch.is_hidden {
        track.is_hidden = is_hidden;
    }
}

fn advance_playback(state: &mut TimelineState, delta_secs: f64) {
    if !state.is_playing {
        return;
    }
    let next = state.playhead_time + clamp_frame_delta(delta_secs);
    state.playhead_time = if next >= state.total_duration {
        0.0
    } else {
        next
    };
}

/// A clip prepared for ordered batch insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedClip {
    pub track_id: TrackId,
    pub kind: ClipKind,
    pub duration: f64,
    pub label: String,
    pub asset_id: Option<AssetId>,
    pub text_data: Option<TextData>,
    pub preferred_start: Option<f64>,
}

impl PreparedClip {
    /// Request placing `asset` on `track_id`, spanning the whole source.
    pub fn for_asset(asset: &MediaAsset, track_id: TrackId, duration: f64) -> Self {
        Self {
            track_id,
            kind: ClipKind::for_asset(asset.kind),
            duration,
            label: asset.display_name.clone(),
            asset_id: Some(asset.id.clone()),
            text_data: None,
            preferred_start: None,
        }
    }

    pub fn text(track_id: TrackId, duration: f64, text: TextData) -> Self {
        Self {
            track_id,
            kind: ClipKind::Text,
            duration,
            label: text.content.clone(),
            asset_id: None,
            text_data: Some(text),
            preferred_start: None,
        }
    }

    pub fn starting_at(mut self, preferred_start: f64) -> Self {
        self.preferred_start = Some(preferred_start);
        self
    }
}

/// Owns the current state, the id strategy and the applied command log.
pub struct Store {
    state: TimelineState,
    ids: Box<dyn IdGenerator>,
    history: Vec<Command>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl Store {
    /// Wrap `state`. Ids already present in it are reported to `ids` so
    /// they are never minted again.
    pub fn new(state: TimelineState, mut ids: Box<dyn IdGenerator>) -> Self {
        for asset in &state.assets {
            ids.observe(&asset.id);
        }
        for clip in &state.clips {
            ids.observe(&clip.id);
        }
        Self {
            state,
            ids,
            history: vec![],
        }
    }

    /// Store with deterministic `kind-N` ids.
    pub fn with_sequential_ids(state: TimelineState) -> Self {
        Self::new(state, Box::new(SequentialIds::new()))
    }

    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    /// Owned copy of the current state, unaffected by later edits.
    pub fn snapshot(&self) -> TimelineState {
        self.state.clone()
    }

    /// Commands applied so far, in order.
    pub fn history(&self) -> &[Command] {
        &self.history
    }

    pub fn dispatch(&mut self, command: Command) {
        debug!(command = command.name(), "dispatch");
        self.history.push(command.clone());
        let state = std::mem::take(&mut self.state);
        self.state = apply(state, command);
    }

    /// Next id of `kind` not used by any asset or clip in the state.
    fn fresh_id(&mut self, kind: IdKind) -> String {
        loop {
            let id = self.ids.next_id(kind);
            if self.state.asset(&id).is_none() && self.state.clip(&id).is_none() {
                return id;
            }
            self.ids.observe(&id);
        }
    }

    /// Dispatch a clip insertion and report the id only if a clip was added.
    fn dispatch_clip(&mut self, id: ClipId, command: Command) -> Option<ClipId> {
        let before = self.state.clips.len();
        self.dispatch(command);
        (self.state.clips.len() > before).then_some(id)
    }

    /// Register a new asset and return its id.
    pub fn ingest_asset(
        &mut self,
        source_locator: impl Into<String>,
        kind: AssetKind,
        duration_secs: f64,
        display_name: impl Into<String>,
    ) -> AssetId {
        let id = self.fresh_id(IdKind::Asset);
        let asset = MediaAsset::new(id.clone(), source_locator, kind, duration_secs, display_name);
        self.dispatch(Command::AddAsset { asset });
        id
    }

    /// Place an existing asset on a track at `start`, spanning the full
    /// source (a default length for images).
    pub fn place_asset(&mut self, asset_id: &str, track_id: TrackId, start: f64) -> Option<ClipId> {
        let asset = self.state.asset(asset_id)?.clone();
        let id = self.fresh_id(IdKind::Clip);
        let clip = Clip::new(
            id.clone(),
            ClipKind::for_asset(asset.kind),
            track_id,
            start,
            default_clip_duration(&asset),
        )
        .with_asset(asset.id.clone())
        .with_label(asset.display_name.clone());
        self.dispatch_clip(id, Command::AddClip { clip })
    }

    /// Insert a clip at the first free slot at or after its preferred start
    /// (the playhead when unset).
    pub fn insert_clip_auto(&mut self, request: PreparedClip) -> Option<ClipId> {
        let id = self.fresh_id(IdKind::Clip);
        let command = Command::AddClipAuto(AutoClip {
            id: id.clone(),
            track_id: request.track_id,
            kind: request.kind,
            duration: request.duration,
            label: request.label,
            asset_id: request.asset_id,
            text_data: request.text_data,
            preferred_start: request.preferred_start,
        });
        self.dispatch_clip(id, command)
    }

    /// Insert a text clip with automatic placement.
    pub fn insert_text(&mut self, track_id: TrackId, duration: f64, text: TextData) -> Option<ClipId> {
        self.insert_clip_auto(PreparedClip::text(track_id, duration, text))
    }

    /// Insert an ordered batch one by one. Later entries see earlier ones,
    /// so a playlist lands back to back in batch order.
    pub fn insert_batch(&mut self, requests: Vec<PreparedClip>) -> Vec<Option<ClipId>> {
        requests
            .into_iter()
            .map(|request| self.insert_clip_auto(request))
            .collect()
    }

    /// Preview the changeset a drag gesture would produce.
    pub fn propose_edit(&self, clip_id: &str, gesture: EditGesture) -> Option<ClipPatch> {
        resolve_edit(&self.state, clip_id, gesture)
    }

    /// Resolve a gesture and apply the result. Returns whether anything was applied.
    pub fn commit_edit(&mut self, clip_id: &str, gesture: EditGesture) -> bool {
        let Some(patch) = self.propose_edit(clip_id, gesture) else {
            return false;
        };
        self.dispatch(Command::UpdateClip {
            id: clip_id.to_string(),
            patch,
        });
        true
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32, label: impl Into<String>) {
        self.dispatch(Command::SetCanvasSize {
            canvas: CanvasSize::new(width, height, label),
        });
    }
}

/// Length used when placing an asset without an explicit duration.
pub const DEFAULT_STILL_DURATION_SECS: f64 = 5.0;

fn default_clip_duration(asset: &MediaAsset) -> f64 {
    if asset.kind == AssetKind::Image || asset.duration_secs <= 0.0 {
        DEFAULT_STILL_DURATION_SECS
    } else {
        asset.duration_secs
    }
}
