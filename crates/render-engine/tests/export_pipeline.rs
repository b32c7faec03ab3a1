use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use splice_common::error::SpliceError;
use splice_common::logging::init_test_logging;
use splice_project_model::{
    AssetKind, Clip, ClipKind, Command, MediaAsset, PreparedClip, Store, TextData, TimelineState,
    TrackPatch,
};
use splice_render_engine::{
    AssetSource, CancelToken, EncodeBackend, EncodeRequest, EncodeSettings, ExportError,
    ExportPipeline, ExportProgress, ExportStage, FontSource, ProgressCallback, ProgressSink,
    ResolvedAsset,
};
use tokio::sync::Notify;

/// Serves assets from memory, optionally failing some ids.
#[derive(Default)]
struct InMemoryAssets {
    failing: HashSet<String>,
    delay: Option<Duration>,
    fetched: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait::async_trait]
impl AssetSource for InMemoryAssets {
    async fn fetch(&self, asset: &MediaAsset) -> Result<ResolvedAsset, ExportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(asset.id.clone());

        if self.failing.contains(&asset.id) {
            return Err(ExportError::AssetResolution {
                asset_id: asset.id.clone(),
                message: "simulated fetch failure".into(),
            });
        }
        Ok(ResolvedAsset {
            asset_id: asset.id.clone(),
            path: PathBuf::from(format!("/mem/{}", asset.id)),
            size_bytes: 1,
        })
    }
}

struct Fonts {
    available: bool,
}

#[async_trait::async_trait]
impl FontSource for Fonts {
    async fn resolve(&self, family: &str) -> Result<PathBuf, SpliceError> {
        if self.available {
            Ok(PathBuf::from(format!("/fonts/{family}.ttf")))
        } else {
            Err(SpliceError::font("no fonts installed"))
        }
    }
}

#[derive(Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    NoArtifact,
    Hang,
}

/// Stands in for an encoder: records the request and reports fake progress.
struct SimulatedBackend {
    available: bool,
    outcome: Outcome,
    started: Notify,
    release: Option<Arc<Notify>>,
    requests: Mutex<Vec<EncodeRequest>>,
}

impl SimulatedBackend {
    fn new(outcome: Outcome) -> Self {
        Self {
            available: true,
            outcome,
            started: Notify::new(),
            release: None,
            requests: Mutex::new(vec![]),
        }
    }

    fn last_request(&self) -> EncodeRequest {
        self.requests.lock().unwrap().last().cloned().expect("encode was called")
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl EncodeBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn encode(
        &self,
        request: EncodeRequest,
        progress: ProgressSink,
    ) -> Result<Vec<u8>, ExportError> {
        self.requests.lock().unwrap().push(request);
        self.started.notify_one();
        if let Some(release) = &self.release {
            release.notified().await;
        }

        for fraction in [0.25, 0.5, 1.0] {
            progress.report(fraction);
        }
        match self.outcome {
            Outcome::Succeed => Ok(b"SIMULATED".to_vec()),
            Outcome::Fail => Err(ExportError::encode("simulated encoder crash")),
            Outcome::NoArtifact => Err(ExportError::ArtifactMissing {
                path: PathBuf::from("/tmp/simulated.mp4"),
            }),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

fn pipeline(
    assets: Arc<InMemoryAssets>,
    fonts_available: bool,
    backend: Arc<SimulatedBackend>,
) -> ExportPipeline {
    ExportPipeline::new(
        assets,
        Arc::new(Fonts {
            available: fonts_available,
        }),
        backend,
        EncodeSettings::default(),
    )
}

fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ExportProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p));
    (callback, seen)
}

/// Two videos and a music bed on separate tracks, plus a title.
fn sample_store() -> Store {
    let mut store = Store::with_sequential_ids(TimelineState::default());
    let a = store.ingest_asset("/m/a.mp4", AssetKind::Video, 5.0, "a");
    let b = store.ingest_asset("/m/b.mp4", AssetKind::Video, 5.0, "b");
    let music = store.ingest_asset("/m/music.wav", AssetKind::Audio, 30.0, "music");
    store.ingest_asset("/m/unused.mp4", AssetKind::Video, 5.0, "unused");

    let batch = [&a, &b]
        .iter()
        .map(|id| PreparedClip::for_asset(store.state().asset(id).unwrap(), 1, 5.0))
        .collect();
    store.insert_batch(batch);
    store.place_asset(&music, 4, 0.0).unwrap();
    store.insert_text(3, 2.0, TextData::new("Splice")).unwrap();
    store
}

#[tokio::test]
async fn export_returns_artifact_with_monotonic_progress() {
    let assets = Arc::new(InMemoryAssets::default());
    let backend = Arc::new(SimulatedBackend::new(Outcome::Succeed));
    let (callback, seen) = recorder();

    let bytes = pipeline(Arc::clone(&assets), true, Arc::clone(&backend))
        .export(sample_store().snapshot(), Some(callback), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(bytes, b"SIMULATED");

    let mut fetched = assets.fetched.lock().unwrap().clone();
    fetched.sort();
    assert_eq!(fetched, vec!["asset-1", "asset-2", "asset-3"]);

    let request = backend.last_request();
    assert_eq!(request.sources.len(), request.graph.inputs.len());
    for (input, source) in request.graph.inputs.iter().zip(&request.sources) {
        assert_eq!(source, &PathBuf::from(format!("/mem/{}", input.asset_id)));
    }
    assert_eq!(
        request.fonts.get("sans-serif"),
        Some(&PathBuf::from("/fonts/sans-serif.ttf"))
    );

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(seen.first().unwrap().stage, ExportStage::Preparing);
    assert_eq!(
        *seen.last().unwrap(),
        ExportProgress {
            percent: 100,
            stage: ExportStage::Complete
        }
    );
    assert!(seen.iter().any(|p| p.stage == ExportStage::Encoding));
}

#[tokio::test]
async fn empty_timeline_still_encodes_base_canvas() {
    let backend = Arc::new(SimulatedBackend::new(Outcome::Succeed));
    let bytes = pipeline(Arc::new(InMemoryAssets::default()), true, Arc::clone(&backend))
        .export(TimelineState::default(), None, &CancelToken::new())
        .await
        .unwrap();
    assert!(!bytes.is_empty());

    let request = backend.last_request();
    assert_eq!(request.graph.op_names(), vec!["color"]);
    assert!(request.sources.is_empty());
    assert!(request.graph.audio_output.is_none());
}

#[tokio::test]
async fn asset_failure_aborts_before_encoding() {
    let assets = Arc::new(InMemoryAssets {
        failing: HashSet::from(["asset-2".to_string()]),
        ..InMemoryAssets::default()
    });
    let backend = Arc::new(SimulatedBackend::new(Outcome::Succeed));
    let (callback, seen) = recorder();

    let err = pipeline(assets, true, Arc::clone(&backend))
        .export(sample_store().snapshot(), Some(callback), &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::AssetResolution { ref asset_id, .. } if asset_id == "asset-2"));
    assert!(err.is_retryable());
    assert_eq!(backend.calls(), 0);
    assert_eq!(seen.lock().unwrap().last().unwrap().stage, ExportStage::Failed);
}

#[tokio::test]
async fn assets_of_skipped_clips_are_never_fetched() {
    init_test_logging();
    let assets = Arc::new(InMemoryAssets {
        failing: HashSet::from(["asset-2".to_string(), "asset-3".to_string()]),
        ..InMemoryAssets::default()
    });
    let backend = Arc::new(SimulatedBackend::new(Outcome::Succeed));

    let mut store = Store::with_sequential_ids(TimelineState::default());
    let kept = store.ingest_asset("/m/kept.mp4", AssetKind::Video, 5.0, "kept");
    let orphan = store.ingest_asset("/m/orphan.mp4", AssetKind::Video, 5.0, "orphan");
    let silent = store.ingest_asset("/m/silent.mp4", AssetKind::Video, 5.0, "silent");
    store.place_asset(&kept, 1, 0.0).unwrap();
    store.place_asset(&silent, 2, 0.0).unwrap();
    store.dispatch(Command::UpdateTrack {
        id: 2,
        patch: TrackPatch {
            is_hidden: Some(true),
            is_muted: Some(true),
            ..TrackPatch::default()
        },
    });

    let mut snapshot = store.snapshot();
    snapshot
        .clips
        .push(Clip::new("stray", ClipKind::Video, 42, 0.0, 5.0).with_asset(orphan));

    pipeline(Arc::clone(&assets), true, Arc::clone(&backend))
        .export(snapshot, None, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(*assets.fetched.lock().unwrap(), vec!["asset-1"]);
    let request = backend.last_request();
    let inputs: Vec<&str> = request.graph.inputs.iter().map(|i| i.asset_id.as_str()).collect();
    assert_eq!(inputs, vec!["asset-1"]);
}

#[tokio::test]
async fn fonts_are_resolved_only_for_drawn_text() {
    let backend = Arc::new(SimulatedBackend::new(Outcome::Succeed));
    let mut store = Store::with_sequential_ids(TimelineState::default());
    let mut hidden = TextData::new("hidden");
    hidden.font_family = "serif".into();
    store.insert_text(2, 1.0, hidden).unwrap();
    store.insert_text(3, 1.0, TextData::new("shown")).unwrap();
    store.dispatch(Command::UpdateTrack {
        id: 2,
        patch: TrackPatch {
            is_hidden: Some(true),
            ..TrackPatch::default()
        },
    });

    pipeline(Arc::new(InMemoryAssets::default()), true, Arc::clone(&backend))
        .export(store.snapshot(), None, &CancelToken::new())
        .await
        .unwrap();

    let request = backend.last_request();
    let fonts: Vec<&str> = request.fonts.keys().map(String::as_str).collect();
    assert_eq!(fonts, vec!["sans-serif"]);
}

#[tokio::test]
async fn error_kinds_stay_distinguishable() {
    let mut unavailable = SimulatedBackend::new(Outcome::Succeed);
    unavailable.available = false;
    let err = pipeline(Arc::new(InMemoryAssets::default()), true, Arc::new(unavailable))
        .export(sample_store().snapshot(), None, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::BackendUnavailable { .. }));
    assert!(!err.is_retryable());

    let err = pipeline(
        Arc::new(InMemoryAssets::default()),
        true,
        Arc::new(SimulatedBackend::new(Outcome::Fail)),
    )
    .export(sample_store().snapshot(), None, &CancelToken::new())
    .await
    .unwrap_err();
    assert!(matches!(err, ExportError::EncodeFailed { .. }));
    assert!(err.is_retryable());

    let err = pipeline(
        Arc::new(InMemoryAssets::default()),
        true,
        Arc::new(SimulatedBackend::new(Outcome::NoArtifact)),
    )
    .export(sample_store().snapshot(), None, &CancelToken::new())
    .await
    .unwrap_err();
    assert!(matches!(err, ExportError::ArtifactMissing { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn missing_font_degrades_without_failing() {
    let backend = Arc::new(SimulatedBackend::new(Outcome::Succeed));
    let result = pipeline(Arc::new(InMemoryAssets::default()), false, Arc::clone(&backend))
        .export(sample_store().snapshot(), None, &CancelToken::new())
        .await;
    assert!(result.is_ok());

    let request = backend.last_request();
    assert!(request.fonts.is_empty());
    assert!(request.graph.op_names().contains(&"draw_text"));
}

#[tokio::test]
async fn cancellation_aborts_pending_encode() {
    let backend = Arc::new(SimulatedBackend::new(Outcome::Hang));
    let pipeline = Arc::new(pipeline(
        Arc::new(InMemoryAssets::default()),
        true,
        Arc::clone(&backend),
    ));
    let cancel = CancelToken::new();

    let task = {
        let pipeline = Arc::clone(&pipeline);
        let cancel = cancel.clone();
        let snapshot = sample_store().snapshot();
        tokio::spawn(async move { pipeline.export(snapshot, None, &cancel).await })
    };

    backend.started.notified().await;
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("export stops after cancel")
        .unwrap();
    assert!(matches!(result, Err(ExportError::Cancelled)));
}

#[tokio::test]
async fn cancelled_token_skips_all_work() {
    let assets = Arc::new(InMemoryAssets::default());
    let backend = Arc::new(SimulatedBackend::new(Outcome::Succeed));
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = pipeline(Arc::clone(&assets), true, Arc::clone(&backend))
        .export(sample_store().snapshot(), None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
    assert!(assets.fetched.lock().unwrap().is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn export_uses_snapshot_taken_at_start() {
    let release = Arc::new(Notify::new());
    let mut backend = SimulatedBackend::new(Outcome::Succeed);
    backend.release = Some(Arc::clone(&release));
    let backend = Arc::new(backend);
    let pipeline = Arc::new(pipeline(
        Arc::new(InMemoryAssets::default()),
        true,
        Arc::clone(&backend),
    ));

    let mut store = sample_store();
    let clips_at_start = store.state().clips.len();
    let task = {
        let pipeline = Arc::clone(&pipeline);
        let snapshot = store.snapshot();
        tokio::spawn(async move { pipeline.export(snapshot, None, &CancelToken::new()).await })
    };

    backend.started.notified().await;
    store.insert_text(3, 1.0, TextData::new("late edit")).unwrap();
    assert_eq!(store.state().clips.len(), clips_at_start + 1);
    release.notify_one();

    task.await.unwrap().unwrap();
    let request = backend.last_request();
    assert_eq!(request.graph.fold_nodes().count(), clips_at_start - 1);
}

#[tokio::test]
async fn fetch_concurrency_is_bounded() {
    let assets = Arc::new(InMemoryAssets {
        delay: Some(Duration::from_millis(20)),
        ..InMemoryAssets::default()
    });
    let mut store = Store::with_sequential_ids(TimelineState::default());
    for i in 0..6 {
        let id = store.ingest_asset(format!("/m/{i}.wav"), AssetKind::Audio, 2.0, "clip");
        store.place_asset(&id, 4, 0.0).unwrap();
    }

    pipeline(
        Arc::clone(&assets),
        true,
        Arc::new(SimulatedBackend::new(Outcome::Succeed)),
    )
    .with_max_concurrent_fetches(2)
    .export(store.snapshot(), None, &CancelToken::new())
    .await
    .unwrap();

    assert_eq!(assets.fetched.lock().unwrap().len(), 6);
    assert!(assets.max_in_flight.load(Ordering::SeqCst) <= 2);
}
