//! Export orchestration: resolve assets, compile, encode.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use splice_common::config::ExportDefaults;
use splice_common::error::SpliceError;
use splice_processing_core::{CompositionGraph, GraphCompiler, Operation};
use splice_project_model::{AssetId, MediaAsset, TimelineState};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// The single structured error surfaced by an export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Encode backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Failed to resolve asset {asset_id}: {message}")]
    AssetResolution { asset_id: AssetId, message: String },

    #[error("Encode failed: {message}")]
    EncodeFailed { message: String },

    #[error("Encoder reported success but produced no artifact at {path}")]
    ArtifactMissing { path: PathBuf },

    #[error("Export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Whether retrying the same export could plausibly succeed. The engine
    /// itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExportError::AssetResolution { .. } | ExportError::EncodeFailed { .. }
        )
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::EncodeFailed {
            message: message.into(),
        }
    }
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    ResolvingAssets,
    Compiling,
    Encoding,
    Finalizing,
    Complete,
    Failed,
}

/// Export progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    /// Overall progress in `[0, 100]`, never decreasing within one export.
    pub percent: u8,

    pub stage: ExportStage,
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Receives encode progress as a fraction in `[0, 1]`.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<dyn Fn(f64) + Send + Sync>,
}

impl ProgressSink {
    pub fn new(f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        (self.inner)(fraction)
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressSink")
    }
}

// Overall percentages at which each stage begins.
const COMPILE_AT: u8 = 5;
const RESOLVE_START: u8 = 10;
const ENCODE_START: u8 = 20;
const ENCODE_END: u8 = 95;
const FINALIZE_AT: u8 = 97;

/// Forwards progress to the caller, holding the percentage monotonic.
struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: AtomicU8,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: AtomicU8::new(0),
        }
    }

    fn report(&self, stage: ExportStage, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if let Some(callback) = &self.callback {
            callback(ExportProgress {
                percent: previous.max(percent),
                stage,
            });
        }
    }

    fn fail(&self) {
        let percent = self.last.load(Ordering::SeqCst);
        self.report(ExportStage::Failed, percent);
    }
}

/// Cooperative cancellation shared between the caller and an export.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn check(&self) -> Result<(), ExportError> {
        if self.is_cancelled() {
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A local byte source for an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub asset_id: AssetId,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Resolves an asset's locator to something the encoder can read.
#[async_trait::async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch(&self, asset: &MediaAsset) -> Result<ResolvedAsset, ExportError>;
}

/// Resolves a font family to a font file.
#[async_trait::async_trait]
pub trait FontSource: Send + Sync {
    async fn resolve(&self, family: &str) -> Result<PathBuf, SpliceError>;
}

/// Font files keyed by family name.
pub type FontMap = BTreeMap<String, PathBuf>;

/// Output encoding parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub container: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self::from_config(&ExportDefaults::default())
    }
}

impl EncodeSettings {
    pub fn from_config(config: &ExportDefaults) -> Self {
        Self {
            fps: config.fps.max(1),
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
            video_bitrate_kbps: config.video_bitrate_kbps,
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            container: config.container.clone(),
        }
    }
}

/// Everything an encode backend needs.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub graph: CompositionGraph,
    /// Source path for each `graph.inputs` entry, index aligned.
    pub sources: Vec<PathBuf>,
    pub fonts: FontMap,
    pub settings: EncodeSettings,
}

/// Executes a composition graph and returns the encoded artifact.
#[async_trait::async_trait]
pub trait EncodeBackend: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend can run on the system.
    async fn is_available(&self) -> bool;

    async fn encode(
        &self,
        request: EncodeRequest,
        progress: ProgressSink,
    ) -> Result<Vec<u8>, ExportError>;
}

/// Default bound on concurrent asset fetches.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Sequences one export: resolve assets, resolve fonts, compile, encode.
pub struct ExportPipeline {
    assets: Arc<dyn AssetSource>,
    fonts: Arc<dyn FontSource>,
    backend: Arc<dyn EncodeBackend>,
    compiler: GraphCompiler,
    settings: EncodeSettings,
    max_concurrent_fetches: usize,
}

impl ExportPipeline {
    pub fn new(
        assets: Arc<dyn AssetSource>,
        fonts: Arc<dyn FontSource>,
        backend: Arc<dyn EncodeBackend>,
        settings: EncodeSettings,
    ) -> Self {
        Self {
            assets,
            fonts,
            backend,
            compiler: GraphCompiler::default(),
            settings,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn with_compiler(mut self, compiler: GraphCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    /// Export `snapshot`. The snapshot is owned, so later timeline edits
    /// cannot affect an export in flight.
    pub async fn export(
        &self,
        snapshot: TimelineState,
        progress: Option<ProgressCallback>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, ExportError> {
        let reporter = Arc::new(ProgressReporter::new(progress));
        let result = self.run(&snapshot, &reporter, cancel).await;

        match &result {
            Ok(bytes) => {
                reporter.report(ExportStage::Complete, 100);
                tracing::info!(
                    backend = self.backend.name(),
                    bytes = bytes.len(),
                    "Export complete"
                );
            }
            Err(ExportError::Cancelled) => {
                reporter.fail();
                tracing::info!("Export cancelled");
            }
            Err(err) => {
                reporter.fail();
                tracing::warn!(error = %err, retryable = err.is_retryable(), "Export failed");
            }
        }
        result
    }

    async fn run(
        &self,
        snapshot: &TimelineState,
        reporter: &Arc<ProgressReporter>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, ExportError> {
        tracing::info!(
            clips = snapshot.clips.len(),
            backend = self.backend.name(),
            "Starting export"
        );
        reporter.report(ExportStage::Preparing, 0);
        cancel.check()?;

        if !self.backend.is_available().await {
            return Err(ExportError::BackendUnavailable {
                backend: self.backend.name().to_string(),
                reason: "backend is not installed or not runnable".to_string(),
            });
        }

        // The graph decides which clips survive, so only its inputs are fetched.
        reporter.report(ExportStage::Compiling, COMPILE_AT);
        let graph = self.compiler.compile(snapshot);
        cancel.check()?;

        reporter.report(ExportStage::ResolvingAssets, RESOLVE_START);
        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            resolved = self.resolve_assets(snapshot, &graph, reporter) => resolved?,
        };

        let fonts = self.resolve_fonts(&graph).await;
        cancel.check()?;

        let sources = graph
            .inputs
            .iter()
            .map(|input| {
                resolved
                    .get(&input.asset_id)
                    .map(|asset| asset.path.clone())
                    .ok_or_else(|| ExportError::AssetResolution {
                        asset_id: input.asset_id.clone(),
                        message: "asset was not resolved before encoding".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            nodes = graph.nodes.len(),
            inputs = sources.len(),
            fonts = fonts.len(),
            "Graph ready for encoding"
        );

        reporter.report(ExportStage::Encoding, ENCODE_START);
        let sink_reporter = Arc::clone(reporter);
        let sink = ProgressSink::new(move |fraction| {
            let span = f64::from(ENCODE_END - ENCODE_START);
            let percent = ENCODE_START + (fraction * span).round() as u8;
            sink_reporter.report(ExportStage::Encoding, percent);
        });
        let request = EncodeRequest {
            graph,
            sources,
            fonts,
            settings: self.settings.clone(),
        };

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExportError::Cancelled),
            encoded = self.backend.encode(request, sink) => encoded?,
        };

        reporter.report(ExportStage::Finalizing, FINALIZE_AT);
        Ok(bytes)
    }

    /// Fetch every asset the graph reads, concurrently. Clips the compiler
    /// skipped are never fetched. The first failure aborts the remaining
    /// fetches.
    async fn resolve_assets(
        &self,
        snapshot: &TimelineState,
        graph: &CompositionGraph,
        reporter: &ProgressReporter,
    ) -> Result<HashMap<AssetId, ResolvedAsset>, ExportError> {
        let mut assets: Vec<MediaAsset> = Vec::new();
        for input in &graph.inputs {
            if assets.iter().any(|asset| asset.id == input.asset_id) {
                continue;
            }
            if let Some(asset) = snapshot.asset(&input.asset_id) {
                assets.push(asset.clone());
            }
        }
        let total = assets.len();
        let mut resolved = HashMap::with_capacity(total);
        if total == 0 {
            return Ok(resolved);
        }

        let permits = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut tasks = JoinSet::new();
        for asset in assets {
            let source = Arc::clone(&self.assets);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| {
                    ExportError::AssetResolution {
                        asset_id: asset.id.clone(),
                        message: e.to_string(),
                    }
                })?;
                source.fetch(&asset).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let asset = joined.map_err(|e| ExportError::AssetResolution {
                asset_id: "<task>".to_string(),
                message: format!("fetch task failed: {e}"),
            })??;
            tracing::debug!(asset_id = %asset.asset_id, path = %asset.path.display(), "Asset resolved");
            resolved.insert(asset.asset_id.clone(), asset);

            let span = usize::from(ENCODE_START - RESOLVE_START);
            let percent = RESOLVE_START as usize + span * resolved.len() / total;
            reporter.report(ExportStage::ResolvingAssets, percent as u8);
        }
        Ok(resolved)
    }

    /// Resolve a font file per drawn text family. Failures are logged and
    /// the family falls back to the encoder's default font.
    async fn resolve_fonts(&self, graph: &CompositionGraph) -> FontMap {
        let mut fonts = FontMap::new();
        let families = graph.nodes.iter().filter_map(|node| match &node.op {
            Operation::DrawText(text) => Some(text.font_family.clone()),
            _ => None,
        });

        for family in families {
            if fonts.contains_key(&family) {
                continue;
            }
            match self.fonts.resolve(&family).await {
                Ok(path) => {
                    fonts.insert(family, path);
                }
                Err(err) => {
                    tracing::warn!(family = %family, error = %err, "Font unavailable, using fallback");
                }
            }
        }
        fonts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_retryable_classification() {
        assert!(ExportError::encode("boom").is_retryable());
        assert!(ExportError::AssetResolution {
            asset_id: "a".into(),
            message: "x".into()
        }
        .is_retryable());
        assert!(!ExportError::Cancelled.is_retryable());
        assert!(!ExportError::ArtifactMissing {
            path: PathBuf::from("/tmp/out.mp4")
        }
        .is_retryable());
        assert!(!ExportError::BackendUnavailable {
            backend: "ffmpeg".into(),
            reason: "missing".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_reporter_never_goes_backwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Box::new(move |p: ExportProgress| {
            sink.lock().unwrap().push(p.percent);
        });
        let reporter = ProgressReporter::new(Some(callback));

        reporter.report(ExportStage::Encoding, 40);
        reporter.report(ExportStage::Encoding, 30);
        reporter.report(ExportStage::Complete, 200);

        assert_eq!(*seen.lock().unwrap(), vec![40, 40, 100]);
    }

    #[test]
    fn test_sink_clamps_fraction() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&seen);
        let sink = ProgressSink::new(move |f| store.lock().unwrap().push(f));
        sink.report(1.7);
        sink.report(f64::NAN);
        assert_eq!(*seen.lock().unwrap(), vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        assert!(!token.is_cancelled());
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = ExportDefaults::default();
        config.fps = 0;
        config.video_codec = "libx265".into();
        let settings = EncodeSettings::from_config(&config);
        assert_eq!(settings.fps, 1);
        assert_eq!(settings.video_codec, "libx265");
    }
}
