//! ffmpeg encode backend: lowers a composition graph to `-filter_complex`
//! and runs ffmpeg as a child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use splice_common::config::ExportDefaults;
use splice_processing_core::graph::{
    CompositionGraph, DrawText, FadeDirection, GraphNode, MixDuration, Operation,
};
use splice_project_model::TextAlign;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::export::{EncodeBackend, EncodeRequest, EncodeSettings, ExportError, FontMap, ProgressSink};

/// Lower every node to an ffmpeg filter chain entry, joined with `;`.
pub fn build_filter_complex(graph: &CompositionGraph, fonts: &FontMap) -> String {
    graph
        .nodes
        .iter()
        .map(|node| lower_node(node, fonts))
        .collect::<Vec<_>>()
        .join(";")
}

fn lower_node(node: &GraphNode, fonts: &FontMap) -> String {
    let inputs: String = node.inputs.iter().map(|label| format!("[{label}]")).collect();
    let outputs: String = node.outputs.iter().map(|label| format!("[{label}]")).collect();
    let filter = match &node.op {
        Operation::Color {
            color,
            width,
            height,
            duration_secs,
        } => format!("color=c={color}:s={width}x{height}:d={}", num(*duration_secs)),
        Operation::Trim {
            start_secs,
            end_secs,
        } => format!("trim=start={}:end={}", num(*start_secs), num(*end_secs)),
        Operation::ResetTimestamps => "setpts=PTS-STARTPTS".to_string(),
        Operation::ShiftTimestamps { offset_secs } => {
            format!("setpts=PTS+{}/TB", num(*offset_secs))
        }
        Operation::LoopStill => "loop=loop=-1:size=1:start=0".to_string(),
        Operation::AlphaFormat => "format=rgba".to_string(),
        Operation::Scale { factor } => {
            let f = num(*factor);
            format!("scale=iw*{f}:ih*{f}")
        }
        Operation::Rotate { degrees } => {
            let rad = num(degrees.to_radians());
            format!("rotate={rad}:ow=rotw({rad}):oh=roth({rad}):c=none")
        }
        Operation::Opacity { factor } => format!("colorchannelmixer=aa={}", num(*factor)),
        Operation::Fade {
            direction,
            start_secs,
            duration_secs,
        } => {
            let kind = match direction {
                FadeDirection::In => "in",
                FadeDirection::Out => "out",
            };
            format!(
                "fade=t={kind}:st={}:d={}:alpha=1",
                num(*start_secs),
                num(*duration_secs)
            )
        }
        Operation::Overlay {
            x,
            y,
            enable_start,
            enable_end,
        } => format!(
            "overlay=x={}:y={}:enable='{}'",
            num(*x),
            num(*y),
            window(*enable_start, *enable_end)
        ),
        Operation::DrawText(text) => lower_text(text, fonts),
        Operation::AudioTrim {
            start_secs,
            end_secs,
        } => format!("atrim=start={}:end={}", num(*start_secs), num(*end_secs)),
        Operation::AudioResetTimestamps => "asetpts=PTS-STARTPTS".to_string(),
        Operation::Volume { gain } => format!("volume={}", num(*gain)),
        Operation::AudioDelay { delay_secs } => {
            let ms = (delay_secs.max(0.0) * 1000.0).round() as u64;
            format!("adelay=delays={ms}:all=1")
        }
        Operation::AudioMix { duration } => {
            let duration = match duration {
                MixDuration::Longest => "longest",
                MixDuration::Shortest => "shortest",
                MixDuration::First => "first",
            };
            format!(
                "amix=inputs={}:duration={duration}:dropout_transition=0:normalize=0",
                node.inputs.len()
            )
        }
    };
    format!("{inputs}{filter}{outputs}")
}

fn lower_text(text: &DrawText, fonts: &FontMap) -> String {
    let font = match fonts.get(&text.font_family) {
        Some(path) => format!("fontfile='{}'", escape_path(path)),
        None => format!("font='{}'", escape_text(&text.font_family)),
    };
    let x = num(text.x);
    let x = match text.align {
        TextAlign::Left => x,
        TextAlign::Center => format!("{x}-text_w/2"),
        TextAlign::Right => format!("{x}-text_w"),
    };
    let mut filter = format!(
        "drawtext={font}:text='{}':fontsize={}:fontcolor={}:x={x}:y={}:enable='{}'",
        escape_text(&text.content),
        num(text.font_size_px),
        ffmpeg_color(&text.color),
        num(text.y),
        window(text.enable_start, text.enable_end)
    );
    if let Some(background) = &text.background_color {
        filter.push_str(&format!(":box=1:boxcolor={}", ffmpeg_color(background)));
    }
    filter
}

/// Half-open `[start, end)` enable expression.
fn window(start: f64, end: f64) -> String {
    format!("gte(t,{})*lt(t,{})", num(start), num(end))
}

/// Fixed-precision decimal with trailing zeros removed.
fn num(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn ffmpeg_color(color: &str) -> String {
    match color.strip_prefix('#') {
        Some(hex) => format!("0x{hex}"),
        None => color.to_string(),
    }
}

/// Escape text for a single-quoted drawtext value.
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            '%' => escaped.push_str("\\%"),
            '\'' => escaped.push('\u{2019}'),
            '\n' | '\r' => escaped.push(' '),
            other => escaped.push(other),
        }
    }
    escaped
}

fn escape_path(path: &Path) -> String {
    escape_text(&path.to_string_lossy())
}

/// Full ffmpeg argument list for one encode.
pub fn build_ffmpeg_args(request: &EncodeRequest, output: &Path) -> Vec<String> {
    let graph = &request.graph;
    let settings = &request.settings;

    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for source in &request.sources {
        args.push("-i".to_string());
        args.push(source.display().to_string());
    }

    args.push("-filter_complex".to_string());
    args.push(build_filter_complex(graph, &request.fonts));

    args.push("-map".to_string());
    args.push(format!("[{}]", graph.video_output));
    args.extend([
        "-c:v".to_string(),
        settings.video_codec.clone(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        format!("{}k", settings.video_bitrate_kbps.max(100)),
        "-r".to_string(),
        settings.fps.to_string(),
    ]);

    match &graph.audio_output {
        Some(label) => {
            args.push("-map".to_string());
            args.push(format!("[{label}]"));
            args.extend([
                "-c:a".to_string(),
                settings.audio_codec.clone(),
                "-b:a".to_string(),
                format!("{}k", settings.audio_bitrate_kbps.max(32)),
            ]);
        }
        None => args.push("-an".to_string()),
    }

    args.push("-t".to_string());
    args.push(num(graph.duration_secs));
    if settings.container == "mp4" || settings.container == "mov" {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }
    args.push(output.display().to_string());
    args
}

/// Accumulates `-progress` key/value output.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both keys.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value.trim() == "end";
            }
            _ => {}
        }
    }

    /// Encoded fraction of `duration_secs`.
    pub fn fraction(&self, duration_secs: f64) -> f64 {
        if self.complete {
            1.0
        } else if duration_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / duration_secs).clamp(0.0, 1.0)
        }
    }
}

/// Removes a partially written artifact unless it was consumed.
struct TempArtifact(PathBuf);

impl Drop for TempArtifact {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Encodes by running an ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
    work_dir: PathBuf,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::from_config(&ExportDefaults::default())
    }
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn from_config(config: &ExportDefaults) -> Self {
        Self::new(config.ffmpeg_binary.clone(), config.resolved_work_dir())
    }

    /// First line of `ffmpeg -version`, if the binary runs.
    pub async fn version(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(str::to_string)
    }

    fn output_path(&self, settings: &EncodeSettings) -> PathBuf {
        self.work_dir
            .join(format!("splice-{}.{}", uuid::Uuid::new_v4(), settings.container))
    }
}

#[async_trait::async_trait]
impl EncodeBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn is_available(&self) -> bool {
        self.version().await.is_some()
    }

    async fn encode(
        &self,
        request: EncodeRequest,
        progress: ProgressSink,
    ) -> Result<Vec<u8>, ExportError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| ExportError::encode(format!("{}: {e}", self.work_dir.display())))?;

        let output = self.output_path(&request.settings);
        let artifact = TempArtifact(output.clone());
        let args = build_ffmpeg_args(&request, &output);
        let duration_secs = request.graph.duration_secs;
        tracing::debug!(args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExportError::BackendUnavailable {
                        backend: self.binary.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    ExportError::encode(format!("Failed to start ffmpeg: {e}"))
                }
            })?;

        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExportError::encode("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExportError::encode("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ExportError::encode(format!("Failed reading ffmpeg progress: {e}")))?
        {
            if let Some((key, value)) = line.trim().split_once('=') {
                state.update(key, value);
                if key == "progress" {
                    progress.report(state.fraction(duration_secs));
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ExportError::encode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(ExportError::encode(format!(
                "ffmpeg exited with {status}: {}",
                stderr_output.trim()
            )));
        }

        let bytes = match tokio::fs::read(&artifact.0).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return Err(ExportError::ArtifactMissing { path: output }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExportError::ArtifactMissing { path: output })
            }
            Err(e) => return Err(ExportError::encode(format!("{}: {e}", output.display()))),
        };
        tracing::info!(bytes = bytes.len(), "ffmpeg encode finished");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_processing_core::compile;
    use splice_project_model::{
        AssetKind, Clip, ClipKind, MediaAsset, TextData, TimelineState,
    };

    fn request(state: &TimelineState) -> EncodeRequest {
        let graph = compile(state);
        let sources = graph
            .inputs
            .iter()
            .map(|input| PathBuf::from(&input.source_locator))
            .collect();
        EncodeRequest {
            graph,
            sources,
            fonts: FontMap::new(),
            settings: EncodeSettings::default(),
        }
    }

    #[test]
    fn test_num_formatting() {
        assert_eq!(num(5.0), "5");
        assert_eq!(num(0.1), "0.1");
        assert_eq!(num(-0.0000001), "0");
        assert_eq!(num(f64::NAN), "0");
        assert_eq!(num(1.25), "1.25");
    }

    #[test]
    fn test_mix_keeps_per_clip_gain() {
        let mut state = TimelineState::default();
        for (i, volume) in [(1, 0.8), (2, 0.3)] {
            let id = format!("a{i}");
            state.assets.push(MediaAsset::new(
                id.clone(),
                format!("/m/{id}.wav"),
                AssetKind::Audio,
                10.0,
                "bed",
            ));
            let mut clip = Clip::new(format!("c{i}"), ClipKind::Audio, 3 + i, 0.0, 4.0).with_asset(id);
            clip.volume = volume;
            state.clips.push(clip);
        }

        let fc = build_filter_complex(&request(&state).graph, &FontMap::new());
        assert!(fc.contains("volume=0.8"));
        assert!(fc.contains("volume=0.3"));
        assert!(fc.ends_with("amix=inputs=2:duration=longest:dropout_transition=0:normalize=0[amix]"));
    }

    #[test]
    fn test_empty_timeline_lowering() {
        let req = request(&TimelineState::default());
        let args = build_ffmpeg_args(&req, Path::new("/tmp/out.mp4"));

        let fc_index = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(args[fc_index + 1], "color=c=black:s=1920x1080:d=30[base]");
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-i".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-progress" && w[1] == "pipe:1"));
    }

    #[test]
    fn test_video_and_text_lowering() {
        let mut state = TimelineState::default();
        state.assets.push(MediaAsset::new("v", "/media/v.mp4", AssetKind::Video, 10.0, "v"));
        let mut clip = Clip::new("c1", ClipKind::Video, 1, 2.0, 3.0).with_asset("v");
        clip.in_point = 1.5;
        clip.volume = 0.5;
        state.clips.push(clip);
        let mut text = TextData::new("It's 50%: done");
        text.align = TextAlign::Right;
        text.background_color = "#000000".into();
        let mut title = Clip::new("t1", ClipKind::Text, 3, 0.0, 1.0).with_text(text);
        title.transform.x = 100.0;
        state.clips.push(title);

        let req = request(&state);
        let fc = build_filter_complex(&req.graph, &FontMap::new());

        assert!(fc.starts_with("color=c=black:s=1920x1080:d=30[base];"));
        assert!(fc.contains("[0:v]trim=start=1.5:end=4.5[s0]"));
        assert!(fc.contains("[s1]setpts=PTS+2/TB[s2]"));
        assert!(fc.contains("[base][s3]overlay=x=0:y=0:enable='gte(t,2)*lt(t,5)'[v1]"));
        assert!(fc.contains("[0:a]atrim=start=1.5:end=4.5"));
        assert!(fc.contains("volume=0.5"));
        assert!(fc.contains("adelay=delays=2000:all=1"));
        assert!(fc.contains("amix=inputs=1:duration=longest:dropout_transition=0:normalize=0"));
        assert!(fc.contains("text='It\u{2019}s 50\\%\\: done'"));
        assert!(fc.contains("x=1920-text_w"));
        assert!(fc.contains(":box=1:boxcolor=0x000000"));
        assert!(fc.contains("font='sans-serif'"));
    }

    #[test]
    fn test_font_map_selects_fontfile() {
        let mut state = TimelineState::default();
        state
            .clips
            .push(Clip::new("t1", ClipKind::Text, 3, 0.0, 1.0).with_text(TextData::new("Hi")));
        let mut fonts = FontMap::new();
        fonts.insert("sans-serif".into(), PathBuf::from("/fonts/DejaVuSans.ttf"));

        let fc = build_filter_complex(&compile(&state), &fonts);
        assert!(fc.contains("drawtext=fontfile='/fonts/DejaVuSans.ttf'"));
    }

    #[test]
    fn test_progress_state_parsing() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "5000000");
        assert_eq!(state.fraction(10.0), 0.5);
        state.update("out_time_ms", "20000000");
        assert_eq!(state.fraction(10.0), 1.0);
        state.update("progress", "continue");
        assert!(!state.complete);
        state.update("progress", "end");
        assert_eq!(state.fraction(0.0), 1.0);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let backend = FfmpegBackend::new("splice-no-such-ffmpeg", std::env::temp_dir());
        assert!(!backend.is_available().await);

        let req = request(&TimelineState::default());
        let err = backend.encode(req, ProgressSink::noop()).await.unwrap_err();
        assert!(matches!(err, ExportError::BackendUnavailable { .. }));
    }
}
