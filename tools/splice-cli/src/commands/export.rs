//! Export a project to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use splice_common::config::AppConfig;
use splice_project_model::LoadedProject;
use splice_render_engine::{
    CancelToken, ConfiguredFontSource, EncodeSettings, ExportPipeline, ExportProgress,
    FfmpegBackend, FileAssetSource, ProgressCallback,
};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let settings = EncodeSettings::from_config(&config.export);
    let output_path = output.unwrap_or_else(|| {
        project
            .exports_dir()
            .join(format!("{}.{}", project.project.name, settings.container))
    });

    println!("  Output: {}", output_path.display());
    println!(
        "  Canvas: {}x{} @ {}fps",
        project.project.state.canvas_size.width,
        project.project.state.canvas_size.height,
        settings.fps
    );

    let pipeline = ExportPipeline::new(
        Arc::new(FileAssetSource::relative_to(&project.root)),
        Arc::new(ConfiguredFontSource::new(config.export.font_file.clone())),
        Arc::new(FfmpegBackend::from_config(&config.export)),
        settings,
    )
    .with_max_concurrent_fetches(config.export.max_concurrent_fetches);

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!("\r  Progress: {:>3}% ({:?})          ", p.percent, p.stage);
        std::io::stdout().flush().ok();
    });

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let bytes = match pipeline
        .export(project.project.state.clone(), Some(progress_cb), &cancel)
        .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            println!();
            anyhow::bail!("Export failed: {e}");
        }
    };

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output_path, &bytes)?;
    println!(
        "\nExport complete: {} ({} bytes)",
        output_path.display(),
        bytes.len()
    );

    Ok(())
}
