//! Check encoder availability.

use splice_common::config::AppConfig;
use splice_render_engine::FfmpegBackend;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Splice System Check");
    println!("{}", "=".repeat(50));

    let backend = FfmpegBackend::from_config(&config.export);
    match backend.version().await {
        Some(version) => println!("[OK] Encoder: {version}"),
        None => {
            println!(
                "[MISSING] Encoder: '{}' did not run. Install ffmpeg or set export.ffmpeg_binary.",
                config.export.ffmpeg_binary
            );
            anyhow::bail!("ffmpeg is not available");
        }
    }

    match &config.export.font_file {
        Some(font) if font.exists() => println!("[OK] Font override: {}", font.display()),
        Some(font) => println!("[WARN] Font override missing: {}", font.display()),
        None => println!("[OK] Fonts: system font directories"),
    }
    println!(
        "[OK] Work directory: {}",
        config.export.resolved_work_dir().display()
    );

    println!();
    println!("Splice is ready to export.");
    Ok(())
}
