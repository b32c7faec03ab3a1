//! Initialize a new Splice project.

use std::path::PathBuf;

use splice_common::config::AppConfig;
use splice_project_model::project::{EXPORTS_DIR, PROJECT_FILE_NAME, SOURCES_DIR};
use splice_project_model::LoadedProject;

pub fn run(
    config: &AppConfig,
    name: String,
    output: PathBuf,
    width: Option<u32>,
    height: Option<u32>,
) -> anyhow::Result<()> {
    let project_dir = output.join(&name);
    println!("Creating project '{}' at {}", name, project_dir.display());

    let mut defaults = config.timeline.clone();
    if let Some(width) = width {
        defaults.canvas_width = width;
    }
    if let Some(height) = height {
        defaults.canvas_height = height;
    }

    let project = LoadedProject::create(&project_dir, &name, &defaults)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;
    let canvas = &project.project.state.canvas_size;

    println!("Project created:");
    println!("  Directory: {}", project.root.display());
    println!(
        "  Canvas: {}x{} ({})",
        canvas.width, canvas.height, canvas.label
    );
    println!("  Tracks: {}", project.project.state.tracks.len());
    println!();
    println!("  {name}/");
    println!("  ├── {PROJECT_FILE_NAME}");
    println!("  ├── {SOURCES_DIR}/   (media files)");
    println!("  └── {EXPORTS_DIR}/   (rendered output)");

    Ok(())
}
