//! Show project information.

use std::path::PathBuf;

use splice_project_model::LoadedProject;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let p = &project.project;
    let state = &p.state;

    println!("Project: {}", p.name);
    println!("  ID: {}", p.id);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!(
        "  Canvas: {}x{} ({})",
        state.canvas_size.width, state.canvas_size.height, state.canvas_size.label
    );
    println!("  Duration: {:.2}s", state.total_duration);
    println!();

    println!("Assets:");
    for asset in &state.assets {
        println!(
            "  {} {:?} {:.1}s  {}",
            asset.id, asset.kind, asset.duration_secs, asset.source_locator
        );
    }
    println!();

    println!("Tracks:");
    for track in &state.tracks {
        let mut flags = Vec::new();
        if track.is_muted {
            flags.push("muted");
        }
        if track.is_hidden {
            flags.push("hidden");
        }
        println!(
            "  [{}] {} ({:?}) {}",
            track.id,
            track.name,
            track.kind,
            flags.join(", ")
        );

        for clip in state.clips_on_track(track.id) {
            println!(
                "      {} {:?} {:.2}s..{:.2}s z={} {}",
                clip.id,
                clip.kind,
                clip.timeline_start,
                clip.timeline_end(),
                clip.z_index,
                clip.label
            );
        }
    }

    Ok(())
}
