//! Print the composition graph for a project.

use std::path::PathBuf;

use splice_processing_core::compile;
use splice_project_model::LoadedProject;

pub fn run(path: PathBuf, pretty: bool) -> anyhow::Result<()> {
    let project =
        LoadedProject::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;

    let graph = compile(&project.project.state);
    tracing::debug!(
        nodes = graph.nodes.len(),
        inputs = graph.inputs.len(),
        "Compiled project"
    );

    let json = if pretty {
        graph.to_json_pretty()?
    } else {
        graph.to_json()?
    };
    println!("{json}");

    Ok(())
}
