use std::path::PathBuf;

use anyhow::Context as _;
use cardvault_cardindex::{load_artifact, ArtifactPaths, CardLabel};
use clap::Args;
use serde::Serialize;

use super::{get_config, output_result};
use crate::Cli;

/// Show metadata of a stored index.
#[derive(Args)]
pub struct InspectCommand {
    /// Artifact directory (default: the configured artifact directory)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Also list every label in index order
    #[arg(long)]
    labels: bool,
}

#[derive(Serialize)]
struct ArtifactInfo {
    index: String,
    build_id: String,
    dataset: String,
    model_id: String,
    vectors: usize,
    dim: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<CardLabel>,
}

impl InspectCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let paths = match &self.dir {
            Some(dir) => ArtifactPaths::in_dir(dir),
            None => get_config(cli)?.artifact_paths(),
        };
        let snapshot = load_artifact(&paths)
            .with_context(|| format!("loading artifact {}", paths.index.display()))?;

        let meta = snapshot.meta();
        let info = ArtifactInfo {
            index: paths.index.display().to_string(),
            build_id: meta.build_id.to_string(),
            dataset: meta.dataset.clone(),
            model_id: meta.model_id.clone(),
            vectors: snapshot.len(),
            dim: snapshot.dim(),
            labels: if self.labels {
                snapshot.labels().iter().cloned().collect()
            } else {
                Vec::new()
            },
        };
        output_result(&info, cli.output.as_deref(), cli.json)
    }
}
