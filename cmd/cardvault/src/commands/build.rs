//! Offline index build.

use std::path::PathBuf;

use anyhow::Context as _;
use cardvault_cardindex::{ArtifactPaths, BuildReport, BuilderConfig, IndexBuilder};
use clap::Args;
use tracing::warn;

use super::{create_embedder, get_config, open_corpus, output_result, print_success, print_warning};
use crate::Cli;

/// Build index artifacts from a JSON Lines manifest
/// (`{"id_card", "name", "image"}` per line).
#[derive(Args)]
pub struct BuildCommand {
    /// Corpus manifest file
    #[arg(long)]
    manifest: String,

    /// Output directory (default: the configured artifact directory)
    #[arg(long)]
    out: Option<PathBuf>,
}

impl BuildCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let corpus = open_corpus(&self.manifest)?;
        let paths = match &self.out {
            Some(dir) => ArtifactPaths::in_dir(dir),
            None => cfg.artifact_paths(),
        };

        let builder = IndexBuilder::new(
            create_embedder(),
            BuilderConfig {
                batch_size: cfg.batch_size,
                dataset: cfg.dataset.clone(),
            },
        );
        let target = paths.clone();
        let output = tokio::task::spawn_blocking(move || builder.build_to(corpus.as_ref(), &target))
            .await
            .context("build task")??;

        let report = &output.report;
        log_skipped(report);
        if !report.failed.is_empty() {
            print_warning(&format!("{} item(s) skipped", report.failed.len()));
        }
        print_success(&format!(
            "indexed {} card(s) into {}",
            output.snapshot.len(),
            paths.index.display()
        ));
        output_result(report, cli.output.as_deref(), cli.json)
    }
}

/// Logs one warning per skipped corpus item.
fn log_skipped(report: &BuildReport) {
    for item in &report.failed {
        warn!(key = %item.key, reason = %item.reason, "corpus item skipped");
    }
}
