use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use tracing::{debug, info};

use super::{create_matcher, get_config, output_result};
use crate::Cli;

/// Identify the card shown in an image.
///
/// Provisions the index first if needed. Prints
/// `{"matches": [{"id", "name", "score", "rank"}], "isMatch": bool}`.
#[derive(Args)]
pub struct QueryCommand {
    /// Image file (PNG, JPEG or WebP)
    image: PathBuf,

    /// Number of candidates to return (default from config)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Similarity a best match must exceed (default from config)
    #[arg(long)]
    threshold: Option<f32>,

    /// Corpus manifest used if the index has to be rebuilt
    #[arg(long)]
    manifest: Option<String>,
}

impl QueryCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let cfg = get_config(cli)?;
        let top_k = self.top_k.unwrap_or(cfg.top_k);
        let threshold = self.threshold.unwrap_or(cfg.threshold);
        if top_k == 0 {
            anyhow::bail!("-k must be at least 1");
        }

        let bytes = std::fs::read(&self.image)
            .with_context(|| format!("reading {}", self.image.display()))?;

        let matcher = create_matcher(cfg, self.manifest.as_deref())?;
        matcher.ensure_ready().await?;
        debug!(image = %self.image.display(), top_k, threshold, "identifying card");
        let result = matcher.search(&bytes, top_k, threshold)?;
        if let Some(best) = result.best() {
            info!(id = %best.label.id, score = best.score, is_match = result.is_match, "best candidate");
        }

        // The match result is a wire shape; it is always printed as JSON.
        output_result(&result, cli.output.as_deref(), true)
    }
}
