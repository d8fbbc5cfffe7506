//! Utility functions for CLI commands.

use std::sync::Arc;

use anyhow::Context as _;
use cardvault_cardindex::{Corpus, ManifestCorpus};
use cardvault_imgembed::{CardEmbedder, DescriptorModel};
use cardvault_match::{CardMatcher, HttpArtifactStore, MatchConfig};

use crate::Cli;

/// Loads the config named by `--config`, or the default one.
pub fn get_config(cli: &Cli) -> anyhow::Result<MatchConfig> {
    let cfg = match cli.config.as_deref() {
        Some(path) => MatchConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => MatchConfig::load_default()?,
    };
    Ok(cfg)
}

pub fn create_embedder() -> Arc<dyn CardEmbedder> {
    Arc::new(DescriptorModel::new())
}

pub fn open_corpus(manifest: &str) -> anyhow::Result<Arc<dyn Corpus>> {
    let corpus = ManifestCorpus::open(manifest).with_context(|| format!("opening manifest {manifest}"))?;
    Ok(Arc::new(corpus))
}

/// Creates a matcher wired with the configured remote store and, if given,
/// a manifest corpus for rebuilds.
pub fn create_matcher(cfg: MatchConfig, manifest: Option<&str>) -> anyhow::Result<CardMatcher> {
    let remote = cfg.remote.clone();
    let mut matcher = CardMatcher::new(create_embedder(), cfg);
    if let Some(remote) = remote {
        let store = HttpArtifactStore::new(&remote).context("creating remote store")?;
        matcher = matcher.with_store(Arc::new(store));
    }
    if let Some(manifest) = manifest {
        matcher = matcher.with_corpus(open_corpus(manifest)?);
    }
    Ok(matcher)
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(
    result: &T,
    output_path: Option<&str>,
    as_json: bool,
) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)? + "\n"
    } else {
        serde_yaml::to_string(result)?
    };

    match output_path {
        Some(path) => std::fs::write(path, output)?,
        None => print!("{}", output),
    }

    Ok(())
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints warning message.
pub fn print_warning(msg: &str) {
    eprintln!("\x1b[33m⚠\x1b[0m {}", msg);
}
