//! Provisioning state machine.
//!
//! Obtains a servable [`IndexSnapshot`] by trying, in order, a remote store,
//! the local artifact, and a full rebuild from the corpus. Remote problems
//! and unusable local files are recovered by moving to the next state.
//! A dimension disagreement between an artifact and the extractor is a
//! configuration error and ends in [`ProvisionState::Failed`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cardvault_cardindex::{
    load_artifact, ArtifactPaths, BuildReport, BuilderConfig, Corpus, IndexBuilder, IndexSnapshot,
    INDEX_FILE_NAME, LABELS_FILE_NAME,
};
use cardvault_imgembed::CardEmbedder;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::MatchConfig;
use crate::error::{ProvisionError, RemoteFetchError};
use crate::store::ArtifactStore;

/// Subdirectory of the artifact directory that receives remote downloads
/// before they are validated.
const STAGING_DIR: &str = ".fetch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisionState {
    Start,
    TryRemote,
    TryLocalArtifact,
    Rebuild,
    Loaded,
    Failed,
}

impl ProvisionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProvisionState::Loaded | ProvisionState::Failed)
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionState::Start => "START",
            ProvisionState::TryRemote => "TRY_REMOTE",
            ProvisionState::TryLocalArtifact => "TRY_LOCAL_ARTIFACT",
            ProvisionState::Rebuild => "REBUILD",
            ProvisionState::Loaded => "LOADED",
            ProvisionState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Where a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Remote,
    Local,
    Rebuilt,
    /// Handed to the matcher directly.
    Installed,
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotSource::Remote => "remote",
            SnapshotSource::Local => "local",
            SnapshotSource::Rebuilt => "rebuilt",
            SnapshotSource::Installed => "installed",
        };
        f.write_str(s)
    }
}

/// Result of a successful provisioning cycle.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub snapshot: Arc<IndexSnapshot>,
    pub source: SnapshotSource,
    /// Present when the snapshot was rebuilt.
    pub report: Option<BuildReport>,
    /// Every state visited, `START` first and `LOADED` last.
    pub trail: Vec<ProvisionState>,
}

#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub dataset: String,
    /// Directory that holds the local artifact pair.
    pub artifact_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub batch_size: usize,
}

impl From<&MatchConfig> for ProvisionConfig {
    fn from(cfg: &MatchConfig) -> Self {
        Self {
            dataset: cfg.dataset.clone(),
            artifact_dir: cfg.artifact_dir(),
            fetch_timeout: cfg.fetch_timeout(),
            batch_size: cfg.batch_size,
        }
    }
}

impl ProvisionConfig {
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.artifact_dir)
    }

    fn staging_dir(&self) -> PathBuf {
        self.artifact_dir.join(STAGING_DIR)
    }
}

/// How a single attempt ended when it did not produce a snapshot.
enum Attempt {
    /// Recoverable; move on to the next source.
    Skip(String),
    Fatal(ProvisionError),
}

pub struct Provisioner {
    embedder: Arc<dyn CardEmbedder>,
    store: Option<Arc<dyn ArtifactStore>>,
    corpus: Option<Arc<dyn Corpus>>,
    cfg: ProvisionConfig,
}

impl Provisioner {
    pub fn new(embedder: Arc<dyn CardEmbedder>, cfg: ProvisionConfig) -> Self {
        Self {
            embedder,
            store: None,
            corpus: None,
            cfg,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_corpus(mut self, corpus: Arc<dyn Corpus>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// Runs one provisioning cycle from `START` to a terminal state.
    pub async fn run(&self) -> Result<Provisioned, ProvisionError> {
        let mut state = ProvisionState::Start;
        let mut trail = vec![state];
        let mut loaded: Option<(IndexSnapshot, SnapshotSource, Option<BuildReport>)> = None;
        let mut failure: Option<ProvisionError> = None;

        while !state.is_terminal() {
            let next = match state {
                ProvisionState::Start => ProvisionState::TryRemote,
                ProvisionState::TryRemote => match self.try_remote().await {
                    Ok(snapshot) => {
                        loaded = Some((snapshot, SnapshotSource::Remote, None));
                        ProvisionState::Loaded
                    }
                    Err(Attempt::Skip(reason)) => {
                        warn!(%reason, "remote artifact unavailable");
                        ProvisionState::TryLocalArtifact
                    }
                    Err(Attempt::Fatal(e)) => {
                        failure = Some(e);
                        ProvisionState::Failed
                    }
                },
                ProvisionState::TryLocalArtifact => match self.try_local().await {
                    Ok(snapshot) => {
                        loaded = Some((snapshot, SnapshotSource::Local, None));
                        ProvisionState::Loaded
                    }
                    Err(Attempt::Skip(reason)) => {
                        warn!(%reason, "local artifact unusable, rebuilding");
                        ProvisionState::Rebuild
                    }
                    Err(Attempt::Fatal(e)) => {
                        failure = Some(e);
                        ProvisionState::Failed
                    }
                },
                ProvisionState::Rebuild => match self.rebuild().await {
                    Ok((snapshot, report)) => {
                        loaded = Some((snapshot, SnapshotSource::Rebuilt, Some(report)));
                        ProvisionState::Loaded
                    }
                    Err(e) => {
                        failure = Some(e);
                        ProvisionState::Failed
                    }
                },
                ProvisionState::Loaded | ProvisionState::Failed => state,
            };
            info!(from = %state, to = %next, "provision transition");
            trail.push(next);
            state = next;
        }

        match loaded {
            Some((snapshot, source, report)) => {
                info!(
                    %source,
                    vectors = snapshot.len(),
                    dim = snapshot.dim(),
                    build_id = %snapshot.meta().build_id,
                    "index loaded"
                );
                Ok(Provisioned {
                    snapshot: Arc::new(snapshot),
                    source,
                    report,
                    trail,
                })
            }
            None => {
                let e = failure.unwrap_or(ProvisionError::NoCorpus);
                let trail: Vec<String> = trail.iter().map(ToString::to_string).collect();
                error!(error = %e, trail = %trail.join(" -> "), "provisioning failed");
                Err(e)
            }
        }
    }

    /// Checks that a snapshot can be served by this extractor.
    fn admit(&self, snapshot: &IndexSnapshot) -> Result<(), Attempt> {
        let extractor = self.embedder.dimension();
        if snapshot.dim() != extractor {
            return Err(Attempt::Fatal(ProvisionError::DimensionMismatch {
                artifact: snapshot.dim(),
                extractor,
            }));
        }
        if !snapshot.is_servable() {
            return Err(Attempt::Skip("artifact holds no vectors".into()));
        }
        let model = self.embedder.model_id();
        if snapshot.meta().model_id != model {
            return Err(Attempt::Skip(format!(
                "artifact built with model {}, extractor is {model}",
                snapshot.meta().model_id
            )));
        }
        Ok(())
    }

    async fn try_remote(&self) -> Result<IndexSnapshot, Attempt> {
        let Some(store) = &self.store else {
            return Err(Attempt::Skip(RemoteFetchError::NotConfigured.to_string()));
        };

        let staging = self.cfg.staging_dir();
        reset_dir(&staging)
            .await
            .map_err(|e| Attempt::Skip(format!("staging {}: {e}", staging.display())))?;

        let dataset = self.cfg.dataset.as_str();
        let fetch = async {
            let index = store.fetch(dataset, INDEX_FILE_NAME, &staging).await?;
            let labels = store.fetch(dataset, LABELS_FILE_NAME, &staging).await?;
            Ok::<_, RemoteFetchError>(ArtifactPaths { index, labels })
        };
        let fetched = match tokio::time::timeout(self.cfg.fetch_timeout, fetch).await {
            Ok(Ok(paths)) => paths,
            Ok(Err(e)) => return Err(Attempt::Skip(e.to_string())),
            Err(_) => {
                return Err(Attempt::Skip(
                    RemoteFetchError::Timeout(self.cfg.fetch_timeout).to_string(),
                ));
            }
        };

        let snapshot = load_blocking(fetched.clone())
            .await
            .map_err(|e| Attempt::Skip(format!("fetched artifact: {e}")))?;
        self.admit(&snapshot)?;

        // Keep the download as the local artifact so later starts stay offline.
        let local = self.cfg.artifact_paths();
        if let Err(e) = promote(&fetched, &local).await {
            warn!(error = %e, "could not store fetched artifact locally");
        }
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!(dir = %staging.display(), error = %e, "could not remove staging directory");
        }

        Ok(snapshot)
    }

    async fn try_local(&self) -> Result<IndexSnapshot, Attempt> {
        let paths = self.cfg.artifact_paths();
        if !paths.exists() {
            return Err(Attempt::Skip(format!(
                "no artifact in {}",
                self.cfg.artifact_dir.display()
            )));
        }
        let snapshot = load_blocking(paths).await.map_err(Attempt::Skip)?;
        self.admit(&snapshot)?;
        Ok(snapshot)
    }

    async fn rebuild(&self) -> Result<(IndexSnapshot, BuildReport), ProvisionError> {
        let corpus = self.corpus.clone().ok_or(ProvisionError::NoCorpus)?;
        let builder = IndexBuilder::new(
            self.embedder.clone(),
            BuilderConfig {
                batch_size: self.cfg.batch_size,
                dataset: self.cfg.dataset.clone(),
            },
        );
        let paths = self.cfg.artifact_paths();
        info!(dataset = %self.cfg.dataset, dir = %self.cfg.artifact_dir.display(), "rebuilding index");

        let output = tokio::task::spawn_blocking(move || builder.build_to(corpus.as_ref(), &paths))
            .await
            .map_err(|e| ProvisionError::Task(e.to_string()))??;

        if output.snapshot.dim() != self.embedder.dimension() {
            return Err(ProvisionError::DimensionMismatch {
                artifact: output.snapshot.dim(),
                extractor: self.embedder.dimension(),
            });
        }
        Ok((output.snapshot, output.report))
    }
}

async fn load_blocking(paths: ArtifactPaths) -> Result<IndexSnapshot, String> {
    tokio::task::spawn_blocking(move || load_artifact(&paths))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

/// Moves a fetched artifact over the local one. If only the index made it,
/// the index is removed again so the two halves never mix.
async fn promote(fetched: &ArtifactPaths, local: &ArtifactPaths) -> std::io::Result<()> {
    tokio::fs::rename(&fetched.index, &local.index).await?;
    if let Err(e) = tokio::fs::rename(&fetched.labels, &local.labels).await {
        if let Err(cleanup) = tokio::fs::remove_file(&local.index).await {
            warn!(path = %local.index.display(), error = %cleanup, "could not remove half-promoted index");
        }
        return Err(e);
    }
    Ok(())
}

async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}
