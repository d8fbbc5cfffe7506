use std::sync::Arc;

use cardvault_imgembed::{decode_image, CardEmbedder, DynamicImage, ExtractionError};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifact_io::{save_artifact, ArtifactPaths};
use crate::corpus::{Corpus, CorpusItem};
use crate::error::BuildError;
use crate::flat::FlatIndex;
use crate::labels::LabelTable;
use crate::snapshot::{ArtifactMeta, IndexSnapshot};

/// Why a single corpus item was left out of the index.
#[derive(Debug, Error)]
pub enum BuildItemError {
    #[error("unreadable item: {0}")]
    Read(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// A skipped item and the reason it was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub key: String,
    pub reason: String,
}

/// Outcome counts of one build.
///
/// Every item the corpus yields is `processed`; it is then either
/// `succeeded` (appended to the index) or `skipped`, in which case it
/// also appears in `failed` with its reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<FailedItem>,
}

impl BuildReport {
    fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    fn record_failure(&mut self, key: String, err: BuildItemError) {
        warn!(key = %key, error = %err, "skipping corpus item");
        self.processed += 1;
        self.skipped += 1;
        self.failed.push(FailedItem {
            key,
            reason: err.to_string(),
        });
    }
}

/// Configuration for [`IndexBuilder`].
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Items decoded and embedded together (default: 128).
    pub batch_size: usize,
    /// Corpus identity recorded in the artifact (default: "cardvault").
    pub dataset: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            dataset: "cardvault".to_string(),
        }
    }
}

/// A freshly built snapshot and the report of how it was built.
#[derive(Debug)]
pub struct BuildOutput {
    pub snapshot: IndexSnapshot,
    pub report: BuildReport,
}

/// Builds an [`IndexSnapshot`] from a [`Corpus`].
///
/// Items are consumed lazily in batches; each batch is decoded and
/// embedded in parallel, then appended in corpus order, so batch size
/// never changes the resulting index. Per-item failures are recorded in
/// the [`BuildReport`] and skipped.
pub struct IndexBuilder {
    embedder: Arc<dyn CardEmbedder>,
    cfg: BuilderConfig,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn CardEmbedder>, cfg: BuilderConfig) -> Self {
        let cfg = BuilderConfig {
            batch_size: cfg.batch_size.max(1),
            ..cfg
        };
        Self { embedder, cfg }
    }

    /// Builds an in-memory snapshot.
    ///
    /// Fails with [`BuildError::EmptyIndex`] if no item could be embedded,
    /// and with [`BuildError::DimensionMismatch`] if the extractor returns
    /// a vector of the wrong length.
    pub fn build(&self, corpus: &dyn Corpus) -> Result<BuildOutput, BuildError> {
        let dim = self.embedder.dimension();
        let mut state = BuildState {
            index: FlatIndex::new(dim)?,
            labels: LabelTable::new(),
            report: BuildReport::default(),
        };

        info!(
            dataset = %self.cfg.dataset,
            model = self.embedder.model_id(),
            dim,
            batch_size = self.cfg.batch_size,
            "building card index"
        );

        let mut batch: Vec<CorpusItem> = Vec::with_capacity(self.cfg.batch_size);
        for entry in corpus.items() {
            match entry {
                Ok(item) => {
                    batch.push(item);
                    if batch.len() >= self.cfg.batch_size {
                        self.flush_batch(&mut batch, &mut state)?;
                    }
                }
                Err(f) => state.report.record_failure(f.key, BuildItemError::Read(f.reason)),
            }
        }
        if !batch.is_empty() {
            self.flush_batch(&mut batch, &mut state)?;
        }

        let BuildState {
            index,
            labels,
            report,
        } = state;

        if index.is_empty() {
            warn!(
                processed = report.processed,
                failed = report.failed.len(),
                "corpus produced an empty index"
            );
            return Err(BuildError::EmptyIndex { report });
        }

        let meta = ArtifactMeta::new(self.cfg.dataset.clone(), self.embedder.model_id());
        let snapshot = IndexSnapshot::new(index, labels, meta)?;
        info!(
            vectors = snapshot.len(),
            skipped = report.skipped,
            build_id = %snapshot.meta().build_id,
            "card index built"
        );
        Ok(BuildOutput { snapshot, report })
    }

    /// Builds a snapshot and persists it to `paths`. Nothing is written
    /// when the build fails.
    pub fn build_to(&self, corpus: &dyn Corpus, paths: &ArtifactPaths) -> Result<BuildOutput, BuildError> {
        let out = self.build(corpus)?;
        save_artifact(&out.snapshot, paths)?;
        info!(
            index = %paths.index.display(),
            labels = %paths.labels.display(),
            "card index saved"
        );
        Ok(out)
    }

    fn flush_batch(&self, batch: &mut Vec<CorpusItem>, state: &mut BuildState) -> Result<(), BuildError> {
        let decoded: Vec<Result<DynamicImage, ExtractionError>> =
            batch.par_iter().map(|item| decode_image(&item.image)).collect();

        let mut images = Vec::with_capacity(batch.len());
        let mut slots = Vec::with_capacity(batch.len());
        for d in decoded {
            match d {
                Ok(img) => {
                    slots.push(Ok(images.len()));
                    images.push(img);
                }
                Err(e) => slots.push(Err(e)),
            }
        }

        let mut embedded: Vec<Option<_>> =
            self.embedder.embed_batch(&images).into_iter().map(Some).collect();

        for (item, slot) in batch.drain(..).zip(slots) {
            let result = match slot {
                Ok(j) => embedded.get_mut(j).and_then(Option::take).unwrap_or_else(|| {
                    Err(ExtractionError::Decode(
                        "extractor returned fewer results than images".into(),
                    ))
                }),
                Err(e) => Err(e),
            };
            match result {
                Ok(v) => {
                    if v.len() != state.index.dim() {
                        return Err(BuildError::DimensionMismatch {
                            expected: state.index.dim(),
                            got: v.len(),
                        });
                    }
                    state.index.push(&v)?;
                    state.labels.push(item.label);
                    state.report.record_success();
                }
                Err(e) => state.report.record_failure(item.key, e.into()),
            }
        }

        info!(
            processed = state.report.processed,
            indexed = state.index.len(),
            skipped = state.report.skipped,
            "indexed batch"
        );
        Ok(())
    }
}

struct BuildState {
    index: FlatIndex,
    labels: LabelTable,
    report: BuildReport,
}
