use serde::Serialize;
use uuid::Uuid;

use crate::error::IndexError;
use crate::flat::{FlatIndex, Hit};
use crate::labels::{CardLabel, LabelTable};

/// Provenance shared by both files of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactMeta {
    /// Random id minted per build; both files must carry the same one.
    pub build_id: Uuid,
    /// Corpus identity the artifact was built from.
    pub dataset: String,
    /// [`CardEmbedder::model_id`](cardvault_imgembed::CardEmbedder::model_id) of the extractor.
    pub model_id: String,
}

impl ArtifactMeta {
    /// Mints metadata for a fresh build.
    pub fn new(dataset: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            dataset: dataset.into(),
            model_id: model_id.into(),
        }
    }
}

/// An index and its label table, checked to be aligned.
///
/// Snapshots are immutable; the query path shares them behind an `Arc` and
/// replaces them wholesale.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    index: FlatIndex,
    labels: LabelTable,
    meta: ArtifactMeta,
}

impl IndexSnapshot {
    /// Pairs `index` with `labels`. Fails unless there is exactly one label
    /// per vector.
    pub fn new(index: FlatIndex, labels: LabelTable, meta: ArtifactMeta) -> Result<Self, IndexError> {
        if labels.len() != index.len() {
            return Err(IndexError::LengthMismatch {
                labels: labels.len(),
                vectors: index.len(),
            });
        }
        Ok(Self {
            index,
            labels,
            meta,
        })
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    /// An empty snapshot must never serve queries.
    pub fn is_servable(&self) -> bool {
        !self.is_empty()
    }

    /// Searches the index and attaches the label of each hit.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(Hit, &CardLabel)>, IndexError> {
        let hits = self.index.search(query, top_k)?;
        hits.into_iter()
            .map(|hit| {
                let label = self.labels.get(hit.position).ok_or(IndexError::LengthMismatch {
                    labels: self.labels.len(),
                    vectors: self.index.len(),
                })?;
                Ok((hit, label))
            })
            .collect()
    }
}
