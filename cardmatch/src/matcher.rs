use std::sync::Arc;
use std::time::Duration;

use cardvault_cardindex::{CardLabel, Corpus, IndexSnapshot};
use cardvault_imgembed::{decode_image, l2_norm, CardEmbedder, DynamicImage};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::error::{ProvisionError, QueryError};
use crate::provision::{ProvisionConfig, Provisioned, Provisioner, SnapshotSource};
use crate::store::ArtifactStore;

/// How far a precomputed query's norm may stray from 1.
pub const UNIT_NORM_TOLERANCE: f64 = 1e-3;

/// Returns whether the best similarity counts as a confident match.
/// A score equal to the threshold is not a match.
pub fn is_match(best: f32, threshold: f32) -> bool {
    best > threshold
}

/// One ranked candidate. Serialises as `{"id", "name", "score", "rank"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateMatch {
    #[serde(flatten)]
    pub label: CardLabel,
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Best first.
    pub matches: Vec<CandidateMatch>,
    #[serde(rename = "isMatch")]
    pub is_match: bool,
}

impl MatchResult {
    pub fn best(&self) -> Option<&CandidateMatch> {
        self.matches.first()
    }
}

/// Identity of the snapshot being served.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotInfo {
    pub build_id: String,
    pub dataset: String,
    pub model_id: String,
    pub vectors: usize,
    pub dim: usize,
    pub source: SnapshotSource,
}

impl SnapshotInfo {
    fn new(snapshot: &IndexSnapshot, source: SnapshotSource) -> Self {
        let meta = snapshot.meta();
        Self {
            build_id: meta.build_id.to_string(),
            dataset: meta.dataset.clone(),
            model_id: meta.model_id.clone(),
            vectors: snapshot.len(),
            dim: snapshot.dim(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceStatus {
    NotReady,
    Loaded {
        index: SnapshotInfo,
    },
    /// The last provisioning cycle failed. `serving` is the snapshot from an
    /// earlier cycle that still answers queries, if any.
    Failed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        serving: Option<SnapshotInfo>,
    },
}

impl ServiceStatus {
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Loaded { .. } | ServiceStatus::Failed { serving: Some(_), .. }
        )
    }
}

#[derive(Default)]
struct ServiceState {
    current: Option<(Arc<IndexSnapshot>, SnapshotSource)>,
    last_error: Option<String>,
}

/// CardMatcher identifies card images against the loaded index.
///
/// Queries take a reference to the current snapshot and run without locks
/// held, so they never wait on provisioning. Provisioning cycles are
/// serialised; a successful cycle replaces the snapshot in one swap.
pub struct CardMatcher {
    embedder: Arc<dyn CardEmbedder>,
    cfg: MatchConfig,
    store: Option<Arc<dyn ArtifactStore>>,
    corpus: Option<Arc<dyn Corpus>>,
    fetch_timeout: Option<Duration>,
    state: RwLock<ServiceState>,
    provisioning: Mutex<()>,
}

impl CardMatcher {
    pub fn new(embedder: Arc<dyn CardEmbedder>, cfg: MatchConfig) -> Self {
        Self {
            embedder,
            cfg,
            store: None,
            corpus: None,
            fetch_timeout: None,
            state: RwLock::new(ServiceState::default()),
            provisioning: Mutex::new(()),
        }
    }

    /// Sets the remote store tried first when provisioning.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the corpus used when the index has to be rebuilt.
    pub fn with_corpus(mut self, corpus: Arc<dyn Corpus>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// Overrides the remote fetch bound from the config.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.cfg
    }

    pub fn embedder(&self) -> &Arc<dyn CardEmbedder> {
        &self.embedder
    }

    /// Runs a provisioning cycle and, on success, swaps in the new snapshot.
    /// On failure the previous snapshot, if any, keeps serving.
    pub async fn provision(&self) -> Result<Provisioned, ProvisionError> {
        let _guard = self.provisioning.lock().await;
        self.run_cycle().await
    }

    /// Re-enters provisioning from the start, e.g. after new artifacts
    /// were published.
    pub async fn reload(&self) -> Result<Provisioned, ProvisionError> {
        self.provision().await
    }

    /// Returns the current snapshot, provisioning first if none is loaded.
    ///
    /// Only a matcher that has never run a cycle provisions lazily. After a
    /// failed cycle with nothing to serve this returns the recorded failure;
    /// retries go through [`provision`](Self::provision) or
    /// [`reload`](Self::reload).
    pub async fn ensure_ready(&self) -> Result<Arc<IndexSnapshot>, QueryError> {
        if let Some(ready) = self.settled() {
            return ready;
        }

        let _guard = self.provisioning.lock().await;
        // Another caller may have finished a cycle while we waited.
        if let Some(ready) = self.settled() {
            return ready;
        }
        self.run_cycle()
            .await
            .map(|p| p.snapshot)
            .map_err(|e| QueryError::IndexUnavailable {
                reason: e.to_string(),
            })
    }

    /// The outcome of the last cycle, or `None` while no cycle has run.
    fn settled(&self) -> Option<Result<Arc<IndexSnapshot>, QueryError>> {
        let state = self.state.read();
        match (&state.current, &state.last_error) {
            (Some((snapshot, _)), _) => Some(Ok(snapshot.clone())),
            (None, Some(reason)) => Some(Err(QueryError::IndexUnavailable {
                reason: reason.clone(),
            })),
            (None, None) => None,
        }
    }

    async fn run_cycle(&self) -> Result<Provisioned, ProvisionError> {
        let mut pcfg = ProvisionConfig::from(&self.cfg);
        if let Some(t) = self.fetch_timeout {
            pcfg.fetch_timeout = t;
        }
        let mut provisioner = Provisioner::new(self.embedder.clone(), pcfg);
        if let Some(store) = &self.store {
            provisioner = provisioner.with_store(store.clone());
        }
        if let Some(corpus) = &self.corpus {
            provisioner = provisioner.with_corpus(corpus.clone());
        }

        match provisioner.run().await {
            Ok(p) => {
                let mut state = self.state.write();
                state.current = Some((p.snapshot.clone(), p.source));
                state.last_error = None;
                Ok(p)
            }
            Err(e) => {
                self.state.write().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Replaces the served snapshot with a prebuilt one.
    pub fn install(&self, snapshot: IndexSnapshot) -> Result<(), ProvisionError> {
        let extractor = self.embedder.dimension();
        if snapshot.dim() != extractor {
            return Err(ProvisionError::DimensionMismatch {
                artifact: snapshot.dim(),
                extractor,
            });
        }
        if !snapshot.is_servable() {
            return Err(ProvisionError::EmptyIndex);
        }
        info!(vectors = snapshot.len(), build_id = %snapshot.meta().build_id, "installing index");
        let mut state = self.state.write();
        state.current = Some((Arc::new(snapshot), SnapshotSource::Installed));
        state.last_error = None;
        Ok(())
    }

    pub fn status(&self) -> ServiceStatus {
        let state = self.state.read();
        let serving = state
            .current
            .as_ref()
            .map(|(snapshot, source)| SnapshotInfo::new(snapshot, *source));
        match (&state.last_error, serving) {
            (Some(reason), serving) => ServiceStatus::Failed {
                reason: reason.clone(),
                serving,
            },
            (None, Some(index)) => ServiceStatus::Loaded { index },
            (None, None) => ServiceStatus::NotReady,
        }
    }

    /// The snapshot currently served.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>, QueryError> {
        let state = self.state.read();
        match &state.current {
            Some((snapshot, _)) => Ok(snapshot.clone()),
            None => Err(QueryError::IndexUnavailable {
                reason: state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "index not loaded".to_string()),
            }),
        }
    }

    /// Identifies an encoded image. Returns up to `top_k` candidates.
    pub fn search(&self, image: &[u8], top_k: usize, threshold: f32) -> Result<MatchResult, QueryError> {
        let snapshot = self.snapshot()?;
        let image = decode_image(image)?;
        let query = self.embedder.embed(&image)?;
        rank(&snapshot, &query, top_k, threshold)
    }

    /// [`search`](Self::search) with the configured `top_k` and threshold.
    pub fn search_default(&self, image: &[u8]) -> Result<MatchResult, QueryError> {
        self.search(image, self.cfg.top_k, self.cfg.threshold)
    }

    pub fn search_image(
        &self,
        image: &DynamicImage,
        top_k: usize,
        threshold: f32,
    ) -> Result<MatchResult, QueryError> {
        let snapshot = self.snapshot()?;
        let query = self.embedder.embed(image)?;
        rank(&snapshot, &query, top_k, threshold)
    }

    /// Searches with a precomputed feature vector. The vector must be unit
    /// length within [`UNIT_NORM_TOLERANCE`]; scores are cosine similarities
    /// only for unit vectors.
    pub fn search_vector(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<MatchResult, QueryError> {
        let snapshot = self.snapshot()?;
        let norm = l2_norm(query);
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(QueryError::NotNormalized { norm });
        }
        rank(&snapshot, query, top_k, threshold)
    }
}

fn rank(
    snapshot: &IndexSnapshot,
    query: &[f32],
    top_k: usize,
    threshold: f32,
) -> Result<MatchResult, QueryError> {
    if query.len() != snapshot.dim() {
        return Err(QueryError::DimensionMismatch {
            query: query.len(),
            index: snapshot.dim(),
        });
    }

    let matches: Vec<CandidateMatch> = snapshot
        .search(query, top_k)?
        .into_iter()
        .enumerate()
        .map(|(i, (hit, label))| CandidateMatch {
            label: label.clone(),
            score: hit.score,
            rank: i + 1,
        })
        .collect();

    let is_match = matches.first().is_some_and(|m| is_match(m.score, threshold));
    if let Some(best) = matches.first() {
        debug!(id = %best.label.id, score = best.score, is_match, "query ranked");
    }
    Ok(MatchResult { matches, is_match })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        assert!(!is_match(0.60, 0.60));
        assert!(is_match(0.61, 0.60));
        assert!(!is_match(0.59, 0.60));
    }

    #[test]
    fn result_json_shape() {
        let result = MatchResult {
            matches: vec![CandidateMatch {
                label: CardLabel::new("sv3-125", "Charizard ex"),
                score: 0.5,
                rank: 1,
            }],
            is_match: false,
        };
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "matches": [{"id": "sv3-125", "name": "Charizard ex", "score": 0.5, "rank": 1}],
                "isMatch": false
            })
        );
    }

    #[test]
    fn status_json_is_tagged() {
        let v = serde_json::to_value(ServiceStatus::NotReady).unwrap();
        assert_eq!(v, serde_json::json!({"status": "not_ready"}));
        let v = serde_json::to_value(ServiceStatus::Failed {
            reason: "boom".into(),
            serving: None,
        })
        .unwrap();
        assert_eq!(v, serde_json::json!({"status": "failed", "reason": "boom"}));
    }
}
