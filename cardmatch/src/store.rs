//! Remote artifact stores.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::RemoteFetchError;

/// ArtifactStore fetches prebuilt artifact files for a dataset.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Downloads `filename` of `dataset` into `dest_dir` and returns the
    /// path of the written file. A partially written file is never left
    /// under the final name.
    async fn fetch(
        &self,
        dataset: &str,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, RemoteFetchError>;
}

/// HTTP store using the Hugging Face hub URL layout:
/// `{base_url}/datasets/{dataset}/resolve/{revision}/{filename}`.
pub struct HttpArtifactStore {
    client: reqwest::Client,
    base_url: String,
    revision: String,
    token: Option<String>,
}

impl HttpArtifactStore {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, RemoteFetchError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            revision: cfg.revision.clone(),
            token: cfg.resolved_token(),
        })
    }

    pub fn url_for(&self, dataset: &str, filename: &str) -> String {
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.base_url, dataset, self.revision, filename
        )
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn fetch(
        &self,
        dataset: &str,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, RemoteFetchError> {
        let url = self.url_for(dataset, filename);
        debug!(%url, "fetching artifact");

        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteFetchError::NotFound(url));
        }
        if !status.is_success() {
            return Err(RemoteFetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let dest = dest_dir.join(filename);
        let tmp = dest_dir.join(format!("{filename}.part"));
        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&tmp, &dest).await.map_err(io_err)?;
        Ok(dest)
    }
}

/// Store backed by a local directory tree `{root}/{dataset}/{filename}`.
/// Useful for mirrors on shared storage.
#[derive(Debug, Clone)]
pub struct DirArtifactStore {
    root: PathBuf,
}

impl DirArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for DirArtifactStore {
    async fn fetch(
        &self,
        dataset: &str,
        filename: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, RemoteFetchError> {
        let src = self.root.join(dataset).join(filename);
        if !tokio::fs::try_exists(&src).await.unwrap_or(false) {
            return Err(RemoteFetchError::NotFound(src.display().to_string()));
        }
        let dest = dest_dir.join(filename);
        let tmp = dest_dir.join(format!("{filename}.part"));
        tokio::fs::copy(&src, &tmp).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &dest).await.map_err(io_err)?;
        Ok(dest)
    }
}

fn io_err(e: std::io::Error) -> RemoteFetchError {
    RemoteFetchError::Io(e.to_string())
}
