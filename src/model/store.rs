use super::tokenizer::TokenizerFile;
use crate::{Error, Result, config::ModelSource};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const DEFAULT_HUB_URL: &str = "https://huggingface.co";

/// Weight files in order of preference.
const WEIGHT_FILES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

/// Paths of everything needed to instantiate a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: TokenizerFile,
    pub weights: PathBuf,
}

/// Resolves checkpoint files from a local directory or the Hugging Face Hub,
/// caching hub downloads on disk.
pub struct ModelStore {
    client: reqwest::Client,
    cache_dir: PathBuf,
    hub_url: String,
    token: Option<String>,
}

impl ModelStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_dir: cache_dir.into(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            token: None,
        }
    }

    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub async fn resolve(&self, source: &ModelSource) -> Result<ModelFiles> {
        info!(
            "Resolving checkpoint files for {} (revision {})",
            source.model_id, source.revision
        );

        let config = self.fetch(source, "config.json").await?;

        let tokenizer = match self.try_fetch(source, "tokenizer.json").await? {
            Some(path) => TokenizerFile::Json(path),
            None => TokenizerFile::WordPieceVocab(self.fetch(source, "vocab.txt").await?),
        };

        let weights = self.fetch_first(source, &WEIGHT_FILES).await?;

        Ok(ModelFiles {
            config,
            tokenizer,
            weights,
        })
    }

    pub async fn fetch(&self, source: &ModelSource, file: &str) -> Result<PathBuf> {
        self.try_fetch(source, file).await?.ok_or_else(|| {
            Error::download(format!("{} not found for model {}", file, source.model_id))
        })
    }

    /// Returns the first of `files` that exists for the model.
    pub async fn fetch_first(&self, source: &ModelSource, files: &[&str]) -> Result<PathBuf> {
        for file in files {
            if let Some(path) = self.try_fetch(source, file).await? {
                return Ok(path);
            }
            debug!("{} not available for {}", file, source.model_id);
        }

        Err(Error::download(format!(
            "none of [{}] found for model {}",
            files.join(", "),
            source.model_id
        )))
    }

    /// `Ok(None)` means the file does not exist in the source.
    async fn try_fetch(&self, source: &ModelSource, file: &str) -> Result<Option<PathBuf>> {
        if let Some(dir) = &source.local_dir {
            let path = dir.join(file);
            return Ok(tokio::fs::try_exists(&path).await?.then_some(path));
        }

        let path = self.cache_path(source, file);
        if tokio::fs::try_exists(&path).await? {
            debug!("Using cached {}", path.display());
            return Ok(Some(path));
        }

        let url = self.file_url(source, file);
        debug!("Downloading {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let mut response = request.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(Error::download(format!("GET {} returned {}", url, status)));
            }
            _ => {}
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stream into a sibling file so a failed download never looks cached.
        let partial = path.with_extension("part");
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len();
        }
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&partial, &path).await?;

        info!("Downloaded {} ({} bytes)", url, written);
        Ok(Some(path))
    }

    fn file_url(&self, source: &ModelSource, file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.hub_url.trim_end_matches('/'),
            source.model_id,
            source.revision,
            file
        )
    }

    fn cache_path(&self, source: &ModelSource, file: &str) -> PathBuf {
        repo_dir(&self.cache_dir, &source.model_id)
            .join(&source.revision)
            .join(file)
    }
}

fn repo_dir(cache_dir: &Path, model_id: &str) -> PathBuf {
    cache_dir.join(model_id.replace('/', "--"))
}
