// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run download of the local embedding model.
//!
//! Fetches the quantized ONNX model and its tokenizer from HuggingFace into
//! `<data_dir>/models/<model_name>/` and reuses them afterwards.

use std::path::{Path, PathBuf};

use recall_core::RecallError;
use tokio::sync::OnceCell;
use tracing::info;

const MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Resolves and, when missing, downloads model files.
pub struct ModelManager {
    data_dir: PathBuf,
    model_name: String,
    /// Resolved model path; concurrent callers share one download.
    ready: OnceCell<PathBuf>,
}

impl ModelManager {
    pub fn new(data_dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            model_name: model_name.into(),
            ready: OnceCell::new(),
        }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join(&self.model_name)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join(MODEL_FILE)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join(TOKENIZER_FILE)
    }

    /// Both files present and non-empty.
    pub fn is_model_available(&self) -> bool {
        [self.model_path(), self.tokenizer_path()]
            .iter()
            .all(|p| p.metadata().is_ok_and(|m| m.is_file() && m.len() > 0))
    }

    /// Make sure the model is on disk and return its path.
    pub async fn ensure_model(&self) -> Result<PathBuf, RecallError> {
        self.ready
            .get_or_try_init(|| self.fetch_missing())
            .await
            .cloned()
    }

    async fn fetch_missing(&self) -> Result<PathBuf, RecallError> {
        if self.is_model_available() {
            return Ok(self.model_path());
        }
        let model_dir = self.model_dir();
        info!(model = %self.model_name, dir = %model_dir.display(), "embedding model missing, downloading");
        tokio::fs::create_dir_all(&model_dir)
            .await
            .map_err(|e| RecallError::Provider {
                message: format!("failed to create model directory {}", model_dir.display()),
                source: Some(Box::new(e)),
            })?;

        for (filename, url) in [(MODEL_FILE, MODEL_URL), (TOKENIZER_FILE, TOKENIZER_URL)] {
            let dest = model_dir.join(filename);
            if dest.metadata().is_ok_and(|m| m.len() > 0) {
                continue;
            }
            let size = download_file(url, &dest).await?;
            info!(file = filename, bytes = size, "downloaded model file");
        }
        info!(dir = %model_dir.display(), "embedding model ready");
        Ok(self.model_path())
    }
}

/// Download `url` into `dest` via a sibling temp file.
async fn download_file(url: &str, dest: &Path) -> Result<usize, RecallError> {
    let provider_err = |message: String, e: reqwest::Error| RecallError::Provider {
        message,
        source: Some(Box::new(e)),
    };
    let response = reqwest::get(url)
        .await
        .map_err(|e| provider_err(format!("failed to download {url}"), e))?;
    if !response.status().is_success() {
        return Err(RecallError::provider(format!(
            "download of {url} failed with status {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| provider_err(format!("failed to read body of {url}"), e))?;
    if bytes.is_empty() {
        return Err(RecallError::provider(format!("download of {url} was empty")));
    }

    let tmp = dest.with_extension("part");
    let written = async {
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, dest).await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(RecallError::Provider {
            message: format!("failed to write {}", dest.display()),
            source: Some(Box::new(e)),
        });
    }
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_model_name() {
        let mgr = ModelManager::new("/tmp/recall", "all-MiniLM-L6-v2");
        assert_eq!(
            mgr.model_path(),
            PathBuf::from("/tmp/recall/models/all-MiniLM-L6-v2/model.onnx")
        );
        assert_eq!(
            mgr.tokenizer_path(),
            PathBuf::from("/tmp/recall/models/all-MiniLM-L6-v2/tokenizer.json")
        );
    }

    #[test]
    fn missing_files_are_unavailable() {
        let mgr = ModelManager::new("/nonexistent/path", "m");
        assert!(!mgr.is_model_available());
    }

    #[tokio::test]
    async fn present_files_skip_download() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ModelManager::new(dir.path(), "local-model");
        std::fs::create_dir_all(mgr.model_dir()).unwrap();
        std::fs::write(mgr.model_path(), b"onnx").unwrap();
        std::fs::write(mgr.tokenizer_path(), b"{}").unwrap();

        assert!(mgr.is_model_available());
        assert_eq!(mgr.ensure_model().await.unwrap(), mgr.model_path());
    }

    #[test]
    fn empty_files_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = ModelManager::new(dir.path(), "broken");
        std::fs::create_dir_all(mgr.model_dir()).unwrap();
        std::fs::write(mgr.model_path(), b"").unwrap();
        std::fs::write(mgr.tokenizer_path(), b"{}").unwrap();
        assert!(!mgr.is_model_available());
    }
}
