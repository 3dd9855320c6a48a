//! HuggingFace Hub client for model acquisition.
//!
//! Fetches the checkpoint files the export stage needs (configuration, the
//! preprocessing companion, and one weights file) into a local cache
//! directory. Files already cached with the expected size are not fetched
//! again. LFS files are verified against the sha256 the API advertises.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{AppConfig, NetworkConfig};
use crate::error::{ConvertError, Result};
use crate::progress::ProgressTracker;

/// Weights files accepted by the export stage, in preference order.
const WEIGHT_CANDIDATES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

/// Files the export stage cannot run without (besides weights).
const REQUIRED_FILES: [&str; 2] = ["config.json", "preprocessor_config.json"];

/// Companion files fetched when the repository has them.
const OPTIONAL_FILES: [&str; 6] = [
    "generation_config.json",
    "tokenizer_config.json",
    "tokenizer.json",
    "vocab.json",
    "merges.txt",
    "special_tokens_map.json",
];

/// One file in a hub repository, as reported by the models API.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoFile {
    pub rfilename: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub lfs: Option<LfsInfo>,
}

/// LFS pointer metadata (`oid` is the sha256 of the blob).
#[derive(Debug, Clone, Deserialize)]
pub struct LfsInfo {
    pub oid: String,
    pub size: u64,
}

impl RepoFile {
    fn expected_size(&self) -> Option<u64> {
        self.lfs.as_ref().map(|l| l.size).or(self.size)
    }
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    #[serde(default)]
    siblings: Vec<RepoFile>,
}

/// Client for fetching pretrained checkpoints from the HuggingFace Hub.
pub struct HubClient {
    client: Client,
    /// Root directory for cached models (`{cache}/models/`).
    models_dir: PathBuf,
}

impl HubClient {
    pub fn new(cache_root: &Path) -> Result<Self> {
        let models_dir = cache_root.join("models");
        std::fs::create_dir_all(&models_dir)
            .map_err(|e| ConvertError::io("creating models cache dir", &models_dir, e))?;

        let client = Client::builder()
            .timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(AppConfig::USER_AGENT)
            .build()
            .map_err(|e| ConvertError::Network {
                message: format!("failed to create HTTP client: {e}"),
                source: Some(e),
            })?;

        Ok(Self { client, models_dir })
    }

    /// Local cache directory for a repository (`{models}/{owner}/{name}/`).
    pub fn model_dir(&self, repo_id: &str) -> PathBuf {
        let mut dir = self.models_dir.clone();
        for segment in repo_id.split('/') {
            dir.push(segment);
        }
        dir
    }

    /// Fetch a checkpoint and its preprocessing companion into the cache.
    ///
    /// Returns the local directory the export stage can load the model from.
    pub async fn fetch_model(
        &self,
        repo_id: &str,
        progress: &ProgressTracker,
        cancel_token: &CancellationToken,
    ) -> Result<PathBuf> {
        info!("Fetching checkpoint files for {}", repo_id);

        let files = self.list_repo_files(repo_id).await?;
        let plan = select_files(&files, repo_id)?;

        let model_dir = self.model_dir(repo_id);
        std::fs::create_dir_all(&model_dir)
            .map_err(|e| ConvertError::io("creating model cache dir", &model_dir, e))?;

        for file in &plan {
            cancel_token.check()?;
            let dest = model_dir.join(&file.rfilename);

            if is_cached(&dest, file.expected_size()) {
                debug!("{} already cached, skipping", file.rfilename);
                continue;
            }

            self.download_with_retry(repo_id, file, &dest, progress, cancel_token)
                .await?;
        }

        info!("Checkpoint ready at {}", model_dir.display());
        Ok(model_dir)
    }

    /// List all files in a repository via the models API.
    async fn list_repo_files(&self, repo_id: &str) -> Result<Vec<RepoFile>> {
        let url = format!("{}/models/{}?blobs=true", NetworkConfig::HF_API_BASE, repo_id);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ConvertError::ModelNotFound {
                repo_id: repo_id.to_string(),
            }),
            status if !status.is_success() => Err(ConvertError::DownloadFailed {
                url,
                message: format!("repository listing failed with status {status}"),
            }),
            _ => {
                let info: RepoInfo = response.json().await?;
                Ok(info.siblings)
            }
        }
    }

    /// Download one file, retrying transient network failures.
    async fn download_with_retry(
        &self,
        repo_id: &str,
        file: &RepoFile,
        dest: &Path,
        progress: &ProgressTracker,
        cancel_token: &CancellationToken,
    ) -> Result<u64> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .download_file(repo_id, file, dest, progress, cancel_token)
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < NetworkConfig::MAX_RETRIES => {
                    warn!(
                        "Download of {} failed (attempt {}): {}. Retrying...",
                        file.rfilename, attempt, e
                    );
                    tokio::time::sleep(NetworkConfig::RETRY_BASE_DELAY * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream one file to `{dest}.part`, verify, then atomically rename.
    async fn download_file(
        &self,
        repo_id: &str,
        file: &RepoFile,
        dest: &Path,
        progress: &ProgressTracker,
        cancel_token: &CancellationToken,
    ) -> Result<u64> {
        let url = format!(
            "{}/{}/resolve/main/{}",
            NetworkConfig::HF_HUB_BASE,
            repo_id,
            file.rfilename
        );
        info!("Downloading {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.is_server_error() {
            // 5xx responses are worth another attempt.
            return Err(ConvertError::Network {
                message: format!("download failed with status {status}"),
                source: None,
            });
        }
        if !status.is_success() {
            return Err(ConvertError::DownloadFailed {
                url,
                message: format!("download failed with status {status}"),
            });
        }

        let total_bytes = response.content_length().or_else(|| file.expected_size());
        let temp_path = PathBuf::from(format!(
            "{}{}",
            dest.display(),
            NetworkConfig::DOWNLOAD_TEMP_SUFFIX
        ));

        let result = self
            .stream_to_file(response, file, &temp_path, total_bytes, progress, cancel_token)
            .await;

        match result {
            Ok(bytes) => {
                std::fs::rename(&temp_path, dest).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    ConvertError::io("moving download into place", dest, e)
                })?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        file: &RepoFile,
        temp_path: &Path,
        total_bytes: Option<u64>,
        progress: &ProgressTracker,
        cancel_token: &CancellationToken,
    ) -> Result<u64> {
        let mut out = std::fs::File::create(temp_path)
            .map_err(|e| ConvertError::io("creating temp download file", temp_path, e))?;

        let expected_sha = file.lfs.as_ref().map(|l| l.oid.clone());
        let mut hasher = expected_sha.as_ref().map(|_| Sha256::new());

        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            cancel_token.check()?;

            let chunk = chunk.map_err(|e| ConvertError::Network {
                message: format!("error reading download stream: {e}"),
                source: Some(e),
            })?;

            out.write_all(&chunk)
                .map_err(|e| ConvertError::io("writing download chunk", temp_path, e))?;
            if let Some(h) = hasher.as_mut() {
                h.update(&chunk);
            }

            bytes_downloaded += chunk.len() as u64;
            progress.update_download(&file.rfilename, bytes_downloaded, total_bytes);
        }

        out.flush()
            .map_err(|e| ConvertError::io("flushing download file", temp_path, e))?;

        if let (Some(expected), Some(h)) = (expected_sha, hasher) {
            let actual = hex::encode(h.finalize());
            if actual != expected {
                return Err(ConvertError::HashMismatch {
                    file: file.rfilename.clone(),
                    expected,
                    actual,
                });
            }
        }

        Ok(bytes_downloaded)
    }
}

/// Decide which repository files to fetch.
///
/// Requires the model configuration, the preprocessing companion, and one
/// weights file (safetensors preferred over the PyTorch pickle). Optional
/// tokenizer companions are taken when present.
fn select_files(files: &[RepoFile], repo_id: &str) -> Result<Vec<RepoFile>> {
    let find = |name: &str| files.iter().find(|f| f.rfilename == name).cloned();

    let mut plan = Vec::new();

    for name in REQUIRED_FILES {
        match find(name) {
            Some(file) => plan.push(file),
            None => {
                return Err(ConvertError::DownloadFailed {
                    url: format!("{repo_id}/{name}"),
                    message: "required file not present in repository".to_string(),
                })
            }
        }
    }

    let weights = WEIGHT_CANDIDATES.iter().find_map(|name| find(name)).ok_or(
        ConvertError::WeightsNotFound {
            repo_id: repo_id.to_string(),
        },
    )?;
    plan.push(weights);

    for name in OPTIONAL_FILES {
        if let Some(file) = find(name) {
            plan.push(file);
        }
    }

    Ok(plan)
}

/// A file is cached when it exists and matches the expected size (or when
/// no size is known to compare against).
fn is_cached(dest: &Path, expected_size: Option<u64>) -> bool {
    match std::fs::metadata(dest) {
        Ok(meta) if meta.is_file() => match expected_size {
            Some(size) => meta.len() == size,
            None => true,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> RepoFile {
        RepoFile {
            rfilename: name.to_string(),
            size: Some(100),
            lfs: None,
        }
    }

    #[test]
    fn test_select_prefers_safetensors() {
        let files = vec![
            file("config.json"),
            file("preprocessor_config.json"),
            file("pytorch_model.bin"),
            file("model.safetensors"),
        ];
        let plan = select_files(&files, "microsoft/trocr-base-handwritten").unwrap();
        let names: Vec<&str> = plan.iter().map(|f| f.rfilename.as_str()).collect();
        assert!(names.contains(&"model.safetensors"));
        assert!(!names.contains(&"pytorch_model.bin"));
    }

    #[test]
    fn test_select_falls_back_to_pytorch_bin() {
        let files = vec![
            file("config.json"),
            file("preprocessor_config.json"),
            file("pytorch_model.bin"),
        ];
        let plan = select_files(&files, "microsoft/trocr-base-handwritten").unwrap();
        assert!(plan.iter().any(|f| f.rfilename == "pytorch_model.bin"));
    }

    #[test]
    fn test_select_errors_without_weights() {
        let files = vec![file("config.json"), file("preprocessor_config.json")];
        let err = select_files(&files, "microsoft/trocr-base-handwritten").unwrap_err();
        assert!(matches!(err, ConvertError::WeightsNotFound { .. }));
    }

    #[test]
    fn test_select_errors_without_preprocessor() {
        let files = vec![file("config.json"), file("model.safetensors")];
        let err = select_files(&files, "microsoft/trocr-base-handwritten").unwrap_err();
        assert!(matches!(err, ConvertError::DownloadFailed { .. }));
        assert!(err.to_string().contains("preprocessor_config.json"));
    }

    #[test]
    fn test_select_takes_optional_companions() {
        let files = vec![
            file("config.json"),
            file("preprocessor_config.json"),
            file("model.safetensors"),
            file("tokenizer.json"),
            file("README.md"),
        ];
        let plan = select_files(&files, "microsoft/trocr-base-handwritten").unwrap();
        let names: Vec<&str> = plan.iter().map(|f| f.rfilename.as_str()).collect();
        assert!(names.contains(&"tokenizer.json"));
        assert!(!names.contains(&"README.md"));
    }

    #[test]
    fn test_model_dir_nests_owner_and_name() {
        let tmp = tempfile::tempdir().unwrap();
        let client = HubClient::new(tmp.path()).unwrap();
        let dir = client.model_dir("microsoft/trocr-base-printed");
        assert_eq!(
            dir,
            tmp.path()
                .join("models")
                .join("microsoft")
                .join("trocr-base-printed")
        );
    }

    #[test]
    fn test_is_cached_checks_size() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, b"{}").unwrap();

        assert!(is_cached(&path, Some(2)));
        assert!(is_cached(&path, None));
        assert!(!is_cached(&path, Some(999)));
        assert!(!is_cached(&tmp.path().join("missing.json"), None));
    }

    #[test]
    fn test_repo_file_expected_size_prefers_lfs() {
        let f = RepoFile {
            rfilename: "model.safetensors".into(),
            size: Some(134),
            lfs: Some(LfsInfo {
                oid: "abc".into(),
                size: 385_000_000,
            }),
        };
        assert_eq!(f.expected_size(), Some(385_000_000));
    }
}
