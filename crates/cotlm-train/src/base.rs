//! Locating the base model to fine-tune.
//!
//! `training.base_model` is either a local directory or a Hugging Face repo
//! id (`google/flan-t5-small`).  Repo files are fetched through `hf-hub`,
//! which caches them under the usual Hugging Face cache directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hf_hub::api::tokio::ApiBuilder;
use tracing::info;

use crate::model::{collect_safetensor_paths, CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};

const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";

/// The three things needed to build a [`crate::model::Seq2SeqModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

/// Resolve `base_model` to local files, downloading them if needed.
pub async fn resolve_base_model(base_model: &str) -> Result<BaseModelFiles> {
    let local = Path::new(base_model);
    if local.is_dir() {
        return from_local_dir(local);
    }
    from_hub(base_model).await
}

/// Files of a model stored in `dir`.
pub fn from_local_dir(dir: &Path) -> Result<BaseModelFiles> {
    let config = dir.join(CONFIG_FILE);
    let tokenizer = dir.join(TOKENIZER_FILE);
    anyhow::ensure!(config.is_file(), "{} has no {CONFIG_FILE}", dir.display());
    anyhow::ensure!(tokenizer.is_file(), "{} has no {TOKENIZER_FILE}", dir.display());

    let weights = collect_safetensor_paths(dir)?;
    info!(path = %dir.display(), shards = weights.len(), "Using local base model");
    Ok(BaseModelFiles { config, tokenizer, weights })
}

async fn from_hub(repo_id: &str) -> Result<BaseModelFiles> {
    let token = std::env::var("HUGGING_FACE_HUB_TOKEN").ok().filter(|t| !t.is_empty());
    let api = ApiBuilder::new()
        .with_token(token)
        .build()
        .context("Failed to initialise Hugging Face Hub client")?;
    let repo = api.model(repo_id.to_string());

    info!(repo_id, "Fetching base model from Hugging Face Hub");

    let config = repo
        .get(CONFIG_FILE)
        .await
        .with_context(|| format!("Cannot fetch {CONFIG_FILE} of '{repo_id}'"))?;
    let tokenizer = repo
        .get(TOKENIZER_FILE)
        .await
        .with_context(|| format!("Cannot fetch {TOKENIZER_FILE} of '{repo_id}'"))?;

    let weights = match repo.get(WEIGHTS_FILE).await {
        Ok(path) => vec![path],
        Err(_) => {
            let index = repo
                .get(SAFETENSORS_INDEX)
                .await
                .with_context(|| format!("'{repo_id}' has no safetensors weights"))?;
            let dir = index
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let mut paths = Vec::new();
            for shard in collect_safetensor_paths(&dir)? {
                let name = shard
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                paths.push(
                    repo.get(&name)
                        .await
                        .with_context(|| format!("Cannot fetch {name} of '{repo_id}'"))?,
                );
            }
            paths
        }
    };

    info!(repo_id, shards = weights.len(), "Base model ready");
    Ok(BaseModelFiles { config, tokenizer, weights })
}
