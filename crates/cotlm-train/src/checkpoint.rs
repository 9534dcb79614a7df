//! Checkpoint persistence.
//!
//! A checkpoint directory holds:
//!
//! ```text
//! <dir>/
//!   model.safetensors    trained weights
//!   config.json          architecture config of the base model
//!   tokenizer.json       tokenizer used for training
//!   training_state.json  what produced it (see [`TrainingState`])
//! ```
//!
//! Writes go to a sibling `<dir>.partial` first and are swapped in only once
//! every file is on disk, so an interrupted save never leaves a half-written
//! checkpoint at `<dir>` and a previous checkpoint survives any failure before
//! the swap.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{TrainableModel, CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
use crate::tokenizer::Tokenizer;

pub const STATE_FILE: &str = "training_state.json";

/// Provenance written next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub base_model: String,
    pub examples: usize,
    pub epochs: usize,
    pub total_steps: usize,
    pub epoch_losses: Vec<f32>,
}

/// `true` when `dir` holds everything [`crate::inference::FineTunedModel`]
/// needs to load.
pub fn checkpoint_exists(dir: &Path) -> bool {
    [CONFIG_FILE, WEIGHTS_FILE, TOKENIZER_FILE]
        .iter()
        .all(|f| dir.join(f).is_file())
}

/// Save `model`, `tokenizer` and `state` as the checkpoint at `dir`,
/// replacing whatever was there.
pub fn save_checkpoint(
    model: &dyn TrainableModel,
    tokenizer: &Tokenizer,
    state: &TrainingState,
    dir: &Path,
) -> Result<()> {
    let staging = sibling(dir, "partial");
    if staging.exists() {
        fs::remove_dir_all(&staging)
            .with_context(|| format!("Cannot clear stale {}", staging.display()))?;
    }
    fs::create_dir_all(&staging)
        .with_context(|| format!("Cannot create {}", staging.display()))?;

    let written = write_files(model, tokenizer, state, &staging);
    if let Err(e) = written {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    swap_into_place(&staging, dir)?;
    info!(path = %dir.display(), "Checkpoint saved");
    Ok(())
}

/// Read the provenance file of a checkpoint.
pub fn load_training_state(dir: &Path) -> Result<TrainingState> {
    let path = dir.join(STATE_FILE);
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Cannot parse {}", path.display()))
}

fn write_files(
    model: &dyn TrainableModel,
    tokenizer: &Tokenizer,
    state: &TrainingState,
    dir: &Path,
) -> Result<()> {
    model.save_pretrained(dir)?;
    tokenizer.save(&dir.join(TOKENIZER_FILE))?;
    let json = serde_json::to_string_pretty(state)?;
    fs::write(dir.join(STATE_FILE), json)
        .with_context(|| format!("Cannot write {}", dir.join(STATE_FILE).display()))
}

fn swap_into_place(staging: &Path, dir: &Path) -> Result<()> {
    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }

    let previous = sibling(dir, "previous");
    if dir.exists() {
        if previous.exists() {
            fs::remove_dir_all(&previous)
                .with_context(|| format!("Cannot clear {}", previous.display()))?;
        }
        fs::rename(dir, &previous)
            .with_context(|| format!("Cannot move old checkpoint {} aside", dir.display()))?;
    }

    if let Err(e) = fs::rename(staging, dir) {
        if previous.exists() {
            restore_previous(&previous, dir);
        }
        return Err(e).with_context(|| format!("Cannot move checkpoint into {}", dir.display()));
    }

    if previous.exists() {
        if let Err(e) = fs::remove_dir_all(&previous) {
            warn!(path = %previous.display(), error = %e, "Could not remove old checkpoint");
        }
    }
    Ok(())
}

/// Move the checkpoint set aside at `previous` back to `dir`.  Returns
/// `false`, leaving it at `previous`, when that fails.
fn restore_previous(previous: &Path, dir: &Path) -> bool {
    match fs::rename(previous, dir) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                path = %previous.display(),
                destination = %dir.display(),
                error = %e,
                "Could not restore previous checkpoint"
            );
            false
        }
    }
}

/// `<dir>.<suffix>` next to `dir`.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "checkpoint".into());
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}
