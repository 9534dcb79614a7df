//! The trainable sequence-to-sequence model.
//!
//! The fine-tuning loop only sees the [`TrainableModel`] trait: give it a
//! batch, get back a loss value and the gradients of every trainable
//! variable.  [`Seq2SeqModel`] implements it for T5-family checkpoints
//! (`flan-t5-small` by default) on top of `candle-transformers`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use candle_core::{backprop::GradStore, DType, Device, Tensor, Var};
use candle_nn::{loss, VarBuilder, VarMap};
use candle_transformers::models::t5::{Config as T5Config, T5ForConditionalGeneration};
use tracing::info;

use crate::dataset::{EncodedBatch, IGNORE_INDEX};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Loss and gradients of one training batch.
pub struct StepOutput {
    /// Mean loss over the batch's target tokens.
    pub loss: f32,
    pub grads: GradStore,
}

/// What the fine-tuning loop needs from a model.
pub trait TrainableModel {
    /// Every variable the optimizer should update.
    fn trainable_vars(&self) -> Vec<Var>;

    /// Forward and backward pass for one batch.  Parameters are not touched.
    fn loss_and_grads(&mut self, batch: &EncodedBatch) -> Result<StepOutput>;

    /// Write weights and architecture config into `dir`, which already exists.
    fn save_pretrained(&self, dir: &Path) -> Result<()>;
}

// ── Seq2SeqModel ──────────────────────────────────────────────────────────────

/// A T5 encoder-decoder whose parameters live in a [`VarMap`].
pub struct Seq2SeqModel {
    model: T5ForConditionalGeneration,
    varmap: VarMap,
    /// The `config.json` of the base model, written back out unchanged.
    raw_config: serde_json::Value,
    decoder_start_id: u32,
    pad_id: u32,
    device: Device,
}

impl Seq2SeqModel {
    /// Build the model from `config.json` and fill it with pre-trained weights.
    ///
    /// `weight_paths` lists one or more `.safetensors` files that together
    /// hold every parameter.
    pub fn from_pretrained(config_path: &Path, weight_paths: &[PathBuf], device: &Device) -> Result<Self> {
        let json = std::fs::read_to_string(config_path)
            .with_context(|| format!("Cannot read {}", config_path.display()))?;
        let raw_config: serde_json::Value = serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse {}", config_path.display()))?;
        let mut config: T5Config = serde_json::from_value(raw_config.clone())
            .with_context(|| format!("{} is not a T5 config", config_path.display()))?;

        // Teacher forcing and beam search both re-run the full decoder prefix.
        config.use_cache = false;

        info!(
            d_model = config.d_model,
            num_layers = config.num_layers,
            vocab_size = config.vocab_size,
            "Building seq2seq model"
        );

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = T5ForConditionalGeneration::load(vb, &config)
            .context("Failed to construct T5 model")?;

        load_weights(&varmap, weight_paths, device)?;
        info!(files = weight_paths.len(), vars = varmap.all_vars().len(), "Pre-trained weights loaded");

        let pad_id = config.pad_token_id as u32;
        let decoder_start_id = config.decoder_start_token_id.map_or(pad_id, |id| id as u32);

        Ok(Self { model, varmap, raw_config, decoder_start_id, pad_id, device: device.clone() })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl TrainableModel for Seq2SeqModel {
    fn trainable_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// T5's `decode` only returns logits for the last decoder position, so
    /// the loss is built one target position at a time: the decoder sees the
    /// shifted-label prefix up to `t` and is scored on label `t`.  Each
    /// position is back-propagated immediately and its gradients summed,
    /// which keeps at most one decoder graph alive.
    ///
    /// Position `t` is weighted by its share of the batch's target tokens,
    /// so the sum equals the token-level mean cross-entropy.
    fn loss_and_grads(&mut self, batch: &EncodedBatch) -> Result<StepOutput> {
        let rows = batch.batch_size();
        let total_targets = batch.target_token_count();
        anyhow::ensure!(total_targets > 0, "Batch has no target tokens");

        let input_ids = tensor_2d(&batch.input_ids, &self.device)?;
        let encoder_out = self.model.encode(&input_ids).context("Encoder forward failed")?;

        let decoder_ids = tensor_2d(&batch.decoder_input_ids(self.decoder_start_id, self.pad_id), &self.device)?;
        let vars = self.trainable_vars();

        let mut total_loss = 0f32;
        let mut grads: Option<GradStore> = None;

        for t in 0..batch.target_len() {
            let (active, targets): (Vec<u32>, Vec<u32>) = (0..rows)
                .filter_map(|r| {
                    let label = batch.labels[r][t];
                    (label != IGNORE_INDEX).then(|| (r as u32, label as u32))
                })
                .unzip();
            if active.is_empty() {
                continue;
            }

            let prefix = decoder_ids.narrow(1, 0, t + 1)?;
            let logits = self
                .model
                .decode(&prefix, &encoder_out)
                .with_context(|| format!("Decoder forward failed at position {t}"))?;

            let index = Tensor::new(active.as_slice(), &self.device)?;
            let logits = logits.index_select(&index, 0)?.to_dtype(DType::F32)?;
            let targets = Tensor::new(targets.as_slice(), &self.device)?;

            let weight = active.len() as f64 / total_targets as f64;
            let position_loss = (loss::cross_entropy(&logits, &targets)? * weight)?;
            total_loss += position_loss.to_scalar::<f32>()?;

            let step = position_loss
                .backward()
                .with_context(|| format!("Backward pass failed at position {t}"))?;
            grads = Some(match grads {
                None => step,
                Some(acc) => accumulate(acc, &step, &vars)?,
            });
        }

        let grads = grads.ok_or_else(|| anyhow!("No gradients were produced"))?;
        Ok(StepOutput { loss: total_loss, grads })
    }

    fn save_pretrained(&self, dir: &Path) -> Result<()> {
        let weights = dir.join(WEIGHTS_FILE);
        self.varmap
            .save(&weights)
            .with_context(|| format!("Failed to save weights to {}", weights.display()))?;

        let config = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(&self.raw_config)?;
        std::fs::write(&config, json)
            .with_context(|| format!("Failed to write {}", config.display()))?;
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Add the gradients in `step` into `acc`, variable by variable.
fn accumulate(mut acc: GradStore, step: &GradStore, vars: &[Var]) -> Result<GradStore> {
    for var in vars {
        let Some(g) = step.get(var.as_tensor()) else { continue };
        let sum = match acc.get(var.as_tensor()) {
            Some(prev) => (prev + g)?,
            None => g.clone(),
        };
        acc.insert(var.as_tensor(), sum);
    }
    Ok(acc)
}

pub(crate) fn tensor_2d(rows: &[Vec<u32>], device: &Device) -> Result<Tensor> {
    let width = rows.first().map_or(0, Vec::len);
    anyhow::ensure!(rows.iter().all(|r| r.len() == width), "Ragged batch");
    let flat: Vec<u32> = rows.iter().flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (rows.len(), width), device)?)
}

/// Copy every variable of `varmap` from the given safetensors files,
/// converting dtypes where the file differs.
fn load_weights(varmap: &VarMap, paths: &[PathBuf], device: &Device) -> Result<()> {
    let mut tensors: HashMap<String, Tensor> = HashMap::new();
    for path in paths {
        let shard = candle_core::safetensors::load(path, device)
            .with_context(|| format!("Failed to read weights from {}", path.display()))?;
        tensors.extend(shard);
    }

    let vars = varmap.data().lock().map_err(|_| anyhow!("VarMap lock poisoned"))?;
    for (name, var) in vars.iter() {
        let value = tensors
            .get(name)
            .or_else(|| weight_alias(name).and_then(|alias| tensors.get(alias)))
            .ok_or_else(|| anyhow!("Weight '{name}' missing from the base model files"))?;
        var.set(&value.to_dtype(var.dtype())?)
            .with_context(|| format!("Shape mismatch for weight '{name}'"))?;
    }
    Ok(())
}

/// Hugging Face T5 files store the tied token embedding once, as
/// `shared.weight`, while a freshly built model names it after the stack
/// that owns it.
fn weight_alias(name: &str) -> Option<&'static str> {
    name.ends_with("embed_tokens.weight").then_some("shared.weight")
}

/// Safetensors files of a model directory: the shards named by
/// `model.safetensors.index.json`, or the single `model.safetensors`.
pub fn collect_safetensor_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let index_path = dir.join("model.safetensors.index.json");
    if index_path.exists() {
        let json = std::fs::read_to_string(&index_path)
            .with_context(|| format!("Cannot read {}", index_path.display()))?;
        let index: serde_json::Value = serde_json::from_str(&json)?;
        let mut shards: Vec<String> = index["weight_map"]
            .as_object()
            .map(|m| m.values().filter_map(|v| v.as_str()).map(String::from).collect())
            .unwrap_or_default();
        shards.sort();
        shards.dedup();
        return Ok(shards.iter().map(|s| dir.join(s)).collect());
    }

    let single = dir.join(WEIGHTS_FILE);
    if single.exists() {
        return Ok(vec![single]);
    }

    anyhow::bail!("No safetensors weights found in {}", dir.display());
}
