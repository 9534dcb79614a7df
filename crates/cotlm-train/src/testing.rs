//! Test models.
//!
//! [`FakeModel`] stands in for [`crate::model::Seq2SeqModel`]: the whole
//! "model" is one bias vector over the vocabulary, so every target token is
//! scored with the same logits.  It trains in microseconds and lets tests
//! inject failures at a chosen step or during save.
//!
//! [`write_tiny_t5`] writes a randomly initialised one-layer T5 in the same
//! layout as a downloaded base model, for tests of the real model path.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{loss, VarBuilder, VarMap};
use candle_transformers::models::t5::{Config as T5Config, T5ForConditionalGeneration};

use crate::dataset::{EncodedBatch, IGNORE_INDEX};
use crate::model::{StepOutput, TrainableModel, CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
use crate::tokenizer::tests::stub_tokenizer_path;

pub(crate) struct FakeModel {
    weight: Var,
    vocab: usize,
    fail_at_step: Option<usize>,
    fail_save: bool,
    pub(crate) steps: usize,
}

impl FakeModel {
    pub(crate) fn new(vocab: usize) -> Self {
        let weight = Var::zeros(vocab, DType::F32, &Device::Cpu).unwrap();
        Self { weight, vocab, fail_at_step: None, fail_save: false, steps: 0 }
    }

    /// Fails on the `step`-th call to `loss_and_grads` (1-based).
    pub(crate) fn failing_at(vocab: usize, step: usize) -> Self {
        Self { fail_at_step: Some(step), ..Self::new(vocab) }
    }

    pub(crate) fn failing_save(vocab: usize) -> Self {
        Self { fail_save: true, ..Self::new(vocab) }
    }

    pub(crate) fn weights(&self) -> Vec<f32> {
        self.weight.as_tensor().to_vec1().unwrap()
    }
}

impl TrainableModel for FakeModel {
    fn trainable_vars(&self) -> Vec<Var> {
        vec![self.weight.clone()]
    }

    fn loss_and_grads(&mut self, batch: &EncodedBatch) -> Result<StepOutput> {
        self.steps += 1;
        if self.fail_at_step == Some(self.steps) {
            bail!("injected failure at step {}", self.steps);
        }

        let targets: Vec<u32> = batch
            .labels
            .iter()
            .flatten()
            .filter(|&&l| l != IGNORE_INDEX)
            .map(|&l| l as u32)
            .collect();
        let logits = self
            .weight
            .as_tensor()
            .unsqueeze(0)?
            .broadcast_as((targets.len(), self.vocab))?
            .contiguous()?;
        let targets = Tensor::new(targets.as_slice(), &Device::Cpu)?;

        let loss = loss::cross_entropy(&logits, &targets)?;
        let value = loss.to_scalar::<f32>()?;
        let grads = loss.backward()?;
        Ok(StepOutput { loss: value, grads })
    }

    fn save_pretrained(&self, dir: &Path) -> Result<()> {
        let tensors = HashMap::from([("weight".to_string(), self.weight.as_tensor().clone())]);
        candle_core::safetensors::save(&tensors, dir.join(WEIGHTS_FILE))?;
        if self.fail_save {
            bail!("injected save failure");
        }
        std::fs::write(dir.join(CONFIG_FILE), "{}")?;
        Ok(())
    }
}

/// Write `config.json`, `model.safetensors` and `tokenizer.json` for a
/// random T5 with `d_model = 16` over the stub tokenizer's vocabulary.
pub(crate) fn write_tiny_t5(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let config = serde_json::json!({
        "vocab_size": 32,
        "d_model": 16,
        "d_kv": 4,
        "d_ff": 32,
        "num_layers": 1,
        "num_decoder_layers": 1,
        "num_heads": 4,
        "relative_attention_num_buckets": 8,
        "relative_attention_max_distance": 16,
        "dropout_rate": 0.0,
        "layer_norm_epsilon": 1e-6,
        "initializer_factor": 1.0,
        "feed_forward_proj": "relu",
        "tie_word_embeddings": true,
        "is_encoder_decoder": true,
        "use_cache": false,
        "pad_token_id": 0,
        "eos_token_id": 1,
        "decoder_start_token_id": 0
    });
    let parsed: T5Config = serde_json::from_value(config.clone())?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    T5ForConditionalGeneration::load(vb, &parsed)?;

    // Layer norm scales start at one in a real T5; the builder's default is zero.
    for (name, var) in varmap.data().lock().unwrap().iter() {
        if name.contains("layer_norm") {
            var.set(&var.as_tensor().ones_like()?)?;
        }
    }

    varmap.save(dir.join(WEIGHTS_FILE))?;
    std::fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(&config)?)?;
    std::fs::copy(stub_tokenizer_path(), dir.join(TOKENIZER_FILE))?;
    Ok(())
}
