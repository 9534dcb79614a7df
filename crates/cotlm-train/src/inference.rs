//! Local inference with a saved checkpoint.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{ops::log_softmax, VarBuilder};
use candle_transformers::models::t5::{Config as T5Config, T5ForConditionalGeneration};
use tracing::{debug, info};

use cotlm_core::prompt::format_training_input;

use crate::checkpoint::checkpoint_exists;
use crate::decode::{beam_search, BeamConfig};
use crate::model::{CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
use crate::tokenizer::Tokenizer;

/// A fine-tuned seq2seq model loaded read-only from a checkpoint directory.
pub struct FineTunedModel {
    model: T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    decoder_start_id: u32,
    device: Device,
}

impl FineTunedModel {
    pub fn load(dir: &Path, device: &Device) -> Result<Self> {
        if !checkpoint_exists(dir) {
            bail!("No trained model found at {}", dir.display());
        }

        let config_path = dir.join(CONFIG_FILE);
        let json = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Cannot read {}", config_path.display()))?;
        let mut config: T5Config = serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse {}", config_path.display()))?;
        config.use_cache = false;

        let weights = dir.join(WEIGHTS_FILE);
        // SAFETY: the checkpoint is not modified while it is mapped; training
        // and inference never run at the same time.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights], DType::F32, device)? };
        let model = T5ForConditionalGeneration::load(vb, &config)
            .with_context(|| format!("Failed to load model from {}", dir.display()))?;

        let tokenizer = Tokenizer::from_file(&dir.join(TOKENIZER_FILE))?;
        let decoder_start_id = config
            .decoder_start_token_id
            .map_or(config.pad_token_id as u32, |id| id as u32);

        info!(path = %dir.display(), "Fine-tuned model loaded");
        Ok(Self { model, tokenizer, decoder_start_id, device: device.clone() })
    }

    /// Answer `question` with beam search.  Deterministic for fixed weights.
    ///
    /// The model sees the question in the same `question: …` form it was
    /// trained on.  The returned text is the full decoded output, reasoning
    /// included.
    pub fn generate(&mut self, question: &str, beam: &BeamConfig) -> Result<String> {
        self.generate_cancellable(question, beam, &AtomicBool::new(false))
    }

    /// [`Self::generate`] that gives up between decoder steps once `cancel`
    /// is set.
    pub fn generate_cancellable(&mut self, question: &str, beam: &BeamConfig, cancel: &AtomicBool) -> Result<String> {
        let mut input = self.tokenizer.encode(&format_training_input(question), true)?;
        let eos = self.tokenizer.eos_token_id();
        if input.last() != Some(&eos) {
            input.push(eos);
        }

        let input = Tensor::new(input.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_out = self.model.encode(&input).context("Encoder forward failed")?;

        let model = &mut self.model;
        let device = &self.device;
        let tokens = beam_search(beam, self.decoder_start_id, eos, |prefixes| {
            if cancel.load(Ordering::Relaxed) {
                bail!("Generation interrupted");
            }
            let n = prefixes.len();
            let width = prefixes[0].len();
            let flat: Vec<u32> = prefixes.iter().flatten().copied().collect();
            let decoder_ids = Tensor::from_vec(flat, (n, width), device)?;

            let (_, src_len, hidden) = encoder_out.dims3()?;
            let encoder_rep = encoder_out.broadcast_as((n, src_len, hidden))?.contiguous()?;

            let logits = model.decode(&decoder_ids, &encoder_rep)?;
            let log_probs = log_softmax(&logits.to_dtype(DType::F32)?, D::Minus1)?;
            Ok(log_probs.to_vec2::<f32>()?)
        })?;

        debug!(generated = tokens.len(), "Beam search finished");
        self.tokenizer.decode(&tokens, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::EncodeLimits;
    use crate::model::Seq2SeqModel;
    use crate::testing::write_tiny_t5;
    use crate::tokenizer::tests::stub_tokenizer;
    use crate::trainer::{FineTuneConfig, FineTuner};
    use cotlm_core::CotExample;
    use tempfile::TempDir;

    const BEAM: BeamConfig = BeamConfig { num_beams: 2, max_length: 6 };

    /// Fine-tune a random one-layer T5 and return its checkpoint directory.
    fn fine_tuned(tmp: &TempDir) -> (std::path::PathBuf, Vec<f32>) {
        let base = tmp.path().join("base");
        write_tiny_t5(&base).unwrap();
        let model = Seq2SeqModel::from_pretrained(
            &base.join(CONFIG_FILE),
            &[base.join(WEIGHTS_FILE)],
            &Device::Cpu,
        )
        .unwrap();

        let config = FineTuneConfig {
            epochs: 8,
            batch_size: 2,
            learning_rate: 1e-2,
            warmup_steps: 0,
            seed: Some(1),
            limits: EncodeLimits { max_source_length: 16, max_target_length: 16 },
        };
        let examples = [
            CotExample::new("what is 2+2?", "Thought: add 2 and 2. Final Answer: 4"),
            CotExample::new("the capital of France?", "Thought: Paris is the capital. Final Answer: Paris"),
        ];

        let dir = tmp.path().join("reasoning_model_finetuned");
        let report = FineTuner::new(model, stub_tokenizer(), config, "tiny-t5").run(&examples, &dir).unwrap();
        (dir, report.epoch_losses)
    }

    #[test]
    fn fine_tune_then_answer_from_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let (dir, losses) = fine_tuned(&tmp);

        assert_eq!(losses.len(), 8);
        assert!(losses.iter().all(|l| l.is_finite()));
        assert!(losses[7] < losses[0], "loss did not decrease: {losses:?}");
        assert!(checkpoint_exists(&dir));

        let mut model = FineTunedModel::load(&dir, &Device::Cpu).unwrap();
        let first = model.generate("what is 2+2?", &BEAM).unwrap();
        let second = model.generate("what is 2+2?", &BEAM).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cancelled_generation_stops() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("base");
        write_tiny_t5(&base).unwrap();
        let mut model = FineTunedModel::load(&base, &Device::Cpu).unwrap();

        let err = model
            .generate_cancellable("what is 2+2?", &BEAM, &AtomicBool::new(true))
            .unwrap_err();
        assert_eq!(err.to_string(), "Generation interrupted");
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = FineTunedModel::load(&tmp.path().join("reasoning_model_finetuned"), &Device::Cpu)
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("No trained model found"));
    }
}
