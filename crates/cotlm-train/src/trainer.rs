//! The fine-tuning loop.
//!
//! One run is: encode the corpus → for a fixed number of epochs, visit every
//! batch once in shuffled order (loss, gradients, AdamW step, linear LR
//! decay) → save the checkpoint.  There is no early stopping and no
//! validation split; per-epoch mean losses are reported for observability.
//!
//! Any error before the checkpoint swap aborts the run and leaves the
//! destination exactly as it was.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::info;

use cotlm_core::CotExample;

use crate::checkpoint::{save_checkpoint, TrainingState};
use crate::dataset::{encode_corpus, EncodeLimits};
use crate::model::TrainableModel;
use crate::schedule::LinearSchedule;
use crate::tokenizer::Tokenizer;

// ── Config ────────────────────────────────────────────────────────────────────

/// Hyper-parameters of a fine-tuning run.
#[derive(Debug, Clone)]
pub struct FineTuneConfig {
    /// Full passes over the corpus.
    pub epochs: usize,
    /// Examples per optimizer step.
    pub batch_size: usize,
    /// Peak AdamW learning rate.
    pub learning_rate: f64,
    /// Steps of linear warmup before the linear decay.
    pub warmup_steps: usize,
    /// Seed for the batch-order shuffle; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub limits: EncodeLimits,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 2,
            learning_rate: 5e-5,
            warmup_steps: 0,
            seed: None,
            limits: EncodeLimits::default(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Mean batch loss of each epoch, in epoch order.
    pub epoch_losses: Vec<f32>,
    pub total_steps: usize,
    pub examples: usize,
    pub elapsed: Duration,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}

// ── FineTuner ─────────────────────────────────────────────────────────────────

pub struct FineTuner<M: TrainableModel> {
    model: M,
    tokenizer: Tokenizer,
    config: FineTuneConfig,
    base_model: String,
}

impl<M: TrainableModel> FineTuner<M> {
    /// `base_model` is recorded in the checkpoint's training state.
    pub fn new(model: M, tokenizer: Tokenizer, config: FineTuneConfig, base_model: impl Into<String>) -> Self {
        Self { model, tokenizer, config, base_model: base_model.into() }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Train on `examples` and save the result to `checkpoint_dir`.
    pub fn run(&mut self, examples: &[CotExample], checkpoint_dir: &Path) -> Result<TrainingReport> {
        ensure!(self.config.epochs > 0, "Epoch count must be positive");
        ensure!(self.config.batch_size > 0, "Batch size must be positive");

        let corpus = encode_corpus(examples, &self.tokenizer, &self.config.limits)
            .context("Failed to encode training corpus")?;
        let batches = corpus.batches(self.config.batch_size);

        let total_steps = batches.len() * self.config.epochs;
        let schedule = LinearSchedule::new(self.config.learning_rate, self.config.warmup_steps, total_steps);

        let params = ParamsAdamW { lr: schedule.lr_at(0), ..Default::default() };
        let mut optimizer = AdamW::new(self.model.trainable_vars(), params)
            .context("Failed to create AdamW optimiser")?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order: Vec<usize> = (0..batches.len()).collect();

        info!(
            examples = examples.len(),
            batches = batches.len(),
            epochs = self.config.epochs,
            total_steps,
            learning_rate = self.config.learning_rate,
            "Starting fine-tuning"
        );

        let pb = progress_bar(total_steps as u64);
        let start = Instant::now();
        let mut step = 0usize;
        let mut source_tokens = 0usize;
        let mut epoch_losses = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0f32;

            for &b in &order {
                let batch = &batches[b];
                let out = self
                    .model
                    .loss_and_grads(batch)
                    .with_context(|| format!("Training step {} failed", step + 1))?;
                ensure!(out.loss.is_finite(), "Loss diverged at step {} ({})", step + 1, out.loss);

                optimizer.set_learning_rate(schedule.lr_at(step));
                optimizer
                    .step(&out.grads)
                    .with_context(|| format!("Optimizer step {} failed", step + 1))?;

                loss_sum += out.loss;
                source_tokens += batch.source_token_count();
                step += 1;

                pb.set_message(format!("epoch {}/{} loss {:.4}", epoch + 1, self.config.epochs, out.loss));
                pb.inc(1);
            }

            let mean = loss_sum / batches.len() as f32;
            info!(epoch = epoch + 1, loss = mean, "Epoch complete");
            epoch_losses.push(mean);
        }

        let elapsed = start.elapsed();
        pb.finish_with_message(format!(
            "Training complete, final loss {:.4}",
            epoch_losses.last().copied().unwrap_or(f32::NAN)
        ));
        info!(
            steps = step,
            source_tokens,
            elapsed = format!("{:.1}s", elapsed.as_secs_f64()),
            "Training finished"
        );

        let state = TrainingState {
            base_model: self.base_model.clone(),
            examples: examples.len(),
            epochs: self.config.epochs,
            total_steps: step,
            epoch_losses: epoch_losses.clone(),
        };
        save_checkpoint(&self.model, &self.tokenizer, &state, checkpoint_dir)
            .with_context(|| format!("Failed to save checkpoint to {}", checkpoint_dir.display()))?;

        Ok(TrainingReport { epoch_losses, total_steps: step, examples: examples.len(), elapsed })
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▓░");
    pb.set_style(style);
    pb.set_message("Fine-tuning");
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{checkpoint_exists, load_training_state};
    use crate::model::WEIGHTS_FILE;
    use crate::testing::FakeModel;
    use crate::tokenizer::tests::stub_tokenizer;
    use cotlm_core::static_corpus;
    use tempfile::TempDir;

    fn config(epochs: usize) -> FineTuneConfig {
        FineTuneConfig { epochs, learning_rate: 0.1, seed: Some(7), ..FineTuneConfig::default() }
    }

    fn tuner(model: FakeModel, epochs: usize) -> FineTuner<FakeModel> {
        let tok = stub_tokenizer();
        FineTuner::new(model, tok, config(epochs), "stub")
    }

    fn vocab() -> usize {
        stub_tokenizer().vocab_size()
    }

    #[test]
    fn reports_one_loss_per_epoch_and_saves() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("reasoning_model_finetuned");
        let mut t = tuner(FakeModel::new(vocab()), 3);

        let report = t.run(&static_corpus(), &dir).unwrap();

        assert_eq!(report.epoch_losses.len(), 3);
        // 7 examples, batch size 2 → 4 batches per epoch.
        assert_eq!(report.total_steps, 12);
        assert_eq!(t.model().steps, 12);
        assert!(checkpoint_exists(&dir));

        let state = load_training_state(&dir).unwrap();
        assert_eq!(state.epoch_losses, report.epoch_losses);
        assert_eq!(state.examples, 7);
    }

    #[test]
    fn loss_goes_down() {
        let tmp = TempDir::new().unwrap();
        let mut t = tuner(FakeModel::new(vocab()), 5);
        let report = t.run(&static_corpus(), &tmp.path().join("ckpt")).unwrap();

        let first = report.epoch_losses[0];
        let last = report.final_loss().unwrap();
        assert!(last < first, "loss did not decrease: {:?}", report.epoch_losses);
    }

    #[test]
    fn parameters_are_updated() {
        let tmp = TempDir::new().unwrap();
        let mut t = tuner(FakeModel::new(vocab()), 1);
        t.run(&static_corpus(), &tmp.path().join("ckpt")).unwrap();
        assert!(t.model().weights().iter().any(|w| *w != 0.0));
    }

    #[test]
    fn failed_step_writes_no_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        let mut t = tuner(FakeModel::failing_at(vocab(), 6), 3);

        let err = t.run(&static_corpus(), &dir).unwrap_err();
        assert!(format!("{err:#}").contains("injected failure"));
        assert!(!dir.exists());
        assert!(!tmp.path().join("ckpt.partial").exists());
    }

    #[test]
    fn failed_run_keeps_prior_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        tuner(FakeModel::new(vocab()), 1).run(&static_corpus(), &dir).unwrap();
        let before = std::fs::read(dir.join(WEIGHTS_FILE)).unwrap();

        let result = tuner(FakeModel::failing_at(vocab(), 2), 2).run(&static_corpus(), &dir);
        assert!(result.is_err());
        assert_eq!(std::fs::read(dir.join(WEIGHTS_FILE)).unwrap(), before);
        assert_eq!(load_training_state(&dir).unwrap().epochs, 1);
    }

    #[test]
    fn empty_corpus_is_a_training_failure() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        let result = tuner(FakeModel::new(vocab()), 1).run(&[], &dir);
        assert!(result.is_err());
        assert!(!dir.exists());
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let tmp = TempDir::new().unwrap();
        let a = tuner(FakeModel::new(vocab()), 2).run(&static_corpus(), &tmp.path().join("a")).unwrap();
        let b = tuner(FakeModel::new(vocab()), 2).run(&static_corpus(), &tmp.path().join("b")).unwrap();
        assert_eq!(a.epoch_losses, b.epoch_losses);
    }
}
