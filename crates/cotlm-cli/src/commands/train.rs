//! `cotlm train`: fine-tune the base seq2seq model on the CoT corpus.
//!
//! The static corpus is always used.  A generated corpus is only added when
//! passed explicitly with `--extra-data`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use cotlm_core::{static_corpus, CotExample, GeneratedCorpus};
use cotlm_train::{
    describe_device, resolve_base_model, select_device, DeviceRequest, EncodeLimits, FineTuneConfig, FineTuner,
    Seq2SeqModel, Tokenizer,
};

use crate::config::{expand_path, AppConfig};

/// Per-invocation overrides of the `[training]` section.
#[derive(Debug, Clone, Default)]
pub struct TrainArgs {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub output_dir: Option<PathBuf>,
    pub base_model: Option<String>,
    pub extra_data: Option<PathBuf>,
    pub seed: Option<u64>,
    pub gpu: bool,
}

pub async fn run(args: TrainArgs, config: &AppConfig) -> Result<()> {
    let tc = &config.training;
    let base_model = args.base_model.clone().unwrap_or_else(|| tc.base_model.clone());
    let checkpoint_dir = args.output_dir.clone().unwrap_or_else(|| expand_path(&tc.checkpoint_dir));
    let ft_config = fine_tune_config(&args, config);

    let examples = training_examples(args.extra_data.as_deref())?;

    // ── Base model ────────────────────────────────────────────────────────────
    let files = resolve_base_model(&base_model)
        .await
        .with_context(|| format!("Failed to resolve base model '{base_model}'"))?;

    let device = select_device(DeviceRequest::new(args.gpu || config.device.prefer_gpu, config.device.cuda_device_id));
    info!(device = %describe_device(&device), base = %base_model, "Loading base model");

    let tokenizer = Tokenizer::from_file(&files.tokenizer)?;
    let model = Seq2SeqModel::from_pretrained(&files.config, &files.weights, &device)?;

    // ── Train ─────────────────────────────────────────────────────────────────
    let mut tuner = FineTuner::new(model, tokenizer, ft_config, base_model.as_str());
    let report = tuner.run(&examples, &checkpoint_dir).context("Training failed; no checkpoint was written")?;

    let losses: Vec<String> = report.epoch_losses.iter().map(|l| format!("{l:.4}")).collect();
    println!(
        "\nTraining complete!\n\
         Examples: {}\n\
         Steps: {}\n\
         Epoch losses: [{}]\n\
         Elapsed: {:.1} s\n\
         Saved to: {}\n\
         \n\
         Ask it questions with:\n  cotlm infer --model-dir {}",
        report.examples,
        report.total_steps,
        losses.join(", "),
        report.elapsed.as_secs_f64(),
        checkpoint_dir.display(),
        checkpoint_dir.display(),
    );

    Ok(())
}

fn fine_tune_config(args: &TrainArgs, config: &AppConfig) -> FineTuneConfig {
    let tc = &config.training;
    FineTuneConfig {
        epochs: args.epochs.unwrap_or(tc.epochs),
        batch_size: args.batch_size.unwrap_or(tc.batch_size),
        learning_rate: args.learning_rate.unwrap_or(tc.learning_rate),
        warmup_steps: tc.warmup_steps,
        seed: args.seed.or(tc.seed),
        limits: EncodeLimits {
            max_source_length: tc.max_source_length,
            max_target_length: tc.max_target_length,
        },
    }
}

/// The static corpus, followed by the parsed records of `extra` if given.
fn training_examples(extra: Option<&Path>) -> Result<Vec<CotExample>> {
    let mut examples = static_corpus();
    if let Some(path) = extra {
        let corpus = GeneratedCorpus::load(path)
            .with_context(|| format!("Failed to load extra training data from {}", path.display()))?;
        let added = corpus.training_examples();
        info!(
            path = %path.display(),
            added = added.len(),
            skipped = corpus.len() - added.len(),
            "Adding generated examples"
        );
        examples.extend(added);
    }
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotlm_core::parse_completion;
    use tempfile::TempDir;

    #[test]
    fn static_corpus_only_by_default() {
        let examples = training_examples(None).unwrap();
        assert_eq!(examples, static_corpus());
    }

    #[test]
    fn extra_data_is_appended_without_parse_failures() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("generated.json");
        let mut corpus = GeneratedCorpus::new();
        corpus.append(parse_completion("Question: Why?\nAnswer: Because."));
        corpus.append(parse_completion("I'm not sure."));
        corpus.persist(&path).unwrap();

        let examples = training_examples(Some(&path)).unwrap();
        assert_eq!(examples.len(), static_corpus().len() + 1);
        assert_eq!(examples.last().unwrap().question, "Why?");
    }

    #[test]
    fn missing_extra_data_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(training_examples(Some(&tmp.path().join("nope.json"))).is_err());
    }

    #[test]
    fn flags_override_config() {
        let config = AppConfig::default();
        let args = TrainArgs { epochs: Some(3), seed: Some(9), ..TrainArgs::default() };
        let ft = fine_tune_config(&args, &config);
        assert_eq!(ft.epochs, 3);
        assert_eq!(ft.seed, Some(9));
        assert_eq!(ft.batch_size, 2);
        assert_eq!(ft.limits.max_source_length, 512);
    }
}
