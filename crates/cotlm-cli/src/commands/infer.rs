//! `cotlm infer`: interactive questions against the locally fine-tuned model.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::io::BufReader;
use tracing::info;

use cotlm_train::{checkpoint_exists, describe_device, select_device, BeamConfig, DeviceRequest, FineTunedModel};

use super::session::{run_session, Answerer};
use crate::config::{expand_path, AppConfig};

/// Runs beam search on a blocking thread so the session can still react to
/// Ctrl+C.  The model travels to the thread and back with each turn.
struct LocalAnswerer {
    model: Option<FineTunedModel>,
    beam: BeamConfig,
}

/// Raises the flag when the turn's future is dropped unfinished.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Answerer for LocalAnswerer {
    async fn answer(&mut self, question: &str) -> Result<String> {
        let mut model = self
            .model
            .take()
            .ok_or_else(|| anyhow!("The model was lost by an interrupted turn"))?;
        let beam = self.beam;
        let question = question.to_string();

        let cancel = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(cancel.clone());

        let (model, answer) = tokio::task::spawn_blocking(move || {
            let answer = model.generate_cancellable(&question, &beam, &cancel);
            (model, answer)
        })
        .await
        .context("Generation thread panicked")?;

        self.model = Some(model);
        answer
    }
}

pub async fn run(model_dir: Option<&PathBuf>, show_thought: bool, gpu: bool, config: &AppConfig) -> Result<()> {
    let model_dir = model_dir.cloned().unwrap_or_else(|| expand_path(&config.training.checkpoint_dir));

    if !checkpoint_exists(&model_dir) {
        println!(
            "Trained model not found at {}.\n\
             Train one first with:\n  cotlm train",
            model_dir.display()
        );
        return Ok(());
    }

    let device = select_device(DeviceRequest::new(gpu || config.device.prefer_gpu, config.device.cuda_device_id));
    info!(device = %describe_device(&device), path = %model_dir.display(), "Loading fine-tuned model");
    let model = FineTunedModel::load(&model_dir, &device)?;

    let mut answerer = LocalAnswerer {
        model: Some(model),
        beam: BeamConfig {
            num_beams: config.inference.num_beams,
            max_length: config.inference.max_length,
        },
    };

    println!("\nCoTLM  |  model: {}  |  type 'exit' or 'quit' to leave\n", model_dir.display());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let (end, stats) = run_session(stdin, &mut stdout, &mut answerer, show_thought).await?;
    info!(?end, answered = stats.answered, failed = stats.failed, "Session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dropped_turn_raises_cancel_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(CancelOnDrop(flag.clone()));
        assert!(flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn lost_model_fails_the_turn() {
        let mut answerer = LocalAnswerer { model: None, beam: BeamConfig::default() };
        assert!(answerer.answer("what is 2+2?").await.is_err());
    }

    #[tokio::test]
    async fn missing_checkpoint_is_reported_without_error() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("reasoning_model_finetuned");
        run(Some(&dir), false, false, &AppConfig::default()).await.unwrap();
    }
}
