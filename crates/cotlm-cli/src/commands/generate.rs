//! `cotlm generate`: ask the LM Studio model for fresh CoT examples and save
//! them as a JSON corpus.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use cotlm_client::{generate_corpus, GenerationParams};

use super::remote::{connect, resolve_model};
use crate::config::{expand_path, AppConfig};

pub async fn run(output: Option<&PathBuf>, model: Option<&str>, config: &AppConfig) -> Result<()> {
    let output = output.cloned().unwrap_or_else(|| expand_path(&config.generation.output_file));
    let identifier = model.unwrap_or(&config.generator.model_identifier);

    let client = connect(&config.generator.base_url).await?;
    let handle = resolve_model(&client, identifier, &mut std::io::stderr())
        .await
        .context("Generation run aborted")?;

    let params = GenerationParams {
        temperature: config.generator.temperature,
        max_tokens: config.generator.max_tokens,
    };

    info!(model = handle.id(), topics = config.generation.topics.len(), "Starting generation run");
    let corpus = generate_corpus(&handle, &config.generation.topics, &params, config.generator.strip_reasoning).await;

    save(&corpus, &output)
}

fn save(corpus: &cotlm_core::GeneratedCorpus, output: &Path) -> Result<()> {
    if corpus.is_empty() {
        println!("No data was generated.");
        return Ok(());
    }

    match corpus.persist(output) {
        Ok(()) => {
            println!("Successfully saved {} examples to {}", corpus.len(), output.display());
            Ok(())
        }
        Err(e) => {
            error!(path = %output.display(), error = %e, "Could not save generated corpus");
            Err(e).with_context(|| format!("{} examples were generated but not saved", corpus.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotlm_client::testing::{spawn_fake_service, LOADED_MODEL};
    use cotlm_core::{parse_completion, GeneratedCorpus};
    use tempfile::TempDir;

    fn fake_config(url: String, topics: &[&str]) -> AppConfig {
        let mut config = AppConfig::default();
        config.generator.base_url = url;
        config.generator.model_identifier = LOADED_MODEL.to_string();
        config.generation.topics = topics.iter().map(|t| t.to_string()).collect();
        config
    }

    #[tokio::test]
    async fn run_saves_every_parsed_topic() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("generated_training_data.json");
        let config = fake_config(spawn_fake_service().await, &["tides", "vague", "broken"]);

        run(Some(&path), None, &config).await.unwrap();

        let corpus = GeneratedCorpus::load(&path).unwrap();
        let kinds: Vec<_> = corpus.records().iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, ["well-formed", "parse-failure"]);
    }

    #[tokio::test]
    async fn unknown_model_aborts_before_writing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("generated_training_data.json");
        let config = fake_config(spawn_fake_service().await, &["tides"]);

        let err = run(Some(&path), Some("qwen/qwen3-4b"), &config).await.unwrap_err();

        assert!(err.to_string().contains("Generation run aborted"));
        assert!(format!("{err:#}").contains("qwen/qwen3-4b"));
        assert!(!path.exists());
    }

    #[test]
    fn empty_corpus_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("generated_training_data.json");
        save(&GeneratedCorpus::new(), &path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn corpus_is_saved() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("generated_training_data.json");
        let mut corpus = GeneratedCorpus::new();
        corpus.append(parse_completion("Question: Why?\nAnswer: Because."));
        save(&corpus, &path).unwrap();
        assert_eq!(GeneratedCorpus::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn unwritable_destination_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing").join("out.json");
        let mut corpus = GeneratedCorpus::new();
        corpus.append(parse_completion("I'm not sure."));
        let err = save(&corpus, &path).unwrap_err();
        assert!(err.to_string().contains("1 examples were generated"));
    }
}
