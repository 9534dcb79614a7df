//! `cotlm check`: verify the generation service is reachable and the
//! configured model answers.

use std::io::Write;

use anyhow::{Context, Result};

use cotlm_client::{format_model_listing, GenerationParams};

use super::remote::{connect, resolve_model};
use crate::config::AppConfig;

const TEST_PROMPT: &str = "Hello! Who are you? Respond in one short sentence.";

const TEST_PARAMS: GenerationParams = GenerationParams { temperature: 0.7, max_tokens: 50 };

pub async fn run(model: Option<&str>, config: &AppConfig) -> Result<()> {
    run_with_output(model, config, &mut std::io::stdout()).await
}

async fn run_with_output<W: Write>(model: Option<&str>, config: &AppConfig, out: &mut W) -> Result<()> {
    let identifier = model.unwrap_or(&config.generator.model_identifier);
    let base_url = &config.generator.base_url;

    writeln!(out, "Connecting to {base_url} ...")?;
    let client = connect(base_url).await?;
    writeln!(out, "Connected.\n")?;

    let models = client.list_loaded_models().await?;
    write!(out, "{}", format_model_listing(&models, identifier))?;

    writeln!(out, "\nResolving model '{identifier}' ...")?;
    let handle = resolve_model(&client, identifier, &mut std::io::sink()).await?;

    writeln!(out, "Sending a test prompt ...")?;
    let reply = handle
        .respond(TEST_PROMPT, &TEST_PARAMS)
        .await
        .context("The model did not answer the test prompt")?;

    writeln!(out, "\nModel reply: {}", reply.trim())?;
    writeln!(out, "\nConnection check passed.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotlm_client::testing::{spawn_fake_service, unreachable_url, LOADED_MODEL, WELL_FORMED};

    fn config(url: String) -> AppConfig {
        let mut config = AppConfig::default();
        config.generator.base_url = url;
        config
    }

    #[tokio::test]
    async fn passes_against_a_loaded_model() {
        let config = config(spawn_fake_service().await);
        let mut out = Vec::new();

        run_with_output(Some(LOADED_MODEL), &config, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("^-- This appears to be a match"), "{out}");
        assert!(out.contains(&format!("Model reply: {WELL_FORMED}")));
        assert!(out.ends_with("Connection check passed.\n"));
    }

    #[tokio::test]
    async fn unknown_model_fails_after_listing() {
        let config = config(spawn_fake_service().await);
        let mut out = Vec::new();

        let err = run_with_output(Some("qwen/qwen3-4b"), &config, &mut out).await.unwrap_err();

        assert!(err.to_string().contains("qwen/qwen3-4b"));
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Currently loaded models:"));
        assert!(!out.contains("Connection check passed."));
    }

    #[tokio::test]
    async fn unreachable_service_fails() {
        let config = config(unreachable_url().await);
        let mut out = Vec::new();
        assert!(run_with_output(None, &config, &mut out).await.is_err());
        assert!(!String::from_utf8(out).unwrap().contains("Connected."));
    }
}
