//! Shared plumbing for the subcommands that talk to LM Studio.

use std::io::Write;

use anyhow::{Context, Result};

use cotlm_client::{format_model_listing, GenerationParams, GeneratorClient, ModelHandle};
use cotlm_core::{display::strip_think_blocks, prompt::build_inference_prompt};

use super::session::Answerer;

pub async fn connect(base_url: &str) -> Result<GeneratorClient> {
    GeneratorClient::connect(base_url).await.with_context(|| {
        format!("Could not connect to the generation service at {base_url}. Is LM Studio running with its server enabled?")
    })
}

/// Resolve `identifier`, writing the loaded-model listing to `diag` when it
/// is not loaded.
pub async fn resolve_model<'a, W: Write>(
    client: &'a GeneratorClient,
    identifier: &str,
    diag: &mut W,
) -> Result<ModelHandle<'a>> {
    match client.get_model(identifier).await {
        Ok(handle) => Ok(handle),
        Err(e) => {
            if e.is_model_resolution() {
                if let Ok(models) = client.list_loaded_models().await {
                    write!(diag, "{}", format_model_listing(&models, identifier))?;
                    diag.flush()?;
                }
            }
            Err(e.into())
        }
    }
}

/// Answers session questions with the remote model.
pub struct RemoteAnswerer<'a> {
    handle: ModelHandle<'a>,
    params: GenerationParams,
    strip_reasoning: bool,
}

impl<'a> RemoteAnswerer<'a> {
    pub fn new(handle: ModelHandle<'a>, params: GenerationParams, strip_reasoning: bool) -> Self {
        Self { handle, params, strip_reasoning }
    }

    pub fn model_id(&self) -> &str {
        self.handle.id()
    }
}

impl Answerer for RemoteAnswerer<'_> {
    async fn answer(&mut self, question: &str) -> Result<String> {
        let raw = self.handle.respond(&build_inference_prompt(question), &self.params).await?;
        Ok(if self.strip_reasoning { strip_think_blocks(&raw) } else { raw })
    }
}
