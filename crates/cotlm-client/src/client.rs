use std::fmt::Write as _;

use tracing::{debug, info};

use crate::{
    error::{ClientError, ClientResult},
    types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelInfo, ModelList},
};

const MODELS_PATH: &str = "/v1/models";
const CHAT_PATH: &str = "/v1/chat/completions";

/// Sampling parameters sent with every request of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 512 }
    }
}

// ─── GeneratorClient ──────────────────────────────────────────────────────────

/// Connection to an OpenAI-compatible generation service such as LM Studio.
///
/// The client is an ordinary owned value: callers create it once per run and
/// lend it to whatever needs it.  Dropping it closes the connection pool.
#[derive(Debug, Clone)]
pub struct GeneratorClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeneratorClient {
    /// Build a client for `base_url` and probe the service once.
    ///
    /// Fails with [`ClientError::Connectivity`] when nothing answers at
    /// `base_url`.
    pub async fn connect(base_url: &str) -> ClientResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .user_agent(concat!("cotlm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let client = Self { http, base_url };
        let models = client.list_loaded_models().await?;
        info!(url = %client.base_url, loaded = models.len(), "Connected to generation service");
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Models currently loaded by the service.  May be empty.
    pub async fn list_loaded_models(&self) -> ClientResult<Vec<ModelInfo>> {
        let url = format!("{}{MODELS_PATH}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ClientError::Connectivity { url: url.clone(), source })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::GenerationCall { status: status.as_u16(), body });
        }

        let list: ModelList = resp
            .json()
            .await
            .map_err(|e| ClientError::MalformedResponse(format!("model list: {e}")))?;
        Ok(list.data)
    }

    /// Resolve `identifier` to a loaded model.
    ///
    /// Matching is exact up to ASCII case.  On a miss the error carries the
    /// ids of every loaded model so the operator can correct the identifier.
    pub async fn get_model(&self, identifier: &str) -> ClientResult<ModelHandle<'_>> {
        let models = self.list_loaded_models().await?;
        match models.iter().find(|m| m.id.eq_ignore_ascii_case(identifier)) {
            Some(m) => {
                debug!(model = %m.id, "Model resolved");
                Ok(ModelHandle { client: self, id: m.id.clone() })
            }
            None => Err(ClientError::ModelResolution {
                identifier: identifier.to_string(),
                loaded: models.into_iter().map(|m| m.id).collect(),
            }),
        }
    }
}

// ─── ModelHandle ──────────────────────────────────────────────────────────────

/// A resolved model on a connected service.  Borrows the client, so it cannot
/// outlive the connection it was resolved on.
#[derive(Debug, Clone)]
pub struct ModelHandle<'a> {
    client: &'a GeneratorClient,
    id: String,
}

impl ModelHandle<'_> {
    /// The model id as reported by the service.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send `prompt` as a single user message and return the completion text.
    pub async fn respond(&self, prompt: &str, params: &GenerationParams) -> ClientResult<String> {
        let request = ChatCompletionRequest {
            model: self.id.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: false,
        };

        let url = format!("{}{CHAT_PATH}", self.client.base_url);
        debug!(model = %self.id, prompt_chars = prompt.len(), "Sending chat completion");

        let resp = self.client.http.post(&url).json(&request).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::GenerationCall { status: status.as_u16(), body });
        }

        let completion: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::MalformedResponse(format!("chat completion: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::MalformedResponse("response has no message content".into()))
    }
}

// ─── Diagnostics ──────────────────────────────────────────────────────────────

/// Human-readable listing of loaded models, marking the ones whose id
/// contains `wanted` (ASCII case-insensitive).
pub fn format_model_listing(models: &[ModelInfo], wanted: &str) -> String {
    if models.is_empty() {
        return "No models are currently loaded. Load the model in LM Studio and try again.\n"
            .to_string();
    }

    let wanted = wanted.to_ascii_lowercase();
    let mut out = String::from("Currently loaded models:\n");
    for (i, m) in models.iter().enumerate() {
        let _ = writeln!(out, "  {}. ID: {}, Owner: {}", i + 1, m.id, m.owned_by);
        if !wanted.is_empty() && m.id.to_ascii_lowercase().contains(&wanted) {
            out.push_str("     ^-- This appears to be a match\n");
        }
    }
    out
}
