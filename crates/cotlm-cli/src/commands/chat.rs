//! `cotlm chat`: interactive questions answered by the LM Studio model.
//!
//! The client is connected once and borrowed by every turn; it is dropped
//! when the session returns, on every path.

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::info;

use cotlm_client::GenerationParams;

use super::remote::{connect, resolve_model, RemoteAnswerer};
use super::session::run_session;
use crate::config::AppConfig;

pub async fn run(model: Option<&str>, show_thought: bool, config: &AppConfig) -> Result<()> {
    let identifier = model.unwrap_or(&config.generator.model_identifier);

    let client = connect(&config.generator.base_url).await?;
    let handle = resolve_model(&client, identifier, &mut std::io::stderr())
        .await
        .context("Chat session aborted")?;

    let params = GenerationParams {
        temperature: config.generator.temperature,
        max_tokens: config.generator.chat_max_tokens,
    };
    let mut answerer = RemoteAnswerer::new(handle, params, config.generator.strip_reasoning);

    println!("\nCoTLM chat  |  model: {}  |  type 'exit' or 'quit' to leave\n", answerer.model_id());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let (end, stats) = run_session(stdin, &mut stdout, &mut answerer, show_thought).await?;
    info!(?end, answered = stats.answered, failed = stats.failed, "Session ended");
    Ok(())
}
