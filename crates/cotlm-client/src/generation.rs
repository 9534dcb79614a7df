//! The generation run: one prompt per topic, every completion parsed and kept.
//!
//! Topics are processed strictly one after another.  A failed request is
//! logged and skipped; the run itself never fails, it just produces fewer
//! records.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use cotlm_core::{
    display::strip_think_blocks, parse_completion, prompt::build_generation_prompt,
    GeneratedCorpus, ParsedExample,
};

use crate::client::{GenerationParams, ModelHandle};

/// Parse one completion, removing `<think>` blocks first when asked to.
///
/// Stripping only decides the fields of a parsed example.  A parse failure
/// always keeps the completion exactly as the service returned it.
pub fn classify_completion(raw: &str, strip_reasoning: bool) -> ParsedExample {
    if !strip_reasoning {
        return parse_completion(raw);
    }
    match parse_completion(&strip_think_blocks(raw)) {
        ParsedExample::ParseFailure { .. } => ParsedExample::ParseFailure { raw_text: raw.to_string() },
        parsed => parsed,
    }
}

/// Ask `model` for one CoT example per topic, in topic order.
pub async fn generate_corpus(
    model: &ModelHandle<'_>,
    topics: &[String],
    params: &GenerationParams,
    strip_reasoning: bool,
) -> GeneratedCorpus {
    info!(model = %model.id(), topics = topics.len(), "Generating CoT examples");

    let pb = progress_bar(topics.len() as u64);
    let mut corpus = GeneratedCorpus::new();
    let mut failed = 0usize;

    for topic in topics {
        pb.set_message(topic.clone());
        let prompt = build_generation_prompt(topic);

        match model.respond(&prompt, params).await {
            Ok(raw) => {
                debug!(topic = %topic, raw = %raw, "Raw completion");
                let parsed = classify_completion(&raw, strip_reasoning);
                match &parsed {
                    ParsedExample::WellFormed(_) => info!(topic = %topic, "Example parsed"),
                    ParsedExample::MalformedParsed(_) => {
                        warn!(topic = %topic, "Example kept without Thought:/Final Answer: markers")
                    }
                    ParsedExample::ParseFailure { .. } => {
                        warn!(topic = %topic, "No Question:/Answer: envelope; raw text kept")
                    }
                }
                corpus.append(parsed);
            }
            Err(e) => {
                failed += 1;
                warn!(topic = %topic, error = %e, "Generation failed; skipping topic");
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!("{} generated, {failed} failed", corpus.len()));
    info!(records = corpus.len(), failed, "Generation run finished");
    corpus
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▓░");
    pb.set_style(style);
    pb
}
