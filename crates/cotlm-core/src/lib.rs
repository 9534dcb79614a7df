//! # cotlm-core
//!
//! The Chain-of-Thought (CoT) text protocol shared by every stage of CoTLM.
//!
//! A generator model is asked to answer in a fixed shape:
//!
//! ```text
//! Question: <question>
//! Answer: Thought: <step-by-step reasoning>
//! Final Answer: <concise answer>
//! ```
//!
//! This crate owns both ends of that contract:
//!
//! | Module | Role |
//! |---|---|
//! | [`prompt`] | Meta-prompts that elicit the shape above |
//! | [`parser`] | Classifies raw completions into [`ParsedExample`] and extracts display answers |
//! | [`display`] | Removes `<think>…</think>` reasoning blocks emitted by reasoning models |
//! | [`corpus`] | The static curated corpus and the persisted generated corpus |
//! | [`session`] | Input classification for the interactive loops |
//!
//! The same parser runs at generation time and at inference time, so a model
//! trained on this corpus is read back through the exact rules that built it.

pub mod corpus;
pub mod display;
pub mod error;
pub mod example;
pub mod parser;
pub mod prompt;
pub mod session;

pub use corpus::{static_corpus, GeneratedCorpus};
pub use error::{CoreError, CoreResult};
pub use example::{CotExample, GeneratedRecord, ParsedExample};
pub use parser::{extract_final_answer, parse_completion};
pub use session::TurnInput;
