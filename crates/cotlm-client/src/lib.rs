//! # cotlm-client
//!
//! Talks to a locally served generator model over the OpenAI-compatible REST
//! API exposed by LM Studio (`/v1/models`, `/v1/chat/completions`), and runs
//! the topic → completion → parsed example loop that fills a
//! [`cotlm_core::GeneratedCorpus`].

pub mod client;
pub mod error;
pub mod generation;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{format_model_listing, GenerationParams, GeneratorClient, ModelHandle};
pub use error::{ClientError, ClientResult};
pub use generation::{classify_completion, generate_corpus};
pub use types::ModelInfo;
