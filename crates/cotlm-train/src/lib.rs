//! # cotlm-train
//!
//! Fine-tunes a small sequence-to-sequence model on CoT examples and runs it
//! locally.
//!
//! | Module | Role |
//! |---|---|
//! | [`base`] | Resolve the base model (local directory or Hugging Face repo) |
//! | [`tokenizer`] | `tokenizer.json` wrapper with pad/eos lookup |
//! | [`dataset`] | Encode examples into padded source/label batches |
//! | [`model`] | [`TrainableModel`] and its T5 implementation |
//! | [`schedule`] | Linear learning-rate schedule |
//! | [`trainer`] | The fine-tuning loop |
//! | [`checkpoint`] | Staged checkpoint save / existence check |
//! | [`decode`] | Model-agnostic beam search |
//! | [`inference`] | Load a checkpoint and answer questions |
//! | [`device`] | CPU / CUDA / Metal selection |

pub mod base;
pub mod checkpoint;
pub mod dataset;
pub mod decode;
pub mod device;
pub mod inference;
pub mod model;
pub mod schedule;
pub mod tokenizer;
pub mod trainer;

#[cfg(test)]
pub(crate) mod testing;

pub use base::{resolve_base_model, BaseModelFiles};
pub use checkpoint::{checkpoint_exists, save_checkpoint, TrainingState};
pub use dataset::{encode_corpus, EncodeLimits, EncodedBatch, EncodedCorpus, IGNORE_INDEX};
pub use decode::{beam_search, BeamConfig};
pub use device::{describe as describe_device, select_device, DeviceRequest};
pub use inference::FineTunedModel;
pub use model::{Seq2SeqModel, StepOutput, TrainableModel};
pub use schedule::LinearSchedule;
pub use tokenizer::Tokenizer;
pub use trainer::{FineTuneConfig, FineTuner, TrainingReport};
