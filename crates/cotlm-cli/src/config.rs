use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Environment variable naming the generator model, checked after every
/// other layer.
pub const MODEL_IDENTIFIER_ENV: &str = "LMSTUDIO_MODEL_IDENTIFIER";

pub const DEFAULT_MODEL_IDENTIFIER: &str = "deepseek/deepseek-r1-0528-qwen3-8b";

/// Full runtime configuration loaded from TOML + env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub generator: GeneratorConfig,
    pub generation: GenerationConfig,
    pub training: TrainingConfig,
    pub inference: InferenceConfig,
    pub device: DeviceConfig,
}

/// The LM Studio (OpenAI-compatible) service that writes examples.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model_identifier: String,
    pub temperature: f64,
    /// Token budget per generated example.
    pub max_tokens: usize,
    /// Token budget per answer in `cotlm chat`.
    pub chat_max_tokens: usize,
    /// Remove `<think>` blocks from completions before parsing.
    pub strip_reasoning: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    pub output_file: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrainingConfig {
    pub base_model: String,
    pub checkpoint_dir: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub warmup_steps: usize,
    pub max_source_length: usize,
    pub max_target_length: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    pub num_beams: usize,
    pub max_length: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub prefer_gpu: bool,
    pub cuda_device_id: usize,
}

fn default_topics() -> Vec<String> {
    [
        "calculating the area of a composite shape",
        "the process of photosynthesis",
        "historical significance of the Silk Road",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig {
                base_url: "http://localhost:1234".to_string(),
                model_identifier: DEFAULT_MODEL_IDENTIFIER.to_string(),
                temperature: 0.7,
                max_tokens: 512,
                chat_max_tokens: 768,
                strip_reasoning: true,
            },
            generation: GenerationConfig {
                output_file: "generated_training_data.json".to_string(),
                topics: default_topics(),
            },
            training: TrainingConfig {
                base_model: "google/flan-t5-small".to_string(),
                checkpoint_dir: "./reasoning_model_finetuned".to_string(),
                epochs: 10,
                batch_size: 2,
                learning_rate: 5e-5,
                warmup_steps: 0,
                max_source_length: 512,
                max_target_length: 512,
                seed: None,
            },
            inference: InferenceConfig { num_beams: 5, max_length: 256 },
            device: DeviceConfig { prefer_gpu: false, cuda_device_id: 0 },
        }
    }
}

/// Load configuration from:
/// 1. Built-in defaults
/// 2. `config/default.toml` (if present)
/// 3. A custom config file path (if provided)
/// 4. Environment variables prefixed with `COTLM_` (`COTLM_TRAINING__EPOCHS=3`)
/// 5. `LMSTUDIO_MODEL_IDENTIFIER`, if set
pub fn load_config(config_file: Option<&PathBuf>) -> Result<AppConfig, ConfigError> {
    let model_override = std::env::var(MODEL_IDENTIFIER_ENV).ok().filter(|v| !v.trim().is_empty());
    load_config_with(config_file, model_override)
}

/// [`load_config`] with the model identifier override passed explicitly.
pub fn load_config_with(
    config_file: Option<&PathBuf>,
    model_override: Option<String>,
) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("generator.base_url", "http://localhost:1234")?
        .set_default("generator.model_identifier", DEFAULT_MODEL_IDENTIFIER)?
        .set_default("generator.temperature", 0.7)?
        .set_default("generator.max_tokens", 512_i64)?
        .set_default("generator.chat_max_tokens", 768_i64)?
        .set_default("generator.strip_reasoning", true)?
        .set_default("generation.output_file", "generated_training_data.json")?
        .set_default("generation.topics", default_topics())?
        .set_default("training.base_model", "google/flan-t5-small")?
        .set_default("training.checkpoint_dir", "./reasoning_model_finetuned")?
        .set_default("training.epochs", 10_i64)?
        .set_default("training.batch_size", 2_i64)?
        .set_default("training.learning_rate", 5e-5)?
        .set_default("training.warmup_steps", 0_i64)?
        .set_default("training.max_source_length", 512_i64)?
        .set_default("training.max_target_length", 512_i64)?
        .set_default("inference.num_beams", 5_i64)?
        .set_default("inference.max_length", 256_i64)?
        .set_default("device.prefer_gpu", false)?
        .set_default("device.cuda_device_id", 0_i64)?
        .add_source(File::with_name("config/default").required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder
        .add_source(
            Environment::with_prefix("COTLM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("generator.model_identifier", model_override)?;

    builder.build()?.try_deserialize()
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(raw)
}
