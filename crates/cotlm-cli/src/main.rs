use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::train::TrainArgs;
use config::load_config;

/// CoTLM: generate chain-of-thought data, fine-tune a small model on it, and
/// ask it questions.
#[derive(Debug, Parser)]
#[command(name = "cotlm", version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Path to a custom configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log format: "pretty" (default) or "json".
    #[arg(long, global = true, default_value = "pretty", value_name = "FORMAT")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask the LM Studio model for new CoT examples and save them as JSON.
    Generate {
        /// Destination file (default from config).
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Model identifier loaded in LM Studio (default from config or
        /// LMSTUDIO_MODEL_IDENTIFIER).
        #[arg(long, short = 'm')]
        model: Option<String>,
    },

    /// Fine-tune the base model on the built-in CoT corpus.
    Train {
        /// Number of training epochs.
        #[arg(long)]
        epochs: Option<usize>,

        /// Examples per optimizer step.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Peak AdamW learning rate.
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Checkpoint directory to write.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Hugging Face repo id or local directory of the base model.
        #[arg(long)]
        base_model: Option<String>,

        /// A corpus written by `cotlm generate` to train on as well.
        #[arg(long, value_name = "FILE")]
        extra_data: Option<PathBuf>,

        /// Seed for the batch shuffle.
        #[arg(long)]
        seed: Option<u64>,

        /// Use GPU acceleration (CUDA/Metal).
        #[arg(long)]
        gpu: bool,
    },

    /// Ask the fine-tuned model questions interactively.
    Infer {
        /// Checkpoint directory (default from config).
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Print the full generated reasoning, not only the final answer.
        #[arg(long)]
        show_thought: bool,

        /// Use GPU acceleration (CUDA/Metal).
        #[arg(long)]
        gpu: bool,
    },

    /// Ask the LM Studio model questions interactively.
    Chat {
        /// Model identifier loaded in LM Studio.
        #[arg(long, short = 'm')]
        model: Option<String>,

        /// Print the full generated reasoning, not only the final answer.
        #[arg(long)]
        show_thought: bool,
    },

    /// Check that LM Studio is reachable and the configured model answers.
    Check {
        /// Model identifier loaded in LM Studio.
        #[arg(long, short = 'm')]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_format);

    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Generate { output, model } => {
            commands::generate::run(output.as_ref(), model.as_deref(), &config).await?;
        }
        Commands::Train { epochs, batch_size, learning_rate, output_dir, base_model, extra_data, seed, gpu } => {
            let args = TrainArgs { epochs, batch_size, learning_rate, output_dir, base_model, extra_data, seed, gpu };
            commands::train::run(args, &config).await?;
        }
        Commands::Infer { model_dir, show_thought, gpu } => {
            commands::infer::run(model_dir.as_ref(), show_thought, gpu, &config).await?;
        }
        Commands::Chat { model, show_thought } => {
            commands::chat::run(model.as_deref(), show_thought, &config).await?;
        }
        Commands::Check { model } => {
            commands::check::run(model.as_deref(), &config).await?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn train_flags_parse() {
        let cli = Cli::try_parse_from([
            "cotlm", "train", "--epochs", "3", "--extra-data", "gen.json", "--seed", "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Train { epochs, extra_data, seed, gpu, .. } => {
                assert_eq!(epochs, Some(3));
                assert_eq!(extra_data, Some(PathBuf::from("gen.json")));
                assert_eq!(seed, Some(7));
                assert!(!gpu);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["cotlm", "infer", "--show-thought", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, "json");
        assert!(matches!(cli.command, Commands::Infer { show_thought: true, .. }));
    }
}
