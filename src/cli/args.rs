//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for llm-endpoints
#[derive(Parser, Debug)]
#[command(
    name = "llm-endpoints",
    version,
    about = "Query OpenAI and Gemini models through one interface, in batches, with CSV output"
)]
pub struct Cli {
    /// Workspace root directory; defaults to current directory
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Configuration file path (skips the workspace and home lookup)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Disable color output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send the canary prompt to every configured provider
    Verify,

    /// Single prompt; prints the model reply
    Ask {
        /// Model id, e.g. gpt-4o or gemini-2.0-flash
        #[arg(long, short)]
        model: String,

        #[command(flatten)]
        overrides: ParameterArgs,

        /// The prompt to send to the model
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Run a list of prompts against one model and save the replies
    Batch {
        /// Model id, e.g. gpt-4o or gemini-2.0-flash
        #[arg(long, short)]
        model: String,

        /// File with one prompt per line
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Run prompts through the bounded worker pool
        #[arg(long)]
        concurrent: bool,

        /// Labels for the saved rows, comma separated; defaults to the prompts
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,

        /// Results directory (overrides configuration)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Results file name; the .csv extension is enforced
        #[arg(long)]
        file_name: Option<String>,

        /// Write labels and replies as two rows
        #[arg(long)]
        transpose: bool,

        /// Print replies without writing a results file
        #[arg(long, conflicts_with_all = ["labels", "output_dir", "file_name", "transpose"])]
        no_save: bool,

        #[command(flatten)]
        overrides: ParameterArgs,

        /// Prompts given inline, after any read from --file
        prompts: Vec<String>,
    },

    /// Write a sample llm-endpoints.toml into the workspace
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

/// Per-call parameter overrides shared by `ask` and `batch`
#[derive(Args, Debug, Clone, Default)]
pub struct ParameterArgs {
    /// System prompt sent with every request
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Stream the reply and reassemble it
    #[arg(long)]
    pub stream: bool,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub top_p: Option<f32>,
}

impl ParameterArgs {
    pub fn is_empty(&self) -> bool {
        !self.stream && self.max_tokens.is_none() && self.temperature.is_none() && self.top_p.is_none()
    }
}
