//! llm-endpoints CLI
//!
//! Thin front end over `llm-endpoints-core`: loads configuration and
//! credentials, builds the dispatcher and runs one subcommand.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use cli::batch::BatchArgs;
use llm_endpoints_core::config::{ConfigManager, Credentials};
use llm_endpoints_core::llm::Dispatcher;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level);

    if args.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let workspace = match args.workspace {
        Some(workspace) => workspace,
        None => std::env::current_dir().context("cannot determine current dir")?,
    };

    if let Commands::Init { force } = args.command {
        return cli::handle_init_command(&workspace, force);
    }

    let manager = match &args.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load_from_workspace(&workspace)?,
    };
    debug!(config_path = ?manager.config_path(), "configuration resolved");
    let mut config = manager.config().clone();
    if let Commands::Batch {
        transpose: true, ..
    } = &args.command
    {
        config.results.transpose = true;
    }

    let credentials = Credentials::load(&config);
    let dispatcher = Dispatcher::from_config(&credentials, &config)
        .context("Failed to initialize providers")?;

    match args.command {
        Commands::Verify => cli::handle_verify_command(&dispatcher).await,
        Commands::Ask {
            model,
            overrides,
            prompt,
        } => cli::handle_ask_command(&dispatcher, &model, &prompt.join(" "), &overrides).await,
        Commands::Batch {
            model,
            file,
            concurrent,
            labels,
            output_dir,
            file_name,
            no_save,
            overrides,
            prompts,
            ..
        } => {
            let batch = BatchArgs {
                model,
                file,
                prompts,
                concurrent,
                labels,
                output_dir,
                file_name,
                no_save,
                overrides,
            };
            cli::handle_batch_command(&dispatcher, batch).await
        }
        Commands::Init { .. } => Ok(()),
    }
}
