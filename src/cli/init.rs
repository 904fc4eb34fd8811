use anyhow::{Context, Result};
use console::style;
use llm_endpoints_core::config::constants::config_files;
use llm_endpoints_core::config::loader::EndpointsConfig;
use std::path::Path;

/// Handle the init command
pub fn handle_init_command(workspace: &Path, force: bool) -> Result<()> {
    let path = workspace.join(config_files::FILE_NAME);

    let written = EndpointsConfig::create_sample_config(&path, force)
        .with_context(|| "failed to initialize configuration file")?;

    if written {
        println!(
            "{} {}",
            style("Created").green().bold(),
            path.display()
        );
    } else {
        println!(
            "{} {} already exists; pass --force to overwrite",
            style("Skipped").yellow().bold(),
            path.display()
        );
    }
    Ok(())
}
