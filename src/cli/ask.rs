use super::{ParameterArgs, resolve_overrides};
use anyhow::{Result, bail};
use console::style;
use llm_endpoints_core::llm::{Dispatcher, Query};

/// Handle the ask command - single prompt, printed reply
pub async fn handle_ask_command(
    dispatcher: &Dispatcher,
    model: &str,
    prompt: &str,
    overrides: &ParameterArgs,
) -> Result<()> {
    if prompt.trim().is_empty() {
        bail!("No prompt provided. Use: llm-endpoints ask --model <MODEL> \"Your question here\"");
    }

    let provider = dispatcher.route(model)?;
    eprintln!(
        "{} {} / {}",
        style("Single Prompt Mode").blue().bold(),
        provider.name(),
        model
    );

    let query = Query::new(model, prompt)
        .with_system_prompt(overrides.system_prompt.clone())
        .with_parameters(resolve_overrides(dispatcher, model, overrides)?);

    let reply = dispatcher.query_with(&query).await?;
    println!("{reply}");
    Ok(())
}
