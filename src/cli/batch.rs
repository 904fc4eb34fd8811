use super::{ParameterArgs, resolve_overrides};
use anyhow::{Context, Result, bail};
use console::style;
use llm_endpoints_core::llm::error_display;
use llm_endpoints_core::llm::{BatchOptions, Dispatcher, ExecutionStrategy, LLMError, SaveOptions};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything the batch command needs besides the dispatcher
#[derive(Debug, Clone)]
pub struct BatchArgs {
    pub model: String,
    pub file: Option<PathBuf>,
    pub prompts: Vec<String>,
    pub concurrent: bool,
    pub labels: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub file_name: Option<String>,
    pub no_save: bool,
    pub overrides: ParameterArgs,
}

/// One prompt per non-blank line
fn read_prompt_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Handle the batch command
///
/// Saving goes through the dispatcher's configured writer, which also rejects
/// a label count that differs from the prompt count before anything is sent.
pub async fn handle_batch_command(dispatcher: &Dispatcher, args: BatchArgs) -> Result<()> {
    let mut prompts = match &args.file {
        Some(path) => read_prompt_file(path)?,
        None => Vec::new(),
    };
    prompts.extend(args.prompts.iter().cloned());

    if prompts.is_empty() {
        bail!("No prompts provided. Pass them inline or with --file");
    }

    let provider = dispatcher.route(&args.model)?;
    let strategy = if args.concurrent {
        ExecutionStrategy::Concurrent
    } else {
        ExecutionStrategy::Sequential
    };
    eprintln!(
        "{} {} prompts, {} / {}, {:?}",
        style("Batch").blue().bold(),
        prompts.len(),
        provider.name(),
        args.model,
        strategy
    );

    let save = (!args.no_save).then(|| SaveOptions {
        directory: args.output_dir.clone(),
        file_name: args.file_name.clone(),
        labels: (!args.labels.is_empty()).then(|| args.labels.clone()),
    });
    let options = BatchOptions {
        strategy,
        system_prompt: args.overrides.system_prompt.clone(),
        parameters: resolve_overrides(dispatcher, &args.model, &args.overrides)?,
        save,
    };

    let results = match dispatcher
        .multiple_queries(&args.model, &prompts, &options)
        .await
    {
        Ok(results) => results,
        Err(LLMError::Batch(batch)) => {
            for failure in &batch.failures {
                eprintln!(
                    "⛔ {}",
                    error_display::format_llm_error(
                        provider.name(),
                        &format!("#{} '{}': {}", failure.index, failure.prompt, failure.error)
                    )
                );
            }
            bail!(
                "{} of {} prompts failed",
                batch.failures.len(),
                batch.total
            );
        }
        Err(err) => return Err(err.into()),
    };

    for (index, result) in results.iter().enumerate() {
        let label = args.labels.get(index).unwrap_or(&result.prompt);
        println!("{} {}", style(format!("{label}:")).cyan().bold(), result.reply);
    }

    if let Some(save) = &options.save {
        println!(
            "{} {}",
            style("Saved").green().bold(),
            dispatcher.results_path(save).display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prompt_file_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompts.txt");
        fs::write(&path, "What is AI?\n\n  2+2?  \n").unwrap();

        assert_eq!(
            read_prompt_file(&path).unwrap(),
            vec!["What is AI?".to_string(), "2+2?".to_string()]
        );
    }
}
