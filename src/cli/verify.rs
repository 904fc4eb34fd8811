use anyhow::{Result, bail};
use console::style;
use llm_endpoints_core::config::constants::env_vars;
use llm_endpoints_core::llm::Dispatcher;

/// Handle the verify command - canary prompt against every provider
pub async fn handle_verify_command(dispatcher: &Dispatcher) -> Result<()> {
    if dispatcher.providers().is_empty() {
        bail!(
            "No provider credentials found. Set {} or {} (or add them to .env)",
            env_vars::OPENAI_API_KEY,
            env_vars::GEMINI_API_KEY
        );
    }

    let reports = dispatcher.verify_all().await;
    let mut failed = Vec::new();
    for report in &reports {
        println!("{}", report.summary_line());
        if !report.passed {
            failed.push(report.provider.as_str());
        }
    }

    if !failed.is_empty() {
        bail!("verification failed for: {}", failed.join(", "));
    }

    println!(
        "{}",
        style(format!("✅ All {} providers are working", reports.len()))
            .green()
            .bold()
    );
    Ok(())
}
