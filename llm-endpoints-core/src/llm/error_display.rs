//! Terminal styling for provider status lines
//!
//! Used by verification reports and the CLI. Error values themselves stay
//! plain text; styling is applied only when something is printed.

use crate::config::constants::providers;
use console::style;

pub fn style_llm_error(message: &str) -> String {
    style(message).red().to_string()
}

pub fn style_llm_warning(message: &str) -> String {
    style(message).yellow().to_string()
}

pub fn style_llm_success(message: &str) -> String {
    style(message).green().to_string()
}

/// Provider name with a per-vendor color
pub fn style_provider_name(provider: &str) -> String {
    let styled_name = match provider.to_lowercase().as_str() {
        providers::GEMINI => style(provider).blue(),
        providers::OPENAI => style(provider).magenta(),
        _ => style(provider).cyan(),
    };
    styled_name.bold().to_string()
}

pub fn format_llm_error(provider: &str, error: &str) -> String {
    format!("{} {}", style_provider_name(provider), style_llm_error(error))
}

pub fn format_llm_warning(provider: &str, warning: &str) -> String {
    format!(
        "{} {}",
        style_provider_name(provider),
        style_llm_warning(warning)
    )
}

pub fn format_llm_success(provider: &str, message: &str) -> String {
    format!(
        "{} {}",
        style_provider_name(provider),
        style_llm_success(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_lines_keep_provider_and_text() {
        let error = format_llm_error("gemini", "Connection failed");
        assert!(error.contains("gemini"));
        assert!(error.contains("Connection failed"));

        let success = format_llm_success("openai", "server response is 'This is a test!'");
        assert!(success.contains("openai"));
        assert!(success.contains("This is a test!"));
    }

    #[test]
    fn unknown_providers_are_still_styled() {
        assert!(style_provider_name("mistral").contains("mistral"));
    }
}
