//! Canary self-test shared by every provider integration.
//!
//! A provider is considered working once its default model answers the canary
//! prompt with exactly the expected sentence. The check is a smoke test: a
//! mismatch or an error is reported, never raised.

use crate::config::constants::verification::{CANARY_PROMPT, EXPECTED_REPLY};
use crate::llm::error_display;
use crate::llm::provider::LLMProvider;
use tracing::{info, warn};

/// Outcome of one provider self-test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub provider: String,
    pub model: String,
    pub reply: Option<String>,
    pub error: Option<String>,
    pub passed: bool,
}

impl VerificationReport {
    /// One human-readable status line, styled for the terminal
    pub fn summary_line(&self) -> String {
        match (&self.reply, &self.error) {
            (_, Some(error)) => format!(
                "⛔ {}",
                error_display::format_llm_error(&self.provider, &format!("verification failed: {error}"))
            ),
            (Some(reply), None) if self.passed => format!(
                "✅ {}",
                error_display::format_llm_success(&self.provider, &format!("server response is '{reply}'"))
            ),
            (Some(reply), None) => format!(
                "⛔ {}",
                error_display::format_llm_warning(
                    &self.provider,
                    &format!("unexpected server response '{reply}', expected '{EXPECTED_REPLY}'")
                )
            ),
            (None, None) => format!(
                "⛔ {}",
                error_display::format_llm_error(&self.provider, "verification produced no reply")
            ),
        }
    }
}

/// Whether a reply satisfies the canary contract: an exact match, whitespace
/// included
pub fn reply_matches(reply: &str) -> bool {
    reply == EXPECTED_REPLY
}

/// Send the canary prompt to the provider's default model
pub async fn verify_provider<P>(provider: &P) -> VerificationReport
where
    P: LLMProvider + ?Sized,
{
    let model = provider.default_model().to_string();
    let name = provider.name().to_string();

    match provider.query(&model, CANARY_PROMPT, None).await {
        Ok(reply) => {
            let passed = reply_matches(&reply);
            if passed {
                info!(provider = %name, model = %model, "verification passed");
            } else {
                warn!(provider = %name, model = %model, reply = %reply, "verification reply mismatch");
            }
            VerificationReport {
                provider: name,
                model,
                reply: Some(reply),
                error: None,
                passed,
            }
        }
        Err(err) => {
            warn!(provider = %name, model = %model, error = %err, "verification request failed");
            VerificationReport {
                provider: name,
                model,
                reply: None,
                error: Some(err.to_string()),
                passed: false,
            }
        }
    }
}
