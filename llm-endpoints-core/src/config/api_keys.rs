//! API key management: environment variables first, then `.env` values, then
//! configuration file values.
//!
//! Credentials are resolved once at startup into an explicit [`Credentials`]
//! value that is handed to the dispatcher. Nothing in the provider code reads
//! the environment.

use crate::config::constants::{env_vars, providers};
use crate::config::loader::EndpointsConfig;
use anyhow::Result;
use std::env;
use std::fmt;
use tracing::{debug, info, warn};

/// Where to look for each provider's secrets
#[derive(Debug, Clone)]
pub struct ApiKeySources {
    /// OpenAI API key environment variables, in priority order
    pub openai_env: Vec<String>,
    /// OpenAI organization environment variables, in priority order
    pub openai_organization_env: Vec<String>,
    /// Gemini API key environment variables, in priority order
    pub gemini_env: Vec<String>,
    pub openai_config: Option<String>,
    pub openai_organization_config: Option<String>,
    pub gemini_config: Option<String>,
}

impl Default for ApiKeySources {
    fn default() -> Self {
        Self {
            openai_env: vec![
                env_vars::OPENAI_API_KEY.to_string(),
                env_vars::LEGACY_API_KEY.to_string(),
            ],
            openai_organization_env: vec![
                env_vars::OPENAI_ORGANIZATION.to_string(),
                env_vars::LEGACY_ORGANIZATION_ID.to_string(),
            ],
            gemini_env: vec![
                env_vars::GEMINI_API_KEY.to_string(),
                env_vars::GOOGLE_API_KEY.to_string(),
            ],
            openai_config: None,
            openai_organization_config: None,
            gemini_config: None,
        }
    }
}

impl ApiKeySources {
    /// Default environment names plus the key values found in the config file
    pub fn from_config(config: &EndpointsConfig) -> Self {
        Self {
            openai_config: config.openai.api_key.clone(),
            openai_organization_config: config.openai.organization.clone(),
            gemini_config: config.gemini.api_key.clone(),
            ..Self::default()
        }
    }
}

/// OpenAI organization-account credentials
#[derive(Clone, PartialEq, Eq)]
pub struct OpenAICredentials {
    pub api_key: String,
    pub organization: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct GeminiCredentials {
    pub api_key: String,
}

/// Secrets for every provider that could be resolved at startup
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub openai: Option<OpenAICredentials>,
    pub gemini: Option<GeminiCredentials>,
}

fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}***")
}

impl fmt::Debug for OpenAICredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAICredentials")
            .field("api_key", &redact(&self.api_key))
            .field("organization", &self.organization)
            .finish()
    }
}

impl fmt::Debug for GeminiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiCredentials")
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai", &self.openai)
            .field("gemini", &self.gemini)
            .finish()
    }
}

impl Credentials {
    /// Load `.env`, then resolve every provider from the configured sources
    pub fn load(config: &EndpointsConfig) -> Self {
        // A broken .env is reported but never fatal
        let _ = load_dotenv();
        Self::from_sources(&ApiKeySources::from_config(config))
    }

    /// Resolve credentials; a provider without a key is left out
    pub fn from_sources(sources: &ApiKeySources) -> Self {
        let openai = match get_api_key(providers::OPENAI, sources) {
            Ok(api_key) => Some(OpenAICredentials {
                api_key,
                organization: first_env(&sources.openai_organization_env)
                    .or_else(|| non_empty(sources.openai_organization_config.as_ref())),
            }),
            Err(err) => {
                debug!(error = %err, "OpenAI credentials unavailable");
                None
            }
        };

        let gemini = match get_api_key(providers::GEMINI, sources) {
            Ok(api_key) => Some(GeminiCredentials { api_key }),
            Err(err) => {
                debug!(error = %err, "Gemini credentials unavailable");
                None
            }
        };

        Self { openai, gemini }
    }

    /// Provider names that have credentials
    pub fn configured_providers(&self) -> Vec<&'static str> {
        let mut configured = Vec::new();
        if self.openai.is_some() {
            configured.push(providers::OPENAI);
        }
        if self.gemini.is_some() {
            configured.push(providers::GEMINI);
        }
        configured
    }
}

/// Load environment variables from a `.env` file in the current directory
///
/// A missing file is fine; a file that exists but cannot be parsed is logged.
pub fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            info!(path = %path.display(), "loaded environment variables");
            Ok(())
        }
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(error = %e, "failed to load .env file");
            Err(e.into())
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

fn first_env(names: &[String]) -> Option<String> {
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|value| !value.is_empty()))
}

/// Get the API key for a provider with the env → config fallback
pub fn get_api_key(provider: &str, sources: &ApiKeySources) -> Result<String> {
    match provider.to_lowercase().as_str() {
        providers::OPENAI => get_api_key_with_fallback(
            &sources.openai_env,
            sources.openai_config.as_ref(),
            "OpenAI",
        ),
        providers::GEMINI => get_api_key_with_fallback(
            &sources.gemini_env,
            sources.gemini_config.as_ref(),
            "Gemini",
        ),
        _ => Err(anyhow::anyhow!("Unsupported provider: {}", provider)),
    }
}

fn get_api_key_with_fallback(
    env_vars: &[String],
    config_value: Option<&String>,
    provider_name: &str,
) -> Result<String> {
    if let Some(key) = first_env(env_vars) {
        return Ok(key);
    }

    if let Some(key) = non_empty(config_value) {
        return Ok(key);
    }

    Err(anyhow::anyhow!(
        "No API key found for {} provider. Set {} (or add it to .env) or configure api_key in llm-endpoints.toml",
        provider_name,
        env_vars.join(" or ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated_sources(prefix: &str) -> ApiKeySources {
        ApiKeySources {
            openai_env: vec![format!("{prefix}_OPENAI_KEY")],
            openai_organization_env: vec![format!("{prefix}_OPENAI_ORG")],
            gemini_env: vec![
                format!("{prefix}_GEMINI_KEY"),
                format!("{prefix}_GOOGLE_KEY"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_env_takes_priority_over_config() {
        unsafe {
            env::set_var("LLMEP_PRIO_OPENAI_KEY", "env-key");
        }

        let sources = ApiKeySources {
            openai_config: Some("config-key".to_string()),
            ..isolated_sources("LLMEP_PRIO")
        };
        assert_eq!(get_api_key("openai", &sources).unwrap(), "env-key");

        unsafe {
            env::remove_var("LLMEP_PRIO_OPENAI_KEY");
        }
    }

    #[test]
    fn test_gemini_falls_back_to_google_key() {
        unsafe {
            env::set_var("LLMEP_GOOGLE_GOOGLE_KEY", "google-key");
        }

        let sources = isolated_sources("LLMEP_GOOGLE");
        assert_eq!(get_api_key("gemini", &sources).unwrap(), "google-key");

        unsafe {
            env::remove_var("LLMEP_GOOGLE_GOOGLE_KEY");
        }
    }

    #[test]
    fn test_missing_provider_leaves_others_usable() {
        let sources = ApiKeySources {
            gemini_config: Some("config-gemini".to_string()),
            ..isolated_sources("LLMEP_PARTIAL")
        };

        let credentials = Credentials::from_sources(&sources);
        assert!(credentials.openai.is_none());
        assert_eq!(
            credentials.gemini.as_ref().map(|g| g.api_key.as_str()),
            Some("config-gemini")
        );
        assert_eq!(credentials.configured_providers(), vec!["gemini"]);
    }

    #[test]
    fn test_organization_is_picked_up() {
        let sources = ApiKeySources {
            openai_config: Some("sk-config".to_string()),
            openai_organization_config: Some("org-123".to_string()),
            ..isolated_sources("LLMEP_ORG")
        };

        let credentials = Credentials::from_sources(&sources);
        let openai = credentials.openai.unwrap();
        assert_eq!(openai.organization.as_deref(), Some("org-123"));
    }

    #[test]
    fn test_error_when_not_found() {
        let sources = isolated_sources("LLMEP_NONE");
        let err = get_api_key("openai", &sources).unwrap_err();
        assert!(err.to_string().contains("LLMEP_NONE_OPENAI_KEY"));
        assert!(get_api_key("mistral", &sources).is_err());
    }

    #[test]
    fn test_debug_output_redacts_keys() {
        let credentials = Credentials {
            openai: Some(OpenAICredentials {
                api_key: "sk-very-secret".to_string(),
                organization: None,
            }),
            gemini: None,
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("sk-v***"));
    }
}
