use crate::config::constants::{config_files, defaults, models, results};
use crate::llm::provider::ModelParameters;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Per-provider overrides; anything unset keeps the provider default
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Model used by the self-test
    pub default_model: Option<String>,

    /// Alternate API base URL (proxies, gateways)
    pub base_url: Option<String>,

    /// Last-resort API key when no environment variable is set
    pub api_key: Option<String>,

    /// OpenAI organization id (ignored by other providers)
    pub organization: Option<String>,

    /// Model ids accepted and routed in addition to the curated list
    pub extra_models: Vec<String>,

    pub stream: Option<bool>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl ProviderSettings {
    /// Apply the configured overrides on top of `base`
    pub fn resolve_parameters(&self, base: ModelParameters) -> ModelParameters {
        ModelParameters {
            stream: self.stream.unwrap_or(base.stream),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            temperature: self.temperature.unwrap_or(base.temperature),
            top_p: self.top_p.unwrap_or(base.top_p),
        }
    }
}

/// Batch execution settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Worker pool size for concurrent batches
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    defaults::MAX_CONCURRENCY
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Where and how result tables are written
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResultsConfig {
    #[serde(default = "default_results_directory")]
    pub directory: PathBuf,

    /// Base file name; the `.csv` extension is enforced on save
    #[serde(default = "default_results_file_name")]
    pub file_name: String,

    /// Write labels and replies as two rows instead of two columns
    #[serde(default)]
    pub transpose: bool,
}

fn default_results_directory() -> PathBuf {
    PathBuf::from(results::DEFAULT_DIRECTORY)
}

fn default_results_file_name() -> String {
    results::DEFAULT_FILE_NAME.to_string()
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            directory: default_results_directory(),
            file_name: default_results_file_name(),
            transpose: false,
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    defaults::HTTP_TIMEOUT_SECS
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_system_prompt() -> String {
    defaults::DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Main configuration structure, read from `llm-endpoints.toml`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EndpointsConfig {
    /// System prompt sent when a query does not carry one
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,

    #[serde(default)]
    pub openai: ProviderSettings,

    #[serde(default)]
    pub gemini: ProviderSettings,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub results: ResultsConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: default_system_prompt(),
            openai: ProviderSettings::default(),
            gemini: ProviderSettings::default(),
            batch: BatchConfig::default(),
            results: ResultsConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl EndpointsConfig {
    /// Fully spelled-out configuration used for `init`
    pub fn sample() -> Self {
        let openai = ModelParameters::openai_defaults();
        let gemini = ModelParameters::gemini_defaults();
        Self {
            openai: ProviderSettings {
                default_model: Some(models::openai::DEFAULT_MODEL.to_string()),
                stream: Some(openai.stream),
                max_tokens: Some(openai.max_tokens),
                temperature: Some(openai.temperature),
                top_p: Some(openai.top_p),
                ..ProviderSettings::default()
            },
            gemini: ProviderSettings {
                default_model: Some(models::google::DEFAULT_MODEL.to_string()),
                stream: Some(gemini.stream),
                max_tokens: Some(gemini.max_tokens),
                temperature: Some(gemini.temperature),
                top_p: Some(gemini.top_p),
                ..ProviderSettings::default()
            },
            ..Self::default()
        }
    }

    /// Write the sample configuration, refusing to clobber unless `force`
    pub fn create_sample_config<P: AsRef<Path>>(output: P, force: bool) -> Result<bool> {
        let output = output.as_ref();
        if output.exists() && !force {
            return Ok(false);
        }

        let config_content = toml::to_string_pretty(&Self::sample())
            .context("Failed to serialize default configuration")?;

        fs::write(output, config_content)
            .with_context(|| format!("Failed to write config file: {}", output.display()))?;

        Ok(true)
    }
}

/// Configuration manager for loading configuration files
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EndpointsConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        Self::load_from_workspace(std::env::current_dir()?)
    }

    /// Workspace file first, then the home directory, else defaults
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref();

        let config_path = workspace.join(config_files::FILE_NAME);
        if config_path.exists() {
            return Self::load_from_file(&config_path);
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config_path = home_dir
                .join(config_files::HOME_DIR_NAME)
                .join(config_files::FILE_NAME);
            if home_config_path.exists() {
                return Self::load_from_file(&home_config_path);
            }
        }

        debug!(workspace = %workspace.display(), "no configuration file found, using defaults");
        Ok(Self {
            config: EndpointsConfig::default(),
            config_path: None,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: EndpointsConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "loaded configuration");
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn config(&self) -> &EndpointsConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
