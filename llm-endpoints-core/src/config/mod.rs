//! Configuration: constants, credentials and the `llm-endpoints.toml` loader.

pub mod api_keys;
pub mod constants;
pub mod loader;

pub use api_keys::{ApiKeySources, Credentials, GeminiCredentials, OpenAICredentials};
pub use loader::{
    BatchConfig, ConfigManager, EndpointsConfig, HttpConfig, ProviderSettings, ResultsConfig,
};
