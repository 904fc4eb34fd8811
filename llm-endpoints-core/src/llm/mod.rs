//! # LLM Integration Layer
//!
//! A single calling convention over several hosted model vendors.
//!
//! - **Providers**: [`providers::OpenAIProvider`] and [`providers::GeminiProvider`]
//!   implement [`LLMProvider`]; each holds its own validated default parameters
//! - **Dispatcher**: [`Dispatcher`] maps model ids to providers by prefix and
//!   configured extra models
//! - **Batches**: [`BatchRunner`] runs prompt lists sequentially (fail fast) or
//!   through a bounded worker pool (aggregate failures)
//! - **Verification**: every provider can answer a canary prompt as a smoke test
//!
//! ## Supported Providers
//!
//! | Provider | Models |
//! |----------|--------|
//! | OpenAI | gpt-4o, gpt-4, gpt-3.5-turbo, gpt-3.5-turbo-instruct, babbage-002, davinci-002 |
//! | Gemini | gemini-2.5-pro, gemini-2.0-flash, gemini-1.5-pro, gemini-1.5-flash |
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use llm_endpoints_core::config::{ConfigManager, Credentials};
//! use llm_endpoints_core::llm::{BatchOptions, Dispatcher, ExecutionStrategy};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let manager = ConfigManager::load()?;
//! let credentials = Credentials::load(manager.config());
//! let dispatcher = Dispatcher::from_config(&credentials, manager.config())?;
//!
//! let prompts = vec!["What is AI?".to_string(), "2+2?".to_string()];
//! let options = BatchOptions {
//!     strategy: ExecutionStrategy::Concurrent,
//!     ..Default::default()
//! };
//! let results = dispatcher.multiple_queries("gpt-4o", &prompts, &options).await?;
//! for result in results {
//!     println!("{} -> {}", result.prompt, result.reply);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod error_display;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod verification;

pub use batch::{BatchRunner, ExecutionStrategy};
pub use factory::{BatchOptions, Dispatcher, SaveOptions};
pub use provider::{
    BatchError, BatchFailure, ErrorKind, LLMError, LLMProvider, ModelParameters, Query,
    QueryResult, ResultSet,
};
pub use verification::VerificationReport;
