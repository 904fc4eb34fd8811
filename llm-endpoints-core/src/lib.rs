//! Core library for `llm-endpoints`: one interface for querying hosted LLM
//! vendors, running prompt batches and saving the replies as CSV.
//!
//! - [`config`]: constants, credential resolution and `llm-endpoints.toml`
//! - [`llm`]: provider clients, the dispatcher and batch execution
//! - [`results`]: CSV persistence

pub mod config;
pub mod llm;
pub mod results;

pub use config::{ConfigManager, Credentials, EndpointsConfig};
pub use llm::{
    BatchOptions, Dispatcher, ExecutionStrategy, LLMError, LLMProvider, ModelParameters,
    QueryResult, SaveOptions,
};
pub use results::ResultWriter;
