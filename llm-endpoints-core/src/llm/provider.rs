//! Universal LLM provider abstraction
//!
//! Every vendor integration implements [`LLMProvider`]. The trait covers the
//! capability set callers rely on regardless of vendor:
//!
//! - **Single query**: [`LLMProvider::query`] and [`LLMProvider::query_with`]
//! - **Parameter configuration**: [`LLMProvider::configure`] stores new
//!   defaults after validating them against [`ParameterLimits`]
//! - **Streaming**: [`LLMProvider::stream`] yields token deltas; queries with
//!   `stream = true` concatenate them in arrival order
//! - **Self-test**: [`LLMProvider::run_verification`] issues the canary prompt
//!
//! Batched queries go through [`crate::llm::batch::BatchRunner`], which only
//! needs the single-query capability.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use llm_endpoints_core::llm::provider::{LLMProvider, ModelParameters};
//! use llm_endpoints_core::llm::providers::GeminiProvider;
//!
//! # async fn demo() -> Result<(), llm_endpoints_core::llm::LLMError> {
//! let gemini = GeminiProvider::new("api-key".to_string());
//! gemini.configure(ModelParameters::default().with_temperature(0.2))?;
//! let reply = gemini.query("gemini-2.0-flash", "2+2?", None).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

use crate::config::constants::{defaults, message_roles};
use crate::llm::verification::{self, VerificationReport};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::pin::Pin;

/// Sampling configuration applied to every request a provider sends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    /// Emit incremental output and reassemble it client-side
    pub stream: bool,
    /// Generation length cap
    pub max_tokens: u32,
    /// Sampling randomness
    pub temperature: f32,
    /// Nucleus sampling mass
    pub top_p: f32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            stream: false,
            max_tokens: defaults::GEMINI_MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
            top_p: defaults::TOP_P,
        }
    }
}

impl ModelParameters {
    /// Defaults used by the OpenAI client
    pub fn openai_defaults() -> Self {
        Self {
            max_tokens: defaults::OPENAI_MAX_TOKENS,
            ..Self::default()
        }
    }

    /// Defaults used by the Gemini client
    pub fn gemini_defaults() -> Self {
        Self {
            max_tokens: defaults::GEMINI_MAX_TOKENS,
            ..Self::default()
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Check every value against the provider's documented ranges
    pub fn validate(&self, limits: &ParameterLimits) -> Result<(), LLMError> {
        if !limits.temperature.contains(&self.temperature) {
            return Err(LLMError::InvalidParameter {
                name: "temperature".to_string(),
                message: format!(
                    "{} is outside the accepted range {}..={}",
                    self.temperature,
                    limits.temperature.start(),
                    limits.temperature.end()
                ),
            });
        }

        if !limits.top_p.contains(&self.top_p) {
            return Err(LLMError::InvalidParameter {
                name: "top_p".to_string(),
                message: format!(
                    "{} is outside the accepted range {}..={}",
                    self.top_p,
                    limits.top_p.start(),
                    limits.top_p.end()
                ),
            });
        }

        if self.max_tokens == 0 {
            return Err(LLMError::InvalidParameter {
                name: "max_tokens".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Accepted parameter ranges as documented by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLimits {
    pub temperature: RangeInclusive<f32>,
    pub top_p: RangeInclusive<f32>,
}

impl Default for ParameterLimits {
    fn default() -> Self {
        Self {
            temperature: defaults::MIN_TEMPERATURE..=defaults::MAX_TEMPERATURE,
            top_p: defaults::MIN_TOP_P..=defaults::MAX_TOP_P,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_openai_str(&self) -> &'static str {
        match self {
            MessageRole::System => message_roles::SYSTEM,
            MessageRole::User => message_roles::USER,
            MessageRole::Assistant => message_roles::ASSISTANT,
        }
    }

    /// Gemini only accepts "user" and "model" in contents; system text goes to
    /// `systemInstruction`
    pub fn as_gemini_str(&self) -> &'static str {
        match self {
            MessageRole::System => message_roles::SYSTEM,
            MessageRole::User => message_roles::USER,
            MessageRole::Assistant => "model",
        }
    }
}

/// Universal message structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }

}

/// Universal LLM request structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub model: String,
    pub parameters: ModelParameters,
}

impl LLMRequest {
    /// Build a single-turn request from a query and the effective parameters
    pub fn from_query(query: &Query, parameters: ModelParameters) -> Self {
        Self {
            messages: vec![Message::user(query.prompt.clone())],
            system_prompt: query.system_prompt.clone(),
            model: query.model.clone(),
            parameters,
        }
    }
}

/// A single unit of work: consumed as soon as it is sent
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Replaces the provider defaults for this query only
    pub parameters: Option<ModelParameters>,
}

impl Query {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            parameters: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_parameters(mut self, parameters: Option<ModelParameters>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// One (prompt, reply) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub prompt: String,
    pub reply: String,
}

impl QueryResult {
    pub fn new(prompt: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reply: reply.into(),
        }
    }
}

/// Results of a batch, in input order
pub type ResultSet = Vec<QueryResult>;

/// Universal LLM response
#[derive(Debug, Clone, PartialEq)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub usage: Option<Usage>,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LLMStreamEvent {
    Token { delta: String },
    Completed { response: LLMResponse },
}

pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMStreamEvent, LLMError>> + Send>>;

/// Concatenate streamed deltas in arrival order
///
/// Falls back to the completed response body when the stream carried no
/// token events (providers without native streaming).
pub async fn collect_stream(mut stream: LLMStream) -> Result<String, LLMError> {
    let mut reply = String::new();
    let mut completed = None;

    while let Some(event) = stream.next().await {
        match event? {
            LLMStreamEvent::Token { delta } => reply.push_str(&delta),
            LLMStreamEvent::Completed { response } => completed = Some(response),
        }
    }

    if reply.is_empty() {
        if let Some(response) = completed {
            return Ok(response.content.unwrap_or_default());
        }
    }

    Ok(reply)
}

/// Universal LLM provider trait
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name (e.g., "gemini", "openai")
    fn name(&self) -> &str;

    /// Model used by the self-test and by callers that do not pick one
    fn default_model(&self) -> &str;

    /// Get supported models
    fn supported_models(&self) -> Vec<String>;

    fn parameter_limits(&self) -> ParameterLimits {
        ParameterLimits::default()
    }

    /// Snapshot of the stored default parameters
    fn parameters(&self) -> ModelParameters;

    /// Replace the stored default parameters
    fn configure(&self, parameters: ModelParameters) -> Result<(), LLMError>;

    /// Generate completion
    async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, LLMError>;

    /// Whether `stream = true` is honoured; otherwise queries fall back to
    /// a single non-streaming request
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Stream completion (optional)
    async fn stream(&self, request: LLMRequest) -> Result<LLMStream, LLMError> {
        // Default implementation falls back to non-streaming
        let response = self.generate(request).await?;
        Ok(futures::stream::once(async move { Ok(LLMStreamEvent::Completed { response }) }).boxed())
    }

    /// Validate request for this provider
    fn validate_request(&self, request: &LLMRequest) -> Result<(), LLMError> {
        if !self
            .supported_models()
            .iter()
            .any(|model| model == &request.model)
        {
            return Err(LLMError::InvalidModel {
                provider: self.name().to_string(),
                model: request.model.clone(),
                message: format!("supported models: {}", self.supported_models().join(", ")),
            });
        }

        if request.messages.is_empty() {
            return Err(LLMError::InvalidParameter {
                name: "messages".to_string(),
                message: "cannot be empty".to_string(),
            });
        }

        request.parameters.validate(&self.parameter_limits())
    }

    /// Send one query, honouring a per-query parameter override
    async fn query_with(&self, query: &Query) -> Result<String, LLMError> {
        let parameters = query.parameters.unwrap_or_else(|| self.parameters());
        let request = LLMRequest::from_query(query, parameters);
        self.validate_request(&request)?;

        if parameters.stream && self.supports_streaming() {
            let stream = self.stream(request).await?;
            collect_stream(stream).await
        } else {
            let response = self.generate(request).await?;
            Ok(response.content.unwrap_or_default())
        }
    }

    /// Send one prompt with the stored default parameters
    async fn query(
        &self,
        model: &str,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LLMError> {
        let query = Query::new(model, prompt).with_system_prompt(system_prompt.map(str::to_string));
        self.query_with(&query).await
    }

    /// Issue the canary prompt and compare the reply; never fails
    async fn run_verification(&self) -> VerificationReport {
        verification::verify_provider(self).await
    }
}

/// Error categories used for composite batch reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    UnknownModel,
    InvalidModel,
    InvalidParameter,
    Provider,
    Timeout,
    Network,
    LabelCountMismatch,
    Batch,
    Persist,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::UnknownModel => "UnknownModelError",
            ErrorKind::InvalidModel => "InvalidModelError",
            ErrorKind::InvalidParameter => "InvalidParameterError",
            ErrorKind::Provider => "ProviderError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::LabelCountMismatch => "LabelCountMismatchError",
            ErrorKind::Batch => "BatchError",
            ErrorKind::Persist => "PersistError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Authentication failed for {provider}: {message}")]
    Authentication { provider: String, message: String },
    #[error("No provider is registered for model '{0}'")]
    UnknownModel(String),
    #[error("{provider} does not recognize model '{model}': {message}")]
    InvalidModel {
        provider: String,
        model: String,
        message: String,
    },
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },
    #[error("{provider} request failed{}: {message}", http_status_suffix(.status))]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
        /// Verbatim vendor error body, when one was returned
        payload: Option<String>,
    },
    #[error("Request to {provider} timed out: {message}")]
    Timeout { provider: String, message: String },
    #[error("Network error talking to {provider}: {message}")]
    Network { provider: String, message: String },
    #[error("Expected {expected} labels but received {actual}")]
    LabelCountMismatch { expected: usize, actual: usize },
    #[error("{0}")]
    Batch(BatchError),
    #[error("Failed to write results to {}: {message}", .path.display())]
    Persist { path: PathBuf, message: String },
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {code})"))
        .unwrap_or_default()
}

impl LLMError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LLMError::Authentication { .. } => ErrorKind::Authentication,
            LLMError::UnknownModel(_) => ErrorKind::UnknownModel,
            LLMError::InvalidModel { .. } => ErrorKind::InvalidModel,
            LLMError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            LLMError::Provider { .. } => ErrorKind::Provider,
            LLMError::Timeout { .. } => ErrorKind::Timeout,
            LLMError::Network { .. } => ErrorKind::Network,
            LLMError::LabelCountMismatch { .. } => ErrorKind::LabelCountMismatch,
            LLMError::Batch(_) => ErrorKind::Batch,
            LLMError::Persist { .. } => ErrorKind::Persist,
        }
    }
}

/// A prompt that failed inside a concurrent batch
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub prompt: String,
    pub error: LLMError,
}

/// Every failure of a concurrent batch, ordered by prompt index
#[derive(Debug)]
pub struct BatchError {
    pub total: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchError {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|failure| failure.index).collect()
    }

    pub fn kinds(&self) -> Vec<(usize, ErrorKind)> {
        self.failures
            .iter()
            .map(|failure| (failure.index, failure.error.kind()))
            .collect()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} prompts failed:",
            self.failures.len(),
            self.total
        )?;
        for failure in &self.failures {
            write!(
                f,
                "\n  #{} {}: {}",
                failure.index,
                failure.error.kind(),
                failure.error
            )?;
        }
        Ok(())
    }
}
