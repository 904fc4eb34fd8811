use crate::config::api_keys::GeminiCredentials;
use crate::config::constants::{defaults, model_helpers, models, providers, urls};
use crate::config::loader::ProviderSettings;
use crate::llm::provider::{
    FinishReason, LLMError, LLMProvider, LLMRequest, LLMResponse, LLMStream, LLMStreamEvent,
    MessageRole, ModelParameters, Usage,
};
use crate::llm::providers::http;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::Client as HttpClient;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    api_key: String,
    http_client: HttpClient,
    base_url: String,
    default_model: String,
    extra_models: Vec<String>,
    default_system_prompt: String,
    parameters: RwLock<ModelParameters>,
}

/// Gemini accepts both `gemini-x` and the resource form `models/gemini-x`
fn normalize_model(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, models::google::DEFAULT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            api_key,
            http_client: http::build_http_client(
                providers::GEMINI,
                Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
            ),
            base_url: urls::GEMINI_API_BASE.to_string(),
            default_model: model,
            extra_models: Vec::new(),
            default_system_prompt: defaults::DEFAULT_SYSTEM_PROMPT.to_string(),
            parameters: RwLock::new(ModelParameters::gemini_defaults()),
        }
    }

    /// Build from resolved credentials and the `[gemini]` config section
    pub fn from_settings(
        credentials: &GeminiCredentials,
        settings: &ProviderSettings,
        default_system_prompt: &str,
        timeout: Duration,
    ) -> Result<Self, LLMError> {
        let model = settings
            .default_model
            .clone()
            .unwrap_or_else(|| models::google::DEFAULT_MODEL.to_string());

        let mut provider = Self::with_model(credentials.api_key.clone(), model)
            .with_extra_models(settings.extra_models.clone())
            .with_system_prompt(default_system_prompt)
            .with_timeout(timeout);
        if let Some(base_url) = &settings.base_url {
            provider = provider.with_base_url(base_url.clone());
        }

        provider.configure(settings.resolve_parameters(ModelParameters::gemini_defaults()))?;
        Ok(provider)
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_extra_models(mut self, extra_models: Vec<String>) -> Self {
        self.extra_models = extra_models;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: &str) -> Self {
        self.default_system_prompt = system_prompt.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = http::build_http_client(providers::GEMINI, timeout);
        self
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let model = normalize_model(model);
        if stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, model
            )
        } else {
            format!("{}/models/{model}:generateContent", self.base_url)
        }
    }

    async fn post(&self, url: &str, model: &str, body: &Value) -> Result<reqwest::Response, LLMError> {
        let response = self
            .http_client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| http::map_transport_error(providers::GEMINI, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(http::map_status_error(
                providers::GEMINI,
                model,
                status,
                error_text,
            ));
        }

        Ok(response)
    }

    fn convert_to_gemini_format(&self, request: &LLMRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|message| message.role != MessageRole::System && !message.content.is_empty())
            .map(|message| {
                json!({
                    "role": message.role.as_gemini_str(),
                    "parts": [{"text": message.content}]
                })
            })
            .collect();

        let system_prompt = request
            .system_prompt
            .as_deref()
            .unwrap_or(&self.default_system_prompt);

        json!({
            "contents": contents,
            "systemInstruction": {
                "parts": [{"text": system_prompt}]
            },
            "generationConfig": {
                "maxOutputTokens": request.parameters.max_tokens,
                "temperature": request.parameters.temperature,
                "topP": request.parameters.top_p
            }
        })
    }

    fn convert_from_gemini_format(&self, response: Value) -> Result<LLMResponse, LLMError> {
        let candidate = response["candidates"]
            .as_array()
            .and_then(|candidates| candidates.first())
            .ok_or_else(|| {
                let reason = response["promptFeedback"]["blockReason"]
                    .as_str()
                    .map(|reason| format!("prompt blocked: {reason}"))
                    .unwrap_or_else(|| "No candidates in response".to_string());
                http::invalid_response(providers::GEMINI, reason)
            })?;

        let text_content = candidate_text(candidate);

        let usage = response.get("usageMetadata").map(|u| Usage {
            prompt_tokens: u["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            completion_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            total_tokens: u["totalTokenCount"].as_u64().unwrap_or(0) as u32,
        });

        Ok(LLMResponse {
            content: Some(text_content),
            usage,
            finish_reason: map_finish_reason(candidate["finishReason"].as_str()),
        })
    }
}

fn candidate_text(candidate: &Value) -> String {
    candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("STOP") | None => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
        Some(other) => FinishReason::Error(other.to_string()),
    }
}

fn parse_stream_chunk(data: &str, finish_reason: &mut FinishReason) -> Result<Option<String>, LLMError> {
    let payload: Value = serde_json::from_str(data).map_err(|err| {
        http::invalid_response(
            providers::GEMINI,
            format!("Failed to parse stream payload: {err}"),
        )
    })?;

    let Some(candidate) = payload["candidates"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };

    if let Some(reason) = candidate["finishReason"].as_str() {
        *finish_reason = map_finish_reason(Some(reason));
    }

    let text = candidate_text(candidate);
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        providers::GEMINI
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supported_models(&self) -> Vec<String> {
        model_helpers::supported_for(providers::GEMINI)
            .into_iter()
            .map(str::to_string)
            .chain(self.extra_models.iter().cloned())
            .collect()
    }

    fn parameters(&self) -> ModelParameters {
        *self.parameters.read()
    }

    fn configure(&self, parameters: ModelParameters) -> Result<(), LLMError> {
        parameters.validate(&self.parameter_limits())?;
        *self.parameters.write() = parameters;
        debug!(provider = providers::GEMINI, ?parameters, "updated default parameters");
        Ok(())
    }

    fn validate_request(&self, request: &LLMRequest) -> Result<(), LLMError> {
        let model = normalize_model(&request.model);
        if !self.supported_models().iter().any(|m| m == model) {
            return Err(LLMError::InvalidModel {
                provider: providers::GEMINI.to_string(),
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

    async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, LLMError> {
        let gemini_request = self.convert_to_gemini_format(&request);
        let url = self.endpoint(&request.model, false);

        debug!(provider = providers::GEMINI, model = %request.model, "sending generateContent request");
        let response = self.post(&url, &request.model, &gemini_request).await?;

        let gemini_response: Value = response
            .json()
            .await
            .map_err(|e| http::map_body_error(providers::GEMINI, e))?;

        self.convert_from_gemini_format(gemini_response)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream(&self, request: LLMRequest) -> Result<LLMStream, LLMError> {
        let gemini_request = self.convert_to_gemini_format(&request);
        let url = self.endpoint(&request.model, true);

        debug!(provider = providers::GEMINI, model = %request.model, "opening streamGenerateContent");
        let response = self.post(&url, &request.model, &gemini_request).await?;

        let stream = try_stream! {
            let mut body_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut pending = Vec::new();
            let mut aggregated_content = String::new();
            let mut finish_reason = FinishReason::Stop;

            while let Some(chunk_result) = body_stream.next().await {
                let chunk = chunk_result
                    .map_err(|err| http::map_transport_error(providers::GEMINI, err))?;
                http::append_utf8(&mut buffer, &mut pending, &chunk);

                for data in http::drain_sse_data(&mut buffer) {
                    if let Some(delta) = parse_stream_chunk(&data, &mut finish_reason)? {
                        aggregated_content.push_str(&delta);
                        yield LLMStreamEvent::Token { delta };
                    }
                }
            }

            for data in http::flush_sse_data(&mut buffer) {
                if let Some(delta) = parse_stream_chunk(&data, &mut finish_reason)? {
                    aggregated_content.push_str(&delta);
                    yield LLMStreamEvent::Token { delta };
                }
            }

            yield LLMStreamEvent::Completed {
                response: LLMResponse {
                    content: Some(aggregated_content),
                    usage: None,
                    finish_reason,
                },
            };
        };

        Ok(Box::pin(stream))
    }
}
