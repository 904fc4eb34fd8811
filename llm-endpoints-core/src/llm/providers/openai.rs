use crate::config::api_keys::OpenAICredentials;
use crate::config::constants::{defaults, model_helpers, models, providers, urls};
use crate::config::loader::ProviderSettings;
use crate::llm::provider::{
    FinishReason, LLMError, LLMProvider, LLMRequest, LLMResponse, LLMStream, LLMStreamEvent,
    ModelParameters, Usage,
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

const ORGANIZATION_HEADER: &str = "OpenAI-Organization";

/// OpenAI client for both the chat and the legacy completions endpoints
pub struct OpenAIProvider {
    api_key: String,
    organization: Option<String>,
    http_client: HttpClient,
    base_url: String,
    default_model: String,
    extra_models: Vec<String>,
    default_system_prompt: String,
    parameters: RwLock<ModelParameters>,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, models::openai::DEFAULT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            api_key,
            organization: None,
            http_client: http::build_http_client(
                providers::OPENAI,
                Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
            ),
            base_url: urls::OPENAI_API_BASE.to_string(),
            default_model: model,
            extra_models: Vec::new(),
            default_system_prompt: defaults::DEFAULT_SYSTEM_PROMPT.to_string(),
            parameters: RwLock::new(ModelParameters::openai_defaults()),
        }
    }

    /// Build from resolved credentials and the `[openai]` config section
    pub fn from_settings(
        credentials: &OpenAICredentials,
        settings: &ProviderSettings,
        default_system_prompt: &str,
        timeout: Duration,
    ) -> Result<Self, LLMError> {
        let model = settings
            .default_model
            .clone()
            .unwrap_or_else(|| models::openai::DEFAULT_MODEL.to_string());

        let mut provider = Self::with_model(credentials.api_key.clone(), model)
            .with_organization(credentials.organization.clone())
            .with_extra_models(settings.extra_models.clone())
            .with_system_prompt(default_system_prompt)
            .with_timeout(timeout);
        if let Some(base_url) = &settings.base_url {
            provider = provider.with_base_url(base_url.clone());
        }

        provider.configure(settings.resolve_parameters(ModelParameters::openai_defaults()))?;
        Ok(provider)
    }

    pub fn with_organization(mut self, organization: Option<String>) -> Self {
        self.organization = organization.filter(|org| !org.is_empty());
        self
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
        self.http_client = http::build_http_client(providers::OPENAI, timeout);
        self
    }

    fn endpoint(&self, legacy: bool) -> String {
        if legacy {
            format!("{}/completions", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn build_body(&self, request: &LLMRequest, legacy: bool) -> Value {
        if legacy {
            self.convert_to_legacy_format(request)
        } else {
            self.convert_to_openai_format(request)
        }
    }

    async fn post(&self, url: &str, model: &str, body: &Value) -> Result<reqwest::Response, LLMError> {
        let mut builder = self
            .http_client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body);
        if let Some(organization) = &self.organization {
            builder = builder.header(ORGANIZATION_HEADER, organization);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| http::map_transport_error(providers::OPENAI, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(http::map_status_error(
                providers::OPENAI,
                model,
                status,
                error_text,
            ));
        }

        Ok(response)
    }

    fn convert_to_openai_format(&self, request: &LLMRequest) -> Value {
        let system_prompt = request
            .system_prompt
            .as_deref()
            .unwrap_or(&self.default_system_prompt);

        let mut messages = vec![json!({
            "role": crate::config::constants::message_roles::SYSTEM,
            "content": system_prompt
        })];
        messages.extend(request.messages.iter().map(|msg| {
            json!({
                "role": msg.role.as_openai_str(),
                "content": msg.content
            })
        }));

        json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.parameters.max_tokens,
            "temperature": request.parameters.temperature,
            "top_p": request.parameters.top_p,
            "stream": request.parameters.stream
        })
    }

    /// Legacy models take a flat prompt; only an explicit system prompt is
    /// prepended
    fn convert_to_legacy_format(&self, request: &LLMRequest) -> Value {
        let conversation = request
            .messages
            .iter()
            .map(|msg| msg.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = match &request.system_prompt {
            Some(system_prompt) => format!("{system_prompt}\n\n{conversation}"),
            None => conversation,
        };

        json!({
            "model": request.model,
            "prompt": prompt,
            "max_tokens": request.parameters.max_tokens,
            "temperature": request.parameters.temperature,
            "top_p": request.parameters.top_p,
            "stream": request.parameters.stream
        })
    }

    fn parse_openai_response(&self, response_json: Value, legacy: bool) -> Result<LLMResponse, LLMError> {
        let choice = response_json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|choices| choices.first())
            .ok_or_else(|| {
                http::invalid_response(providers::OPENAI, "Invalid response format: missing choices")
            })?;

        let content = if legacy {
            choice.get("text").and_then(|t| t.as_str())
        } else {
            choice
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
        }
        .map(str::to_string);

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|fr| fr.as_str())
            .map(map_finish_reason)
            .unwrap_or(FinishReason::Stop);

        let usage = response_json.get("usage").map(|u| Usage {
            prompt_tokens: token_count(u, "prompt_tokens"),
            completion_tokens: token_count(u, "completion_tokens"),
            total_tokens: token_count(u, "total_tokens"),
        });

        Ok(LLMResponse {
            content,
            usage,
            finish_reason,
        })
    }
}

fn token_count(usage: &Value, field: &str) -> u32 {
    usage.get(field).and_then(|v| v.as_u64()).unwrap_or(0) as u32
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Error(other.to_string()),
    }
}

/// Text carried by one streamed chunk; chat uses `delta.content`, legacy `text`
fn parse_stream_delta(payload: &Value, legacy: bool, finish_reason: &mut FinishReason) -> Option<String> {
    let choice = payload.get("choices")?.as_array()?.first()?;

    if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        *finish_reason = map_finish_reason(reason);
    }

    let text = if legacy {
        choice.get("text")?.as_str()?
    } else {
        choice.get("delta")?.get("content")?.as_str()?
    };

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn parse_stream_payload(data: &str) -> Result<Value, LLMError> {
    serde_json::from_str(data).map_err(|err| {
        http::invalid_response(
            providers::OPENAI,
            format!("Failed to parse stream payload: {err}"),
        )
    })
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        providers::OPENAI
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn supported_models(&self) -> Vec<String> {
        model_helpers::supported_for(providers::OPENAI)
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
        debug!(provider = providers::OPENAI, ?parameters, "updated default parameters");
        Ok(())
    }

    async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, LLMError> {
        let legacy = model_helpers::is_openai_legacy(&request.model);
        let mut body = self.build_body(&request, legacy);
        body["stream"] = Value::Bool(false);

        debug!(provider = providers::OPENAI, model = %request.model, legacy, "sending completion request");
        let response = self.post(&self.endpoint(legacy), &request.model, &body).await?;

        let openai_response: Value = response
            .json()
            .await
            .map_err(|e| http::map_body_error(providers::OPENAI, e))?;

        self.parse_openai_response(openai_response, legacy)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream(&self, request: LLMRequest) -> Result<LLMStream, LLMError> {
        let legacy = model_helpers::is_openai_legacy(&request.model);
        let mut body = self.build_body(&request, legacy);
        body["stream"] = Value::Bool(true);

        debug!(provider = providers::OPENAI, model = %request.model, legacy, "opening completion stream");
        let response = self.post(&self.endpoint(legacy), &request.model, &body).await?;

        let stream = try_stream! {
            let mut body_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut pending = Vec::new();
            let mut aggregated_content = String::new();
            let mut finish_reason = FinishReason::Stop;
            let mut done = false;

            while let Some(chunk_result) = body_stream.next().await {
                let chunk = chunk_result
                    .map_err(|err| http::map_transport_error(providers::OPENAI, err))?;
                http::append_utf8(&mut buffer, &mut pending, &chunk);

                for data in http::drain_sse_data(&mut buffer) {
                    if data == "[DONE]" {
                        done = true;
                        break;
                    }
                    let payload = parse_stream_payload(&data)?;
                    if let Some(delta) = parse_stream_delta(&payload, legacy, &mut finish_reason) {
                        aggregated_content.push_str(&delta);
                        yield LLMStreamEvent::Token { delta };
                    }
                }

                if done {
                    break;
                }
            }

            if !done {
                for data in http::flush_sse_data(&mut buffer) {
                    if data == "[DONE]" {
                        break;
                    }
                    let payload = parse_stream_payload(&data)?;
                    if let Some(delta) = parse_stream_delta(&payload, legacy, &mut finish_reason) {
                        aggregated_content.push_str(&delta);
                        yield LLMStreamEvent::Token { delta };
                    }
                }
            }

            let content = if aggregated_content.is_empty() {
                None
            } else {
                Some(aggregated_content)
            };
            yield LLMStreamEvent::Completed {
                response: LLMResponse {
                    content,
                    usage: None,
                    finish_reason,
                },
            };
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{Message, Query};

    fn request(model: &str, system_prompt: Option<&str>) -> LLMRequest {
        LLMRequest {
            messages: vec![Message::user("Say this is a test!".to_string())],
            system_prompt: system_prompt.map(str::to_string),
            model: model.to_string(),
            parameters: ModelParameters::openai_defaults(),
        }
    }

    #[test]
    fn chat_body_uses_default_system_prompt() {
        let provider = OpenAIProvider::new("test_key".to_string());
        let body = provider.convert_to_openai_format(&request(models::openai::GPT_3_5_TURBO, None));

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a helpful assistant.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn legacy_body_is_flat_prompt() {
        let provider = OpenAIProvider::new("test_key".to_string());

        let plain = provider
            .convert_to_legacy_format(&request(models::openai::GPT_3_5_TURBO_INSTRUCT, None));
        assert_eq!(plain["prompt"], "Say this is a test!");
        assert!(plain.get("messages").is_none());

        let with_system = provider.convert_to_legacy_format(&request(
            models::openai::GPT_3_5_TURBO_INSTRUCT,
            Some("Answer tersely."),
        ));
        assert_eq!(with_system["prompt"], "Answer tersely.\n\nSay this is a test!");
    }

    #[test]
    fn endpoints_follow_model_family() {
        let provider = OpenAIProvider::new("test_key".to_string())
            .with_base_url("http://localhost:9999/v1/".to_string());
        assert_eq!(provider.endpoint(false), "http://localhost:9999/v1/chat/completions");
        assert_eq!(provider.endpoint(true), "http://localhost:9999/v1/completions");
    }

    #[test]
    fn parses_chat_and_legacy_responses() {
        let provider = OpenAIProvider::new("test_key".to_string());

        let chat = provider
            .parse_openai_response(
                json!({
                    "choices": [{"message": {"role": "assistant", "content": "This is a test!"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
                }),
                false,
            )
            .unwrap();
        assert_eq!(chat.content.as_deref(), Some("This is a test!"));
        assert_eq!(chat.usage.map(|u| u.total_tokens), Some(17));

        let legacy = provider
            .parse_openai_response(
                json!({"choices": [{"text": "\n\nThis is a test!", "finish_reason": "length"}]}),
                true,
            )
            .unwrap();
        assert_eq!(legacy.content.as_deref(), Some("\n\nThis is a test!"));
        assert_eq!(legacy.finish_reason, FinishReason::Length);

        let broken = provider.parse_openai_response(json!({"id": "x"}), false);
        assert!(matches!(broken, Err(LLMError::Provider { status: None, .. })));
    }

    #[test]
    fn stream_delta_extraction() {
        let mut finish = FinishReason::Stop;
        let chat = json!({"choices": [{"delta": {"content": "This "}}]});
        assert_eq!(parse_stream_delta(&chat, false, &mut finish).as_deref(), Some("This "));

        let last = json!({"choices": [{"delta": {}, "finish_reason": "length"}]});
        assert_eq!(parse_stream_delta(&last, false, &mut finish), None);
        assert_eq!(finish, FinishReason::Length);

        let legacy = json!({"choices": [{"text": "test!"}]});
        assert_eq!(parse_stream_delta(&legacy, true, &mut finish).as_deref(), Some("test!"));
    }

    #[test]
    fn configure_validates_and_persists() {
        let provider = OpenAIProvider::new("test_key".to_string());
        let err = provider
            .configure(ModelParameters::openai_defaults().with_temperature(5.0))
            .unwrap_err();
        assert!(matches!(err, LLMError::InvalidParameter { ref name, .. } if name == "temperature"));
        assert_eq!(provider.parameters(), ModelParameters::openai_defaults());

        provider
            .configure(ModelParameters::openai_defaults().with_temperature(2.0))
            .unwrap();
        assert_eq!(provider.parameters().temperature, 2.0);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_any_request() {
        let provider = OpenAIProvider::new("test_key".to_string())
            .with_base_url("http://127.0.0.1:9".to_string());
        let err = provider
            .query_with(&Query::new("gpt-2", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::InvalidModel { ref model, .. } if model == "gpt-2"));
    }

    #[test]
    fn extra_models_extend_supported_list() {
        let provider = OpenAIProvider::new("test_key".to_string())
            .with_extra_models(vec!["gpt-4.1".to_string()]);
        let supported = provider.supported_models();
        assert!(supported.contains(&"gpt-4.1".to_string()));
        assert!(supported.contains(&"davinci-002".to_string()));
    }
}
