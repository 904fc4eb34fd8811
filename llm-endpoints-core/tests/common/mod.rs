//! Shared fixtures for integration tests: an in-process stub provider and a
//! loopback HTTP responder for wire-level checks.

#![allow(dead_code)]

use async_trait::async_trait;
use llm_endpoints_core::llm::provider::{
    FinishReason, LLMRequest, LLMResponse, ParameterLimits,
};
use llm_endpoints_core::llm::{LLMError, LLMProvider, ModelParameters};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use futures::StreamExt;
use std::convert::Infallible;
use std::time::Duration;
use tokio::net::TcpListener;

/// Deterministic provider answering from a fixed prompt → reply table
pub struct StubProvider {
    name: String,
    models: Vec<String>,
    replies: HashMap<String, String>,
    fallback: Option<String>,
    parameters: RwLock<ModelParameters>,
    pub seen: Mutex<Vec<LLMRequest>>,
}

impl StubProvider {
    pub fn new(name: &str, models: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            replies: HashMap::new(),
            fallback: None,
            parameters: RwLock::new(ModelParameters::default()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, prompt: &str, reply: &str) -> Self {
        self.replies.insert(prompt.to_string(), reply.to_string());
        self
    }

    /// Reply used for any prompt missing from the table
    pub fn fallback(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl LLMProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.models[0]
    }

    fn supported_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn parameters(&self) -> ModelParameters {
        *self.parameters.read()
    }

    fn configure(&self, parameters: ModelParameters) -> Result<(), LLMError> {
        parameters.validate(&ParameterLimits::default())?;
        *self.parameters.write() = parameters;
        Ok(())
    }

    async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, LLMError> {
        let prompt = request.messages[0].content.clone();
        self.seen.lock().push(request);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let reply = self
            .replies
            .get(&prompt)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| LLMError::Provider {
                provider: self.name.clone(),
                status: Some(500),
                message: format!("no canned reply for '{prompt}'"),
                payload: None,
            })?;

        Ok(LLMResponse {
            content: Some(reply),
            usage: None,
            finish_reason: FinishReason::Stop,
        })
    }
}

/// A request captured by the loopback server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    /// Header block, lowercased
    pub headers: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// What the loopback server answers with; the body is sent chunk by chunk,
/// `chunk_delay` apart
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub chunks: Vec<String>,
    pub chunk_delay: Duration,
}

impl CannedResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.to_string()],
            chunk_delay: Duration::from_millis(5),
        }
    }

    /// A JSON body dribbled out `chunk_size` bytes at a time
    pub fn json_trickle(body: serde_json::Value, chunk_size: usize, delay: Duration) -> Self {
        let text = body.to_string();
        Self {
            status: 200,
            content_type: "application/json",
            chunks: text
                .as_bytes()
                .chunks(chunk_size)
                .map(|c| String::from_utf8_lossy(c).into_owned())
                .collect(),
            chunk_delay: delay,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            chunks: vec![body.to_string()],
            chunk_delay: Duration::from_millis(5),
        }
    }

    pub fn event_stream(events: &[&str]) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks: events.iter().map(|e| e.to_string()).collect(),
            chunk_delay: Duration::from_millis(5),
        }
    }
}

pub type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

#[derive(Clone)]
struct Responder {
    response: CannedResponse,
    log: RequestLog,
}

async fn respond(
    State(responder): State<Responder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let headers = headers
        .iter()
        .map(|(name, value)| format!("{name}: {}", String::from_utf8_lossy(value.as_bytes())))
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();
    responder.log.lock().push(RecordedRequest {
        request_line: format!("{method} {uri}"),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let CannedResponse {
        status,
        content_type,
        chunks,
        chunk_delay,
    } = responder.response;
    let stream = futures::stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(chunk_delay).await;
        Ok::<_, Infallible>(chunk)
    });

    (
        StatusCode::from_u16(status).expect("valid status"),
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(stream),
    )
}

/// Serve `response` to every request; returns the base URL and the log of
/// requests received
pub async fn serve(response: CannedResponse) -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let log = RequestLog::default();

    let app = Router::new().fallback(respond).with_state(Responder {
        response,
        log: Arc::clone(&log),
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}"), log)
}
