//! Wire-level behaviour of the HTTP providers against a loopback server

mod common;

use common::{CannedResponse, serve};
use llm_endpoints_core::llm::providers::{GeminiProvider, OpenAIProvider};
use llm_endpoints_core::llm::{ErrorKind, LLMError, LLMProvider, ModelParameters};
use serde_json::json;
use std::time::Duration;

fn openai(base_url: &str) -> OpenAIProvider {
    OpenAIProvider::new("sk-test".to_string()).with_base_url(base_url.to_string())
}

fn gemini(base_url: &str) -> GeminiProvider {
    GeminiProvider::new("gm-test".to_string()).with_base_url(base_url.to_string())
}

#[tokio::test]
async fn openai_chat_round_trip() {
    let (base_url, requests) = serve(CannedResponse::json(
        200,
        json!({
            "choices": [{"message": {"role": "assistant", "content": "4"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        }),
    ))
    .await;

    let provider = openai(&base_url).with_organization(Some("org-42".to_string()));
    let reply = provider.query("gpt-4o", "2+2?", None).await.unwrap();
    assert_eq!(reply, "4");

    let requests = requests.lock();
    let request = &requests[0];
    assert!(request.request_line.starts_with("POST /chat/completions"));
    assert!(request.headers.contains("authorization: bearer sk-test"));
    assert!(request.headers.contains("openai-organization: org-42"));

    let body = request.json();
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["max_tokens"], 128);
    assert_eq!(body["messages"][0]["content"], "You are a helpful assistant.");
    assert_eq!(body["messages"][1]["content"], "2+2?");
}

#[tokio::test]
async fn openai_legacy_model_uses_completions() {
    let (base_url, requests) = serve(CannedResponse::json(
        200,
        json!({"choices": [{"text": " This is a test!", "finish_reason": "stop"}]}),
    ))
    .await;

    let reply = openai(&base_url)
        .query("gpt-3.5-turbo-instruct", "Say this is a test!", Some("Be exact."))
        .await
        .unwrap();
    assert_eq!(reply.trim(), "This is a test!");

    let requests = requests.lock();
    assert!(requests[0].request_line.starts_with("POST /completions"));
    assert_eq!(requests[0].json()["prompt"], "Be exact.\n\nSay this is a test!");
}

#[tokio::test]
async fn unauthorized_maps_to_authentication() {
    let (base_url, _) = serve(CannedResponse::json(
        401,
        json!({"error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}}),
    ))
    .await;

    let err = openai(&base_url)
        .query("gpt-4o", "hi", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(err.to_string().contains("Incorrect API key provided"));
}

#[tokio::test]
async fn forbidden_maps_to_authentication() {
    let (base_url, _) = serve(CannedResponse::json(
        403,
        json!({"error": {"message": "Method doesn't allow unregistered callers", "status": "PERMISSION_DENIED"}}),
    ))
    .await;

    let err = gemini(&base_url)
        .query("gemini-2.0-flash", "hi", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(err.to_string().contains("unregistered callers"));
}

#[tokio::test]
async fn model_not_found_code_maps_to_invalid_model() {
    let (base_url, _) = serve(CannedResponse::json(
        400,
        json!({"error": {"message": "The model `gpt-4o` does not exist", "code": "model_not_found"}}),
    ))
    .await;

    let err = openai(&base_url)
        .query("gpt-4o", "hi", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::InvalidModel { ref model, .. } if model == "gpt-4o"));
}

#[tokio::test]
async fn deadline_during_body_is_a_timeout() {
    let body = json!({
        "choices": [{"message": {"role": "assistant", "content": "slow answer"}, "finish_reason": "stop"}]
    });
    let (base_url, _) = serve(CannedResponse::json_trickle(
        body,
        4,
        Duration::from_millis(10),
    ))
    .await;

    let err = openai(&base_url)
        .with_timeout(Duration::from_millis(50))
        .query("gpt-4o", "hi", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout, "{err:?}");
}

#[tokio::test]
async fn not_found_maps_to_invalid_model() {
    let (base_url, _) = serve(CannedResponse::json(
        404,
        json!({"error": {"message": "models/gemini-2.5-pro is not found", "status": "NOT_FOUND"}}),
    ))
    .await;

    let err = gemini(&base_url)
        .query("gemini-2.5-pro", "hi", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::InvalidModel { ref model, .. } if model == "gemini-2.5-pro"));
}

#[tokio::test]
async fn server_error_keeps_vendor_payload() {
    let (base_url, _) = serve(CannedResponse::text(500, "upstream exploded")).await;

    let err = openai(&base_url)
        .query("gpt-4o", "hi", None)
        .await
        .unwrap_err();
    match err {
        LLMError::Provider {
            status, payload, ..
        } => {
            assert_eq!(status, Some(500));
            assert_eq!(payload.as_deref(), Some("upstream exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn openai_stream_fragments_concatenate_in_order() {
    let (base_url, requests) = serve(CannedResponse::event_stream(&[
        "data: {\"choices\":[{\"delta\":{\"content\":\"This \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"is a\"}}]}\n\ndata: {\"choi",
        "ces\":[{\"delta\":{\"content\":\" test!\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    ]))
    .await;

    let provider = openai(&base_url);
    provider
        .configure(ModelParameters::openai_defaults().with_stream(true))
        .unwrap();

    let reply = provider
        .query("gpt-3.5-turbo", "Say this is a test!", None)
        .await
        .unwrap();
    assert_eq!(reply, "This is a test!");
    assert_eq!(requests.lock()[0].json()["stream"], true);
}

#[tokio::test]
async fn gemini_generate_round_trip() {
    let (base_url, requests) = serve(CannedResponse::json(
        200,
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "AI is artificial intelligence."}]},
                "finishReason": "STOP"
            }]
        }),
    ))
    .await;

    let reply = gemini(&base_url)
        .query("gemini-2.0-flash", "What is AI?", Some("Be brief."))
        .await
        .unwrap();
    assert_eq!(reply, "AI is artificial intelligence.");

    let requests = requests.lock();
    let request = &requests[0];
    assert!(
        request
            .request_line
            .starts_with("POST /models/gemini-2.0-flash:generateContent")
    );
    assert!(request.headers.contains("x-goog-api-key: gm-test"));

    let body = request.json();
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
}

#[tokio::test]
async fn gemini_stream_and_verification() {
    let (base_url, requests) = serve(CannedResponse::event_stream(&[
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"This is \"}]}}]}\r\n\r\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a test!\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
    ]))
    .await;

    let provider = gemini(&base_url);
    provider
        .configure(ModelParameters::gemini_defaults().with_stream(true))
        .unwrap();

    let report = provider.run_verification().await;
    assert!(report.passed, "{report:?}");
    assert_eq!(report.reply.as_deref(), Some("This is a test!"));
    assert!(
        requests.lock()[0]
            .request_line
            .contains(":streamGenerateContent?alt=sse")
    );
}

#[tokio::test]
async fn verification_reports_transport_failure_without_raising() {
    // Bind and drop a listener so the port is closed
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let report = openai(&format!("http://{addr}")).run_verification().await;
    assert!(!report.passed);
    assert!(report.error.is_some());
}
