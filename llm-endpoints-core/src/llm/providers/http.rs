//! Wire helpers shared by the HTTP providers: client construction, error
//! classification and server-sent-event framing.

use crate::llm::provider::LLMError;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub(crate) fn build_http_client(provider: &str, timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            warn!(provider, error = %err, "falling back to default HTTP client without timeout");
            HttpClient::new()
        })
}

/// Map a failure to send or read a request
pub(crate) fn map_transport_error(provider: &str, err: reqwest::Error) -> LLMError {
    if err.is_timeout() {
        LLMError::Timeout {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    } else {
        LLMError::Network {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

/// Map a failure while reading or decoding a successful response body
///
/// A deadline hit mid-body surfaces as a decode error too; it stays a timeout.
pub(crate) fn map_body_error(provider: &str, err: reqwest::Error) -> LLMError {
    if err.is_decode() && !err.is_timeout() {
        invalid_response(provider, format!("Failed to parse response: {err}"))
    } else {
        map_transport_error(provider, err)
    }
}

/// Classify a non-2xx response, keeping the vendor payload verbatim
pub(crate) fn map_status_error(
    provider: &str,
    model: &str,
    status: StatusCode,
    body: String,
) -> LLMError {
    let message = extract_error_message(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        } else {
            body.clone()
        }
    });

    match status.as_u16() {
        401 | 403 => LLMError::Authentication {
            provider: provider.to_string(),
            message,
        },
        _ if body.contains("API_KEY_INVALID") || body.contains("invalid_api_key") => {
            LLMError::Authentication {
                provider: provider.to_string(),
                message,
            }
        }
        404 => LLMError::InvalidModel {
            provider: provider.to_string(),
            model: model.to_string(),
            message,
        },
        _ if body.contains("model_not_found") => LLMError::InvalidModel {
            provider: provider.to_string(),
            model: model.to_string(),
            message,
        },
        code => LLMError::Provider {
            provider: provider.to_string(),
            status: Some(code),
            message,
            payload: if body.is_empty() { None } else { Some(body) },
        },
    }
}

/// Both vendors wrap failures as `{"error": {"message": ...}}`
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Malformed 2xx body
pub(crate) fn invalid_response(provider: &str, message: impl Into<String>) -> LLMError {
    LLMError::Provider {
        provider: provider.to_string(),
        status: None,
        message: message.into(),
        payload: None,
    }
}

/// Append a body chunk, holding back a multi-byte character split across chunks
pub(crate) fn append_utf8(buffer: &mut String, pending: &mut Vec<u8>, chunk: &[u8]) {
    pending.extend_from_slice(chunk);
    let mut complete = 0;
    loop {
        match std::str::from_utf8(&pending[complete..]) {
            Ok(_) => {
                complete = pending.len();
                break;
            }
            // Invalid byte: replace it and keep scanning what follows
            Err(err) => match err.error_len() {
                Some(invalid) => complete += err.valid_up_to() + invalid,
                None => {
                    complete += err.valid_up_to();
                    break;
                }
            },
        }
    }
    buffer.push_str(&String::from_utf8_lossy(&pending[..complete]));
    pending.drain(..complete);
}

fn next_event_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|idx| (idx, 2));
    let crlf = buffer.find("\r\n\r\n").map(|idx| (idx, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn data_lines(event: &str) -> impl Iterator<Item = String> + '_ {
    event.lines().filter_map(|line| {
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            None
        } else {
            Some(data.to_string())
        }
    })
}

/// Remove every complete event from `buffer` and return its `data:` payloads
pub(crate) fn drain_sse_data(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some((idx, separator_len)) = next_event_boundary(buffer) {
        let event: String = buffer.drain(..idx + separator_len).collect();
        payloads.extend(data_lines(&event));
    }
    payloads
}

/// Payloads left in the buffer once the body ends without a trailing blank line
pub(crate) fn flush_sse_data(buffer: &mut String) -> Vec<String> {
    let rest = std::mem::take(buffer);
    data_lines(&rest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let auth = map_status_error(
            "openai",
            "gpt-4",
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key provided"}}"#.to_string(),
        );
        assert!(matches!(auth, LLMError::Authentication { ref message, .. } if message == "Incorrect API key provided"));

        let gemini_auth = map_status_error(
            "gemini",
            "gemini-2.0-flash",
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"API key not valid","details":[{"reason":"API_KEY_INVALID"}]}}"#
                .to_string(),
        );
        assert!(matches!(gemini_auth, LLMError::Authentication { .. }));

        let missing = map_status_error("openai", "gpt-9", StatusCode::NOT_FOUND, String::new());
        assert!(matches!(missing, LLMError::InvalidModel { ref model, .. } if model == "gpt-9"));

        let upstream = map_status_error(
            "gemini",
            "gemini-2.0-flash",
            StatusCode::INTERNAL_SERVER_ERROR,
            "oops".to_string(),
        );
        match upstream {
            LLMError::Provider {
                status, payload, ..
            } => {
                assert_eq!(status, Some(500));
                assert_eq!(payload.as_deref(), Some("oops"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn sse_framing_keeps_partial_events_buffered() {
        let mut buffer = String::from("data: {\"a\":1}\n\ndata: {\"b\"");
        assert_eq!(drain_sse_data(&mut buffer), vec!["{\"a\":1}".to_string()]);
        assert_eq!(buffer, "data: {\"b\"");

        buffer.push_str(":2}\r\n\r\ndata: [DONE]");
        assert_eq!(drain_sse_data(&mut buffer), vec!["{\"b\":2}".to_string()]);
        assert_eq!(flush_sse_data(&mut buffer), vec!["[DONE]".to_string()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn split_multibyte_characters_are_reassembled() {
        let bytes = "data: ✅\n\n".as_bytes();
        let mut buffer = String::new();
        let mut pending = Vec::new();

        append_utf8(&mut buffer, &mut pending, &bytes[..7]);
        assert_eq!(buffer, "data: ");
        assert_eq!(pending.len(), 1);

        append_utf8(&mut buffer, &mut pending, &bytes[7..]);
        assert!(pending.is_empty());
        assert_eq!(drain_sse_data(&mut buffer), vec!["✅".to_string()]);
    }

    #[test]
    fn invalid_byte_does_not_swallow_a_split_character() {
        let check = "✅".as_bytes();
        let mut first = b"data: a\xFF".to_vec();
        first.push(check[0]);

        let mut buffer = String::new();
        let mut pending = Vec::new();
        append_utf8(&mut buffer, &mut pending, &first);
        assert_eq!(buffer, "data: a\u{FFFD}");
        assert_eq!(pending, vec![check[0]]);

        append_utf8(&mut buffer, &mut pending, &check[1..]);
        append_utf8(&mut buffer, &mut pending, b"\n\n");
        assert!(pending.is_empty());
        assert_eq!(drain_sse_data(&mut buffer), vec!["a\u{FFFD}✅".to_string()]);
    }
}
