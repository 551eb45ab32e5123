use std::time::Duration;

use agridiag_contracts::results::{FailureKind, InferenceResult};
use anyhow::{Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::config::AppConfig;
use crate::normalizer::CanonicalImage;

const ERROR_MESSAGE_MAX_CHARS: usize = 512;

/// One outbound call: the canonical image plus resolved prompt text.
#[derive(Debug, Clone)]
pub struct InferenceRequest<'a> {
    pub image: &'a CanonicalImage,
    pub prompt: String,
    pub thinking_budget: Option<u32>,
}

/// A remote multimodal model. Implementations make exactly one attempt and
/// never retry: every outcome, including transport errors, is an
/// `InferenceResult`.
pub trait InferenceClient: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn infer(&self, request: &InferenceRequest<'_>) -> InferenceResult;
}

pub struct GeminiClient {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            http,
        })
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    /// Request body for `generateContent`. The image part leads the text
    /// part.
    pub fn build_payload(request: &InferenceRequest<'_>) -> Value {
        let mut payload = Map::new();
        payload.insert(
            "contents".to_string(),
            json!([{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.image.mime_type(),
                            "data": request.image.to_base64(),
                        }
                    },
                    { "text": request.prompt },
                ],
            }]),
        );
        if let Some(budget) = request.thinking_budget {
            payload.insert(
                "generationConfig".to_string(),
                json!({
                    "thinkingConfig": { "thinkingBudget": budget },
                }),
            );
        }
        Value::Object(payload)
    }

    fn send(&self, payload: &Value) -> Result<HttpResponse, reqwest::Error> {
        self.http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
    }
}

impl InferenceClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn infer(&self, request: &InferenceRequest<'_>) -> InferenceResult {
        let payload = Self::build_payload(request);
        log::debug!(
            "POST {} (image {} bytes, prompt {} chars, thinking budget {:?})",
            self.endpoint(),
            request.image.len(),
            request.prompt.chars().count(),
            request.thinking_budget
        );

        let response = match self.send(&payload) {
            Ok(response) => response,
            Err(err) => {
                let result = classify_transport_error(err);
                log::warn!("Gemini transport failure: {result:?}");
                return result;
            }
        };

        let code = response.status().as_u16();
        let body = match response.text() {
            Ok(body) => body,
            Err(err) => return classify_transport_error(err),
        };
        let result = result_from_response(code, &body);
        match &result {
            InferenceResult::Success { text } => {
                log::info!("Gemini returned {} chars ({code})", text.chars().count());
            }
            InferenceResult::Failure { kind, .. } => {
                log::warn!("Gemini request failed ({code}) classified as {kind}");
            }
        }
        result
    }
}

/// Maps a completed HTTP exchange to a result.
pub fn result_from_response(code: u16, body: &str) -> InferenceResult {
    if !(200..300).contains(&code) {
        return classify_http_failure(code, body);
    }
    let parsed: Value = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return InferenceResult::failure(
                FailureKind::UnknownError,
                format!("Gemini returned invalid JSON payload: {err}"),
            );
        }
    };
    match extract_response_text(&parsed) {
        Some(text) => InferenceResult::success(text),
        None => InferenceResult::failure(
            FailureKind::UnknownError,
            format!(
                "Gemini returned no text ({})",
                empty_response_reason(&parsed)
            ),
        ),
    }
}

/// Text parts of the first candidate joined together, skipping thought
/// summaries. `None` when there is no text at all.
pub fn extract_response_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)?;
    let mut text = String::new();
    for part in parts {
        if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        if let Some(chunk) = part.get("text").and_then(Value::as_str) {
            text.push_str(chunk);
        }
    }
    (!text.is_empty()).then_some(text)
}

fn empty_response_reason(payload: &Value) -> String {
    if let Some(block) = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return format!("prompt blocked: {block}");
    }
    if let Some(reason) = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("finishReason"))
        .and_then(Value::as_str)
    {
        return format!("finish reason: {reason}");
    }
    "no candidates".to_string()
}

/// Classifies a non-2xx response using the status code and the `status`
/// string of Google's error envelope.
pub fn classify_http_failure(code: u16, body: &str) -> InferenceResult {
    let envelope = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").cloned());
    let status = envelope
        .as_ref()
        .and_then(|error| error.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let message = envelope
        .as_ref()
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string());
    let lowered = message.to_ascii_lowercase();
    let invalid_key = body.contains("API_KEY_INVALID") || lowered.contains("api key not valid");
    let oversized = lowered.contains("payload size exceeds")
        || lowered.contains("request payload size")
        || lowered.contains("too large");

    let kind = match (code, status.as_str()) {
        (401 | 403, _) | (_, "UNAUTHENTICATED" | "PERMISSION_DENIED") => {
            FailureKind::AuthenticationError
        }
        (400, _) if invalid_key => FailureKind::AuthenticationError,
        (429, _) | (_, "RESOURCE_EXHAUSTED") => FailureKind::QuotaOrRateLimitError,
        (413, _) => FailureKind::PayloadTooLargeError,
        (400, _) if oversized => FailureKind::PayloadTooLargeError,
        (500 | 502 | 503 | 504, _) | (_, "UNAVAILABLE" | "INTERNAL" | "DEADLINE_EXCEEDED") => {
            FailureKind::ServiceUnavailableError
        }
        _ => FailureKind::UnknownError,
    };

    let detail = if message.is_empty() {
        "no error message".to_string()
    } else {
        truncate_text(&message, ERROR_MESSAGE_MAX_CHARS)
    };
    InferenceResult::failure(kind, format!("Gemini request failed ({code}): {detail}"))
}

/// The URL is stripped first so the query-string key never reaches the
/// message.
pub fn classify_transport_error(err: reqwest::Error) -> InferenceResult {
    let err = err.without_url();
    let kind = if err.is_timeout() || err.is_connect() {
        FailureKind::ServiceUnavailableError
    } else {
        FailureKind::UnknownError
    };
    let message = error_chain_text(&err, ERROR_MESSAGE_MAX_CHARS);
    InferenceResult::failure(kind, format!("Error calling Gemini API: {message}"))
}

fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty()
            && !parts
                .last()
                .map(|existing| existing == trimmed)
                .unwrap_or(false)
        {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

/// Used by callers that want the configured timeout for display.
pub fn describe_timeout(timeout: Option<Duration>) -> String {
    match timeout {
        Some(value) => format!("{:.1}s", value.as_secs_f64()),
        None => "transport default".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use agridiag_contracts::results::{FailureKind, InferenceResult};
    use serde_json::json;

    use super::{
        classify_http_failure, describe_timeout, extract_response_text, result_from_response,
        truncate_text, GeminiClient, InferenceClient, InferenceRequest,
    };
    use crate::config::{AppConfig, ConfigOverrides};
    use crate::normalizer::{normalize, UploadedImage};

    fn canonical() -> crate::normalizer::CanonicalImage {
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgb8(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode test image");
        normalize(&UploadedImage::from_bytes("leaf.png", bytes), u64::MAX)
            .expect("normalize test image")
            .image
    }

    fn config(model: &str) -> AppConfig {
        AppConfig::resolve_with(
            ConfigOverrides {
                model: Some(model.to_string()),
                api_base: Some("https://example.test/v1beta/".to_string()),
                ..ConfigOverrides::default()
            },
            &|key: &str| (key == "GEMINI_API_KEY").then(|| "test-key".to_string()),
        )
        .expect("test config")
    }

    fn kind_of(result: &InferenceResult) -> Option<FailureKind> {
        result.failure_kind()
    }

    #[test]
    fn payload_orders_image_before_text_and_carries_budget() {
        let image = canonical();
        let request = InferenceRequest {
            image: &image,
            prompt: "What disease is this?".to_string(),
            thinking_budget: Some(500),
        };
        let payload = GeminiClient::build_payload(&request);
        let parts = payload["contents"][0]["parts"]
            .as_array()
            .expect("parts array");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!(image.to_base64()));
        assert_eq!(parts[1]["text"], json!("What disease is this?"));
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        assert_eq!(
            payload["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            json!(500)
        );
    }

    #[test]
    fn payload_omits_generation_config_without_budget() {
        let image = canonical();
        let request = InferenceRequest {
            image: &image,
            prompt: "hi".to_string(),
            thinking_budget: None,
        };
        let payload = GeminiClient::build_payload(&request);
        assert!(payload.get("generationConfig").is_none());
    }

    #[test]
    fn endpoint_uses_model_path() -> anyhow::Result<()> {
        let client = GeminiClient::new(&config("gemini-2.5-flash"))?;
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        let prefixed = GeminiClient::new(&config("models/gemini-2.5-pro"))?;
        assert_eq!(
            prefixed.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-pro:generateContent"
        );
        Ok(())
    }

    #[test]
    fn response_text_joins_parts_and_skips_thoughts() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "thinking about spots", "thought": true},
                        {"text": "Likely disease: "},
                        {"text": "Leaf Blight"},
                    ]
                },
                "finishReason": "STOP",
            }, {
                "content": {"parts": [{"text": "second candidate"}]}
            }]
        });
        assert_eq!(
            extract_response_text(&payload).as_deref(),
            Some("Likely disease: Leaf Blight")
        );
    }

    #[test]
    fn success_body_becomes_success_verbatim() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "  * spots\n* halo  "}]}}]
        })
        .to_string();
        assert_eq!(
            result_from_response(200, &body),
            InferenceResult::success("  * spots\n* halo  ")
        );
    }

    #[test]
    fn blocked_prompt_is_unknown_error_with_reason() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let result = result_from_response(200, &body);
        assert_eq!(kind_of(&result), Some(FailureKind::UnknownError));
        match result {
            InferenceResult::Failure { message, .. } => {
                assert!(message.contains("prompt blocked: SAFETY"), "{message}")
            }
            other => panic!("unexpected {other:?}"),
        }

        let no_text = json!({"candidates": [{"finishReason": "MAX_TOKENS"}]}).to_string();
        let result = result_from_response(200, &no_text);
        assert!(matches!(
            result,
            InferenceResult::Failure { ref message, .. } if message.contains("finish reason: MAX_TOKENS")
        ));
    }

    #[test]
    fn invalid_json_success_is_unknown_error() {
        let result = result_from_response(200, "<html>oops</html>");
        assert_eq!(kind_of(&result), Some(FailureKind::UnknownError));
    }

    #[test]
    fn http_failures_are_classified() {
        let envelope = |code: u16, status: &str, message: &str| {
            json!({"error": {"code": code, "status": status, "message": message}}).to_string()
        };
        let cases = [
            (
                400,
                json!({"error": {
                    "code": 400,
                    "status": "INVALID_ARGUMENT",
                    "message": "API key not valid. Please pass a valid API key.",
                    "details": [{"reason": "API_KEY_INVALID"}],
                }})
                .to_string(),
                FailureKind::AuthenticationError,
            ),
            (
                403,
                envelope(403, "PERMISSION_DENIED", "denied"),
                FailureKind::AuthenticationError,
            ),
            (401, String::new(), FailureKind::AuthenticationError),
            (
                429,
                envelope(429, "RESOURCE_EXHAUSTED", "Quota exceeded"),
                FailureKind::QuotaOrRateLimitError,
            ),
            (413, "Request Entity Too Large".to_string(), FailureKind::PayloadTooLargeError),
            (
                400,
                envelope(
                    400,
                    "INVALID_ARGUMENT",
                    "Request payload size exceeds the limit: 20971520 bytes.",
                ),
                FailureKind::PayloadTooLargeError,
            ),
            (
                503,
                envelope(503, "UNAVAILABLE", "The model is overloaded."),
                FailureKind::ServiceUnavailableError,
            ),
            (500, envelope(500, "INTERNAL", "boom"), FailureKind::ServiceUnavailableError),
            (
                504,
                envelope(504, "DEADLINE_EXCEEDED", "deadline"),
                FailureKind::ServiceUnavailableError,
            ),
            (
                400,
                envelope(400, "INVALID_ARGUMENT", "Unsupported MIME type"),
                FailureKind::UnknownError,
            ),
            (404, envelope(404, "NOT_FOUND", "model not found"), FailureKind::UnknownError),
        ];
        for (code, body, expected) in cases {
            let result = classify_http_failure(code, &body);
            assert_eq!(kind_of(&result), Some(expected), "{code} {body}");
        }
    }

    #[test]
    fn http_failure_message_prefers_envelope_message() {
        let body = json!({"error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded for metric"}})
            .to_string();
        assert_eq!(
            classify_http_failure(429, &body),
            InferenceResult::failure(
                FailureKind::QuotaOrRateLimitError,
                "Gemini request failed (429): Quota exceeded for metric"
            )
        );
        let raw = classify_http_failure(502, "  bad gateway ");
        assert_eq!(
            raw,
            InferenceResult::failure(
                FailureKind::ServiceUnavailableError,
                "Gemini request failed (502): bad gateway"
            )
        );
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match classify_http_failure(418, &body) {
            InferenceResult::Failure { message, .. } => {
                assert!(message.chars().count() < 600);
                assert!(message.ends_with('…'));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn unreachable_endpoint_is_service_unavailable_and_hides_key() -> anyhow::Result<()> {
        let config = AppConfig::resolve_with(
            ConfigOverrides {
                api_base: Some("http://127.0.0.1:1/v1beta".to_string()),
                timeout_secs: Some(5.0),
                ..ConfigOverrides::default()
            },
            &|key: &str| (key == "GEMINI_API_KEY").then(|| "secret-test-key".to_string()),
        )?;
        let client = GeminiClient::new(&config)?;
        let image = canonical();
        let request = InferenceRequest {
            image: &image,
            prompt: "What disease is this?".to_string(),
            thinking_budget: Some(200),
        };

        match client.infer(&request) {
            InferenceResult::Failure { kind, message } => {
                assert_eq!(kind, FailureKind::ServiceUnavailableError);
                assert!(message.starts_with("Error calling Gemini API:"), "{message}");
                assert!(!message.contains("secret-test-key"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn timeout_description() {
        assert_eq!(describe_timeout(None), "transport default");
        assert_eq!(
            describe_timeout(Some(std::time::Duration::from_millis(2500))),
            "2.5s"
        );
    }
}
