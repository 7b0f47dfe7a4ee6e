//! Gemini provider implementation.
//!
//! Uses the `generateContent` REST endpoint directly.
//!
//! Features:
//! - `x-goog-api-key` header authentication
//! - System instruction as a top-level `systemInstruction` field
//! - Native function calling with `functionCall` / `functionResponse` parts
//! - The model's own parts are replayed verbatim on the next request

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ssalmuk_core::error::ProviderError;
use ssalmuk_core::message::{ToolResultEntry, Turn};
use ssalmuk_core::provider::*;
use ssalmuk_core::tool::ToolCall;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            name: "gemini".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    /// Convert turns to Gemini `contents`.
    fn to_api_contents(turns: &[Turn]) -> Vec<GeminiContent> {
        turns
            .iter()
            .map(|turn| {
                let parts = match turn {
                    Turn::UserText { text } | Turn::ModelText { text } => {
                        vec![serde_json::json!({ "text": text })]
                    }
                    Turn::ModelToolRequest { calls, raw_parts } => {
                        if raw_parts.is_empty() {
                            calls.iter().map(function_call_part).collect()
                        } else {
                            raw_parts.clone()
                        }
                    }
                    Turn::ToolResult { results } => {
                        results.iter().map(function_response_part).collect()
                    }
                };
                GeminiContent {
                    role: turn.role().as_str(),
                    parts,
                }
            })
            .collect()
    }

    /// Convert tool definitions to a single `functionDeclarations` block.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<GeminiTool> {
        vec![GeminiTool {
            function_declarations: tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters_json_schema: t.parameters.clone(),
                })
                .collect(),
        }]
    }

    fn build_body(request: &ProviderRequest) -> Value {
        let mut body = serde_json::json!({
            "contents": Self::to_api_contents(&request.turns),
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if !request.system_instruction.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": request.system_instruction }]
            });
        }

        if let Some(temperature) = request.temperature {
            body["generationConfig"] = serde_json::json!({ "temperature": temperature });
        }

        body
    }

    /// Convert the API response to our domain type.
    fn response_to_provider_response(
        resp: GenerateContentResponse,
        requested_model: &str,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let usage = resp.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });
        let model = resp
            .model_version
            .unwrap_or_else(|| requested_model.to_string());

        let Some(parts) = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .filter(|parts| !parts.is_empty())
        else {
            warn!(feedback = ?resp.prompt_feedback, "Gemini returned no candidate content");
            return Ok(ProviderResponse {
                usage,
                model,
                ..ProviderResponse::default()
            });
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in &parts {
            if let Some(call) = part.get("functionCall") {
                tool_calls.push(parse_function_call(call)?);
                continue;
            }
            let is_thought = part.get("thought").and_then(Value::as_bool).unwrap_or(false);
            if !is_thought && let Some(t) = part.get("text").and_then(Value::as_str) {
                text.push_str(t);
            }
        }

        Ok(ProviderResponse {
            text,
            tool_calls,
            raw_parts: parts,
            usage,
            model,
        })
    }
}

fn function_call_part(call: &ToolCall) -> Value {
    let mut function_call = serde_json::json!({
        "name": call.name,
        "args": call.arguments,
    });
    if let Some(id) = &call.id {
        function_call["id"] = serde_json::json!(id);
    }
    serde_json::json!({ "functionCall": function_call })
}

fn function_response_part(entry: &ToolResultEntry) -> Value {
    let result = serde_json::to_value(&entry.output)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }));
    let mut function_response = serde_json::json!({
        "name": entry.name,
        "response": { "result": result },
    });
    if let Some(id) = &entry.id {
        function_response["id"] = serde_json::json!(id);
    }
    serde_json::json!({ "functionResponse": function_response })
}

fn parse_function_call(call: &Value) -> std::result::Result<ToolCall, ProviderError> {
    let name = call
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::MalformedResponse("functionCall without a name".into()))?;
    let arguments = match call.get("args") {
        Some(Value::Null) | None => serde_json::json!({}),
        Some(args) => args.clone(),
    };
    Ok(ToolCall {
        id: call.get("id").and_then(Value::as_str).map(str::to_string),
        name: name.to_string(),
        arguments,
    })
}

#[async_trait]
impl ssalmuk_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = self.endpoint(&request.model);
        let body = Self::build_body(&request);

        debug!(
            provider = "gemini",
            model = %request.model,
            turns = request.turns.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Gemini API key".into(),
            ));
        }
        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse Gemini response: {e}")))?;

        let resp = Self::response_to_provider_response(api_resp, &request.model)?;
        if let Some(usage) = resp.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                tool_calls = resp.tool_calls.len(),
                "Gemini response received"
            );
        }
        Ok(resp)
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters_json_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssalmuk_core::Provider;
    use ssalmuk_core::tool::ToolOutput;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn parse(json: Value) -> ProviderResponse {
        let resp: GenerateContentResponse = serde_json::from_value(json).unwrap();
        GeminiProvider::response_to_provider_response(resp, "gemini-2.5-flash").unwrap()
    }

    fn request(turns: Vec<Turn>) -> ProviderRequest {
        ProviderRequest {
            model: "gemini-2.5-flash".into(),
            turns,
            tools: vec![],
            system_instruction: String::new(),
            temperature: None,
        }
    }

    /// Answer exactly one HTTP request with a canned response; yields the raw request.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let content_length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + content_length {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn provider_name() {
        let p = GeminiProvider::new("test-key");
        assert_eq!(p.name(), "gemini");
    }

    #[test]
    fn custom_base_url_trims_slash() {
        let p = GeminiProvider::new("key").with_base_url("https://proxy.example.com/");
        assert_eq!(p.base_url(), "https://proxy.example.com");
        assert_eq!(
            p.endpoint("gemini-2.5-flash"),
            "https://proxy.example.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn text_turns_map_to_roles() {
        let contents = GeminiProvider::to_api_contents(&[Turn::user("Hi"), Turn::model("Hello!")]);
        let json = serde_json::to_value(&contents).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "role": "user", "parts": [{ "text": "Hi" }] },
                { "role": "model", "parts": [{ "text": "Hello!" }] }
            ])
        );
    }

    #[test]
    fn tool_request_replays_raw_parts_verbatim() {
        let raw = serde_json::json!({
            "functionCall": { "name": "read_file", "args": { "path": "a.rs" } },
            "thoughtSignature": "opaque"
        });
        let turn = Turn::ModelToolRequest {
            calls: vec![ToolCall::new("read_file", serde_json::json!({ "path": "a.rs" }))],
            raw_parts: vec![raw.clone()],
        };
        let contents = GeminiProvider::to_api_contents(&[turn]);
        assert_eq!(contents[0].role, "model");
        assert_eq!(contents[0].parts, vec![raw]);
    }

    #[test]
    fn tool_request_without_raw_parts_is_synthesised() {
        let mut call = ToolCall::new("run_command", serde_json::json!({ "command": "ls" }));
        call.id = Some("call-1".into());
        let turn = Turn::ModelToolRequest {
            calls: vec![call],
            raw_parts: vec![],
        };
        let contents = GeminiProvider::to_api_contents(&[turn]);
        assert_eq!(
            contents[0].parts[0],
            serde_json::json!({
                "functionCall": { "name": "run_command", "args": { "command": "ls" }, "id": "call-1" }
            })
        );
    }

    #[test]
    fn tool_results_wrap_output_in_result() {
        let turn = Turn::ToolResult {
            results: vec![
                ToolResultEntry {
                    id: None,
                    name: "write_file".into(),
                    output: ToolOutput::Written { written: true },
                },
                ToolResultEntry {
                    id: Some("c2".into()),
                    name: "nope".into(),
                    output: ToolOutput::error("Unknown tool: nope"),
                },
            ],
        };
        let contents = GeminiProvider::to_api_contents(&[turn]);
        assert_eq!(contents[0].role, "user");
        assert_eq!(
            contents[0].parts,
            vec![
                serde_json::json!({
                    "functionResponse": { "name": "write_file", "response": { "result": { "written": true } } }
                }),
                serde_json::json!({
                    "functionResponse": {
                        "name": "nope",
                        "response": { "result": { "error": "Unknown tool: nope" } },
                        "id": "c2"
                    }
                }),
            ]
        );
    }

    #[test]
    fn tools_and_instruction_in_body() {
        let mut req = request(vec![Turn::user("hi")]);
        req.tools = vec![ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({ "type": "object", "required": ["path"] }),
        }];
        req.system_instruction = "You are a coding agent.".into();
        req.temperature = Some(0.2);

        let body = GeminiProvider::build_body(&req);
        let decl = &body["tools"][0]["functionDeclarations"][0];
        assert_eq!(decl["name"], "read_file");
        assert_eq!(decl["parametersJsonSchema"]["required"][0], "path");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a coding agent."
        );
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn empty_instruction_and_tools_are_omitted() {
        let body = GeminiProvider::build_body(&request(vec![Turn::user("hi")]));
        assert!(body.get("tools").is_none());
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn parse_text_response_skips_thoughts() {
        let resp = parse(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "thinking...", "thought": true },
                        { "text": "Hello, " },
                        { "text": "world" }
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15 },
            "modelVersion": "gemini-2.5-flash-001"
        }));

        assert_eq!(resp.text, "Hello, world");
        assert!(!resp.has_tool_calls());
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
        assert_eq!(resp.model, "gemini-2.5-flash-001");
    }

    #[test]
    fn parse_function_calls_in_order() {
        let resp = parse(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Let me look." },
                        { "functionCall": { "name": "read_file", "args": { "path": "Cargo.toml" } } },
                        { "functionCall": { "id": "x1", "name": "run_command", "args": { "command": "ls" } } }
                    ]
                }
            }]
        }));

        assert_eq!(resp.text, "Let me look.");
        assert_eq!(resp.tool_calls.len(), 2);
        assert_eq!(resp.tool_calls[0].name, "read_file");
        assert_eq!(resp.tool_calls[0].arguments["path"], "Cargo.toml");
        assert_eq!(resp.tool_calls[1].id.as_deref(), Some("x1"));
        assert_eq!(resp.raw_parts.len(), 3);
        assert_eq!(resp.model, "gemini-2.5-flash");
    }

    #[test]
    fn function_call_without_args_gets_empty_object() {
        let resp = parse(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "functionCall": { "name": "run_command" } }] } }]
        }));
        assert_eq!(resp.tool_calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn nameless_function_call_is_malformed() {
        let resp: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "functionCall": { "args": {} } }] } }]
        }))
        .unwrap();
        let err = GeminiProvider::response_to_provider_response(resp, "m").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn no_candidates_is_an_empty_answer() {
        let resp = parse(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }));
        assert!(resp.text.is_empty());
        assert!(!resp.has_tool_calls());
    }

    #[tokio::test]
    async fn complete_posts_to_generate_content() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"pong"}]}}]}"#,
        )
        .await;

        let provider = GeminiProvider::new("secret-key").with_base_url(base_url);
        let resp = provider.complete(request(vec![Turn::user("ping")])).await.unwrap();
        assert_eq!(resp.text, "pong");

        let raw_request = server.await.unwrap();
        assert!(raw_request.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent"));
        assert!(raw_request.to_lowercase().contains("x-goog-api-key: secret-key"));
        assert!(raw_request.contains(r#""text":"ping""#));
    }

    #[tokio::test]
    async fn auth_failure_maps_to_authentication_failed() {
        let (base_url, server) = serve_once("403 Forbidden", r#"{"error":{}}"#).await;
        let provider = GeminiProvider::new("bad").with_base_url(base_url);
        let err = provider.complete(request(vec![Turn::user("hi")])).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let (base_url, server) = serve_once("429 Too Many Requests", "{}").await;
        let provider = GeminiProvider::new("k").with_base_url(base_url);
        let err = provider.complete(request(vec![Turn::user("hi")])).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let (base_url, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let provider = GeminiProvider::new("k").with_base_url(base_url);
        let err = provider.complete(request(vec![Turn::user("hi")])).await.unwrap_err();
        match err {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 500);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let provider = GeminiProvider::new("k").with_base_url("http://127.0.0.1:1");
        let err = provider.complete(request(vec![Turn::user("hi")])).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
