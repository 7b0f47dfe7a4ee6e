//! Shared test helpers: a scripted provider that records what it was sent.

use ssalmuk_core::error::ProviderError;
use ssalmuk_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use ssalmuk_core::tool::ToolCall;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Returns scripted responses in order, then repeats `fallback` if set.
///
/// Running out of script without a fallback is a provider error.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    fallback: Option<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same response.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(vec![])
        }
    }

    /// Fail the first call.
    pub fn failing(error: ProviderError) -> Self {
        let provider = Self::new(vec![]);
        provider.responses.lock().unwrap().push_back(Err(error));
        provider
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ProviderError::MalformedResponse("script exhausted".into())),
        }
    }
}

/// A plain-text response.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted-model".into(),
        ..ProviderResponse::text(text)
    }
}

/// A response requesting the given `(name, args)` calls.
pub fn tool_response(calls: &[(&str, serde_json::Value)]) -> ProviderResponse {
    ProviderResponse {
        model: "scripted-model".into(),
        ..ProviderResponse::tool_calls(
            calls
                .iter()
                .map(|(name, args)| ToolCall::new(*name, args.clone()))
                .collect(),
        )
    }
}
