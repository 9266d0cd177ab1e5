use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionRequest, CompletionResponse, Provider, status_error, transport_error};
use crate::errors::ProviderError;

const NAME: &str = "Anthropic";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic messages API
#[derive(Debug)]
pub struct Anthropic {
    client: Client,
    api_key: String,
    /// Base URL without the `/v1/messages` suffix
    endpoint: String,
}

/// Body of `POST /v1/messages`
#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Turn<'a>>,
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

/// Reply of the messages API; only text blocks are used
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl<'a> MessagesRequest<'a> {
    /// Single-turn request with an optional system prompt
    pub fn single_turn(model: &'a str, max_tokens: u32, system: Option<&'a str>, user: &'a str) -> Self {
        Self {
            model,
            max_tokens,
            system: system.filter(|s| !s.is_empty()),
            temperature: None,
            messages: vec![Turn { role: "user", content: user }],
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl MessagesResponse {
    /// Concatenated text of every text block
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect()
    }
}

impl Anthropic {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        if self.endpoint.is_empty() {
            "https://api.anthropic.com/v1/messages".to_string()
        } else {
            format!("{}/v1/messages", self.endpoint)
        }
    }

    /// Send one messages request
    pub async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, ProviderError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("{} returned {}: {}", NAME, status, body);
            return Err(status_error(NAME, status, body));
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("{}: {}", NAME, e)))
    }
}

#[async_trait]
impl Provider for Anthropic {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = MessagesRequest::single_turn(
            &request.model,
            request.max_tokens,
            Some(&request.system),
            &request.user,
        )
        .with_temperature(request.temperature);

        let response = self.send(&body).await?;
        Ok(CompletionResponse {
            text: response.text(),
            prompt_tokens: Some(response.usage.input_tokens),
            completion_tokens: Some(response.usage.output_tokens),
        })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let probe = MessagesRequest::single_turn("claude-3-haiku-20240307", 8, None, "ping");
        self.send(&probe).await.map(|_| ())
    }

    fn name(&self) -> &str {
        NAME
    }
}
