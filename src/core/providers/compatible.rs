//! OpenAI-compatible chat completions client.
//! Works against any `/chat/completions` endpoint with function-style tool calls.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::response::{Message, ModelTurn, Role, ToolCall};
use super::scrub::sanitize_api_error;
use super::traits::Provider;
use crate::config::ModelConfig;
use crate::core::tools::ToolSpec;
use crate::error::ModelError;

pub fn build_provider_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleProvider {
    pub(crate) model: String,
    pub(crate) temperature: f64,
    api_key: Option<String>,
    chat_url: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str, temperature: f64) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let chat_url = if base_url.ends_with("chat/completions") {
            base_url.to_string()
        } else {
            format!("{base_url}/chat/completions")
        };
        Self {
            model: model.to_string(),
            temperature,
            api_key: api_key.filter(|k| !k.is_empty()).map(ToString::to_string),
            chat_url,
            client: build_provider_client(120),
        }
    }

    /// Main model from config.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::for_model(config, &config.model)
    }

    /// Same endpoint and credentials, different model (e.g. the auditor).
    pub fn for_model(config: &ModelConfig, model: &str) -> Self {
        let mut provider = Self::new(
            &config.base_url,
            config.api_key.as_deref(),
            model,
            config.temperature,
        );
        provider.client = build_provider_client(config.request_timeout_secs);
        provider
    }

    fn apply_auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    /// Usually a JSON string; some servers send an object.
    #[serde(default)]
    arguments: serde_json::Value,
}

fn to_wire(message: &Message) -> WireMessage<'_> {
    let content = if message.content.is_empty() && !message.tool_calls.is_empty() {
        None
    } else {
        Some(message.content.as_str())
    };
    WireMessage {
        role: message.role,
        content,
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: &call.id,
                kind: "function",
                function: WireFunctionCall {
                    name: &call.name,
                    arguments: &call.raw_arguments,
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.as_deref(),
    }
}

fn from_wire(response: ChatResponse) -> Result<ModelTurn, ModelError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ModelError::EmptyResponse)?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            let raw_arguments = match call.function.arguments {
                serde_json::Value::String(text) => text,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            ToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.function.name,
                raw_arguments,
            }
        })
        .collect();

    Ok(ModelTurn {
        content: choice.message.content,
        tool_calls,
    })
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolSpec],
    ) -> anyhow::Result<ModelTurn> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: transcript.iter().map(to_wire).collect(),
            tools: tools
                .iter()
                .map(|spec| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: &spec.name,
                        description: &spec.description,
                        parameters: &spec.parameters,
                    },
                })
                .collect(),
        };

        let response = self
            .apply_auth_header(self.client.post(&self.chat_url).json(&request))
            .send()
            .await
            .map_err(|e| ModelError::Request {
                endpoint: self.chat_url.clone(),
                message: sanitize_api_error(&e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                endpoint: self.chat_url.clone(),
                status: status.as_u16(),
                body: sanitize_api_error(&body),
            }
            .into());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("{} returned malformed JSON", self.chat_url))?;
        let turn = from_wire(parsed)?;
        debug!(
            model = %self.model,
            tool_calls = turn.tool_calls.len(),
            has_text = turn.text_content().is_some(),
            "model turn received"
        );
        Ok(turn)
    }

    async fn warmup(&self) -> anyhow::Result<()> {
        // Any response (even 404) means the connection pool is primed.
        let _ = self.client.head(&self.chat_url).send().await;
        Ok(())
    }
}
