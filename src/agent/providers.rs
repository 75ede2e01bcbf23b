use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::errors::UpstreamError;
use crate::config::{Config, Endpoint};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Inline image attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub media_type: String,
    /// Base64 without the `data:` prefix
    pub data: String,
}

impl ImageData {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            images: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant message that requested tools.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.images.push(image);
        self
    }
}

/// One model reply: text, tool requests, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LLMResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl LLMResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls: calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, messages: &[Message], tools: Option<&[ToolSchema]>)
    -> Result<LLMResponse>;

    fn model(&self) -> &str;
}

/// Chat provider for the configured backend (Ollama when `use_local_model`).
pub fn create_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    if config.use_local_model {
        Ok(Arc::new(OllamaProvider::new(
            &config.local_base_url,
            &config.local_model,
            config.model_temperature,
            timeout,
        )?))
    } else {
        Ok(Arc::new(OpenAIProvider::new(
            &config.chat_endpoint(),
            config.model_temperature,
            timeout,
        )?))
    }
}

/// Vision provider; always an OpenAI-compatible endpoint.
pub fn create_vision_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let provider = OpenAIProvider::new(
        &config.vision_endpoint(),
        config.model_temperature,
        Duration::from_secs(config.request_timeout_secs),
    )?
    .with_max_tokens(2048);
    Ok(Arc::new(provider))
}

fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

// OpenAI-compatible Provider
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
}

impl OpenAIProvider {
    pub fn new(endpoint: &Endpoint, temperature: f64, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: endpoint.api_key.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
            temperature,
            max_tokens: None,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn format_tools(&self, tools: &[ToolSchema]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect()
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let content = if m.images.is_empty() {
                    json!(m.content)
                } else {
                    let mut parts: Vec<Value> = m
                        .images
                        .iter()
                        .map(|img| {
                            json!({
                                "type": "image_url",
                                "image_url": { "url": img.data_url() }
                            })
                        })
                        .collect();
                    parts.push(json!({"type": "text", "text": m.content}));
                    Value::Array(parts)
                };

                let mut msg = json!({
                    "role": role_name(m.role),
                    "content": content
                });

                if let Some(ref tool_calls) = m.tool_calls {
                    msg["tool_calls"] = json!(
                        tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.arguments
                                    }
                                })
                            })
                            .collect::<Vec<_>>()
                    );
                }

                if let Some(ref tool_call_id) = m.tool_call_id {
                    msg["tool_call_id"] = json!(tool_call_id);
                }

                msg
            })
            .collect()
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<LLMResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": self.format_messages(messages),
            "temperature": self.temperature,
            "stream": false
        });

        if let Some(tools) = tools
            && !tools.is_empty()
        {
            body["tools"] = json!(self.format_tools(tools));
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        debug!("OpenAI request: {}", serde_json::to_string_pretty(&body)?);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &text).into());
        }

        let response_body: Value = response.json().await.map_err(UpstreamError::from_reqwest)?;

        debug!(
            "OpenAI response: {}",
            serde_json::to_string_pretty(&response_body)?
        );

        if let Some(error) = response_body.get("error") {
            return Err(UpstreamError::from_message(&format!("OpenAI API error: {}", error)).into());
        }

        let choice = response_body["choices"]
            .get(0)
            .ok_or_else(|| UpstreamError::Other("No choices in response".into()))?;

        let message = &choice["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();

        let tool_calls: Vec<ToolCall> = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .map(|tc| ToolCall {
                        id: tc["id"].as_str().unwrap_or("").to_string(),
                        name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                        arguments: tc["function"]["arguments"]
                            .as_str()
                            .unwrap_or("{}")
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            tool_calls,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Ollama Provider (for local models)
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f64,
}

impl OllamaProvider {
    pub fn new(endpoint: &str, model: &str, temperature: f64, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        })
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let mut msg = json!({
                    "role": role_name(m.role),
                    "content": m.content
                });
                if !m.images.is_empty() {
                    msg["images"] = json!(m.images.iter().map(|i| &i.data).collect::<Vec<_>>());
                }
                if let Some(ref tool_calls) = m.tool_calls {
                    msg["tool_calls"] = json!(
                        tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "function": {
                                        "name": tc.name,
                                        "arguments": serde_json::from_str::<Value>(&tc.arguments)
                                            .unwrap_or(json!({}))
                                    }
                                })
                            })
                            .collect::<Vec<_>>()
                    );
                }
                msg
            })
            .collect()
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<LLMResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": self.format_messages(messages),
            "stream": false,
            "options": { "temperature": self.temperature }
        });

        if let Some(tools) = tools
            && !tools.is_empty()
        {
            body["tools"] = json!(
                tools
                    .iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    }))
                    .collect::<Vec<_>>()
            );
        }

        debug!("Ollama request: {}", serde_json::to_string_pretty(&body)?);

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &text).into());
        }

        let response_body: Value = response.json().await.map_err(UpstreamError::from_reqwest)?;

        debug!(
            "Ollama response: {}",
            serde_json::to_string_pretty(&response_body)?
        );

        if let Some(error) = response_body.get("error") {
            return Err(UpstreamError::from_message(&format!("Ollama error: {}", error)).into());
        }

        let message = &response_body["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();

        // Ollama omits call ids; synthesize stable ones per response.
        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .enumerate()
                    .map(|(i, tc)| ToolCall {
                        id: tc["id"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("call_{}", i)),
                        name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                        arguments: match &tc["function"]["arguments"] {
                            Value::String(s) => s.clone(),
                            Value::Null => "{}".to_string(),
                            other => other.to_string(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            tool_calls,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
#[path = "test/unit/provider_http_test.rs"]
mod provider_http_test;
