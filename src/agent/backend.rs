//! Model dispatch for one turn: a plain single call, or a bounded
//! call-model / run-tools loop.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::cleanup::clean_reply;
use super::errors::ChatError;
use super::mcp::McpToolSource;
use super::providers::{LLMProvider, Message, create_provider};
use super::tools::{ToolSet, ToolSource};
use crate::config::Config;
use crate::history::{Turn, TurnRole};
use crate::paths::Paths;

/// Everything a backend needs to answer one input.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [Turn],
    pub input: &'a str,
    /// Literal substrings removed from the reply
    pub cleanup: &'a [String],
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Produce the cleaned reply text.
    async fn respond(&self, request: &TurnRequest<'_>) -> Result<String, ChatError>;
}

fn to_message(turn: &Turn) -> Message {
    match turn.role {
        TurnRole::System => Message::system(turn.content.clone()),
        TurnRole::User => Message::user(turn.content.clone()),
        TurnRole::Assistant => Message::assistant(turn.content.clone()),
    }
}

/// `[system] + history + input`. The system prompt is skipped when the
/// history already starts with one.
fn seed_messages(request: &TurnRequest<'_>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    let has_system = request
        .history
        .iter()
        .any(|t| t.role == TurnRole::System);
    if !has_system && !request.system_prompt.is_empty() {
        messages.push(Message::system(request.system_prompt));
    }
    messages.extend(
        request
            .history
            .iter()
            .filter(|t| !t.content.is_empty())
            .map(to_message),
    );
    messages.push(Message::user(request.input));
    messages
}

/// One request, no tools.
pub struct PlainBackend {
    provider: Arc<dyn LLMProvider>,
}

impl PlainBackend {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ModelBackend for PlainBackend {
    async fn respond(&self, request: &TurnRequest<'_>) -> Result<String, ChatError> {
        let messages = seed_messages(request);
        debug!(
            "Plain request to {} with {} messages",
            self.provider.model(),
            messages.len()
        );
        let response = self
            .provider
            .chat(&messages, None)
            .await
            .map_err(ChatError::upstream)?;
        Ok(clean_reply(&response.content, request.cleanup))
    }
}

/// Calls the model, runs any requested tools, and repeats until the model
/// answers without tool calls or `max_hops` model calls have been made.
pub struct ToolBackend {
    provider: Arc<dyn LLMProvider>,
    source: Arc<dyn ToolSource>,
    tools: OnceCell<ToolSet>,
    max_hops: usize,
}

impl ToolBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, source: Arc<dyn ToolSource>, max_hops: usize) -> Self {
        Self {
            provider,
            source,
            tools: OnceCell::new(),
            max_hops: max_hops.max(1),
        }
    }

    /// Discovered once per process. A failure leaves the set empty.
    async fn tools(&self) -> &ToolSet {
        self.tools
            .get_or_init(|| async {
                match self.source.discover().await {
                    Ok(set) => {
                        info!("Tool discovery found {} tools: {:?}", set.len(), set.names());
                        set
                    }
                    Err(e) => {
                        warn!("Tool discovery failed, continuing without tools: {:#}", e);
                        ToolSet::new()
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl ModelBackend for ToolBackend {
    async fn respond(&self, request: &TurnRequest<'_>) -> Result<String, ChatError> {
        let tools = self.tools().await;
        let schemas = tools.schemas();
        let bound = (!schemas.is_empty()).then_some(schemas.as_slice());

        let mut messages = seed_messages(request);

        for hop in 1..=self.max_hops {
            let response = self
                .provider
                .chat(&messages, bound)
                .await
                .map_err(ChatError::upstream)?;

            if !response.has_tool_calls() || tools.is_empty() {
                return Ok(clean_reply(&response.content, request.cleanup));
            }

            debug!(
                "Hop {}: model requested {} tool calls",
                hop,
                response.tool_calls.len()
            );

            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                results.push(tools.execute(call).await);
            }

            messages.push(Message::assistant_tool_calls(
                response.content,
                response.tool_calls,
            ));
            messages.extend(
                results
                    .into_iter()
                    .map(|r| Message::tool_result(r.call_id, r.output)),
            );
        }

        warn!("Tool loop stopped after {} model calls", self.max_hops);
        Err(ChatError::ToolLoopExhausted(self.max_hops))
    }
}

/// Both backends, built once. The tool backend is chosen per turn from the
/// live `enable_mcp` flag.
pub struct Backends {
    pub plain: Arc<dyn ModelBackend>,
    pub tools: Arc<dyn ModelBackend>,
}

impl Backends {
    pub fn from_config(config: &Config, paths: &Paths) -> anyhow::Result<Self> {
        let provider = create_provider(config)?;
        let source: Arc<dyn ToolSource> = Arc::new(McpToolSource::new(paths.mcp_config_file()));
        Ok(Self {
            plain: Arc::new(PlainBackend::new(provider.clone())),
            tools: Arc::new(ToolBackend::new(provider, source, config.max_tool_hops)),
        })
    }

    pub fn select(&self, use_tools: bool) -> &Arc<dyn ModelBackend> {
        if use_tools { &self.tools } else { &self.plain }
    }
}
