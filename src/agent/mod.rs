//! Model access: providers, the tool loop, vision, and reply cleanup.

pub mod backend;
pub mod cleanup;
pub mod errors;
pub mod mcp;
pub mod providers;
pub mod tools;
pub mod vision;

pub use backend::{Backends, ModelBackend, PlainBackend, ToolBackend, TurnRequest};
pub use cleanup::clean_reply;
pub use errors::{ChatError, UpstreamError};
pub use mcp::McpToolSource;
pub use providers::{
    ImageData, LLMProvider, LLMResponse, Message, OllamaProvider, OpenAIProvider, Role, ToolCall,
    ToolSchema, create_provider, create_vision_provider,
};
pub use tools::{StaticToolSource, Tool, ToolResult, ToolSet, ToolSource};
pub use vision::VisionAdapter;
