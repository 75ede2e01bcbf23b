//! Tool servers registered in `mcp_config.json`, reached through `rmcp`.
//!
//! ```json
//! {"mcpServers": {
//!     "search": {"transport": "streamable_http", "url": "http://localhost:8931/mcp"},
//!     "files":  {"transport": "stdio", "command": "npx", "args": ["-y", "server-fs", "/tmp"]}
//! }}
//! ```
//!
//! A server that fails to start or list its tools is skipped with a warning.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmcp::{
    ServiceExt,
    model::{
        CallToolRequestParams, ClientCapabilities, Implementation, InitializeRequestParams,
        RawContent,
    },
    service::{RoleClient, RunningService, ServerSink},
    transport::{StreamableHttpClientTransport, child_process::TokioChildProcess},
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use super::providers::ToolSchema;
use super::tools::{Tool, ToolSet, ToolSource};

pub const ACCEPTED_TRANSPORTS: &[&str] = &["stdio", "streamable_http"];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach one tool server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ServerSpec {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
    },
    StreamableHttp {
        url: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct McpConfigFile {
    #[serde(default, rename = "mcpServers")]
    servers: BTreeMap<String, Value>,
}

/// Parse every server entry, in name order. Bad entries are reported per
/// server so the rest can still be used.
pub fn parse_servers(content: &str) -> Result<Vec<(String, Result<ServerSpec>)>> {
    let file: McpConfigFile = serde_json::from_str(content).context("Invalid mcp_config.json")?;
    Ok(file
        .servers
        .into_iter()
        .map(|(name, raw)| {
            let spec = parse_server(&name, raw);
            (name, spec)
        })
        .collect())
}

fn parse_server(name: &str, raw: Value) -> Result<ServerSpec> {
    let accepted = ACCEPTED_TRANSPORTS.join(", ");
    match raw.get("transport") {
        None => anyhow::bail!(
            "Missing 'transport' key for MCP server '{}'. Accepted values: {}",
            name,
            accepted
        ),
        Some(Value::String(t)) if !ACCEPTED_TRANSPORTS.contains(&t.as_str()) => anyhow::bail!(
            "Unsupported transport '{}' for MCP server '{}'. Accepted values: {}",
            t,
            name,
            accepted
        ),
        _ => {}
    }
    serde_json::from_value(raw).with_context(|| format!("Invalid MCP server '{}'", name))
}

/// Discovers tools from the servers in `mcp_config.json`.
pub struct McpToolSource {
    config_path: PathBuf,
}

impl McpToolSource {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

#[async_trait]
impl ToolSource for McpToolSource {
    async fn discover(&self) -> Result<ToolSet> {
        let mut set = ToolSet::new();

        if !self.config_path.exists() {
            info!(
                "No MCP config at {:?}; tool servers are unavailable",
                self.config_path
            );
            return Ok(set);
        }

        let content = tokio::fs::read_to_string(&self.config_path).await?;
        for (name, spec) in parse_servers(&content)? {
            let spec = match spec {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("MCP config error: {:#}", e);
                    continue;
                }
            };

            match tokio::time::timeout(CONNECT_TIMEOUT, connect(&name, &spec)).await {
                Ok(Ok(tools)) => {
                    info!("Loaded {} tools from MCP server '{}'", tools.len(), name);
                    for tool in tools {
                        set.add(tool);
                    }
                }
                Ok(Err(e)) => warn!("MCP server '{}' unavailable: {:#}", name, e),
                Err(_) => warn!("MCP server '{}' timed out while connecting", name),
            }
        }

        Ok(set)
    }
}

fn client_info() -> InitializeRequestParams {
    InitializeRequestParams {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Default::default()
        },
    }
}

type ClientService = RunningService<RoleClient, InitializeRequestParams>;

/// Keeps a server session open while any of its tools is alive.
struct Connection {
    _service: Mutex<ClientService>,
}

async fn connect(name: &str, spec: &ServerSpec) -> Result<Vec<Arc<dyn Tool>>> {
    let service: ClientService = match spec {
        ServerSpec::StreamableHttp { url } => {
            let transport = StreamableHttpClientTransport::from_uri(url.as_str());
            client_info()
                .serve(transport)
                .await
                .with_context(|| format!("Failed to connect to {}", url))?
        }
        ServerSpec::Stdio {
            command,
            args,
            env,
            cwd,
        } => {
            let mut cmd = tokio::process::Command::new(command);
            cmd.args(args);
            if let Some(dir) = cwd {
                cmd.current_dir(dir);
            }
            for (key, value) in env {
                cmd.env(key, value);
            }
            let transport = TokioChildProcess::new(cmd)
                .with_context(|| format!("Failed to spawn '{}'", command))?;
            client_info()
                .serve(transport)
                .await
                .with_context(|| format!("Failed to initialize '{}'", command))?
        }
    };

    let sink = service.peer().clone();
    let listed = sink
        .list_tools(Default::default())
        .await
        .with_context(|| format!("Failed to list tools of '{}'", name))?
        .tools;

    let connection = Arc::new(Connection {
        _service: Mutex::new(service),
    });

    Ok(listed
        .into_iter()
        .map(|definition| {
            Arc::new(McpTool {
                schema: ToolSchema {
                    name: definition.name.to_string(),
                    description: definition
                        .description
                        .as_deref()
                        .unwrap_or_default()
                        .to_string(),
                    parameters: Value::Object((*definition.input_schema).clone()),
                },
                sink: sink.clone(),
                _connection: connection.clone(),
            }) as Arc<dyn Tool>
        })
        .collect())
}

struct McpTool {
    schema: ToolSchema,
    sink: ServerSink,
    _connection: Arc<Connection>,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, arguments: &str) -> Result<String> {
        let arguments = match serde_json::from_str::<Value>(arguments) {
            Ok(Value::Object(map)) => Some(map),
            Ok(Value::Null) | Err(_) => None,
            Ok(other) => anyhow::bail!("Tool arguments must be a JSON object, got {}", other),
        };

        let result = self
            .sink
            .call_tool(CallToolRequestParams {
                meta: None,
                name: self.schema.name.clone().into(),
                arguments,
                task: None,
            })
            .await
            .with_context(|| format!("Tool call '{}' failed", self.schema.name))?;

        let text = result
            .content
            .into_iter()
            .map(|c| match c.raw {
                RawContent::Text(raw) => raw.text,
                RawContent::Image(raw) => format!("[image: {}]", raw.mime_type),
                RawContent::Resource(_) => "[resource]".to_string(),
                RawContent::Audio(_) => "[audio]".to_string(),
                RawContent::ResourceLink(link) => format!("[link: {}]", link.uri),
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error == Some(true) {
            anyhow::bail!(
                "{}",
                if text.is_empty() {
                    "No message returned"
                } else {
                    &text
                }
            );
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_transports() {
        let servers = parse_servers(
            r#"{"mcpServers": {
                "web": {"transport": "streamable_http", "url": "http://localhost:9/mcp"},
                "fs": {"transport": "stdio", "command": "server-fs", "args": ["/tmp"], "env": {"A": "1"}}
            }}"#,
        )
        .unwrap();

        let names: Vec<_> = servers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["fs", "web"]);

        assert_eq!(
            servers[0].1.as_ref().unwrap(),
            &ServerSpec::Stdio {
                command: "server-fs".into(),
                args: vec!["/tmp".into()],
                env: BTreeMap::from([("A".to_string(), "1".to_string())]),
                cwd: None,
            }
        );
        assert_eq!(
            servers[1].1.as_ref().unwrap(),
            &ServerSpec::StreamableHttp {
                url: "http://localhost:9/mcp".into()
            }
        );
    }

    #[test]
    fn missing_transport_lists_accepted_values() {
        let servers =
            parse_servers(r#"{"mcpServers": {"x": {"command": "server"}}}"#).unwrap();
        let err = servers[0].1.as_ref().unwrap_err().to_string();
        assert!(err.contains("Missing 'transport' key"), "{err}");
        assert!(err.contains("stdio, streamable_http"), "{err}");
    }

    #[test]
    fn unsupported_transport_is_rejected() {
        let servers =
            parse_servers(r#"{"mcpServers": {"x": {"transport": "websocket", "url": "ws://h"}}}"#)
                .unwrap();
        let err = servers[0].1.as_ref().unwrap_err().to_string();
        assert!(err.contains("Unsupported transport 'websocket'"), "{err}");
    }

    #[test]
    fn empty_config_has_no_servers() {
        assert!(parse_servers("{}").unwrap().is_empty());
        assert!(parse_servers("not json").is_err());
    }

    #[tokio::test]
    async fn missing_file_yields_no_tools() {
        let tmp = tempfile::tempdir().unwrap();
        let source = McpToolSource::new(tmp.path().join("mcp_config.json"));
        assert!(source.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_servers_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mcp_config.json");
        std::fs::write(
            &path,
            r#"{"mcpServers": {
                "ghost": {"transport": "stdio", "command": "/nonexistent/modelchat-test-server"},
                "broken": {"command": "no-transport"}
            }}"#,
        )
        .unwrap();

        let set = McpToolSource::new(&path).discover().await.unwrap();
        assert!(set.is_empty());
    }
}
