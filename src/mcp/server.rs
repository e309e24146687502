use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::perplexity::PerplexityClient;

use super::handlers::RequestHandler;
use super::types::*;

/// Line-delimited JSON-RPC server. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct McpServer {
    handler: Arc<RequestHandler>,
    initialized: Arc<RwLock<bool>>,
}

impl McpServer {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Arc::new(PerplexityClient::new(config)?);

        let proxy = &config.proxy;
        if let Some(url) = proxy.proxy_url() {
            info!(
                proxy = %url,
                bypass = proxy.no_proxy.len(),
                "Outbound proxy configured"
            );
        }

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Arc<PerplexityClient>) -> Self {
        Self {
            handler: Arc::new(RequestHandler::new(client)),
            initialized: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn run(&self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve until `reader` hits EOF. Tool calls run on their own tasks;
    /// everything else is handled in arrival order.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(rx, writer));

        let mut buffer = String::new();

        loop {
            buffer.clear();

            match reader.read_line(&mut buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = buffer.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                        Ok(req) => req,
                        Err(e) => {
                            warn!("Failed to parse request: {}", e);
                            let _ = tx.send(JsonRpcResponse::error(
                                None,
                                JsonRpcError::parse_error(),
                            ));
                            continue;
                        }
                    };

                    if request.method == "tools/call" {
                        let server = self.clone();
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            if let Some(response) = server.respond(request).await {
                                let _ = tx.send(response);
                            }
                        });
                    } else if let Some(response) = self.respond(request).await {
                        let _ = tx.send(response);
                    }
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    drop(tx);
                    writer_task.await??;
                    return Err(e.into());
                }
            }
        }

        // In-flight tool calls hold senders; the writer drains until they finish
        drop(tx);
        writer_task.await??;

        Ok(())
    }

    async fn respond(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        match self.process_request(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("Error processing request: {}", e);
                Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::internal_error(e.to_string()),
                ))
            }
        }
    }

    async fn process_request(&self, request: JsonRpcRequest) -> Result<Option<JsonRpcResponse>> {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Ok(Some(JsonRpcResponse::error(
                request.id.clone(),
                JsonRpcError::invalid_request(),
            )));
        }

        debug!(method = %request.method, "Handling request");

        // Route to appropriate handler
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request).await.map(Some),
            "initialized" | "notifications/initialized" => self.handle_initialized(request).await,
            // Notifications never get a response, whatever the method
            _ if request.id.is_none() => {
                debug!(method = %request.method, "Ignoring notification");
                Ok(None)
            }
            "ping" => Ok(Some(JsonRpcResponse::success(request.id, json!({})))),
            "tools/list" => self.handle_list_tools(request).await.map(Some),
            "tools/call" => self.handle_call_tool(request).await.map(Some),
            "prompts/list" => self.handle_list_prompts(request).await.map(Some),
            "resources/list" => self.handle_list_resources(request).await.map(Some),
            _ => {
                warn!("Unknown method: {}", request.method);
                Ok(Some(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::method_not_found(&request.method),
                )))
            }
        }
    }

    async fn handle_initialize(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let params: InitializeRequest = match request.params {
            Some(p) => serde_json::from_value(p)?,
            None => {
                return Ok(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("Missing params".to_string()),
                ));
            }
        };

        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = %client.version, "Client connected");
        }

        // Support both protocol versions
        let protocol_version = if params.protocol_version.starts_with("2025") {
            PROTOCOL_VERSION_2025.to_string()
        } else {
            PROTOCOL_VERSION.to_string()
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: HashMap::new(),
                experimental: Default::default(),
            },
            server_info: ServerInfo {
                name: "Perplexity MCP Server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }

    async fn handle_initialized(&self, request: JsonRpcRequest) -> Result<Option<JsonRpcResponse>> {
        let mut initialized = self.initialized.write().await;
        *initialized = true;

        // Notifications don't get responses
        if request.id.is_none() {
            Ok(None)
        } else {
            Ok(Some(JsonRpcResponse::success(request.id, Value::Null)))
        }
    }

    async fn ensure_initialized(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        if *self.initialized.read().await {
            None
        } else {
            Some(JsonRpcResponse::error(
                request.id.clone(),
                JsonRpcError::internal_error("Server not initialized".to_string()),
            ))
        }
    }

    async fn handle_list_tools(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if let Some(rejection) = self.ensure_initialized(&request).await {
            return Ok(rejection);
        }

        let result = ListToolsResult {
            tools: self.handler.list_tools(),
        };

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }

    async fn handle_call_tool(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if let Some(rejection) = self.ensure_initialized(&request).await {
            return Ok(rejection);
        }

        let params: CallToolRequest = match request.params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => {
                    return Ok(JsonRpcResponse::error(
                        request.id,
                        JsonRpcError::invalid_params(format!("Invalid params: {}", e)),
                    ));
                }
            },
            None => {
                return Ok(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("Missing params".to_string()),
                ));
            }
        };

        let result = self.handler.call_tool(&params.name, params.arguments).await;

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }

    async fn handle_list_prompts(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        Ok(JsonRpcResponse::success(request.id, json!({ "prompts": [] })))
    }

    async fn handle_list_resources(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        Ok(JsonRpcResponse::success(request.id, json!({ "resources": [] })))
    }
}

async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let line = serde_json::to_string(&response)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}
