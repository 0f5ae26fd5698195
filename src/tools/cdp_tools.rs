//! RMCP 0.3.2 implementation of the Chrome debug MCP tool
//!
//! One tool, `cdp_command`, relaying arbitrary DevTools protocol commands to
//! the connected browser page and post-processing the response.

use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use super::types::*;
use crate::cdp_client::{CdpClient, ConnectionEvent};
use crate::config::Config;
use crate::discovery;
use crate::error::CdpError;
use crate::extract;

/// Chrome debug tool handler
///
/// Owns at most one live DevTools connection. The connection is established
/// lazily on the first command and rebuilt (via fresh discovery) whenever the
/// cached one is no longer connected.
#[derive(Clone)]
pub struct ChromeDebugToolHandler {
    #[allow(dead_code)]
    tool_router: ToolRouter<ChromeDebugToolHandler>,
    config: Config,
    client: Arc<Mutex<Option<Arc<CdpClient>>>>,
}

impl ChromeDebugToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
            client: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the cached client, or discover a page target and connect.
    ///
    /// A failed attempt leaves the slot empty so the next call retries
    /// discovery from scratch instead of reusing a broken object.
    async fn ensure_client(&self) -> Result<Arc<CdpClient>, CdpError> {
        let mut slot = self.client.lock().await;

        if let Some(client) = slot.as_ref() {
            if client.is_connected() {
                return Ok(client.clone());
            }
            debug!("Cached connection is stale, rebuilding");
            *slot = None;
        }

        let targets = discovery::list_targets(&self.config.discovery_url())
            .await
            .inspect_err(|e| error!("Target discovery failed: {}", e))?;

        let target = targets.into_iter().next().ok_or(CdpError::NoTargets)?;
        let ws_url = target.web_socket_debugger_url.ok_or_else(|| {
            CdpError::ConnectionFailed(format!(
                "target {} has no webSocketDebuggerUrl (another client attached?)",
                target.id
            ))
        })?;

        info!("Connecting to page target '{}' ({})", target.title, target.url);
        let client = Arc::new(
            CdpClient::connect(&ws_url)
                .await
                .inspect_err(|e| error!("Connection to {} failed: {}", ws_url, e))?,
        );

        Self::spawn_event_observer(client.subscribe());

        *slot = Some(client.clone());
        Ok(client)
    }

    /// Log notifications and connection loss for the lifetime of one
    /// connection.
    fn spawn_event_observer(mut events: broadcast::Receiver<ConnectionEvent>) {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectionEvent::Notification { method, .. }) => {
                        debug!("CDP event: {}", method);
                    }
                    Ok(ConnectionEvent::Error(e)) => warn!("Connection error: {}", e),
                    Ok(ConnectionEvent::Disconnected) => {
                        info!("DevTools connection closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Event observer lagged, skipped {} event(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Drop the cached client so the next call rebuilds from discovery.
    async fn invalidate(&self) {
        *self.client.lock().await = None;
    }

    /// Whether a live connection is currently cached.
    pub async fn is_connected(&self) -> bool {
        match self.client.lock().await.as_ref() {
            Some(client) => client.is_connected(),
            None => false,
        }
    }

    /// Validate the arguments, relay the command, and post-process the
    /// response into the tool's output text.
    pub async fn run_cdp_command(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<String, CdpError> {
        let method = method.trim();
        if method.is_empty() {
            return Err(CdpError::InvalidArgument(
                "method must be a non-empty string".to_string(),
            ));
        }
        let params = parse_params(params)?;

        let client = self.ensure_client().await?;

        let response = match client.send_command(method, params).await {
            Ok(response) => response,
            Err(e) => {
                // A timeout only fails this command; connection-level
                // failures invalidate the cached client so the next call
                // reconnects.
                if matches!(e, CdpError::ConnectionClosed | CdpError::ConnectionFailed(_)) {
                    self.invalidate().await;
                }
                return Err(e);
            }
        };

        let raw = serde_json::to_value(&response)?;
        let processed = extract::externalize_binary_fields(&raw, &self.config.output_dir);
        Ok(serde_json::to_string_pretty(&processed)?)
    }
}

/// Accept params as a structured value or a JSON-encoded string.
fn parse_params(params: Option<Value>) -> Result<Option<Value>, CdpError> {
    match params {
        None => Ok(None),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            serde_json::from_str(text)
                .map(Some)
                .map_err(|e| CdpError::InvalidArgument(format!("params is not valid JSON: {}", e)))
        }
        Some(value) => Ok(Some(value)),
    }
}

#[tool_router]
impl ChromeDebugToolHandler {
    #[tool(description = "Execute a raw Chrome DevTools Protocol command against the connected page (e.g. Runtime.evaluate, Page.captureScreenshot). Returns the protocol response as JSON; large binary payloads are saved to disk and replaced with file references.")]
    async fn cdp_command(
        &self,
        Parameters(args): Parameters<CdpCommandArgs>,
    ) -> Result<CallToolResult, McpError> {
        match self.run_cdp_command(&args.method, args.params).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) => {
                error!("cdp_command '{}' failed: {}", args.method, e);
                Ok(CallToolResult::error(vec![Content::text(format!("Error: {}", e))]))
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for ChromeDebugToolHandler {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_params_absent() {
        assert!(parse_params(None).unwrap().is_none());
    }

    #[test]
    fn test_parse_params_object_passthrough() {
        let params = parse_params(Some(json!({"expression": "1+1"}))).unwrap();
        assert_eq!(params, Some(json!({"expression": "1+1"})));
    }

    #[test]
    fn test_parse_params_json_string() {
        let params = parse_params(Some(json!(r#"{"expression": "1+1"}"#))).unwrap();
        assert_eq!(params, Some(json!({"expression": "1+1"})));
    }

    #[test]
    fn test_parse_params_empty_string() {
        assert!(parse_params(Some(json!(""))).unwrap().is_none());
    }

    #[test]
    fn test_parse_params_malformed_string() {
        let result = parse_params(Some(json!("{not json")));
        assert!(matches!(result, Err(CdpError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_empty_method_rejected_before_any_network_activity() {
        // Port 9 is discard; if validation ran after connection management
        // this would fail with a discovery error instead.
        let handler = ChromeDebugToolHandler::new(Config {
            host: "127.0.0.1".to_string(),
            port: 9,
            ..Config::default()
        });
        let result = handler.run_cdp_command("   ", None).await;
        assert!(matches!(result, Err(CdpError::InvalidArgument(_))));
        assert!(!handler.is_connected().await);
    }

    #[tokio::test]
    async fn test_malformed_params_rejected_before_any_network_activity() {
        let handler = ChromeDebugToolHandler::new(Config {
            host: "127.0.0.1".to_string(),
            port: 9,
            ..Config::default()
        });
        let result = handler.run_cdp_command("Runtime.evaluate", Some(json!("{broken"))).await;
        assert!(matches!(result, Err(CdpError::InvalidArgument(_))));
    }

    #[test]
    fn test_handler_creation() {
        let _handler = ChromeDebugToolHandler::new(Config::default());
        let _second = ChromeDebugToolHandler::new(Config::default());
    }
}
