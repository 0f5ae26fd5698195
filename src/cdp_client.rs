//! Chrome DevTools Protocol WebSocket client
//!
//! Speaks single-frame JSON text messages over one persistent WebSocket
//! connection. Outbound commands carry a monotonically allocated `id`;
//! inbound frames are either responses (numeric `id` present, routed back to
//! the waiting caller) or unsolicited event notifications (no `id`, published
//! on the event channel).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::error::{CdpError, Result};

/// Deadline for a single in-flight command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound command frame: `{id, method, params}`
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

/// Protocol-level error payload inside a response. Forwarded verbatim to the
/// caller; not a transport failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

/// Response correlated to one prior command by `id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

/// Inbound frame before classification — response or notification
#[derive(Debug, Deserialize)]
struct InboundMessage {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<ProtocolError>,
    method: Option<String>,
    params: Option<Value>,
}

/// Connection lifecycle and notification events published to observers
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connection lost or closed; all in-flight commands have been rejected.
    Disconnected,
    /// Transport error on the connection.
    Error(String),
    /// Unsolicited protocol notification (e.g. `Page.loadEventFired`).
    Notification { method: String, params: Value },
}

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<CommandResponse>>>>;

/// Client connected to a single DevTools WebSocket endpoint.
///
/// `connect` is the only constructor, so an instance can never be connected
/// twice — reconnection means building a new client. The id counter and the
/// pending-request table are private to the instance and only mutated through
/// `send_command` and the reader task.
pub struct CdpClient {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingTable,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl CdpClient {
    /// Establish a WebSocket connection to a DevTools endpoint.
    ///
    /// Spawns a writer task (draining the outbound queue) and a reader task
    /// (classifying every inbound frame). Fails if the handshake does not
    /// complete.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        debug!("Connecting to DevTools endpoint: {}", ws_url);

        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let (events, _) = broadcast::channel(64);

        // Writer task: serialize access to the sink. Ends when the last
        // sender is dropped or a close frame goes out.
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if write.send(msg).await.is_err() {
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Reader task: classify inbound frames until the connection ends,
        // then reject everything still in flight.
        let reader_pending = pending.clone();
        let reader_connected = connected.clone();
        let reader_events = events.clone();
        let reader_outbound = outbound.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        Self::dispatch(&text, &reader_pending, &reader_events).await;
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = reader_outbound.send(Message::Pong(data));
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = reader_events.send(ConnectionEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            reader_connected.store(false, Ordering::SeqCst);

            // Dropping the senders rejects every in-flight command with
            // ConnectionClosed rather than leaving it to hang.
            let dropped = {
                let mut pending = reader_pending.lock().await;
                let count = pending.len();
                pending.clear();
                count
            };
            if dropped > 0 {
                warn!("Connection lost with {} command(s) in flight", dropped);
            }
            let _ = reader_events.send(ConnectionEvent::Disconnected);
        });

        Ok(Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            connected,
            events,
        })
    }

    /// Route one inbound frame: a numeric `id` makes it a response for the
    /// pending table; `method` + `params` without an `id` make it a
    /// notification. Anything else is dropped.
    async fn dispatch(
        text: &str,
        pending: &Mutex<HashMap<u64, oneshot::Sender<CommandResponse>>>,
        events: &broadcast::Sender<ConnectionEvent>,
    ) {
        let msg: InboundMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Dropping unparseable frame: {}", e);
                return;
            }
        };

        if let Some(id) = msg.id {
            // Taking the entry out of the table under the lock is what makes
            // resolution single-shot: a timed-out command has already removed
            // its entry, so a late response finds nothing here.
            let tx = pending.lock().await.remove(&id);
            match tx {
                Some(tx) => {
                    let response = CommandResponse {
                        id,
                        result: msg.result,
                        error: msg.error,
                    };
                    let _ = tx.send(response);
                }
                None => {
                    debug!("Dropping response for unknown id {} (timed out?)", id);
                }
            }
        } else if let (Some(method), Some(params)) = (msg.method, msg.params) {
            debug!("Notification: {}", method);
            let _ = events.send(ConnectionEvent::Notification { method, params });
        } else {
            debug!("Dropping frame with neither id nor method");
        }
    }

    /// Send a command and await its correlated response.
    ///
    /// A protocol-level `error` in the response is returned as data, not as a
    /// failure of this call.
    pub async fn send_command(&self, method: &str, params: Option<Value>) -> Result<CommandResponse> {
        self.send_command_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// `send_command` with an explicit deadline.
    pub async fn send_command_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<CommandResponse> {
        if !self.is_connected() {
            return Err(CdpError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = CommandRequest {
            id,
            method,
            params: params.unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        };
        let frame = serde_json::to_string(&request)?;

        debug!("Sending command {} ({})", id, method);
        if self.outbound.send(Message::Text(frame.into())).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(CdpError::ConnectionClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped: the reader task drained the table on
            // connection loss.
            Ok(Err(_)) => Err(CdpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(CdpError::CommandTimeout {
                    method: method.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Subscribe to lifecycle events and protocol notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Whether the underlying connection is still open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of commands currently awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Close the connection and discard all in-flight commands. Waiting
    /// callers observe the closure as `ConnectionClosed`.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.pending.lock().await.clear();
        let _ = self.outbound.send(Message::Close(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_request_serialization() {
        let request = CommandRequest {
            id: 7,
            method: "Runtime.evaluate",
            params: json!({"expression": "1+1"}),
        };
        let frame = serde_json::to_string(&request).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "Runtime.evaluate");
        assert_eq!(value["params"]["expression"], "1+1");
    }

    #[test]
    fn test_inbound_response_classification() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"id": 3, "result": {"value": 2}}"#).unwrap();
        assert_eq!(msg.id, Some(3));
        assert_eq!(msg.result.unwrap()["value"], 2);
        assert!(msg.error.is_none());
        assert!(msg.method.is_none());
    }

    #[test]
    fn test_inbound_protocol_error_classification() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"id": 4, "error": {"code": -32601, "message": "method not found"}}"#,
        )
        .unwrap();
        assert_eq!(msg.id, Some(4));
        let error = msg.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "method not found");
    }

    #[test]
    fn test_inbound_notification_classification() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"method": "Page.loadEventFired", "params": {"timestamp": 123.4}}"#,
        )
        .unwrap();
        assert!(msg.id.is_none());
        assert_eq!(msg.method.as_deref(), Some("Page.loadEventFired"));
        assert!(msg.params.is_some());
    }

    #[test]
    fn test_response_serialization_omits_absent_fields() {
        let response = CommandResponse {
            id: 9,
            result: Some(json!({"value": 2})),
            error: None,
        };
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.contains("\"result\""));
        assert!(!text.contains("\"error\""));
    }

    #[test]
    fn test_default_command_timeout() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT, Duration::from_secs(10));
    }
}
