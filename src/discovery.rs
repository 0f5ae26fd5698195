//! DevTools target discovery
//!
//! Enumerates connectable targets from the browser's `/json` directory
//! endpoint. Only targets of type `page` can host a debugging session.

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;

/// A connectable target reported by the directory endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    /// WebSocket endpoint for attaching to this target. Absent when another
    /// client is already attached.
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Fetch the target list and keep only `page` targets, in directory order.
///
/// The list is fetched fresh on every call; targets are never cached.
pub async fn list_targets(discovery_url: &str) -> Result<Vec<Target>> {
    debug!("Discovering targets at {}", discovery_url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let targets: Vec<Target> = client
        .get(discovery_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let pages = filter_pages(targets);
    info!("Found {} page target(s)", pages.len());
    for target in &pages {
        debug!("  {} - {} ({})", target.id, target.title, target.url);
    }

    Ok(pages)
}

/// Keep only targets of type `page`, preserving their relative order.
pub fn filter_pages(targets: Vec<Target>) -> Vec<Target> {
    targets
        .into_iter()
        .filter(|t| t.target_type == "page")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(target_type: &str, id: &str) -> Target {
        Target {
            id: id.to_string(),
            target_type: target_type.to_string(),
            title: String::new(),
            url: String::new(),
            web_socket_debugger_url: None,
        }
    }

    #[test]
    fn test_filter_keeps_only_pages_in_order() {
        let targets = vec![
            target("page", "a"),
            target("iframe", "b"),
            target("worker", "c"),
            target("page", "d"),
        ];
        let pages = filter_pages(targets);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].id, "a");
        assert_eq!(pages[1].id, "d");
    }

    #[test]
    fn test_filter_empty_when_no_pages() {
        let targets = vec![target("worker", "a"), target("iframe", "b")];
        assert!(filter_pages(targets).is_empty());
    }

    #[test]
    fn test_target_deserialization() {
        let json = r#"{
            "description": "",
            "devtoolsFrontendUrl": "/devtools/inspector.html?ws=127.0.0.1:9222/devtools/page/ABC",
            "id": "ABC",
            "title": "Example Domain",
            "type": "page",
            "url": "https://example.com/",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/ABC"
        }"#;

        let target: Target = serde_json::from_str(json).unwrap();
        assert_eq!(target.id, "ABC");
        assert_eq!(target.target_type, "page");
        assert_eq!(target.title, "Example Domain");
        assert_eq!(
            target.web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/ABC")
        );
    }

    #[test]
    fn test_target_without_ws_url() {
        let json = r#"{"id": "X", "type": "page", "title": "t", "url": "u"}"#;
        let target: Target = serde_json::from_str(json).unwrap();
        assert!(target.web_socket_debugger_url.is_none());
    }
}
