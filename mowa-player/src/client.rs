//! Reconnecting WebSocket client
//!
//! Reconnection is a client responsibility: exponential backoff with a
//! capped attempt count, re-issuing a session lookup (never re-creation)
//! before each attempt. The server makes no state-replay guarantee.

use futures_util::{SinkExt, StreamExt};
use mowa_core::protocol::{ClientMessage, ServerMessage};
use mowa_core::{Error, Result};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// First retry delay; doubles on every failed attempt.
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_attempts: 5,
        }
    }
}

pub struct AvatarClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
    policy: ReconnectPolicy,
}

impl AvatarClient {
    pub fn new(base_url: &str, session_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Create a brand-new session and return its id.
    pub async fn create_session(base_url: &str, language: Option<&str>) -> Result<String> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/sessions", base_url.trim_end_matches('/'));
        let response = client
            .post(&url)
            .json(&json!({ "language": language }))
            .send()
            .await
            .map_err(|e| Error::TransportDecode(format!("create session failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::TransportDecode(format!(
                "create session returned {}",
                status
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::TransportDecode(format!("invalid create reply: {}", e)))?;
        body["session_id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::TransportDecode("create reply carried no session_id".to_string()))
    }

    /// Verify the session still exists server-side.
    pub async fn lookup_session(&self) -> Result<()> {
        let url = format!("{}/api/v1/sessions/{}", self.base_url, self.session_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::TransportDecode(format!("session lookup failed: {}", e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SessionNotFound(self.session_id.clone()));
        }
        if !response.status().is_success() {
            return Err(Error::TransportDecode(format!(
                "session lookup returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn ws_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{}/api/v1/sessions/{}/ws", ws_base, self.session_id)
    }

    /// Connect (or reconnect) with exponential backoff. A vanished session
    /// aborts immediately with `SessionNotFound`; connection failures retry
    /// up to the attempt cap.
    pub async fn connect(&self) -> Result<WsStream> {
        let mut delay = self.policy.base_delay;
        for attempt in 1..=self.policy.max_attempts {
            self.lookup_session().await?;
            match connect_async(self.ws_url()).await {
                Ok((stream, _)) => {
                    info!(
                        "websocket connected to session {} (attempt {})",
                        self.session_id, attempt
                    );
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(
                        "connect attempt {}/{} failed: {}",
                        attempt, self.policy.max_attempts, e
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(Error::Timeout(format!(
            "websocket connect failed after {} attempts",
            self.policy.max_attempts
        )))
    }

    pub async fn send(stream: &mut WsStream, message: &ClientMessage) -> Result<()> {
        stream
            .send(WsMessage::Text(message.to_json()?))
            .await
            .map_err(|e| Error::TransportDecode(format!("send failed: {}", e)))
    }

    /// Next protocol message, skipping transport-level frames. None when the
    /// connection closed.
    pub async fn recv(stream: &mut WsStream) -> Result<Option<ServerMessage>> {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    let message: ServerMessage = serde_json::from_str(&text).map_err(|e| {
                        Error::TransportDecode(format!("invalid server message: {}", e))
                    })?;
                    return Ok(Some(message));
                }
                Ok(WsMessage::Close(_)) => return Ok(None),
                Ok(other) => {
                    debug!("ignoring transport frame: {:?}", other);
                }
                Err(e) => {
                    return Err(Error::TransportDecode(format!("receive failed: {}", e)));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_scheme_swap() {
        let client = AvatarClient::new("http://localhost:8000", "abc");
        assert_eq!(
            client.ws_url(),
            "ws://localhost:8000/api/v1/sessions/abc/ws"
        );

        let client = AvatarClient::new("https://example.com/", "abc");
        assert_eq!(
            client.ws_url(),
            "wss://example.com/api/v1/sessions/abc/ws"
        );
    }

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }
}
