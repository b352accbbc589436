use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use lantern_core::WalletError;

use crate::config::IndexerConfig;

/// Sub-protocol the indexer's streaming endpoint speaks.
pub const SUB_PROTOCOL: &str = "graphql-transport-ws";

// ── Message envelope ─────────────────────────────────────────────────────────

/// `graphql-transport-ws` envelope: `{type, id?, payload?}`.
///
/// The `type` discriminator is always serialized, including for messages
/// whose remaining fields are defaults; the server rejects untyped frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    ConnectionInit {
        payload: Option<Value>,
    },
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Next {
        id: String,
        payload: Value,
    },
    Error {
        id: String,
        payload: Value,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub query: String,
    pub variables: Value,
}

// ── Connection ───────────────────────────────────────────────────────────────

/// One established streaming connection, past the `connection_init` /
/// `connection_ack` handshake.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsConnection {
    /// Upgrade, announce the sub-protocol and complete the init handshake.
    pub async fn connect(config: &IndexerConfig) -> Result<Self, WalletError> {
        let mut request = config
            .stream_url()
            .into_client_request()
            .map_err(|e| WalletError::BadParameter(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(SUB_PROTOCOL),
        );

        let (stream, _) = connect_async(request)
            .await
            .map_err(|_| WalletError::NotConnected)?;
        let mut conn = Self { stream };

        // The init payload is required on the wire, null included.
        conn.send(&WsMessage::ConnectionInit { payload: None })
            .await?;

        let ack = tokio::time::timeout(config.request_timeout, conn.recv())
            .await
            .map_err(|_| WalletError::TimedOut)??;
        match ack {
            Some(WsMessage::ConnectionAck { .. }) => Ok(conn),
            Some(other) => Err(WalletError::HandshakeRejected(format!(
                "expected connection_ack, got {other:?}"
            ))),
            None => Err(WalletError::HandshakeRejected(
                "connection closed during handshake".to_string(),
            )),
        }
    }

    pub async fn send(&mut self, message: &WsMessage) -> Result<(), WalletError> {
        let json =
            serde_json::to_string(message).map_err(|e| WalletError::Serialization(e.to_string()))?;
        self.stream
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| WalletError::NotConnected)
    }

    /// Next protocol message, or `None` once the peer closes. Transport
    /// ping/pong frames are handled below this layer.
    pub async fn recv(&mut self) -> Result<Option<WsMessage>, WalletError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message = serde_json::from_str(text.as_str())
                        .map_err(|e| WalletError::InvalidResponse(e.to_string()))?;
                    return Ok(Some(message));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(_)) => return Err(WalletError::NotConnected),
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
