use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Frame that does not parse as an Engine.IO / Socket.IO packet.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown {layer} packet type '{found}'")]
    UnknownType { layer: &'static str, found: char },

    #[error("binary Socket.IO packets are not supported")]
    UnsupportedBinary,

    #[error("invalid acknowledgement id '{0}'")]
    InvalidAckId(String),

    #[error("invalid packet JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event packet must be a JSON array starting with the event name")]
    InvalidEvent,
}

/// Errors raised while establishing or driving the WebSocket session.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid server URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported server URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),

    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("server rejected namespace connect: {0}")]
    ConnectRejected(String),

    #[error("connection closed during handshake")]
    ClosedDuringHandshake,

    #[error(transparent)]
    Packet(#[from] PacketError),
}

impl From<tungstenite::Error> for ChannelError {
    fn from(error: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}
