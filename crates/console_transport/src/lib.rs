//! Socket.IO transport for the execution console.
//!
//! [`Channel`] keeps one WebSocket session to the execution server alive,
//! reconnecting with a capped exponential schedule ([`ReconnectPolicy`]) and
//! surfacing connectivity through [`console_protocol::ConnectionStatus`].
//! Packet framing lives in [`packet`]; nothing here knows about sessions.

pub mod channel;
pub mod config;
pub mod error;
pub mod packet;
pub mod reconnect;
pub mod url;

pub use channel::Channel;
pub use config::{TransportConfig, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_SERVER_URL};
pub use error::{ChannelError, PacketError};
pub use packet::{EnginePacket, OpenHandshake, SocketPacket};
pub use reconnect::ReconnectPolicy;
pub use url::socket_endpoint;
