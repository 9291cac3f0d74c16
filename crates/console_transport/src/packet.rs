//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! One WebSocket text frame carries one Engine.IO packet. Engine.IO `message`
//! packets carry one Socket.IO packet:
//!
//! ```text
//! <engine type>[<socket type>[<namespace>,][<ack id>][<json>]]
//! 42["execution_output",{"output":"hi\n"}]
//! ```

use console_protocol::OutboundMessage;
use serde::Deserialize;
use serde_json::Value;

use crate::error::PacketError;

const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Session parameters announced by the server in the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Event packet on the default namespace for an outbound console message.
    pub fn from_outbound(message: &OutboundMessage) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: message.event_name().to_string(),
            args: message.payload().into_iter().collect(),
        }
    }

    /// `connect` packet for the default namespace.
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }
}

pub fn decode(frame: &str) -> Result<EnginePacket, PacketError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();

    Ok(match kind {
        '0' => {
            let handshake = if rest.is_empty() {
                OpenHandshake::default()
            } else {
                serde_json::from_str(rest)?
            };
            EnginePacket::Open(handshake)
        }
        '1' => EnginePacket::Close,
        '2' => EnginePacket::Ping(rest.to_string()),
        '3' => EnginePacket::Pong(rest.to_string()),
        '4' => EnginePacket::Message(decode_socket(rest)?),
        '5' => EnginePacket::Upgrade,
        '6' => EnginePacket::Noop,
        found => {
            return Err(PacketError::UnknownType {
                layer: "engine",
                found,
            })
        }
    })
}

pub fn encode(packet: &EnginePacket) -> Result<String, PacketError> {
    Ok(match packet {
        EnginePacket::Open(_) => "0".to_string(),
        EnginePacket::Close => "1".to_string(),
        EnginePacket::Ping(data) => format!("2{data}"),
        EnginePacket::Pong(data) => format!("3{data}"),
        EnginePacket::Message(socket) => format!("4{}", encode_socket(socket)?),
        EnginePacket::Upgrade => "5".to_string(),
        EnginePacket::Noop => "6".to_string(),
    })
}

/// Encodes an outbound console message as a complete text frame.
pub fn encode_outbound(message: &OutboundMessage) -> Result<String, PacketError> {
    encode(&EnginePacket::Message(SocketPacket::from_outbound(message)))
}

fn decode_socket(input: &str) -> Result<SocketPacket, PacketError> {
    let mut chars = input.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(PacketError::UnsupportedBinary);
    }

    let (namespace, rest) = split_namespace(rest);
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let (ack, rest) = rest.split_at(digits);
    let ack_id = if ack.is_empty() {
        None
    } else {
        Some(
            ack.parse::<u64>()
                .map_err(|_| PacketError::InvalidAckId(ack.to_string()))?,
        )
    };
    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest)?)
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let Some(Value::Array(mut items)) = data else {
                return Err(PacketError::InvalidEvent);
            };
            if items.is_empty() {
                return Err(PacketError::InvalidEvent);
            }
            let Value::String(name) = items.remove(0) else {
                return Err(PacketError::InvalidEvent);
            };
            Ok(SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args: items,
            })
        }
        '4' => Ok(SocketPacket::ConnectError { namespace, data }),
        found => Err(PacketError::UnknownType {
            layer: "socket",
            found,
        }),
    }
}

fn encode_socket(packet: &SocketPacket) -> Result<String, PacketError> {
    let mut out = String::new();
    match packet {
        SocketPacket::Connect { namespace, data } => {
            out.push('0');
            push_namespace(&mut out, namespace, data.is_some());
            if let Some(data) = data {
                out.push_str(&serde_json::to_string(data)?);
            }
        }
        SocketPacket::Disconnect { namespace } => {
            out.push('1');
            push_namespace(&mut out, namespace, false);
        }
        SocketPacket::Event {
            namespace,
            ack_id,
            name,
            args,
        } => {
            out.push('2');
            push_namespace(&mut out, namespace, true);
            if let Some(ack_id) = ack_id {
                out.push_str(&ack_id.to_string());
            }
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            out.push_str(&serde_json::to_string(&Value::Array(items))?);
        }
        SocketPacket::ConnectError { namespace, data } => {
            out.push('4');
            push_namespace(&mut out, namespace, data.is_some());
            if let Some(data) = data {
                out.push_str(&serde_json::to_string(data)?);
            }
        }
    }
    Ok(out)
}

fn split_namespace(input: &str) -> (String, &str) {
    if !input.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), input);
    }

    match input.find(',') {
        Some(index) => (input[..index].to_string(), &input[index + 1..]),
        None => (input.to_string(), ""),
    }
}

fn push_namespace(out: &mut String, namespace: &str, followed: bool) {
    if namespace == DEFAULT_NAMESPACE {
        return;
    }
    out.push_str(namespace);
    if followed {
        out.push(',');
    }
}
