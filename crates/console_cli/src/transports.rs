use console_protocol::{Outbox, OutboundMessage, Transport, TransportError, TransportEvent};
use console_transport::{Channel, TransportConfig, DEFAULT_SERVER_URL};
use console_transport_mock::{MockExecutionServer, ScriptedTransport, MOCK_TRANSPORT_ID};

pub const SOCKET_TRANSPORT_ID: &str = "socket";
pub const DEFAULT_TRANSPORT_ID: &str = SOCKET_TRANSPORT_ID;
pub const TRANSPORT_ENV_VAR: &str = "EXEC_CONSOLE_TRANSPORT";
pub const URL_ENV_VAR: &str = "EXEC_CONSOLE_URL";

/// Transport chosen at startup.
pub enum HostTransport {
    Socket(Channel),
    Mock(ScriptedTransport),
}

impl HostTransport {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Socket(_) => SOCKET_TRANSPORT_ID,
            Self::Mock(_) => MOCK_TRANSPORT_ID,
        }
    }
}

impl Outbox for HostTransport {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        match self {
            Self::Socket(channel) => channel.send(message),
            Self::Mock(transport) => transport.send(message),
        }
    }
}

impl Transport for HostTransport {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        match self {
            Self::Socket(channel) => channel.next_event().await,
            Self::Mock(transport) => transport.next_event().await,
        }
    }
}

/// Must be called inside a Tokio runtime; the socket transport spawns its
/// connection task immediately.
pub fn transport_from_env() -> Result<HostTransport, String> {
    let transport_id = env_value(TRANSPORT_ENV_VAR);
    let server_url = env_value(URL_ENV_VAR);

    transport_for_id(
        transport_id.as_deref().unwrap_or(DEFAULT_TRANSPORT_ID),
        server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL),
    )
}

pub fn transport_for_id(transport_id: &str, server_url: &str) -> Result<HostTransport, String> {
    match transport_id {
        SOCKET_TRANSPORT_ID => Channel::connect(TransportConfig::new(server_url))
            .map(HostTransport::Socket)
            .map_err(|error| format!("Cannot connect to '{server_url}': {error}")),
        MOCK_TRANSPORT_ID => {
            let (transport, _script) = ScriptedTransport::with_server(MockExecutionServer::new());
            Ok(HostTransport::Mock(transport))
        }
        unknown => Err(format!(
            "Unsupported transport '{unknown}'. Available transports: {SOCKET_TRANSPORT_ID}, {MOCK_TRANSPORT_ID}"
        )),
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
