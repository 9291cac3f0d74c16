use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use console_protocol::{
    ConnectionStatus, InboundMessage, Outbox, OutboundMessage, Transport, TransportError,
    TransportEvent,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TransportConfig;
use crate::error::ChannelError;
use crate::packet::{self, EnginePacket, OpenHandshake, SocketPacket};
use crate::url::socket_endpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Reconnecting Socket.IO channel to the execution server.
///
/// Socket I/O runs on a background task. Inbound events reach the owner
/// through [`Transport::next_event`] in arrival order and are also fanned out
/// to [`Channel::on`] / [`Channel::once`] subscribers. Messages sent while the
/// socket is down stay queued and are flushed after the next handshake.
pub struct Channel {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    status: watch::Receiver<ConnectionStatus>,
    listeners: Arc<Mutex<Listeners>>,
    driver: JoinHandle<()>,
}

impl Channel {
    /// Validates `config` and starts connecting in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: TransportConfig) -> Result<Self, ChannelError> {
        let endpoint = socket_endpoint(&config.server_url)?;
        let headers = parse_headers(&config)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let listeners = Arc::new(Mutex::new(Listeners::default()));

        let driver = Driver {
            config,
            endpoint,
            headers,
            outbound: outbound_rx,
            unsent: None,
            events: events_tx,
            status: status_tx,
            listeners: Arc::clone(&listeners),
        };

        Ok(Self {
            outbound: outbound_tx,
            events: events_rx,
            status: status_rx,
            listeners,
            driver: tokio::spawn(driver.run()),
        })
    }

    /// Current connectivity.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every connectivity change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Persistent subscription to one inbound event name.
    pub fn on(&self, event_name: &str) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut listeners = lock_unpoisoned(&self.listeners);
        listeners.prune_closed();
        listeners.entry(event_name).push(Listener::Persistent(sender));
        receiver
    }

    /// Single-use subscription, resolved by the next matching event.
    pub fn once(&self, event_name: &str) -> oneshot::Receiver<InboundMessage> {
        let (sender, receiver) = oneshot::channel();
        let mut listeners = lock_unpoisoned(&self.listeners);
        listeners.prune_closed();
        listeners.entry(event_name).push(Listener::Once(sender));
        receiver
    }
}

impl Outbox for Channel {
    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }
}

impl Transport for Channel {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

enum Listener {
    Persistent(mpsc::UnboundedSender<InboundMessage>),
    Once(oneshot::Sender<InboundMessage>),
}

impl Listener {
    fn is_closed(&self) -> bool {
        match self {
            Self::Persistent(sender) => sender.is_closed(),
            Self::Once(sender) => sender.is_closed(),
        }
    }
}

#[derive(Default)]
struct Listeners {
    by_event: HashMap<String, Vec<Listener>>,
}

impl Listeners {
    fn entry(&mut self, event_name: &str) -> &mut Vec<Listener> {
        self.by_event.entry(event_name.to_string()).or_default()
    }

    /// Drops subscriptions whose receiver is gone, across every event name.
    fn prune_closed(&mut self) {
        self.by_event.retain(|_, listeners| {
            listeners.retain(|listener| !listener.is_closed());
            !listeners.is_empty()
        });
    }

    fn dispatch(&mut self, message: &InboundMessage) {
        let Some(listeners) = self.by_event.get_mut(message.event_name()) else {
            return;
        };

        let mut kept = Vec::with_capacity(listeners.len());
        for listener in listeners.drain(..) {
            match listener {
                Listener::Persistent(sender) => {
                    if sender.send(message.clone()).is_ok() {
                        kept.push(Listener::Persistent(sender));
                    }
                }
                Listener::Once(sender) => {
                    let _ = sender.send(message.clone());
                }
            }
        }
        *listeners = kept;
    }
}

enum PumpExit {
    ConnectionLost,
    ChannelDropped,
}

enum FrameOutcome {
    Handled,
    /// A server ping; the heartbeat deadline starts over.
    Ping,
    ConnectionLost,
}

/// How long the server may stay silent between pings before the connection
/// counts as dead: `pingInterval + pingTimeout` from the `open` packet.
/// `None` when the server announced no interval.
fn heartbeat_budget(open: &OpenHandshake) -> Option<Duration> {
    (open.ping_interval > 0)
        .then(|| Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout)))
}

struct Driver {
    config: TransportConfig,
    endpoint: Url,
    headers: Vec<(HeaderName, HeaderValue)>,
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    /// Message whose write failed when the socket went down.
    unsent: Option<OutboundMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
    status: watch::Sender<ConnectionStatus>,
    listeners: Arc<Mutex<Listeners>>,
}

impl Driver {
    async fn run(mut self) {
        let policy = self.config.reconnect;
        let mut connected_before = false;
        let mut failed_attempts: u32 = 0;

        loop {
            match self.open_session().await {
                Ok((socket, heartbeat)) => {
                    failed_attempts = 0;
                    info!(endpoint = %self.endpoint, resumed = connected_before, "console channel connected");
                    self.status.send_replace(ConnectionStatus::Connected);
                    self.emit(TransportEvent::Connected {
                        resumed: connected_before,
                    });
                    connected_before = true;

                    match self.pump(socket, heartbeat).await {
                        PumpExit::ChannelDropped => return,
                        PumpExit::ConnectionLost => {
                            warn!(endpoint = %self.endpoint, "console channel lost");
                            self.emit(TransportEvent::Disconnected);
                        }
                    }
                }
                Err(error) => {
                    warn!(endpoint = %self.endpoint, %error, "console channel connect failed");
                }
            }

            if !policy.allows(failed_attempts) {
                warn!(
                    attempts = failed_attempts,
                    "console channel giving up after reconnect attempts"
                );
                self.status.send_replace(ConnectionStatus::Disconnected);
                self.emit(TransportEvent::GaveUp);
                return;
            }

            let delay = policy.delay_for(failed_attempts);
            failed_attempts += 1;
            debug!(attempt = failed_attempts, ?delay, "console channel reconnecting");
            self.status.send_replace(ConnectionStatus::Reconnecting {
                attempt: failed_attempts,
            });
            tokio::time::sleep(delay).await;
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    async fn open_session(&self) -> Result<(WsStream, Option<Duration>), ChannelError> {
        let timeout = self.config.handshake_timeout;
        match tokio::time::timeout(timeout, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::HandshakeTimeout(timeout)),
        }
    }

    async fn handshake(&self) -> Result<(WsStream, Option<Duration>), ChannelError> {
        let mut request = self.endpoint.as_str().into_client_request()?;
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let (mut socket, _response) = connect_async(request).await?;

        let heartbeat = loop {
            match next_packet(&mut socket).await? {
                EnginePacket::Open(open) => {
                    debug!(
                        sid = %open.sid,
                        ping_interval = open.ping_interval,
                        ping_timeout = open.ping_timeout,
                        "engine session opened"
                    );
                    break heartbeat_budget(&open);
                }
                EnginePacket::Ping(data) => send_packet(&mut socket, &EnginePacket::Pong(data)).await?,
                EnginePacket::Close => return Err(ChannelError::ClosedDuringHandshake),
                other => debug!(?other, "ignoring packet before engine open"),
            }
        };

        send_packet(&mut socket, &EnginePacket::Message(SocketPacket::connect())).await?;

        loop {
            match next_packet(&mut socket).await? {
                EnginePacket::Message(SocketPacket::Connect { .. }) => return Ok((socket, heartbeat)),
                EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                    return Err(ChannelError::ConnectRejected(rejection_message(data)));
                }
                EnginePacket::Ping(data) => send_packet(&mut socket, &EnginePacket::Pong(data)).await?,
                EnginePacket::Close => return Err(ChannelError::ClosedDuringHandshake),
                other => debug!(?other, "ignoring packet before namespace connect"),
            }
        }
    }

    async fn pump(&mut self, socket: WsStream, heartbeat: Option<Duration>) -> PumpExit {
        let (mut sink, mut source): (WsSink, WsSource) = socket.split();
        let mut silent_until = heartbeat.map(|budget| Instant::now() + budget);

        if let Some(message) = self.unsent.take() {
            if !self.write(&mut sink, message).await {
                return PumpExit::ConnectionLost;
            }
        }

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => match self.handle_frame(&text, &mut sink).await {
                        FrameOutcome::Handled => {}
                        FrameOutcome::Ping => {
                            silent_until = heartbeat.map(|budget| Instant::now() + budget);
                        }
                        FrameOutcome::ConnectionLost => return PumpExit::ConnectionLost,
                    },
                    Some(Ok(Message::Close(_))) | None => return PumpExit::ConnectionLost,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!(%error, "console channel read failed");
                        return PumpExit::ConnectionLost;
                    }
                },
                outbound = self.outbound.recv() => match outbound {
                    Some(message) => {
                        if !self.write(&mut sink, message).await {
                            return PumpExit::ConnectionLost;
                        }
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return PumpExit::ChannelDropped;
                    }
                },
                () = tokio::time::sleep_until(silent_until.unwrap_or_else(far_future)), if silent_until.is_some() => {
                    warn!(?heartbeat, "no ping from server within the heartbeat window");
                    return PumpExit::ConnectionLost;
                }
            }
        }
    }

    async fn handle_frame(&mut self, text: &str, sink: &mut WsSink) -> FrameOutcome {
        let packet = match packet::decode(text) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(%error, frame = text, "dropping undecodable frame");
                return FrameOutcome::Handled;
            }
        };

        match packet {
            EnginePacket::Ping(data) => match packet::encode(&EnginePacket::Pong(data)) {
                Ok(frame) => match sink.send(Message::Text(frame)).await {
                    Ok(()) => FrameOutcome::Ping,
                    Err(_) => FrameOutcome::ConnectionLost,
                },
                Err(error) => {
                    warn!(%error, "failed to encode pong");
                    FrameOutcome::Ping
                }
            },
            EnginePacket::Close | EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
                FrameOutcome::ConnectionLost
            }
            EnginePacket::Message(SocketPacket::Event { name, args, .. }) => {
                let payload = args.into_iter().next().unwrap_or(Value::Null);
                match InboundMessage::decode(&name, payload) {
                    Ok(message) => {
                        lock_unpoisoned(&self.listeners).dispatch(&message);
                        self.emit(TransportEvent::Message(message));
                    }
                    Err(error) => warn!(event = %name, %error, "dropping inbound event"),
                }
                FrameOutcome::Handled
            }
            other => {
                debug!(?other, "ignoring packet");
                FrameOutcome::Handled
            }
        }
    }

    async fn write(&mut self, sink: &mut WsSink, message: OutboundMessage) -> bool {
        let frame = match packet::encode_outbound(&message) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(event = message.event_name(), %error, "dropping unencodable message");
                return true;
            }
        };

        match sink.send(Message::Text(frame)).await {
            Ok(()) => true,
            Err(error) => {
                warn!(event = message.event_name(), %error, "write failed, keeping message for reconnect");
                self.unsent = Some(message);
                false
            }
        }
    }
}

async fn next_packet(socket: &mut WsStream) -> Result<EnginePacket, ChannelError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(packet::decode(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(ChannelError::ClosedDuringHandshake),
            Some(Ok(_)) => continue,
            Some(Err(error)) => return Err(error.into()),
        }
    }
}

async fn send_packet(socket: &mut WsStream, packet: &EnginePacket) -> Result<(), ChannelError> {
    let frame = packet::encode(packet)?;
    socket.send(Message::Text(frame)).await?;
    Ok(())
}

fn rejection_message(data: Option<Value>) -> String {
    match data {
        Some(Value::Object(map)) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => Value::Object(map).to_string(),
        },
        Some(Value::String(message)) => message,
        Some(other) => other.to_string(),
        None => "no reason given".to_string(),
    }
}

fn parse_headers(config: &TransportConfig) -> Result<Vec<(HeaderName, HeaderValue)>, ChannelError> {
    config
        .extra_headers
        .iter()
        .map(|(key, value)| {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|error| {
                ChannelError::InvalidHeader {
                    name: key.clone(),
                    message: error.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|error| ChannelError::InvalidHeader {
                name: key.clone(),
                message: error.to_string(),
            })?;
            Ok((name, value))
        })
        .collect()
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(24 * 60 * 60)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
