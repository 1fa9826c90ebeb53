//! RealtimeChannel - WebSocket connection supervisor
//!
//! One supervisor task owns the socket. It dials `{ws_url}/api/ws/{token}`,
//! pumps inbound frames to the listener registry, writes outbound frames
//! and keepalive pings, and redials after any failure until
//! [`RealtimeChannel::disconnect`] is called, the session token goes away
//! or the last handle is dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::realtime::event::{InboundEvent, OutboundFrame};
use crate::realtime::listeners::{ListenerRegistry, Subscription};

/// Connection lifecycle: `Disconnected -> Connecting -> Connected -> Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("No session token available")]
    MissingCredential,

    #[error("Invalid WebSocket URL: {0}")]
    InvalidUrl(String),

    #[error("Not running inside a Tokio runtime")]
    NoRuntime,
}

/// Source of the bearer token used to open the socket
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
struct Timings {
    keepalive_interval: Duration,
    reconnect_delay: Duration,
    connect_retry_delay: Duration,
}

#[derive(Default)]
struct Control {
    /// Bumped whenever a supervisor is started or stopped
    generation: u64,
    supervisor: Option<JoinHandle<()>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    ws_url: String,
    timings: Timings,
    tokens: Arc<dyn TokenProvider>,
    listeners: ListenerRegistry,
    state: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

/// Held only by handles, never by the supervisor task
struct Owner {
    shared: Arc<Shared>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        if self.shared.shutdown() {
            tracing::info!("Realtime channel dropped, supervisor stopped");
        }
    }
}

/// Cloneable handle to one realtime connection
///
/// Dropping the last handle tears the connection down like
/// [`disconnect`](Self::disconnect).
#[derive(Clone)]
pub struct RealtimeChannel {
    owner: Arc<Owner>,
}

impl RealtimeChannel {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            ws_url: config.ws_url.trim_end_matches('/').to_string(),
            timings: Timings {
                keepalive_interval: config.keepalive_interval,
                reconnect_delay: config.reconnect_delay,
                connect_retry_delay: config.connect_retry_delay,
            },
            tokens,
            listeners: ListenerRegistry::new(),
            state,
            control: Mutex::new(Control::default()),
        });
        Self {
            owner: Arc::new(Owner { shared }),
        }
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.owner.shared
    }

    /// Start the connection supervisor
    ///
    /// Does nothing if a supervisor is already running, including while it
    /// waits to redial. Transport failures after this returns are reported
    /// only as state changes.
    pub fn connect(&self) -> Result<(), ChannelError> {
        let shared = self.shared();
        let mut control = shared.control.lock();
        if control
            .supervisor
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            tracing::debug!("Realtime channel already running");
            return Ok(());
        }

        if shared.tokens.token().is_none() {
            tracing::warn!("Cannot connect realtime channel without a session token");
            return Err(ChannelError::MissingCredential);
        }

        let parsed = url::Url::parse(&shared.ws_url)
            .map_err(|e| ChannelError::InvalidUrl(format!("{}: {}", shared.ws_url, e)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidUrl(shared.ws_url.clone()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;

        control.generation += 1;
        let generation = control.generation;
        shared.state.send_replace(ConnectionState::Connecting);
        control.supervisor = Some(runtime.spawn(supervise(shared.clone(), generation)));

        tracing::info!(generation, "Realtime channel started");
        Ok(())
    }

    /// Stop the supervisor, close the socket and drop every listener
    pub fn disconnect(&self) {
        self.shared().shutdown();
        tracing::info!("Realtime channel disconnected");
    }

    /// Send a frame if connected
    ///
    /// Returns `false` and drops the frame when there is no open socket.
    pub fn send(&self, frame: &OutboundFrame) -> bool {
        let shared = self.shared();
        let control = shared.control.lock();
        let connected = *shared.state.borrow() == ConnectionState::Connected;
        match (&control.outbound, connected) {
            (Some(outbound), true) => outbound.send(frame.to_json()).is_ok(),
            _ => {
                tracing::debug!(frame = ?frame, "Dropping outbound frame while not connected");
                false
            }
        }
    }

    /// Register `listener` for every inbound event
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.shared().listeners.subscribe(Arc::new(listener))
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared().state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared().state.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.shared().listeners.len()
    }
}

impl Shared {
    /// Stop any supervisor and forget listeners and the outbound queue
    ///
    /// Returns whether a supervisor was still running.
    fn shutdown(&self) -> bool {
        let mut control = self.control.lock();
        control.generation += 1;
        let running = match control.supervisor.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        };
        control.outbound = None;
        self.listeners.clear();
        self.state.send_replace(ConnectionState::Disconnected);
        running
    }

    /// Publish `state` unless a newer supervisor has taken over
    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(%state, "Realtime state changed");
        }
        true
    }

    fn attach_outbound(&self, generation: u64, outbound: Option<mpsc::UnboundedSender<String>>) {
        let mut control = self.control.lock();
        if control.generation == generation {
            control.outbound = outbound;
        }
    }

    fn endpoint(&self, token: &str) -> String {
        format!("{}/api/ws/{}", self.ws_url, urlencoding::encode(token))
    }

    fn handle_frame(&self, text: &str) {
        match InboundEvent::parse(text) {
            Ok(event) => {
                tracing::trace!(kind = event.kind(), "Realtime event");
                self.listeners.dispatch(&event);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed realtime frame");
            }
        }
    }

    async fn run_connection(&self, generation: u64, socket: Socket) {
        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        self.attach_outbound(generation, Some(outbound_tx));
        if !self.set_state(generation, ConnectionState::Connected) {
            return;
        }
        tracing::info!("Realtime channel connected");

        let period = self.timings.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping = OutboundFrame::Ping.to_json();

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    if sink.send(WsMessage::Text(ping.clone().into())).await.is_err() {
                        break;
                    }
                }
                Some(frame) = outbound_rx.recv() => {
                    if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(&text),
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sink.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::info!("Realtime connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Realtime connection error");
                        break;
                    }
                },
            }
        }

        self.attach_outbound(generation, None);
    }
}

async fn supervise(shared: Arc<Shared>, generation: u64) {
    loop {
        let Some(token) = shared.tokens.token() else {
            tracing::info!("Session token gone, stopping realtime channel");
            shared.set_state(generation, ConnectionState::Disconnected);
            return;
        };

        if !shared.set_state(generation, ConnectionState::Connecting) {
            return;
        }

        let delay = match connect_async(shared.endpoint(&token)).await {
            Ok((socket, _)) => {
                shared.run_connection(generation, socket).await;
                shared.timings.reconnect_delay
            }
            Err(e) => {
                tracing::warn!(error = %e, "Realtime dial failed");
                shared.timings.connect_retry_delay
            }
        };

        if !shared.set_state(generation, ConnectionState::Disconnected) {
            return;
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Scheduling realtime reconnect");
        tokio::time::sleep(delay).await;
    }
}
