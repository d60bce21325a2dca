//! Connection lifecycle management.
//!
//! A [`Connection`] owns one transport and keeps it connected: attempts are
//! bounded by a timeout, failures and disconnects schedule a reconnect, and
//! after every successful connect the remote application is polled until it
//! is ready to answer requests. Progress is reported as [`ConnectionEvent`]s.

use crate::credentials::ObsCredentials;
use crate::emitter::{Event, EventEmitter, ListenerId};
use crate::error::{Error, Result};
use crate::reconnect::ReconnectController;
use crate::transport::{IdentificationParams, Transport, TransportEvent};
use crate::websocket::WsTransport;
use crate::{OBS_CONNECT_TIMEOUT_MS, OBS_READY_DELAY_MS, RECONNECT_BASE_DELAY_MS};
use log::Level;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time;

/// Lifecycle notifications
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The transport connected and the handshake completed
    Connected,

    /// The remote application answers requests
    Ready,

    /// An established connection was lost
    Disconnected,

    /// A reconnect attempt will be made after the given delay
    Reconnecting(Duration),

    /// A connection attempt failed
    ConnectionFailed(Arc<Error>),

    /// A transport error, or a fatal readiness failure
    Error(Arc<Error>),
}

/// Discriminant of [`ConnectionEvent`], used to register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEventKind {
    Connected,
    Ready,
    Disconnected,
    Reconnecting,
    ConnectionFailed,
    Error,
}

impl ConnectionEventKind {
    /// All event kinds
    pub const ALL: [ConnectionEventKind; 6] = [
        Self::Connected,
        Self::Ready,
        Self::Disconnected,
        Self::Reconnecting,
        Self::ConnectionFailed,
        Self::Error,
    ];

    /// Get the string representation of an event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::ConnectionFailed => "connection_failed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Event for ConnectionEvent {
    type Kind = ConnectionEventKind;

    fn kind(&self) -> ConnectionEventKind {
        match self {
            Self::Connected => ConnectionEventKind::Connected,
            Self::Ready => ConnectionEventKind::Ready,
            Self::Disconnected => ConnectionEventKind::Disconnected,
            Self::Reconnecting(_) => ConnectionEventKind::Reconnecting,
            Self::ConnectionFailed(_) => ConnectionEventKind::ConnectionFailed,
            Self::Error(_) => ConnectionEventKind::Error,
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Initial address and password
    pub credentials: ObsCredentials,

    /// Initial handshake parameters
    pub identification: IdentificationParams,

    /// How long a single connection attempt may take
    pub connect_timeout: Duration,

    /// Delay between readiness checks while the remote application starts up
    pub ready_delay: Duration,

    /// Base delay before a reconnect attempt
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            credentials: ObsCredentials::default(),
            identification: IdentificationParams::default(),
            connect_timeout: Duration::from_millis(OBS_CONNECT_TIMEOUT_MS),
            ready_delay: Duration::from_millis(OBS_READY_DELAY_MS),
            reconnect_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
        }
    }
}

/// Builder for creating a [`Connection`]
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    /// Connection configuration
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a new connection builder
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
        }
    }

    /// Set address and password from a connection string
    pub fn connection_string(mut self, conn_str: &str) -> Result<Self> {
        self.config.credentials = ObsCredentials::parse(conn_str)?;
        Ok(self)
    }

    /// Set the WebSocket address
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.credentials.address = Some(address.into());
        self
    }

    /// Set the server password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.credentials.password = Some(password.into());
        self
    }

    /// Set address and password at once
    pub fn credentials(mut self, credentials: ObsCredentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    /// Set the handshake parameters
    pub fn identification_params(mut self, params: IdentificationParams) -> Self {
        self.config.identification = params;
        self
    }

    /// Set the event subscription bitmask
    pub fn event_subscriptions(mut self, mask: u32) -> Self {
        self.config.identification.event_subscriptions = Some(mask);
        self
    }

    /// Set the connection attempt timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the delay between readiness checks
    pub fn ready_delay(mut self, delay: Duration) -> Self {
        self.config.ready_delay = delay;
        self
    }

    /// Set the reconnection delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Build a connection over a WebSocket transport
    pub fn build(self) -> Connection {
        self.build_with(Arc::new(WsTransport::new()))
    }

    /// Build a connection over the given transport
    pub fn build_with(self, transport: Arc<dyn Transport>) -> Connection {
        Connection::with_config(transport, self.config)
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    credentials: Mutex<ObsCredentials>,
    params: Mutex<IdentificationParams>,

    /// True between a completed handshake and a detected disconnect
    connected: AtomicBool,

    /// True while a connection attempt is in flight
    attempting: AtomicBool,

    /// True while a scheduled reconnect is sleeping
    reconnect_pending: AtomicBool,

    quiet: AtomicBool,
    reconnect: Mutex<ReconnectController>,
    events: EventEmitter<ConnectionEvent>,

    /// Taken by the listener task on the first successful connect
    transport_events: Mutex<Option<broadcast::Receiver<TransportEvent>>>,
}

/// A self-healing connection to the remote application.
///
/// Cloning is cheap; all clones share the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("credentials", &*lock(&self.inner.credentials))
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    /// Create a connection over the given transport with default settings
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ConnectionConfig::default())
    }

    /// Create a connection over the given transport
    pub fn with_config(transport: Arc<dyn Transport>, config: ConnectionConfig) -> Self {
        let transport_events = transport.subscribe();
        Self {
            inner: Arc::new(Inner {
                credentials: Mutex::new(config.credentials.clone()),
                params: Mutex::new(config.identification.clone()),
                reconnect: Mutex::new(ReconnectController::new(config.reconnect_delay)),
                transport,
                config,
                connected: AtomicBool::new(false),
                attempting: AtomicBool::new(false),
                reconnect_pending: AtomicBool::new(false),
                quiet: AtomicBool::new(false),
                events: EventEmitter::new(),
                transport_events: Mutex::new(Some(transport_events)),
            }),
        }
    }

    /// Create a new connection builder
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// The transport, for issuing requests
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    /// Whether the transport is currently connected
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Current address and password
    pub fn credentials(&self) -> ObsCredentials {
        lock(&self.inner.credentials).clone()
    }

    /// Replace address and password; used from the next connection attempt on
    pub fn set_credentials(&self, credentials: ObsCredentials) {
        *lock(&self.inner.credentials) = credentials;
    }

    /// Current handshake parameters
    pub fn identification_params(&self) -> IdentificationParams {
        lock(&self.inner.params).clone()
    }

    /// Replace the handshake parameters; used from the next connection attempt on
    pub fn set_identification_params(&self, params: IdentificationParams) {
        *lock(&self.inner.params) = params;
    }

    /// Silence lifecycle logging
    pub fn set_quiet(&self, quiet: bool) {
        self.inner.quiet.store(quiet, Ordering::Relaxed);
    }

    /// Register a lifecycle listener
    pub fn on<F>(&self, kind: ConnectionEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, listener)
    }

    /// Register a lifecycle listener that runs at most once
    pub fn once<F>(&self, kind: ConnectionEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner.events.once(kind, listener)
    }

    /// Remove a lifecycle listener
    pub fn off(&self, kind: ConnectionEventKind, id: ListenerId) -> bool {
        self.inner.events.off(kind, id)
    }

    /// Connect to the remote application.
    ///
    /// Does nothing when already connected. Failures are not returned: they
    /// are reported through [`ConnectionEvent::ConnectionFailed`] and retried
    /// in the background, except for a missing address, which is reported
    /// but not retried. Listen for [`ConnectionEvent::Ready`] before issuing
    /// requests.
    pub async fn connect(&self) {
        self.try_connect().await
    }

    async fn try_connect(&self) {
        if self.is_connected() {
            return;
        }
        if self.inner.attempting.swap(true, Ordering::SeqCst) {
            self.log(Level::Debug, format_args!("connection attempt already in flight"));
            return;
        }

        let outcome = self.attempt().await;
        self.inner.attempting.store(false, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                self.inner.connected.store(true, Ordering::SeqCst);
                lock(&self.inner.reconnect).reset();
                self.log(Level::Info, format_args!("connected"));
                self.emit(ConnectionEvent::Connected);
                self.attach_listeners();
                self.spawn_ready();
            }
            Err(err @ Error::Config(_)) => {
                self.log(Level::Error, format_args!("connection failed: {}", err));
                self.emit(ConnectionEvent::ConnectionFailed(Arc::new(err)));
            }
            Err(err) => {
                self.log(Level::Error, format_args!("connection failed: {}", err));
                self.emit(ConnectionEvent::ConnectionFailed(Arc::new(err)));
                self.schedule_reconnect();
            }
        }
    }

    /// A single connection attempt, bounded by the connect timeout
    async fn attempt(&self) -> Result<()> {
        let credentials = self.credentials();
        let params = self.identification_params();
        let address = credentials
            .address
            .ok_or_else(|| Error::Config("No OBS websocket address specified".to_string()))?;

        let timeout = self.inner.config.connect_timeout;
        let connect = self
            .inner
            .transport
            .connect(&address, credentials.password.as_deref(), &params);

        match time::timeout(timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "Connection timeout after {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Start watching the transport for closure and errors.
    ///
    /// Runs once per connection instance; later connects reuse the task.
    fn attach_listeners(&self) {
        let Some(mut rx) = lock(&self.inner.transport_events).take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Transport listener skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(connection) = upgrade(&weak) else {
                    break;
                };
                match event {
                    TransportEvent::ConnectionClosed => connection.handle_closed(),
                    TransportEvent::ConnectionError(err) => {
                        connection.log(Level::Error, format_args!("error: {}", err));
                        connection.emit(ConnectionEvent::Error(err));
                    }
                    TransportEvent::Event(_) => {}
                }
            }
        });
    }

    fn handle_closed(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            self.log(Level::Info, format_args!("disconnected"));
            self.emit(ConnectionEvent::Disconnected);
            self.schedule_reconnect();
        }
    }

    fn spawn_ready(&self) {
        let connection = self.clone();
        tokio::spawn(async move {
            if let Err(err) = connection.schedule_ready().await {
                connection.log(Level::Error, format_args!("readiness check failed: {}", err));
                connection.emit(ConnectionEvent::Error(Arc::new(err)));
            }
        });
    }

    /// Poll the remote application until it answers requests, then emit `Ready`.
    ///
    /// "Not ready" answers are retried after the ready delay; any other
    /// failure ends the loop and is returned. Polling stops quietly if the
    /// connection drops in the meantime, including while a request is in
    /// flight: the transport fails pending requests before it reports the
    /// closure, and the reconnect path starts a new poll.
    async fn schedule_ready(&self) -> Result<()> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Version {
            obs_version: Option<String>,
            obs_web_socket_version: Option<String>,
        }

        loop {
            if !self.is_connected() {
                return Ok(());
            }
            match self.inner.transport.call_as::<Version>("GetVersion", None).await {
                Ok(version) => {
                    self.log(
                        Level::Info,
                        format_args!(
                            "OBS version {}, WS version {}",
                            version.obs_version.as_deref().unwrap_or("unknown"),
                            version.obs_web_socket_version.as_deref().unwrap_or("unknown")
                        ),
                    );
                    self.emit(ConnectionEvent::Ready);
                    return Ok(());
                }
                Err(err) if err.is_not_ready() => {
                    self.log(Level::Debug, format_args!("not ready yet, retrying"));
                    time::sleep(self.inner.config.ready_delay).await;
                }
                Err(err @ Error::Connection(_)) => {
                    self.log(Level::Debug, format_args!("readiness check stopped: {}", err));
                    return Ok(());
                }
                Err(_) if !self.is_connected() => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Announce and schedule the next connection attempt.
    ///
    /// At most one reconnect sleeps at a time; a failed manual connect while
    /// one is pending leaves it to that retry.
    fn schedule_reconnect(&self) {
        if self.inner.reconnect_pending.swap(true, Ordering::SeqCst) {
            self.log(Level::Debug, format_args!("reconnect already scheduled"));
            return;
        }
        let delay = lock(&self.inner.reconnect).next_delay();
        self.log(Level::Info, format_args!("reconnecting in {} ms", delay.as_millis()));
        self.emit(ConnectionEvent::Reconnecting(delay));

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(connection) = upgrade(&weak) {
                connection.inner.reconnect_pending.store(false, Ordering::SeqCst);
                connection.try_connect().await;
            }
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        self.inner.events.emit(&event);
    }

    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.inner.quiet.load(Ordering::Relaxed) {
            log::log!(target: "obstools::connection", level, "{}", args);
        }
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<Connection> {
    weak.upgrade().map(|inner| Connection { inner })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
