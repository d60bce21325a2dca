use crate::audio::Audio;
use crate::connection::{Connection, ConnectionEvent, ConnectionEventKind};
use crate::credentials::ObsCredentials;
use crate::debug::DebugMode;
use crate::emitter::ListenerId;
use crate::games::Games;
use crate::scenes::Scenes;
use crate::transport::{IdentificationParams, Transport};
use crate::triggers::{TriggerRegistry, Triggers};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Entry point bundling the connection with every higher level component.
///
/// All components share the connection's transport; none of them alter the
/// connection lifecycle.
#[derive(Debug, Clone)]
pub struct ObsTools {
    connection: Connection,
    scenes: Scenes,
    audio: Audio,
    debug: DebugMode,
    games: Games,
    triggers: Triggers,
    registry: TriggerRegistry,
}

impl ObsTools {
    /// Create tools over a WebSocket connection; call [`ObsTools::connect`] to start
    pub fn new(credentials: ObsCredentials) -> Self {
        Self::with_connection(Connection::builder().credentials(credentials).build())
    }

    /// Create tools and start connecting in the background
    pub fn auto_connect(credentials: ObsCredentials) -> Self {
        let tools = Self::new(credentials);
        tools.spawn_connect();
        tools
    }

    /// Create tools over an existing connection
    pub fn with_connection(connection: Connection) -> Self {
        let transport = connection.transport();
        let scenes = Scenes::new(Arc::clone(&transport));
        let registry = TriggerRegistry::new();
        Self {
            audio: Audio::new(Arc::clone(&transport), scenes.clone()),
            debug: DebugMode::new(Arc::clone(&transport), scenes.clone()),
            games: Games::new(Arc::clone(&transport), scenes.clone()),
            triggers: Triggers::new(transport, scenes.clone(), registry.clone()),
            scenes,
            registry,
            connection,
        }
    }

    /// Connect; see [`Connection::connect`]
    pub async fn connect(&self) {
        self.connection.connect().await
    }

    /// Connect on a background task
    pub fn spawn_connect(&self) -> JoinHandle<()> {
        let connection = self.connection.clone();
        tokio::spawn(async move { connection.connect().await })
    }

    /// Whether the transport is currently connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Replace address and password for the next connection attempt
    pub fn set_credentials(&self, credentials: ObsCredentials) {
        self.connection.set_credentials(credentials)
    }

    /// Replace the handshake parameters for the next connection attempt
    pub fn set_identification_params(&self, params: IdentificationParams) {
        self.connection.set_identification_params(params)
    }

    /// Register a lifecycle listener
    pub fn on<F>(&self, kind: ConnectionEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.connection.on(kind, listener)
    }

    /// Register a lifecycle listener that runs at most once
    pub fn once<F>(&self, kind: ConnectionEventKind, listener: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.connection.once(kind, listener)
    }

    /// Remove a lifecycle listener
    pub fn off(&self, kind: ConnectionEventKind, id: ListenerId) -> bool {
        self.connection.off(kind, id)
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The shared transport, for issuing raw requests
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.connection.transport()
    }

    /// Scene and source discovery
    pub fn scenes(&self) -> &Scenes {
        &self.scenes
    }

    /// Audio input enumeration
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Debug mode switching
    pub fn debug(&self) -> &DebugMode {
        &self.debug
    }

    /// Game scene management
    pub fn games(&self) -> &Games {
        &self.games
    }

    /// Hotkey trigger managers
    pub fn triggers(&self) -> &Triggers {
        &self.triggers
    }

    /// Names of the live trigger managers
    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }
}
