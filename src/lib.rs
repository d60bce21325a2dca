//! OBS Tools Library
//!
//! This library keeps a resilient connection to an OBS Studio instance over
//! obs-websocket and builds higher level operations on top of it: scene and
//! source discovery, audio input enumeration, debug mode, hotkey triggers and
//! game scene switching. Scenes and sources are addressed through tags
//! embedded in their names, such as `[[Game:StarCraft]]` or `[[Debug]]`.

pub mod audio;
pub mod connection;
pub mod credentials;
pub mod debug;
pub mod emitter;
pub mod error;
pub mod games;
pub mod reconnect;
pub mod scenes;
pub mod tags;
pub mod tools;
pub mod transport;
pub mod triggers;
pub mod types;
pub mod websocket;

pub use audio::Audio;
pub use connection::{
    Connection, ConnectionBuilder, ConnectionConfig, ConnectionEvent, ConnectionEventKind,
};
pub use credentials::ObsCredentials;
pub use debug::DebugMode;
pub use emitter::{Event, EventEmitter, ListenerId};
pub use error::{Error, Result};
pub use games::{GameScene, Games};
pub use scenes::{Scenes, SearchOptions};
pub use tags::{extract_tag, extract_tags, has_tag, Tag};
pub use tools::ObsTools;
pub use transport::{
    BatchRequest, IdentificationParams, ObsEvent, RequestResponse, RequestStatus, Transport,
    TransportEvent,
};
pub use triggers::{TriggerManager, TriggerRegistry, Triggers};
pub use websocket::WsTransport;

/// Default obs-websocket port
pub const DEFAULT_PORT: u16 = 4455;

/// Default obs-websocket address
pub const DEFAULT_ADDRESS: &str = "ws://127.0.0.1:4455";

/// Request status code returned while OBS is still starting up
pub const OBS_NOT_READY: u16 = 207;

/// Default connection attempt timeout in milliseconds.
///
/// A stalled connection can take a long time to fail when a fresh attempt
/// would succeed quickly.
pub const OBS_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Default delay between readiness checks in milliseconds
pub const OBS_READY_DELAY_MS: u64 = 500;

/// Default reconnection delay in milliseconds
pub const RECONNECT_BASE_DELAY_MS: u64 = 1000;

/// A simple example of using the library:
///
/// ```rust,no_run
/// use obstools::{ConnectionEventKind, ObsCredentials, ObsTools};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tools = ObsTools::new(ObsCredentials::new("ws://127.0.0.1:4455").with_password("secret"));
///
/// let (tx, rx) = tokio::sync::oneshot::channel();
/// let tx = std::sync::Mutex::new(Some(tx));
/// tools.once(ConnectionEventKind::Ready, move |_| {
///     if let Some(tx) = tx.lock().unwrap().take() {
///         let _ = tx.send(());
///     }
/// });
/// tools.connect().await;
/// rx.await?;
///
/// for game in tools.games().get_games().await? {
///     println!("{}", game);
/// }
/// tools.games().switch_to_game_scene("a1").await?;
/// # Ok(())
/// # }
/// ```
#[doc(hidden)]
pub struct Examples;
