//! Hotkey triggers and toggles.
//!
//! A scene tagged `[[HotkeyTriggers]]` holds sources tagged
//! `[[Trigger:Name]]`. Hiding such a source (typically through an OBS
//! hotkey) runs the callbacks registered for `Name`:
//!
//! - a *toggle* callback receives the new visibility on every change;
//! - a *trigger* callback runs when the source is hidden, after which the
//!   source is made visible again so the hotkey can fire once more.
//!
//! The table mapping scene item ids to trigger names is resolved when the
//! manager is created and only changes on [`TriggerManager::refresh`]; sources
//! added to the trigger scene later are not picked up automatically.

use crate::error::{Error, Result};
use crate::scenes::{Scenes, SearchOptions};
use crate::tags::{extract_tag, TAG_HOTKEY_TRIGGERS, TAG_TRIGGER};
use crate::transport::{Transport, TransportEvent};
use crate::types::SceneItem;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Event emitted by the remote application when an item is shown or hidden
const SCENE_ITEM_ENABLE_STATE_CHANGED: &str = "SceneItemEnableStateChanged";

/// Names of the trigger managers alive for one tools instance
#[derive(Debug, Clone, Default)]
pub struct TriggerRegistry {
    names: Arc<Mutex<HashSet<String>>>,
}

impl TriggerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a manager with this name exists
    pub fn has(&self, name: &str) -> bool {
        lock(&self.names).contains(name)
    }

    /// Record a manager name; false if it was already taken
    pub fn register(&self, name: &str) -> bool {
        lock(&self.names).insert(name.to_string())
    }

    /// Release a manager name; false if it was not registered
    pub fn unregister(&self, name: &str) -> bool {
        lock(&self.names).remove(name)
    }
}

#[derive(Clone)]
enum Callback {
    Trigger(Arc<dyn Fn() + Send + Sync>),
    Toggle(Arc<dyn Fn(bool) + Send + Sync>),
}

impl Callback {
    fn label(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::Toggle(_) => "toggle",
        }
    }
}

#[derive(Default)]
struct State {
    scene_uuid: Option<String>,
    scene_items: Vec<SceneItem>,
    callbacks: HashMap<String, Callback>,
    /// Scene item id to trigger name
    map: HashMap<i64, String>,
    active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnableStateChanged {
    #[serde(default)]
    scene_uuid: Option<String>,
    scene_item_id: i64,
    scene_item_enabled: bool,
}

struct Shared {
    name: String,
    transport: Arc<dyn Transport>,
    scenes: Scenes,
    registry: TriggerRegistry,
    state: Mutex<State>,
}

/// Creates trigger managers
#[derive(Clone)]
pub struct Triggers {
    transport: Arc<dyn Transport>,
    scenes: Scenes,
    registry: TriggerRegistry,
}

impl fmt::Debug for Triggers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Triggers")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Triggers {
    /// Create a triggers component sharing `registry`
    pub fn new(transport: Arc<dyn Transport>, scenes: Scenes, registry: TriggerRegistry) -> Self {
        Self {
            transport,
            scenes,
            registry,
        }
    }

    /// Whether a trigger manager with this name exists
    pub fn has_trigger_manager(&self, name: &str) -> bool {
        self.registry.has(name)
    }

    /// Create a trigger manager and resolve its trigger scene.
    ///
    /// Only one manager may exist per name at a time.
    pub async fn create_trigger_manager(&self, name: &str) -> Result<TriggerManager> {
        if !self.registry.register(name) {
            return Err(Error::Trigger(format!(
                "TriggerManager already instantiated by this name: {}",
                name
            )));
        }
        info!("created TriggerManager: {}", name);

        let shared = Arc::new(Shared {
            name: name.to_string(),
            transport: Arc::clone(&self.transport),
            scenes: self.scenes.clone(),
            registry: self.registry.clone(),
            state: Mutex::new(State {
                active: true,
                ..State::default()
            }),
        });

        let manager = TriggerManager {
            listener: Mutex::new(Some(spawn_listener(Arc::clone(&shared)))),
            shared,
        };
        manager.refresh().await?;
        Ok(manager)
    }
}

/// Dispatches scene item visibility changes to registered callbacks.
///
/// Dropping the manager destroys it.
pub struct TriggerManager {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for TriggerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("TriggerManager")
            .field("name", &self.shared.name)
            .field("scene_uuid", &state.scene_uuid)
            .field("triggers", &state.map.len())
            .field("active", &state.active)
            .finish()
    }
}

impl TriggerManager {
    /// Name the manager was registered under
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the manager still handles events
    pub fn is_active(&self) -> bool {
        lock(&self.shared.state).active
    }

    /// Uuid of the resolved trigger scene, if one was found
    pub fn scene_uuid(&self) -> Option<String> {
        lock(&self.shared.state).scene_uuid.clone()
    }

    /// Register a callback that runs whenever the `name` source is hidden
    pub fn add_trigger<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.add(name, Callback::Trigger(Arc::new(callback)))
    }

    /// Register a callback that receives every visibility change of the `name` source
    pub fn add_toggle<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared.add(name, Callback::Toggle(Arc::new(callback)))
    }

    /// Find the trigger scene again and rebuild the id table
    pub async fn refresh(&self) -> Result<()> {
        let scenes = self
            .shared
            .scenes
            .find_scenes(&SearchOptions::tag(TAG_HOTKEY_TRIGGERS, None))
            .await?;
        let Some(scene) = scenes.into_iter().next() else {
            debug!("no {} scene found", TAG_HOTKEY_TRIGGERS);
            return Ok(());
        };
        let items = self.shared.scenes.get_scene_items(&scene.scene_uuid).await?;

        let mut state = lock(&self.shared.state);
        state.map = items
            .iter()
            .filter_map(|item| {
                let value = extract_tag(&item.source_name, Some(TAG_TRIGGER)).value?;
                (!value.is_empty()).then_some((item.scene_item_id, value))
            })
            .collect();
        state.scene_uuid = Some(scene.scene_uuid);
        state.scene_items = items;
        Ok(())
    }

    /// Stop handling events and release the manager's name
    pub fn destroy(&self) {
        let was_active = std::mem::replace(&mut lock(&self.shared.state).active, false);
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
        if was_active {
            self.shared.registry.unregister(&self.shared.name);
            info!("destroyed TriggerManager: {}", self.shared.name);
        }
    }
}

impl Drop for TriggerManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Shared {
    fn add(self: &Arc<Self>, name: &str, callback: Callback) -> Result<()> {
        let initial: Vec<(i64, bool)> = {
            let mut state = lock(&self.state);
            if !state.active {
                return Err(Error::Trigger("TriggerManager is not active".to_string()));
            }
            if state.callbacks.contains_key(name) {
                return Err(Error::Trigger(format!(
                    "TriggerManager already has a callback for this trigger: {}",
                    name
                )));
            }
            state.callbacks.insert(name.to_string(), callback.clone());
            state
                .scene_items
                .iter()
                .filter(|item| {
                    extract_tag(&item.source_name, Some(TAG_TRIGGER)).value.as_deref() == Some(name)
                })
                .map(|item| (item.scene_item_id, item.scene_item_enabled))
                .collect()
        };

        // Bring the callback in line with the current state
        for (item_id, enabled) in initial {
            self.set_state(name, &callback, item_id, enabled);
        }
        Ok(())
    }

    fn handle_event(self: &Arc<Self>, event: EnableStateChanged) {
        let target = {
            let state = lock(&self.state);
            if !state.active || event.scene_uuid.is_none() || event.scene_uuid != state.scene_uuid {
                return;
            }
            state.map.get(&event.scene_item_id).and_then(|name| {
                state
                    .callbacks
                    .get(name)
                    .map(|callback| (name.clone(), callback.clone()))
            })
        };

        if let Some((name, callback)) = target {
            self.set_state(&name, &callback, event.scene_item_id, event.scene_item_enabled);
        }
    }

    /// Run a callback for a new item state; triggers also re-show their item
    fn set_state(self: &Arc<Self>, name: &str, callback: &Callback, item_id: i64, enabled: bool) {
        let scene_uuid = {
            let state = lock(&self.state);
            match (&state.scene_uuid, state.active) {
                (Some(uuid), true) => uuid.clone(),
                _ => return,
            }
        };

        info!(
            "running {} callback: {} (state: {})",
            callback.label(),
            name,
            enabled
        );

        match callback {
            Callback::Trigger(run) => {
                if !enabled {
                    run();
                }
                self.show_item(scene_uuid, item_id);
            }
            Callback::Toggle(run) => run(enabled),
        }
    }

    fn show_item(&self, scene_uuid: String, item_id: i64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime available to re-enable trigger item {}", item_id);
            return;
        };
        let transport = Arc::clone(&self.transport);
        runtime.spawn(async move {
            let data = json!({
                "sceneUuid": scene_uuid,
                "sceneItemId": item_id,
                "sceneItemEnabled": true,
            });
            if let Err(e) = transport.call("SetSceneItemEnabled", Some(data)).await {
                warn!("failed to re-enable trigger item {}: {}", item_id, e);
            }
        });
    }
}

fn spawn_listener(shared: Arc<Shared>) -> JoinHandle<()> {
    let mut rx = shared.transport.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(TransportEvent::Event(event)) => event,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("trigger listener skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if event.event_type != SCENE_ITEM_ENABLE_STATE_CHANGED {
                continue;
            }
            match serde_json::from_value::<EnableStateChanged>(event.event_data) {
                Ok(change) => shared.handle_event(change),
                Err(e) => warn!("malformed {} event: {}", SCENE_ITEM_ENABLE_STATE_CHANGED, e),
            }
        }
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
