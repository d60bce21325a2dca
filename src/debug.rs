//! Debug mode.
//!
//! In debug mode every source tagged `[[Debug]]` is shown, and browser
//! sources that support it are switched to their simulation mode through a
//! `simulate` query parameter. Sources that support simulation but have it
//! turned off carry `_simulate` instead, so the capability is not forgotten.

use crate::error::Result;
use crate::scenes::{warn_failures, Scenes};
use crate::tags::{has_tag, TAG_DEBUG_SOURCE};
use crate::transport::{BatchRequest, Transport};
use crate::types::{SceneItem, SceneWithSceneItems};
use log::{info, warn};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use url::Url;

const SIMULATE: &str = "simulate";
const SIMULATE_OFF: &str = "_simulate";

/// Rewrite a browser source URL for the given simulation state.
///
/// Returns `None` when the URL does not support simulation, cannot be
/// parsed, or is already in the requested state.
pub fn simulation_url(raw: &str, simulate: bool) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if !pairs.iter().any(|(key, _)| key == SIMULATE || key == SIMULATE_OFF) {
        return None;
    }

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in pairs.iter().filter(|(key, _)| key != SIMULATE && key != SIMULATE_OFF) {
            query.append_pair(key, value);
        }
        query.append_pair(if simulate { SIMULATE } else { SIMULATE_OFF }, "1");
    }

    let rewritten = url.to_string();
    (rewritten != raw).then_some(rewritten)
}

/// Debug mode switching
#[derive(Clone)]
pub struct DebugMode {
    transport: Arc<dyn Transport>,
    scenes: Scenes,
}

impl fmt::Debug for DebugMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugMode").finish_non_exhaustive()
    }
}

impl DebugMode {
    /// Create a debug mode component
    pub fn new(transport: Arc<dyn Transport>, scenes: Scenes) -> Self {
        Self { transport, scenes }
    }

    /// Turn debug mode on or off
    pub async fn set_debug_mode(&self, value: bool) -> Result<()> {
        info!("setting debug mode: {}", value);

        self.set_browser_source_simulation(value).await?;

        let requests: Vec<BatchRequest> = self
            .get_debug_scenes()
            .await?
            .iter()
            .flat_map(|scene| {
                scene.scene_items.iter().map(move |item| {
                    BatchRequest::new(
                        "SetSceneItemEnabled",
                        json!({
                            "sceneUuid": scene.scene.scene_uuid,
                            "sceneItemId": item.scene_item_id,
                            "sceneItemEnabled": value,
                        }),
                    )
                })
            })
            .collect();

        let responses = self.transport.call_batch(requests).await?;
        warn_failures("set_debug_mode", &responses);
        Ok(())
    }

    /// Switch every simulation-capable browser source on or off.
    ///
    /// Changing the URL makes the browser source reload.
    pub async fn set_browser_source_simulation(&self, value: bool) -> Result<()> {
        info!("setting browser sources to simulate: {}", value);

        let mut requests = Vec::new();
        for source in self.scenes.get_collection_browser_sources().await? {
            let Some(raw) = source.url() else {
                continue;
            };
            if Url::parse(raw).is_err() {
                warn!("ignoring browser source {} with invalid url {:?}", source.source_name, raw);
                continue;
            }
            let Some(url) = simulation_url(raw, value) else {
                continue;
            };

            let mut settings = source.input_settings.clone();
            settings.insert("url".to_string(), Value::String(url));
            requests.push(BatchRequest::new(
                "SetInputSettings",
                json!({
                    "inputName": source.source_name,
                    "inputSettings": settings,
                }),
            ));
        }

        let responses = self.transport.call_batch(requests).await?;
        warn_failures("set_browser_source_simulation", &responses);
        Ok(())
    }

    /// Whether any debug source is currently visible
    pub async fn get_debug_mode(&self) -> Result<bool> {
        Ok(self
            .get_debug_scene_items()
            .await?
            .iter()
            .any(|item| item.scene_item_enabled))
    }

    /// All debug scene items across all scenes
    pub async fn get_debug_scene_items(&self) -> Result<Vec<SceneItem>> {
        Ok(self
            .get_debug_scenes()
            .await?
            .into_iter()
            .flat_map(|scene| scene.scene_items)
            .collect())
    }

    /// Scenes containing debug items, with every other item removed
    pub async fn get_debug_scenes(&self) -> Result<Vec<SceneWithSceneItems>> {
        Ok(self
            .scenes
            .get_collection_scenes_with_scene_items()
            .await?
            .into_iter()
            .map(|mut scene| {
                scene
                    .scene_items
                    .retain(|item| has_tag(&item.source_name, TAG_DEBUG_SOURCE, None));
                scene
            })
            .filter(|scene| !scene.scene_items.is_empty())
            .collect())
    }
}
