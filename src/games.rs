//! Game scenes.
//!
//! Output scenes are tagged `[[Game]]` and labelled with a code such as
//! `A1` or `B2`; `A1` is the primary output. Game-specific sources carry a
//! tag such as `[[Game:StarCraft]]` and are shown only while that game is
//! active.

use crate::error::{Error, Result};
use crate::scenes::{warn_failures, Scenes};
use crate::tags::{extract_tag, TAG_GAME};
use crate::transport::{BatchRequest, Transport};
use crate::types::SceneWithSceneItems;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Marker in the name of every game output scene
const SCENE_GAME_IDENTIFIER: &str = "[[Game]]";

/// Label of the primary game scene
const PRIMARY_LABEL: &str = "A1";

/// Label of game scenes without a recognizable code
const UNKNOWN_LABEL: &str = "xx";

static LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ABC][0-9]").expect("label pattern is valid"));

/// A game output scene
#[derive(Debug, Clone, PartialEq)]
pub struct GameScene {
    /// Scene code, e.g. `A1`
    pub label: String,

    /// Whether this is the primary output
    pub primary: bool,

    pub scene: SceneWithSceneItems,
}

/// The scene code in a scene name, or `xx`
pub fn extract_game_scene_label(scene_name: &str) -> String {
    LABEL_PATTERN
        .find(scene_name)
        .map(|m| m.as_str())
        .unwrap_or(UNKNOWN_LABEL)
        .to_string()
}

/// The game named by the first tag of a scene or source name.
///
/// `"StarCraft 4:3 Gameplay [[Game:StarCraft]]"` yields `StarCraft`; names
/// without a game tag, or with a bare `[[Game]]`, yield `None`.
pub fn extract_game_tag(name: &str) -> Option<String> {
    let tag = extract_tag(name, None);
    if !tag.key_is(TAG_GAME) {
        return None;
    }
    tag.value
}

/// Whether a name is tagged for `game`; `None` if it has no game tag at all
pub fn has_game_tag(name: &str, game: &str) -> Option<bool> {
    extract_game_tag(name).map(|tagged| tagged == game)
}

/// Game scene switching
#[derive(Clone)]
pub struct Games {
    transport: Arc<dyn Transport>,
    scenes: Scenes,
}

impl fmt::Debug for Games {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Games").finish_non_exhaustive()
    }
}

impl Games {
    /// Create a games component
    pub fn new(transport: Arc<dyn Transport>, scenes: Scenes) -> Self {
        Self { transport, scenes }
    }

    /// All game output scenes, sorted by label
    pub async fn get_game_scenes(&self) -> Result<Vec<GameScene>> {
        let mut scenes: Vec<GameScene> = self
            .scenes
            .get_collection_scenes_with_scene_items()
            .await?
            .into_iter()
            .filter(|scene| scene.scene.scene_name.contains(SCENE_GAME_IDENTIFIER))
            .map(|scene| {
                let label = extract_game_scene_label(&scene.scene.scene_name);
                GameScene {
                    primary: label == PRIMARY_LABEL,
                    label,
                    scene,
                }
            })
            .collect();
        scenes.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(scenes)
    }

    /// Games that have scenes, in scene order
    pub async fn get_games(&self) -> Result<Vec<String>> {
        let mut games: Vec<String> = Vec::new();
        for scene in self.scenes.get_collection_scenes().await? {
            if let Some(game) = extract_game_tag(&scene.scene_name) {
                if !games.contains(&game) {
                    games.push(game);
                }
            }
        }
        Ok(games)
    }

    /// The game shown by the first visible item of the primary game scene
    pub async fn get_active_game(&self) -> Result<Option<String>> {
        let primary = self
            .get_game_scenes()
            .await?
            .into_iter()
            .find(|scene| scene.primary)
            .ok_or_else(|| Error::NotFound("No primary game scene found".to_string()))?;

        let items = self
            .scenes
            .get_scene_items(&primary.scene.scene.scene_uuid)
            .await?;
        let active = items
            .iter()
            .find(|item| item.scene_item_enabled && !item.source_name.is_empty())
            .ok_or_else(|| {
                Error::NotFound("No visible item in the primary game scene".to_string())
            })?;

        Ok(extract_game_tag(&active.source_name))
    }

    /// Show the sources of `game` and hide those of every other game.
    ///
    /// Items tagged with a bare `[[Game]]` are left alone.
    pub async fn switch_active_game(&self, game: &str) -> Result<()> {
        info!("switching to game {}", game);

        let games = self.get_games().await?;
        if !games.iter().any(|known| known == game) {
            return Err(Error::NotFound(format!("Game not found: {}", game)));
        }

        let mut requests = Vec::new();
        for scene in self.scenes.get_collection_scenes_with_scene_items().await? {
            for item in &scene.scene_items {
                let tag = extract_tag(&item.source_name, None);
                let Some(value) = tag.value.as_deref().filter(|_| tag.key_is(TAG_GAME)) else {
                    continue;
                };
                requests.push(BatchRequest::new(
                    "SetSceneItemEnabled",
                    json!({
                        "sceneUuid": scene.scene.scene_uuid,
                        "sceneItemId": item.scene_item_id,
                        "sceneItemEnabled": value == game,
                    }),
                ));
            }
        }

        let responses = self.transport.call_batch(requests).await?;
        warn_failures("switch_active_game", &responses);
        Ok(())
    }

    /// Make the game scene with the given code (e.g. `a1`, `B2`) the program scene
    pub async fn switch_to_game_scene(&self, code: &str) -> Result<()> {
        let code = code.to_uppercase();
        info!("switching to game scene {}", code);

        let scene = self
            .get_game_scenes()
            .await?
            .into_iter()
            .find(|scene| scene.label == code)
            .ok_or_else(|| Error::NotFound(format!("Requested game scene not found: {}", code)))?;

        self.transport
            .call(
                "SetCurrentProgramScene",
                Some(json!({ "sceneUuid": scene.scene.scene.scene_uuid })),
            )
            .await?;
        Ok(())
    }
}
