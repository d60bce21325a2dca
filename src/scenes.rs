//! Scene and source discovery.

use crate::error::Result;
use crate::tags::{has_tag, Tag};
use crate::transport::{BatchRequest, RequestResponse, Transport};
use crate::types::{
    Scene, SceneItem, SceneWithSceneItems, Source, SourceType, INPUT_KIND_BROWSER_SOURCE,
};
use log::warn;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Filter for [`Scenes::find_scenes`] and [`Scenes::find_scene_items`].
///
/// An item matches when it satisfies either criterion; with no criteria
/// everything matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Match scene items of this input kind
    pub input_kind: Option<String>,

    /// Match names carrying this tag; a missing value matches any value
    pub tag: Option<Tag>,
}

impl SearchOptions {
    /// Search by tag
    pub fn tag(key: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            input_kind: None,
            tag: Some(Tag::new(key, value)),
        }
    }

    /// Search by input kind
    pub fn input_kind(kind: impl Into<String>) -> Self {
        Self {
            input_kind: Some(kind.into()),
            tag: None,
        }
    }

    fn matches_tag(&self, name: &str) -> bool {
        match &self.tag {
            Some(Tag { key: Some(key), value }) => has_tag(name, key, value.as_deref()),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct SceneList {
    scenes: Vec<Scene>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneItemList {
    scene_items: Vec<SceneItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputSettings {
    #[serde(default)]
    input_settings: Map<String, Value>,
    #[serde(default)]
    input_kind: Option<String>,
}

/// Scene and source queries shared by the other components
#[derive(Clone)]
pub struct Scenes {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Scenes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenes").finish_non_exhaustive()
    }
}

impl Scenes {
    /// Create a scene component issuing requests through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// All scenes in the current collection
    pub async fn get_collection_scenes(&self) -> Result<Vec<Scene>> {
        let list: SceneList = self.transport.call_as("GetSceneList", None).await?;
        Ok(list.scenes)
    }

    /// Fetch the items of each scene in one batch.
    ///
    /// Scenes whose item list could not be fetched are left out.
    pub async fn apply_scene_items(&self, scenes: Vec<Scene>) -> Result<Vec<SceneWithSceneItems>> {
        let requests = scenes
            .iter()
            .map(|scene| {
                BatchRequest::new("GetSceneItemList", json!({ "sceneName": scene.scene_name }))
            })
            .collect();
        let responses = self.transport.call_batch(requests).await?;

        Ok(scenes
            .into_iter()
            .zip(responses)
            .filter_map(|(scene, response)| {
                let list = response.data::<SceneItemList>()?;
                Some(SceneWithSceneItems {
                    scene,
                    scene_items: list.scene_items,
                })
            })
            .collect())
    }

    /// All scenes with their items; every item carries its scene
    pub async fn get_collection_scenes_with_scene_items(&self) -> Result<Vec<SceneWithSceneItems>> {
        let scenes = self.get_collection_scenes().await?;
        let scenes = self.apply_scene_items(scenes).await?;
        Ok(apply_scene_references(scenes))
    }

    /// Items of a single scene
    pub async fn get_scene_items(&self, scene_uuid: &str) -> Result<Vec<SceneItem>> {
        let list: SceneItemList = self
            .transport
            .call_as("GetSceneItemList", Some(json!({ "sceneUuid": scene_uuid })))
            .await?;
        Ok(list.scene_items)
    }

    /// All sources used in the collection, with input settings.
    ///
    /// Nested scenes are not sources and are left out. Sources keep no scene
    /// specific data; a source used in several scenes appears once per use.
    pub async fn get_collection_sources(&self) -> Result<Vec<Source>> {
        let sources: Vec<Source> = self
            .get_collection_scenes_with_scene_items()
            .await?
            .iter()
            .flat_map(|scene| scene.scene_items.iter().map(SceneItem::to_source))
            .filter(|source| source.source_type != SourceType::Scene)
            .collect();

        let requests = sources
            .iter()
            .map(|source| {
                BatchRequest::new("GetInputSettings", json!({ "inputUuid": source.source_uuid }))
            })
            .collect();
        let responses = self.transport.call_batch(requests).await?;

        Ok(sources
            .into_iter()
            .zip(responses)
            .map(|(mut source, response)| {
                // Sources without input settings are kept as they are
                if let Some(settings) = response.data::<InputSettings>() {
                    source.input_settings = settings.input_settings;
                    source.input_kind = settings.input_kind;
                }
                source
            })
            .collect())
    }

    /// All browser sources used in the collection
    pub async fn get_collection_browser_sources(&self) -> Result<Vec<Source>> {
        Ok(self
            .get_collection_sources()
            .await?
            .into_iter()
            .filter(|source| source.input_kind.as_deref() == Some(INPUT_KIND_BROWSER_SOURCE))
            .collect())
    }

    /// Scenes whose name matches the search tag (input kind is ignored for scenes)
    pub async fn find_scenes(&self, opts: &SearchOptions) -> Result<Vec<Scene>> {
        Ok(self
            .get_collection_scenes()
            .await?
            .into_iter()
            .filter(|scene| opts.tag.is_none() || opts.matches_tag(&scene.scene_name))
            .collect())
    }

    /// Scene items across all scenes matching the search, unique by source
    pub async fn find_scene_items(&self, opts: &SearchOptions) -> Result<Vec<SceneItem>> {
        let mut seen = HashSet::new();
        Ok(self
            .get_collection_scenes_with_scene_items()
            .await?
            .into_iter()
            .flat_map(|scene| scene.scene_items)
            .filter(|item| {
                let by_kind = opts.input_kind.is_some() && item.input_kind == opts.input_kind;
                let unfiltered = opts.input_kind.is_none() && opts.tag.is_none();
                by_kind || opts.matches_tag(&item.source_name) || unfiltered
            })
            .filter(|item| seen.insert(item.source_uuid.clone()))
            .collect())
    }
}

/// Give every scene item a copy of the scene it belongs to
pub fn apply_scene_references(scenes: Vec<SceneWithSceneItems>) -> Vec<SceneWithSceneItems> {
    scenes
        .into_iter()
        .map(|mut scene| {
            for item in &mut scene.scene_items {
                item.scene = Some(scene.scene.clone());
            }
            scene
        })
        .collect()
}

/// Log the failed entries of a batch
pub(crate) fn warn_failures(context: &str, responses: &[RequestResponse]) {
    for response in responses.iter().filter(|response| !response.is_ok()) {
        warn!(
            "{}: {} failed: {}",
            context,
            response.request_type,
            response.request_status.to_error()
        );
    }
}
