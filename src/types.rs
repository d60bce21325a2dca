//! Typed views of the payloads returned by the remote application.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Input capability flag: the input produces audio
pub const OBS_SOURCE_AUDIO: u32 = 1 << 1;

/// Input kind of browser sources
pub const INPUT_KIND_BROWSER_SOURCE: &str = "browser_source";

/// Blend mode of a scene item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    #[serde(rename = "OBS_BLEND_NORMAL")]
    Normal,
    #[serde(rename = "OBS_BLEND_ADDITIVE")]
    Additive,
    #[serde(rename = "OBS_BLEND_SUBTRACT")]
    Subtract,
    #[serde(rename = "OBS_BLEND_SCREEN")]
    Screen,
    #[serde(rename = "OBS_BLEND_MULTIPLY")]
    Multiply,
    #[serde(rename = "OBS_BLEND_LIGHTEN")]
    Lighten,
    #[serde(rename = "OBS_BLEND_DARKEN")]
    Darken,
    #[serde(other)]
    Unknown,
}

/// Kind of source backing a scene item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "OBS_SOURCE_TYPE_INPUT")]
    Input,
    #[serde(rename = "OBS_SOURCE_TYPE_FILTER")]
    Filter,
    #[serde(rename = "OBS_SOURCE_TYPE_TRANSITION")]
    Transition,
    #[serde(rename = "OBS_SOURCE_TYPE_SCENE")]
    Scene,
    #[serde(other)]
    Unknown,
}

/// A scene as listed by `GetSceneList`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(default)]
    pub scene_index: i64,
    pub scene_name: String,
    pub scene_uuid: String,
}

/// A scene together with its items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneWithSceneItems {
    #[serde(flatten)]
    pub scene: Scene,
    pub scene_items: Vec<SceneItem>,
}

/// A source placed in a scene, with its scene-local state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItem {
    /// The scene this item belongs to, filled in by scene discovery
    #[serde(skip)]
    pub scene: Option<Scene>,
    #[serde(default)]
    pub input_kind: Option<String>,
    #[serde(default)]
    pub is_group: Option<bool>,
    #[serde(default)]
    pub scene_item_blend_mode: Option<BlendMode>,
    pub scene_item_enabled: bool,
    pub scene_item_id: i64,
    #[serde(default)]
    pub scene_item_index: i64,
    #[serde(default)]
    pub scene_item_locked: bool,
    #[serde(default)]
    pub scene_item_transform: Value,
    pub source_name: String,
    pub source_type: SourceType,
    pub source_uuid: String,
}

impl SceneItem {
    /// Strip scene-local state, leaving an input kind and settings to be filled in
    pub fn to_source(&self) -> Source {
        Source {
            input_kind: None,
            input_settings: Map::new(),
            source_name: self.source_name.clone(),
            source_type: self.source_type,
            source_uuid: self.source_uuid.clone(),
        }
    }
}

/// A source independent of any scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub input_kind: Option<String>,
    pub input_settings: Map<String, Value>,
    pub source_name: String,
    pub source_type: SourceType,
    pub source_uuid: String,
}

impl Source {
    /// The `url` input setting, for browser sources
    pub fn url(&self) -> Option<&str> {
        self.input_settings.get("url").and_then(Value::as_str)
    }
}

/// An input as listed by `GetInputList`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub input_name: String,
    pub input_uuid: String,
    #[serde(default)]
    pub input_kind: Option<String>,
    #[serde(default)]
    pub unversioned_input_kind: Option<String>,
    #[serde(default)]
    pub input_kind_caps: u32,
}

impl Input {
    /// Whether the input can produce audio
    pub fn supports_audio(&self) -> bool {
        self.input_kind_caps & OBS_SOURCE_AUDIO != 0
    }
}

/// An audio-capable input with its settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInput {
    pub input_name: String,
    pub input_uuid: String,
    #[serde(default)]
    pub input_kind: Option<String>,
    #[serde(default)]
    pub input_settings: Map<String, Value>,
}

impl AudioInput {
    /// Browser sources only emit audio when it is rerouted to OBS
    pub fn emits_audio(&self) -> bool {
        if self.input_kind.as_deref() != Some(INPUT_KIND_BROWSER_SOURCE) {
            return true;
        }
        self.input_settings.get("reroute_audio") == Some(&Value::Bool(true))
    }
}

/// Volume of an input, from `GetInputVolume`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputVolume {
    pub input_volume_mul: f64,
    pub input_volume_db: f64,
}

/// An audio input with its volume and monitoring setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputMetadata {
    #[serde(flatten)]
    pub input: AudioInput,
    #[serde(flatten)]
    pub volume: InputVolume,
    pub monitor_type: Option<String>,
}
