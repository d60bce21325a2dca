//! Audio input enumeration.

use crate::error::{Error, Result};
use crate::scenes::Scenes;
use crate::transport::{BatchRequest, Transport};
use crate::types::{AudioInput, AudioInputMetadata, Input, InputVolume, SourceType};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Deserialize)]
struct InputList {
    inputs: Vec<Input>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputSettings {
    #[serde(default)]
    input_settings: Map<String, Value>,
    #[serde(default)]
    input_kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitorType {
    monitor_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentProgramScene {
    #[serde(default)]
    scene_uuid: Option<String>,
    #[serde(default)]
    current_program_scene_uuid: Option<String>,
}

/// Audio queries
#[derive(Clone)]
pub struct Audio {
    transport: Arc<dyn Transport>,
    scenes: Scenes,
}

impl fmt::Debug for Audio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Audio").finish_non_exhaustive()
    }
}

impl Audio {
    /// Create an audio component
    pub fn new(transport: Arc<dyn Transport>, scenes: Scenes) -> Self {
        Self { transport, scenes }
    }

    /// All audio-capable inputs, with their settings and input kind.
    ///
    /// Browser sources are included even when they do not reroute audio.
    pub async fn get_collection_audio_inputs(&self) -> Result<Vec<AudioInput>> {
        let list: InputList = self.transport.call_as("GetInputList", None).await?;
        let inputs: Vec<Input> = list
            .inputs
            .into_iter()
            .filter(Input::supports_audio)
            .collect();

        let requests = inputs
            .iter()
            .map(|input| {
                BatchRequest::new("GetInputSettings", json!({ "inputUuid": input.input_uuid }))
            })
            .collect();
        let responses = self.transport.call_batch(requests).await?;

        Ok(inputs
            .into_iter()
            .zip(responses)
            .map(|(input, response)| {
                let settings = response.data::<InputSettings>();
                AudioInput {
                    input_name: input.input_name,
                    input_uuid: input.input_uuid,
                    input_kind: settings
                        .as_ref()
                        .and_then(|s| s.input_kind.clone())
                        .or(input.input_kind),
                    input_settings: settings.map(|s| s.input_settings).unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Audio inputs heard in a scene, including nested scenes, sorted by name
    pub async fn get_scene_audio_inputs(
        &self,
        scene_uuid: &str,
    ) -> Result<Vec<AudioInputMetadata>> {
        let available: HashMap<String, AudioInput> = self
            .get_collection_audio_inputs()
            .await?
            .into_iter()
            .map(|input| (input.input_uuid.clone(), input))
            .collect();

        let mut found = Vec::new();
        let mut visited = HashSet::new();
        self.collect_scene_audio_inputs(
            scene_uuid.to_string(),
            &available,
            &mut visited,
            &mut found,
        )
        .await?;

        let mut seen = HashSet::new();
        found.retain(|input| seen.insert(input.input_uuid.clone()));

        let mut inputs = self.get_audio_inputs_data(found).await?;
        inputs.sort_by(|a, b| a.input.input_name.cmp(&b.input.input_name));
        Ok(inputs)
    }

    /// Audio inputs heard in the current program scene
    pub async fn get_current_scene_audio_inputs(&self) -> Result<Vec<AudioInputMetadata>> {
        let current: CurrentProgramScene = self
            .transport
            .call_as("GetCurrentProgramScene", None)
            .await?;
        let scene_uuid = current
            .scene_uuid
            .or(current.current_program_scene_uuid)
            .ok_or_else(|| Error::NotFound("No current program scene".to_string()))?;
        self.get_scene_audio_inputs(&scene_uuid).await
    }

    /// Attach volume and monitor type to each input
    pub async fn get_audio_inputs_data(
        &self,
        inputs: Vec<AudioInput>,
    ) -> Result<Vec<AudioInputMetadata>> {
        let by_uuid = |request_type: &str| -> Vec<BatchRequest> {
            inputs
                .iter()
                .map(|input| {
                    BatchRequest::new(request_type, json!({ "inputUuid": input.input_uuid }))
                })
                .collect()
        };
        let volumes = self.transport.call_batch(by_uuid("GetInputVolume")).await?;
        let monitor_types = self
            .transport
            .call_batch(by_uuid("GetInputAudioMonitorType"))
            .await?;

        Ok(inputs
            .into_iter()
            .zip(volumes.into_iter().zip(monitor_types))
            .map(|(input, (volume, monitor))| AudioInputMetadata {
                input,
                volume: volume.data::<InputVolume>().unwrap_or_default(),
                monitor_type: monitor.data::<MonitorType>().and_then(|m| m.monitor_type),
            })
            .collect())
    }

    /// Walk a scene and its nested scenes, collecting inputs that emit audio
    fn collect_scene_audio_inputs<'a>(
        &'a self,
        scene_uuid: String,
        available: &'a HashMap<String, AudioInput>,
        visited: &'a mut HashSet<String>,
        found: &'a mut Vec<AudioInput>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !visited.insert(scene_uuid.clone()) {
                return Ok(());
            }
            for item in self.scenes.get_scene_items(&scene_uuid).await? {
                if item.source_type == SourceType::Scene {
                    self.collect_scene_audio_inputs(item.source_uuid, available, visited, found)
                        .await?;
                    continue;
                }
                match available.get(&item.source_uuid) {
                    Some(input) if input.emits_audio() => found.push(input.clone()),
                    _ => {}
                }
            }
            Ok(())
        })
    }
}
