//! In-memory stand-in for the remote application, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use obstools::{
    BatchRequest, Error, IdentificationParams, ObsEvent, RequestResponse, RequestStatus, Result,
    Transport, TransportEvent,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const BROWSER: &str = "browser_source";
pub const CAPTURE: &str = "game_capture";
pub const IMAGE: &str = "image_source";
pub const MIC: &str = "wasapi_input_capture";
pub const MEDIA: &str = "ffmpeg_source";
pub const WEBCAM: &str = "dshow_input";

/// Scenes, inputs and a request log
#[derive(Default)]
struct State {
    scenes: Vec<Value>,
    items: HashMap<String, Vec<Value>>,
    inputs: Vec<Value>,
    settings: HashMap<String, Map<String, Value>>,
    volumes: HashMap<String, Value>,
    monitor_types: HashMap<String, String>,
    current_scene: Option<String>,
    calls: Vec<(String, Value)>,
}

/// Fake obs-websocket server answering the requests obstools issues
pub struct FakeObs {
    state: Mutex<State>,
    events: broadcast::Sender<TransportEvent>,
}

impl FakeObs {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(State::default()),
            events,
        })
    }

    pub fn add_scene(&self, name: &str, uuid: &str) {
        let mut state = self.state.lock().unwrap();
        let index = state.scenes.len();
        state.scenes.push(json!({
            "sceneIndex": index,
            "sceneName": name,
            "sceneUuid": uuid,
        }));
        state.items.entry(uuid.to_string()).or_default();
    }

    /// Register an input; `caps` is the input kind capability mask
    pub fn add_input(&self, name: &str, uuid: &str, kind: &str, caps: u32, settings: Value) {
        let mut state = self.state.lock().unwrap();
        state.inputs.push(json!({
            "inputName": name,
            "inputUuid": uuid,
            "inputKind": kind,
            "unversionedInputKind": kind,
            "inputKindCaps": caps,
        }));
        let settings = settings.as_object().cloned().unwrap_or_default();
        state.settings.insert(uuid.to_string(), settings);
    }

    /// Place a registered input in a scene
    pub fn add_item(&self, scene_uuid: &str, id: i64, input_uuid: &str, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        let input = state
            .inputs
            .iter()
            .find(|input| input["inputUuid"] == input_uuid)
            .cloned()
            .expect("input registered before use");
        let items = state.items.entry(scene_uuid.to_string()).or_default();
        let index = items.len();
        items.push(json!({
            "inputKind": input["inputKind"],
            "isGroup": null,
            "sceneItemBlendMode": "OBS_BLEND_NORMAL",
            "sceneItemEnabled": enabled,
            "sceneItemId": id,
            "sceneItemIndex": index,
            "sceneItemLocked": false,
            "sceneItemTransform": {},
            "sourceName": input["inputName"],
            "sourceType": "OBS_SOURCE_TYPE_INPUT",
            "sourceUuid": input_uuid,
        }));
    }

    /// Nest one scene inside another
    pub fn add_scene_item(&self, scene_uuid: &str, id: i64, nested_uuid: &str) {
        let mut state = self.state.lock().unwrap();
        let name = state
            .scenes
            .iter()
            .find(|scene| scene["sceneUuid"] == nested_uuid)
            .map(|scene| scene["sceneName"].clone())
            .expect("scene registered before use");
        let items = state.items.entry(scene_uuid.to_string()).or_default();
        let index = items.len();
        items.push(json!({
            "inputKind": null,
            "isGroup": false,
            "sceneItemBlendMode": "OBS_BLEND_NORMAL",
            "sceneItemEnabled": true,
            "sceneItemId": id,
            "sceneItemIndex": index,
            "sceneItemLocked": false,
            "sceneItemTransform": {},
            "sourceName": name,
            "sourceType": "OBS_SOURCE_TYPE_SCENE",
            "sourceUuid": nested_uuid,
        }));
    }

    pub fn set_volume(&self, input_uuid: &str, mul: f64, db: f64) {
        self.state.lock().unwrap().volumes.insert(
            input_uuid.to_string(),
            json!({ "inputVolumeMul": mul, "inputVolumeDb": db }),
        );
    }

    pub fn set_monitor_type(&self, input_uuid: &str, monitor_type: &str) {
        self.state
            .lock()
            .unwrap()
            .monitor_types
            .insert(input_uuid.to_string(), monitor_type.to_string());
    }

    pub fn set_current_scene(&self, scene_uuid: &str) {
        self.state.lock().unwrap().current_scene = Some(scene_uuid.to_string());
    }

    pub fn current_scene(&self) -> Option<String> {
        self.state.lock().unwrap().current_scene.clone()
    }

    /// Visibility of a scene item
    pub fn item_enabled(&self, scene_uuid: &str, id: i64) -> Option<bool> {
        let state = self.state.lock().unwrap();
        state
            .items
            .get(scene_uuid)?
            .iter()
            .find(|item| item["sceneItemId"] == id)
            .and_then(|item| item["sceneItemEnabled"].as_bool())
    }

    pub fn input_settings(&self, input_uuid: &str) -> Map<String, Value> {
        self.state
            .lock()
            .unwrap()
            .settings
            .get(input_uuid)
            .cloned()
            .unwrap_or_default()
    }

    /// Request data of every call of the given type, in order
    pub fn calls(&self, request_type: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(kind, _)| kind == request_type)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Push an event to every subscriber
    pub fn emit_event(&self, event_type: &str, event_data: Value) {
        let _ = self.events.send(TransportEvent::Event(ObsEvent {
            event_type: event_type.to_string(),
            event_intent: None,
            event_data,
        }));
    }

    fn handle(&self, request_type: &str, data: &Value) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((request_type.to_string(), data.clone()));

        match request_type {
            "GetVersion" => Ok(json!({
                "obsVersion": "30.2.0",
                "obsWebSocketVersion": "5.5.0",
            })),
            "GetSceneList" => Ok(json!({
                "currentProgramSceneName": null,
                "currentProgramSceneUuid": state.current_scene,
                "scenes": state.scenes,
            })),
            "GetSceneItemList" => {
                let uuid = scene_uuid(&state, data).ok_or_else(|| not_found("scene"))?;
                let items = state.items.get(&uuid).cloned().unwrap_or_default();
                Ok(json!({ "sceneItems": items }))
            }
            "GetInputList" => Ok(json!({ "inputs": state.inputs })),
            "GetInputSettings" => {
                let uuid = input_uuid(&state, data).ok_or_else(|| not_found("input"))?;
                let kind = input_kind(&state, &uuid);
                Ok(json!({
                    "inputKind": kind,
                    "inputSettings": state.settings.get(&uuid).cloned().unwrap_or_default(),
                }))
            }
            "GetInputVolume" => {
                let uuid = input_uuid(&state, data).ok_or_else(|| not_found("input"))?;
                Ok(state
                    .volumes
                    .get(&uuid)
                    .cloned()
                    .unwrap_or_else(|| json!({ "inputVolumeMul": 1.0, "inputVolumeDb": 0.0 })))
            }
            "GetInputAudioMonitorType" => {
                let uuid = input_uuid(&state, data).ok_or_else(|| not_found("input"))?;
                let monitor_type = state
                    .monitor_types
                    .get(&uuid)
                    .cloned()
                    .unwrap_or_else(|| "OBS_MONITORING_TYPE_NONE".to_string());
                Ok(json!({ "monitorType": monitor_type }))
            }
            "GetCurrentProgramScene" => Ok(json!({
                "sceneUuid": state.current_scene,
                "currentProgramSceneUuid": state.current_scene,
            })),
            "SetSceneItemEnabled" => {
                let uuid = scene_uuid(&state, data).ok_or_else(|| not_found("scene"))?;
                let id = data["sceneItemId"].clone();
                let enabled = data["sceneItemEnabled"].clone();
                let item = state
                    .items
                    .get_mut(&uuid)
                    .and_then(|items| items.iter_mut().find(|item| item["sceneItemId"] == id))
                    .ok_or_else(|| not_found("scene item"))?;
                item["sceneItemEnabled"] = enabled;
                Ok(Value::Null)
            }
            "SetInputSettings" => {
                let uuid = input_uuid(&state, data).ok_or_else(|| not_found("input"))?;
                let settings = data["inputSettings"].as_object().cloned().unwrap_or_default();
                state.settings.entry(uuid).or_default().extend(settings);
                Ok(Value::Null)
            }
            "SetCurrentProgramScene" => {
                let uuid = scene_uuid(&state, data).ok_or_else(|| not_found("scene"))?;
                state.current_scene = Some(uuid);
                Ok(Value::Null)
            }
            _ => Err(Error::Request {
                code: 204,
                comment: Some(format!("Unknown request type: {}", request_type)),
            }),
        }
    }
}

fn not_found(what: &str) -> Error {
    Error::Request {
        code: 600,
        comment: Some(format!("No {} was found", what)),
    }
}

fn scene_uuid(state: &State, data: &Value) -> Option<String> {
    if let Some(uuid) = data["sceneUuid"].as_str() {
        return state.items.contains_key(uuid).then(|| uuid.to_string());
    }
    let name = data["sceneName"].as_str()?;
    state
        .scenes
        .iter()
        .find(|scene| scene["sceneName"] == name)
        .and_then(|scene| scene["sceneUuid"].as_str())
        .map(str::to_string)
}

fn input_uuid(state: &State, data: &Value) -> Option<String> {
    let input = state.inputs.iter().find(|input| match data["inputUuid"].as_str() {
        Some(uuid) => input["inputUuid"] == uuid,
        None => input["inputName"] == data["inputName"],
    })?;
    input["inputUuid"].as_str().map(str::to_string)
}

fn input_kind(state: &State, uuid: &str) -> Value {
    state
        .inputs
        .iter()
        .find(|input| input["inputUuid"] == uuid)
        .map(|input| input["inputKind"].clone())
        .unwrap_or(Value::Null)
}

#[async_trait]
impl Transport for FakeObs {
    async fn connect(
        &self,
        _address: &str,
        _password: Option<&str>,
        _params: &IdentificationParams,
    ) -> Result<()> {
        Ok(())
    }

    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value> {
        self.handle(request_type, &request_data.unwrap_or(Value::Null))
    }

    async fn call_batch(&self, requests: Vec<BatchRequest>) -> Result<Vec<RequestResponse>> {
        Ok(requests
            .into_iter()
            .map(|request| {
                let data = request.request_data.unwrap_or(Value::Null);
                match self.handle(&request.request_type, &data) {
                    Ok(response) => RequestResponse {
                        request_type: request.request_type,
                        request_status: RequestStatus {
                            result: true,
                            code: 100,
                            comment: None,
                        },
                        response_data: Some(response),
                    },
                    Err(err) => RequestResponse {
                        request_type: request.request_type,
                        request_status: RequestStatus {
                            result: false,
                            code: err.code().unwrap_or(0),
                            comment: Some(err.to_string()),
                        },
                        response_data: None,
                    },
                }
            })
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// A scene collection with game outputs, nested audio, debug overlays and hotkey triggers.
///
/// | scene                               | uuid             | items                                  |
/// |-------------------------------------|------------------|----------------------------------------|
/// | `Game A1 [[Game]]`                  | scene-a1         | 1 StarCraft (on), 2 Dota (off), 3 Webcam, 4 Overlay [[Debug]] (off) |
/// | `Game B2 [[Game]]`                  | scene-b2         | 1 StarCraft minimap (on), 2 Dota minimap (off) |
/// | `StarCraft Intro [[Game:StarCraft]]`| scene-sc-intro   | 1 Mic                                  |
/// | `Dota Intro [[Game:Dota]]`          | scene-dota-intro | 1 Shared Audio (scene), 2 Mic          |
/// | `Shared Audio`                      | scene-shared     | 1 Music, 2 Alerts, 3 Mic, 4 Dota Intro (scene) |
/// | `Hotkeys [[HotkeyTriggers]]`        | scene-hotkeys    | 1 Replay trigger, 2 Mute trigger, 3 Label |
pub fn studio() -> Arc<FakeObs> {
    let obs = FakeObs::new();

    obs.add_scene("Game A1 [[Game]]", "scene-a1");
    obs.add_scene("Game B2 [[Game]]", "scene-b2");
    obs.add_scene("StarCraft Intro [[Game:StarCraft]]", "scene-sc-intro");
    obs.add_scene("Dota Intro [[Game:Dota]]", "scene-dota-intro");
    obs.add_scene("Shared Audio", "scene-shared");
    obs.add_scene("Hotkeys [[HotkeyTriggers]]", "scene-hotkeys");

    obs.add_input("StarCraft Gameplay [[Game:StarCraft]]", "src-sc", CAPTURE, 0, json!({}));
    obs.add_input("Dota Gameplay [[Game:Dota]]", "src-dota", CAPTURE, 0, json!({}));
    obs.add_input("Webcam", "src-cam", WEBCAM, 2, json!({}));
    obs.add_input(
        "Overlay [[Debug]]",
        "src-overlay",
        BROWSER,
        2,
        json!({ "url": "http://localhost:8080/overlay?theme=dark&_simulate=1", "width": 1920 }),
    );
    obs.add_input("StarCraft Minimap [[Game:StarCraft]]", "src-sc-mini", CAPTURE, 0, json!({}));
    obs.add_input("Dota Minimap [[Game:Dota]]", "src-dota-mini", CAPTURE, 0, json!({}));
    obs.add_input("Mic", "src-mic", MIC, 2, json!({}));
    obs.add_input("Music", "src-music", MEDIA, 2, json!({ "local_file": "music.mp3" }));
    obs.add_input(
        "Alerts",
        "src-alerts",
        BROWSER,
        2,
        json!({ "url": "http://localhost:8080/alerts", "reroute_audio": true }),
    );
    obs.add_input("Replay [[Trigger:Replay]]", "src-t-replay", IMAGE, 0, json!({}));
    obs.add_input("Mute [[Trigger:Mute]]", "src-t-mute", IMAGE, 0, json!({}));
    obs.add_input("Label", "src-label", IMAGE, 0, json!({}));

    obs.add_item("scene-a1", 1, "src-sc", true);
    obs.add_item("scene-a1", 2, "src-dota", false);
    obs.add_item("scene-a1", 3, "src-cam", true);
    obs.add_item("scene-a1", 4, "src-overlay", false);

    obs.add_item("scene-b2", 1, "src-sc-mini", true);
    obs.add_item("scene-b2", 2, "src-dota-mini", false);

    obs.add_item("scene-sc-intro", 1, "src-mic", true);

    obs.add_scene_item("scene-dota-intro", 1, "scene-shared");
    obs.add_item("scene-dota-intro", 2, "src-mic", true);

    obs.add_item("scene-shared", 1, "src-music", true);
    obs.add_item("scene-shared", 2, "src-alerts", true);
    obs.add_item("scene-shared", 3, "src-mic", true);
    obs.add_scene_item("scene-shared", 4, "scene-dota-intro");

    obs.add_item("scene-hotkeys", 1, "src-t-replay", true);
    obs.add_item("scene-hotkeys", 2, "src-t-mute", true);
    obs.add_item("scene-hotkeys", 3, "src-label", true);

    obs.set_volume("src-mic", 0.5, -6.0);
    obs.set_monitor_type("src-mic", "OBS_MONITORING_TYPE_MONITOR_AND_OUTPUT");
    obs.set_current_scene("scene-sc-intro");

    obs
}
