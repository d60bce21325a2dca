mod common;

use common::studio;
use obstools::{DebugMode, Scenes, Transport};
use serde_json::json;
use std::sync::Arc;
use tokio::test;

fn debug_mode() -> (Arc<common::FakeObs>, DebugMode) {
    let obs = studio();
    let transport = Arc::clone(&obs) as Arc<dyn Transport>;
    let debug = DebugMode::new(Arc::clone(&transport), Scenes::new(transport));
    (obs, debug)
}

/// Test that debug scenes keep only their debug items
#[test]
async fn test_get_debug_scenes() {
    let (_, debug) = debug_mode();
    let scenes = debug.get_debug_scenes().await.unwrap();

    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].scene.scene_uuid, "scene-a1");
    assert_eq!(scenes[0].scene_items.len(), 1);
    assert_eq!(scenes[0].scene_items[0].source_name, "Overlay [[Debug]]");

    let items = debug.get_debug_scene_items().await.unwrap();
    assert_eq!(items.len(), 1);
}

/// Test turning debug mode on and off again
#[test]
async fn test_set_debug_mode() {
    let (obs, debug) = debug_mode();
    assert!(!debug.get_debug_mode().await.unwrap());

    debug.set_debug_mode(true).await.unwrap();

    assert!(debug.get_debug_mode().await.unwrap());
    assert_eq!(obs.item_enabled("scene-a1", 4), Some(true));
    let settings = obs.input_settings("src-overlay");
    assert_eq!(settings["url"], "http://localhost:8080/overlay?theme=dark&simulate=1");
    // Other settings survive the rewrite
    assert_eq!(settings["width"], 1920);
    // Browser sources without simulation support are not touched
    assert_eq!(obs.input_settings("src-alerts")["url"], "http://localhost:8080/alerts");

    debug.set_debug_mode(false).await.unwrap();

    assert!(!debug.get_debug_mode().await.unwrap());
    assert_eq!(obs.item_enabled("scene-a1", 4), Some(false));
    assert_eq!(
        obs.input_settings("src-overlay")["url"],
        "http://localhost:8080/overlay?theme=dark&_simulate=1"
    );
}

/// Test that a browser source already in the requested state is not updated
#[test]
async fn test_browser_source_simulation_unchanged() {
    let (obs, debug) = debug_mode();

    debug.set_browser_source_simulation(false).await.unwrap();

    assert!(obs.calls("SetInputSettings").is_empty());
}

/// Test that browser sources with unusable urls are skipped
#[test]
async fn test_browser_source_simulation_skips_invalid_url() {
    let (obs, debug) = debug_mode();
    obs.add_input(
        "Broken [[Debug]]",
        "src-broken",
        common::BROWSER,
        2,
        json!({ "url": "not a url" }),
    );
    obs.add_item("scene-b2", 3, "src-broken", false);

    debug.set_browser_source_simulation(true).await.unwrap();

    let updates = obs.calls("SetInputSettings");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["inputName"], "Overlay [[Debug]]");
    assert_eq!(obs.input_settings("src-broken")["url"], "not a url");
}
