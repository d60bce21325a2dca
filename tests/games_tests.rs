mod common;

use common::studio;
use obstools::{Error, Games, Scenes, Transport};
use std::sync::Arc;
use tokio::test;

fn games() -> (Arc<common::FakeObs>, Games) {
    let obs = studio();
    let transport = Arc::clone(&obs) as Arc<dyn Transport>;
    let games = Games::new(Arc::clone(&transport), Scenes::new(transport));
    (obs, games)
}

/// Test that game scenes are found and sorted by label
#[test]
async fn test_get_game_scenes() {
    let (_, games) = games();
    let scenes = games.get_game_scenes().await.unwrap();

    let labels: Vec<(&str, bool)> = scenes
        .iter()
        .map(|scene| (scene.label.as_str(), scene.primary))
        .collect();
    assert_eq!(labels, vec![("A1", true), ("B2", false)]);
    assert_eq!(scenes[0].scene.scene_items.len(), 4);
}

/// Test that games are listed once each, in scene order
#[test]
async fn test_get_games() {
    let (obs, games) = games();
    obs.add_scene("StarCraft Outro [[Game:StarCraft]]", "scene-sc-outro");

    assert_eq!(games.get_games().await.unwrap(), vec!["StarCraft", "Dota"]);
}

/// Test that the active game comes from the first visible primary scene item
#[test]
async fn test_get_active_game() {
    let (_, games) = games();
    assert_eq!(games.get_active_game().await.unwrap().as_deref(), Some("StarCraft"));
}

/// Test that a visible untagged item means no active game
#[test]
async fn test_get_active_game_untagged() {
    let obs = common::FakeObs::new();
    obs.add_scene("Main A1 [[Game]]", "scene-main");
    obs.add_input("Webcam", "src-cam", common::WEBCAM, 2, serde_json::json!({}));
    obs.add_item("scene-main", 1, "src-cam", true);
    let transport = Arc::clone(&obs) as Arc<dyn Transport>;
    let games = Games::new(Arc::clone(&transport), Scenes::new(transport));

    assert_eq!(games.get_active_game().await.unwrap(), None);
}

/// Test that a collection without a primary game scene is an error
#[test]
async fn test_get_active_game_without_primary() {
    let obs = common::FakeObs::new();
    obs.add_scene("Secondary B1 [[Game]]", "scene-b1");
    let transport = Arc::clone(&obs) as Arc<dyn Transport>;
    let games = Games::new(Arc::clone(&transport), Scenes::new(transport));

    match games.get_active_game().await {
        Err(Error::NotFound(_)) => (),
        other => panic!("Expected NotFound error, got {:?}", other),
    }
}

/// Test that switching games shows that game's sources and hides the others
#[test]
async fn test_switch_active_game() {
    let (obs, games) = games();

    games.switch_active_game("Dota").await.unwrap();

    assert_eq!(obs.item_enabled("scene-a1", 1), Some(false));
    assert_eq!(obs.item_enabled("scene-a1", 2), Some(true));
    assert_eq!(obs.item_enabled("scene-b2", 1), Some(false));
    assert_eq!(obs.item_enabled("scene-b2", 2), Some(true));

    // Untagged, debug and trigger items are left alone
    assert_eq!(obs.calls("SetSceneItemEnabled").len(), 4);
    assert_eq!(obs.item_enabled("scene-a1", 3), Some(true));
    assert_eq!(obs.item_enabled("scene-a1", 4), Some(false));

    assert_eq!(games.get_active_game().await.unwrap().as_deref(), Some("Dota"));
}

/// Test that switching to an unknown game changes nothing
#[test]
async fn test_switch_unknown_game() {
    let (obs, games) = games();

    match games.switch_active_game("Quake").await {
        Err(Error::NotFound(msg)) => assert!(msg.contains("Quake")),
        other => panic!("Expected NotFound error, got {:?}", other),
    }
    assert!(obs.calls("SetSceneItemEnabled").is_empty());
}

/// Test switching the program scene by code, ignoring case
#[test]
async fn test_switch_to_game_scene() {
    let (obs, games) = games();

    games.switch_to_game_scene("b2").await.unwrap();
    assert_eq!(obs.current_scene().as_deref(), Some("scene-b2"));

    match games.switch_to_game_scene("C3").await {
        Err(Error::NotFound(_)) => (),
        other => panic!("Expected NotFound error, got {:?}", other),
    }
    assert_eq!(obs.current_scene().as_deref(), Some("scene-b2"));
}
