//! Tag parsing for scene and source names.
//!
//! A tag is a bracketed annotation embedded in a name, either `[[Key]]` or
//! `[[Key:Value]]`. A name such as `"Gameplay [[Game:StarCraft]]"` carries
//! the tag `Game` with value `StarCraft`. Unbalanced or nested brackets are
//! simply not matched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Tag marking sources that are only visible in debug mode
pub const TAG_DEBUG_SOURCE: &str = "Debug";

/// Tag marking game scenes and game-specific sources
pub const TAG_GAME: &str = "Game";

/// Tag marking the scene that holds hotkey trigger sources
pub const TAG_HOTKEY_TRIGGERS: &str = "HotkeyTriggers";

/// Tag naming a trigger or toggle source
pub const TAG_TRIGGER: &str = "Trigger";

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^:]+?)(:(.+?))?\]\]").expect("tag pattern is valid"));

/// A single `[[Key]]` or `[[Key:Value]]` annotation.
///
/// The empty tag (both fields `None`) stands for "no tag found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: Option<String>,
    pub value: Option<String>,
}

impl Tag {
    /// Create a tag with a key and an optional value
    pub fn new(key: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.map(str::to_string),
        }
    }

    /// Whether this is the empty "no tag" value
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.value.is_none()
    }

    /// Whether the key equals `key`, ignoring case
    pub fn key_is(&self, key: &str) -> bool {
        matches_item(Some(key), self.key.as_deref(), false)
    }
}

/// Compares a query item against a tag item, ignoring case.
///
/// When `optional` is set, a missing query item matches anything.
fn matches_item(query: Option<&str>, item: Option<&str>, optional: bool) -> bool {
    match (query, item) {
        (None, _) if optional => true,
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        (None, None) => true,
        _ => false,
    }
}

/// All tags in `name`, in order of appearance
pub fn extract_tags(name: &str) -> Vec<Tag> {
    TAG_PATTERN
        .captures_iter(name)
        .map(|caps| Tag {
            key: caps.get(1).map(|m| m.as_str().to_string()),
            value: caps.get(3).map(|m| m.as_str().to_string()),
        })
        .collect()
}

/// The first tag in `name`, or the first tag whose key matches `key`.
///
/// Returns the empty tag if nothing matches.
pub fn extract_tag(name: &str, key: Option<&str>) -> Tag {
    let tags = extract_tags(name);
    match key.filter(|key| !key.is_empty()) {
        Some(key) => tags.into_iter().find(|tag| tag.key_is(key)),
        None => tags.into_iter().next(),
    }
    .unwrap_or_default()
}

/// Whether `name` carries a tag with the given key, and value if one is given
pub fn has_tag(name: &str, key: &str, value: Option<&str>) -> bool {
    extract_tags(name).iter().any(|tag| {
        matches_item(Some(key), tag.key.as_deref(), false)
            && matches_item(value, tag.value.as_deref(), true)
    })
}
