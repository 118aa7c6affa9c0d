//! Environment snapshot model and snapshot sources.
//!
//! A snapshot is a point-in-time observation of the external application,
//! produced by the capture subsystem and consumed read-only by the engine.
//! The engine never caches a snapshot across steps; it re-reads from its
//! `SnapshotSource` between steps so environment changes are observed.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

// =============================================================================
// Snapshot data model
// =============================================================================

/// Screen-space rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    /// Center point of the rectangle.
    pub fn center(&self) -> (i64, i64) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Observed client window state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientState {
    pub focused: bool,
    pub bounds: Rect,
}

/// One detected UI element and its reported state string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiElement {
    pub id: String,
    pub state: String,
}

/// Observed UI surface state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiState {
    pub hover_text: String,
    pub open_interface: String,
    pub cursor_state: String,
    pub elements: Vec<UiElement>,
}

/// One point-in-time observation of the external application.
///
/// All fields are serde-defaulted so partial snapshot files still parse;
/// `stale = true` tells the engine the observation carries no strong
/// guarantee and hover/occlusion strictness is loosened accordingly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub client: ClientState,
    pub ui: UiState,
    pub cues: serde_json::Map<String, serde_json::Value>,
    pub chat: Vec<String>,
    pub stale: bool,
}

impl Snapshot {
    /// Look up a named cue value.
    pub fn cue(&self, name: &str) -> Option<&serde_json::Value> {
        self.cues.get(name)
    }

    /// Find a UI element by id.
    pub fn element(&self, id: &str) -> Option<&UiElement> {
        self.ui.elements.iter().find(|e| e.id == id)
    }
}

// =============================================================================
// Snapshot sources
// =============================================================================

/// Source of environment snapshots.
///
/// The engine calls `current()` between steps instead of caching; a source
/// returning `None` means no observation is available right now.
pub trait SnapshotSource: Send {
    fn current(&self) -> Option<Snapshot>;
}

/// Polls a JSON file on every call.
///
/// This matches the externally-updated snapshot file contract: the capture
/// subsystem rewrites the file, the engine re-reads it. Absent or unparsable
/// files yield `None` rather than an error.
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSource for FileSnapshotSource {
    fn current(&self) -> Option<Snapshot> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Snapshot file unparsable");
                None
            }
        }
    }
}

/// Feeds a scripted sequence of snapshots, then holds the last one.
///
/// Used by tests and dry runs to simulate environment evolution without a
/// live capture subsystem.
pub struct ScriptedSnapshotSource {
    script: Mutex<VecDeque<Option<Snapshot>>>,
    last: Mutex<Option<Snapshot>>,
}

impl ScriptedSnapshotSource {
    pub fn new(script: Vec<Option<Snapshot>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
        }
    }

    /// Convenience constructor for a source that always returns `snapshot`.
    pub fn fixed(snapshot: Snapshot) -> Self {
        Self::new(vec![Some(snapshot)])
    }
}

impl SnapshotSource for ScriptedSnapshotSource {
    fn current(&self) -> Option<Snapshot> {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(next) = script.pop_front() {
            *last = next.clone();
            next
        } else {
            last.clone()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn focused_snapshot() -> Snapshot {
        Snapshot {
            client: ClientState {
                focused: true,
                bounds: Rect { x: 0, y: 0, width: 800, height: 600 },
            },
            ..Snapshot::default()
        }
    }

    // ---- Rect ----

    #[test]
    fn test_rect_center() {
        let r = Rect { x: 10, y: 20, width: 100, height: 50 };
        assert_eq!(r.center(), (60, 45));
    }

    #[test]
    fn test_rect_center_zero_size() {
        let r = Rect { x: 5, y: 5, width: 0, height: 0 };
        assert_eq!(r.center(), (5, 5));
    }

    // ---- Snapshot parsing ----

    #[test]
    fn test_snapshot_parses_partial_json() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"client":{"focused":true}}"#).unwrap();
        assert!(snapshot.client.focused);
        assert_eq!(snapshot.ui.hover_text, "");
        assert!(snapshot.cues.is_empty());
        assert!(!snapshot.stale);
    }

    #[test]
    fn test_snapshot_parses_empty_object() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snapshot, Snapshot::default());
    }

    #[test]
    fn test_snapshot_full_round_trip() {
        let mut cues = serde_json::Map::new();
        cues.insert("modal_state".into(), serde_json::json!("none"));
        let snapshot = Snapshot {
            client: ClientState {
                focused: true,
                bounds: Rect { x: 1, y: 2, width: 3, height: 4 },
            },
            ui: UiState {
                hover_text: "Chop down Tree".into(),
                open_interface: "inventory".into(),
                cursor_state: "pointer".into(),
                elements: vec![UiElement { id: "slot_1".into(), state: "visible".into() }],
            },
            cues,
            chat: vec!["Welcome".into()],
            stale: false,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let rt: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, rt);
    }

    #[test]
    fn test_snapshot_cue_lookup() {
        let mut cues = serde_json::Map::new();
        cues.insert("animation_state".into(), serde_json::json!("active"));
        let snapshot = Snapshot { cues, ..Snapshot::default() };
        assert_eq!(snapshot.cue("animation_state"), Some(&serde_json::json!("active")));
        assert!(snapshot.cue("missing").is_none());
    }

    #[test]
    fn test_snapshot_element_lookup() {
        let snapshot = Snapshot {
            ui: UiState {
                elements: vec![
                    UiElement { id: "a".into(), state: "visible".into() },
                    UiElement { id: "b".into(), state: "occluded".into() },
                ],
                ..UiState::default()
            },
            ..Snapshot::default()
        };
        assert_eq!(snapshot.element("b").unwrap().state, "occluded");
        assert!(snapshot.element("c").is_none());
    }

    // ---- FileSnapshotSource ----

    #[test]
    fn test_file_source_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"client":{"focused":true},"stale":true}"#).unwrap();

        let source = FileSnapshotSource::new(&path);
        let snapshot = source.current().unwrap();
        assert!(snapshot.client.focused);
        assert!(snapshot.stale);
    }

    #[test]
    fn test_file_source_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSnapshotSource::new(dir.path().join("nope.json"));
        assert!(source.current().is_none());
    }

    #[test]
    fn test_file_source_unparsable_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "not json").unwrap();
        let source = FileSnapshotSource::new(&path);
        assert!(source.current().is_none());
    }

    #[test]
    fn test_file_source_observes_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"client":{"focused":false}}"#).unwrap();
        let source = FileSnapshotSource::new(&path);
        assert!(!source.current().unwrap().client.focused);

        std::fs::write(&path, r#"{"client":{"focused":true}}"#).unwrap();
        assert!(source.current().unwrap().client.focused);
    }

    // ---- ScriptedSnapshotSource ----

    #[test]
    fn test_scripted_source_plays_sequence() {
        let a = focused_snapshot();
        let mut b = focused_snapshot();
        b.ui.open_interface = "bank".into();

        let source = ScriptedSnapshotSource::new(vec![Some(a.clone()), Some(b.clone())]);
        assert_eq!(source.current().unwrap(), a);
        assert_eq!(source.current().unwrap(), b);
        // Exhausted script holds the last snapshot.
        assert_eq!(source.current().unwrap(), b);
        assert_eq!(source.current().unwrap(), b);
    }

    #[test]
    fn test_scripted_source_fixed() {
        let snapshot = focused_snapshot();
        let source = ScriptedSnapshotSource::fixed(snapshot.clone());
        for _ in 0..5 {
            assert_eq!(source.current().unwrap(), snapshot);
        }
    }

    #[test]
    fn test_scripted_source_none_entries() {
        let source = ScriptedSnapshotSource::new(vec![None, Some(focused_snapshot())]);
        assert!(source.current().is_none());
        assert!(source.current().is_some());
    }
}
