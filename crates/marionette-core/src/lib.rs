pub mod config;
pub mod error;
pub mod logging;
pub mod snapshot;
pub mod types;

pub use config::{HumanizationProfile, SampleSpec};
pub use error::{MarionetteError, Result};
pub use snapshot::{
    ClientState, FileSnapshotSource, Rect, ScriptedSnapshotSource, Snapshot, SnapshotSource,
    UiElement, UiState,
};
pub use types::*;
