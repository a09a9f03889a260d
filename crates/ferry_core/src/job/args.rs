//! Import configuration: what to import and how.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ferry_math::TimeInterval;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Frames per scene time unit over source time codes per second.
pub fn time_sample_multiplier(scene_fps: f64, time_codes_per_second: f64) -> f64 {
    scene_fps / time_codes_per_second
}

/// Variant selections keyed by variant set name.
pub type VariantSelections = BTreeMap<String, String>;

/// What to import.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportData {
    pub filename: PathBuf,
    /// Prim to import; empty imports the default prim.
    pub root_prim_path: String,
    /// Applied to the root prim, and to the stage's model prim through the
    /// session layer before composition.
    pub root_variant_selections: VariantSelections,
    /// Extra selections keyed by prim path.
    pub prim_variant_selections: BTreeMap<String, VariantSelections>,
    /// Prim paths the stage is restricted to; empty loads everything.
    pub population_mask: Vec<String>,
}

impl ImportData {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    pub fn with_root_prim_path(mut self, path: impl Into<String>) -> Self {
        self.root_prim_path = path.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filename.as_os_str().is_empty()
    }
}

/// How to import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportArgs {
    /// Share prototype content between instances instead of copying it.
    pub import_instances: bool,
    /// Frame range in source time codes. `None`, or an infinite range, uses
    /// the stage's authored range.
    pub time_interval: Option<TimeInterval>,
    /// Keep the timeline expanded to the imported range after the import.
    pub preserve_timeline: bool,
    /// Chasers to run after the import, in order.
    pub chaser_names: Vec<String>,
    /// Per-chaser arguments keyed by chaser name.
    pub chaser_args: BTreeMap<String, BTreeMap<String, String>>,
    /// Create a `usdStage` node pointing at the imported file.
    pub use_as_animation_cache: bool,
    pub apply_euler_filter: bool,
}

impl Default for ImportArgs {
    fn default() -> Self {
        Self {
            import_instances: true,
            time_interval: None,
            preserve_timeline: false,
            chaser_names: Vec::new(),
            chaser_args: BTreeMap::new(),
            use_as_animation_cache: false,
            apply_euler_filter: false,
        }
    }
}

impl ImportArgs {
    pub fn from_json_str(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String, ImportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
