//! Import errors and warnings.

use thiserror::Error;

use crate::scene::SceneError;
use crate::usd::{ScenePath, StageError};

/// Conditions that abort an import, undo or redo.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Import data has no file name")]
    EmptyImportData,

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("Invalid frame range: min {min} is greater than max {max}")]
    InvalidFrameRange { min: f64, max: f64 },

    #[error("No root prim: the stage has no default prim and no root path was given")]
    NoDefaultPrim,

    #[error("Nothing to import under '{0}'")]
    EmptyRange(ScenePath),

    #[error("Chaser '{0}' failed")]
    ChaserFailed(String),

    #[error("Chaser '{0}' failed to undo")]
    ChaserUndo(String),

    #[error("Chaser '{0}' failed to redo")]
    ChaserRedo(String),

    #[error("Invalid import arguments: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to read import arguments: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems an import reports and works around.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportWarning {
    #[error("Root prim '{0}' not found; importing the whole stage")]
    UnresolvedRootPrim(String),

    #[error("Prim '{path}' has no variant set '{set}'")]
    InvalidVariantSet { path: ScenePath, set: String },

    #[error("Variant set '{set}' on '{path}' has no variant '{selection}'")]
    InvalidVariantSelection {
        path: ScenePath,
        set: String,
        selection: String,
    },

    #[error("Cannot select variants on '{0}': no such prim")]
    InvalidVariantPrim(String),

    #[error("Ignoring invalid population mask path '{0}'")]
    InvalidMaskPath(String),

    #[error("Stage metersPerUnit is {stage} but the scene uses {scene}; values are imported as-is")]
    DistanceUnit { stage: f64, scene: f64 },

    #[error("Could not create the animation cache node: {0}")]
    AnimationCacheNode(String),

    #[error("No chaser registered as '{0}'")]
    MissingChaser(String),
}
