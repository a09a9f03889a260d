//! Layers: a parsed USDA file, and the session layer that holds variant
//! selections made while importing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::parser::parse_usda;
use super::types::{LayerMetadata, PrimSpec};
use super::{ScenePath, StageError};

/// A parsed scene description file.
#[derive(Clone, Debug, Default)]
pub struct Layer {
    pub identifier: String,
    /// Location on disk, when the layer came from a file.
    pub real_path: Option<PathBuf>,
    pub metadata: LayerMetadata,
    pub root_prims: Vec<PrimSpec>,
}

impl Layer {
    /// Reads and parses a `.usda` file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StageError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| StageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut layer = Self::from_string(&path.display().to_string(), &content)?;
        layer.real_path = Some(path.to_path_buf());
        log::info!("Opened layer '{}' ({} root prims)", layer.identifier, layer.root_prims.len());
        Ok(layer)
    }

    /// Parses a layer from text. The identifier is used in messages only.
    pub fn from_string(identifier: &str, content: &str) -> Result<Self, StageError> {
        let parsed = parse_usda(content).map_err(|source| StageError::Parse {
            identifier: identifier.to_string(),
            source,
        })?;
        Ok(Self {
            identifier: identifier.to_string(),
            real_path: None,
            metadata: parsed.metadata,
            root_prims: parsed.root_prims,
        })
    }

    /// The prim spec authored directly at `path`, ignoring composition.
    pub fn prim_spec_at(&self, path: &ScenePath) -> Option<&PrimSpec> {
        let mut components = path.components();
        let first = components.next()?;
        let mut spec = self.root_prims.iter().find(|p| p.name == first)?;
        for name in components {
            spec = spec.child(name)?;
        }
        Some(spec)
    }

    /// Path of the `defaultPrim`, when it is authored and valid.
    pub fn default_prim_path(&self) -> Option<ScenePath> {
        let name = self.metadata.default_prim.as_deref()?;
        ScenePath::parse(&format!("/{name}")).ok()
    }

    /// Name used to address the root model: the default prim, or the first
    /// root prim.
    pub fn model_name(&self) -> Option<&str> {
        self.metadata
            .default_prim
            .as_deref()
            .or_else(|| self.root_prims.first().map(|p| p.name.as_str()))
    }

    /// Resolves an asset path relative to this layer's directory.
    pub fn resolve_asset(&self, asset: &str) -> PathBuf {
        let asset_path = Path::new(asset);
        if asset_path.is_absolute() {
            return asset_path.to_path_buf();
        }
        match self.real_path.as_deref().and_then(Path::parent) {
            Some(dir) => dir.join(asset_path),
            None => asset_path.to_path_buf(),
        }
    }
}

/// Stage-level overrides. Only variant selections are recorded here; the
/// persistent layers are never edited.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionLayer {
    selections: BTreeMap<ScenePath, BTreeMap<String, String>>,
}

impl SessionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session layer selecting `selections` on the root model prim.
    pub fn for_variant_selections<'a>(
        model_name: Option<&str>,
        selections: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Self {
        let mut session = Self::new();
        let Some(model_path) = model_name.and_then(|name| ScenePath::parse(&format!("/{name}")).ok()) else {
            return session;
        };
        for (set, selection) in selections {
            session.set_selection(&model_path, set, selection);
        }
        session
    }

    pub fn set_selection(&mut self, path: &ScenePath, set: &str, selection: &str) {
        self.selections
            .entry(path.clone())
            .or_default()
            .insert(set.to_string(), selection.to_string());
    }

    pub fn selection(&self, path: &ScenePath, set: &str) -> Option<&str> {
        self.selections.get(path)?.get(set).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}
