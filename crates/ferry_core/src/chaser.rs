//! Post-import plugins.
//!
//! A chaser runs after the scene nodes exist. It sees the nodes of the top
//! imported prims and the full source path to node map, and must be able
//! to undo and redo whatever it changed.

use std::collections::BTreeMap;

use crate::job::ImportArgs;
use crate::scene::{AttrValue, NodeHandle, TargetScene};
use crate::usd::{PrimPredicate, ScenePath, Stage};

/// Name of the built-in [`SourcePathChaser`].
pub const SOURCE_PATH_CHASER: &str = "sourcePath";

/// What a chaser factory gets to look at.
pub struct ChaserContext<'a> {
    pub predicate: PrimPredicate,
    pub stage: &'a Stage,
    /// Nodes of the top imported prims, parallel to `source_paths`.
    pub added_nodes: &'a [NodeHandle],
    pub source_paths: &'a [ScenePath],
    pub args: &'a ImportArgs,
}

impl ChaserContext<'_> {
    /// Arguments given to the named chaser.
    pub fn chaser_args(&self, chaser: &str) -> Option<&BTreeMap<String, String>> {
        self.args.chaser_args.get(chaser)
    }
}

/// A reversible post-import step.
pub trait Chaser {
    /// Returns false to fail the import.
    fn post_import(&mut self, scene: &mut dyn TargetScene) -> bool;

    fn undo(&mut self, _scene: &mut dyn TargetScene) -> bool {
        true
    }

    fn redo(&mut self, _scene: &mut dyn TargetScene) -> bool {
        true
    }

    /// Receives every imported DAG node keyed by source path, before
    /// [`Chaser::post_import`].
    fn set_source_to_target_map(&mut self, _map: &BTreeMap<String, NodeHandle>) {}
}

pub type ChaserFactory = Box<dyn Fn(&ChaserContext<'_>) -> Option<Box<dyn Chaser>>>;

/// Chaser factories keyed by name.
#[derive(Default)]
pub struct ChaserRegistry {
    factories: BTreeMap<String, ChaserFactory>,
}

impl ChaserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SOURCE_PATH_CHASER, |context| {
            Some(Box::new(SourcePathChaser::from_context(context)) as Box<dyn Chaser>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ChaserContext<'_>) -> Option<Box<dyn Chaser>> + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the named chaser. `None` when the name is unknown or the
    /// factory declines.
    pub fn create(&self, name: &str, context: &ChaserContext<'_>) -> Option<Box<dyn Chaser>> {
        self.factories.get(name).and_then(|factory| factory(context))
    }
}

/// Stamps every imported DAG node with the path of the prim it came from.
///
/// The attribute defaults to [`SourcePathChaser::DEFAULT_ATTRIBUTE`] and can
/// be renamed with the chaser argument `attr`.
#[derive(Debug, Default)]
pub struct SourcePathChaser {
    attribute: String,
    map: BTreeMap<String, NodeHandle>,
    previous: Vec<(NodeHandle, Option<AttrValue>)>,
}

impl SourcePathChaser {
    pub const DEFAULT_ATTRIBUTE: &'static str = "usdSourcePath";

    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ..Self::default()
        }
    }

    pub fn from_context(context: &ChaserContext<'_>) -> Self {
        let attribute = context
            .chaser_args(SOURCE_PATH_CHASER)
            .and_then(|args| args.get("attr"))
            .map_or(Self::DEFAULT_ATTRIBUTE, String::as_str);
        Self::new(attribute)
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn stamp(&mut self, scene: &mut dyn TargetScene) -> bool {
        self.previous.clear();
        for (path, node) in &self.map {
            let previous = scene.attribute(*node, &self.attribute).cloned();
            if let Err(e) = scene.set_attribute(*node, &self.attribute, AttrValue::String(path.clone())) {
                log::error!("Failed to stamp '{path}': {e}");
                return false;
            }
            self.previous.push((*node, previous));
        }
        true
    }
}

impl Chaser for SourcePathChaser {
    fn post_import(&mut self, scene: &mut dyn TargetScene) -> bool {
        self.stamp(scene)
    }

    fn undo(&mut self, scene: &mut dyn TargetScene) -> bool {
        let mut ok = true;
        for (node, previous) in self.previous.iter().rev() {
            let result = match previous {
                Some(value) => scene.set_attribute(*node, &self.attribute, value.clone()),
                None => scene.remove_attribute(*node, &self.attribute).map(|_| ()),
            };
            if let Err(e) = result {
                log::error!("Failed to remove '{}' from {node:?}: {e}", self.attribute);
                ok = false;
            }
        }
        ok
    }

    fn redo(&mut self, scene: &mut dyn TargetScene) -> bool {
        self.stamp(scene)
    }

    fn set_source_to_target_map(&mut self, map: &BTreeMap<String, NodeHandle>) {
        self.map = map.clone();
    }
}
