//! Prim readers: per-type converters from stage prims to scene nodes.
//!
//! A [`PrimReaderRegistry`] maps schema type names to factories. Lookup falls
//! back to a generic factory, and a factory may decline a prim by returning
//! `None`. Prims without a reader produce no node and no registry entry.
//!
//! Built-in readers:
//!
//! - `Xform`, `Scope` and typeless prims: a `transform` node
//! - `Mesh`: a `transform` node with a `mesh` shape child
//! - `Shader` with `info:id = "UsdUVTexture"`: a `file` dependency node

mod mesh;
mod texture;
mod transform;
pub mod xformable;

use std::collections::{BTreeMap, HashMap};

use crate::context::ReaderContext;
use crate::job::ImportArgs;
use crate::scene::{NodeHandle, SceneError, TargetScene};
use crate::usd::{Prim, ScenePath};

pub use mesh::MeshReader;
pub use texture::TextureReader;
pub use transform::TransformReader;

/// What a reader gets to look at: the prim and the import arguments.
#[derive(Clone, Copy, Debug)]
pub struct ReaderArgs<'a> {
    pub prim: Prim<'a>,
    pub args: &'a ImportArgs,
}

impl<'a> ReaderArgs<'a> {
    pub fn new(prim: Prim<'a>, args: &'a ImportArgs) -> Self {
        Self { prim, args }
    }

    pub fn path(&self) -> &'a ScenePath {
        self.prim.path()
    }
}

/// Converts one prim into scene nodes.
///
/// Readers do not fail. Scene errors are logged and the prim is left
/// partially or wholly unconverted.
pub trait PrimReader {
    fn read(&mut self, args: &ReaderArgs<'_>, context: &mut ReaderContext<'_>, scene: &mut dyn TargetScene);

    /// Whether [`PrimReader::post_read_subtree`] must run once the prim's
    /// descendants have been read.
    fn has_post_read_subtree(&self) -> bool {
        false
    }

    fn post_read_subtree(&mut self, _args: &ReaderArgs<'_>, _context: &mut ReaderContext<'_>, _scene: &mut dyn TargetScene) {}
}

/// Reads the attributes of one applied API schema onto already created nodes.
pub trait SchemaReader {
    fn read(&self, args: &ReaderArgs<'_>, context: &mut ReaderContext<'_>, scene: &mut dyn TargetScene);
}

/// Builds a reader for a prim, or declines it.
pub type ReaderFactory = Box<dyn Fn(&ReaderArgs<'_>) -> Option<Box<dyn PrimReader>>>;

/// Type name to reader factory dispatch.
#[derive(Default)]
pub struct PrimReaderRegistry {
    factories: HashMap<String, ReaderFactory>,
    fallback: Option<ReaderFactory>,
    schema_readers: BTreeMap<String, Box<dyn SchemaReader>>,
}

impl PrimReaderRegistry {
    /// An empty registry: nothing is read.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in readers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("Xform", |_| Some(Box::new(TransformReader) as Box<dyn PrimReader>));
        registry.register("Scope", |_| Some(Box::new(TransformReader) as Box<dyn PrimReader>));
        registry.register("Mesh", |_| Some(Box::new(MeshReader) as Box<dyn PrimReader>));
        registry.register("Shader", |args| {
            TextureReader::accepts(&args.prim).then(|| Box::new(TextureReader) as Box<dyn PrimReader>)
        });
        registry.set_fallback(|args| {
            (args.prim.type_name().is_none() || xformable::has_xform_ops(&args.prim))
                .then(|| Box::new(TransformReader) as Box<dyn PrimReader>)
        });
        registry
    }

    /// Registers (or replaces) the factory for a schema type name.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&ReaderArgs<'_>) -> Option<Box<dyn PrimReader>> + 'static,
    {
        if self.factories.insert(type_name.to_string(), Box::new(factory)).is_some() {
            log::debug!("Replaced prim reader for '{type_name}'");
        }
    }

    /// Factory used for types without a registered factory.
    pub fn set_fallback<F>(&mut self, factory: F)
    where
        F: Fn(&ReaderArgs<'_>) -> Option<Box<dyn PrimReader>> + 'static,
    {
        self.fallback = Some(Box::new(factory));
    }

    pub fn clear_fallback(&mut self) {
        self.fallback = None;
    }

    pub fn register_schema_reader(&mut self, schema: &str, reader: impl SchemaReader + 'static) {
        self.schema_readers.insert(schema.to_string(), Box::new(reader));
    }

    pub fn has_reader_for(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// The reader for a prim: its type's factory, or the fallback when the
    /// type has none.
    pub fn find_or_fallback(&self, args: &ReaderArgs<'_>) -> Option<Box<dyn PrimReader>> {
        let factory = args
            .prim
            .type_name()
            .and_then(|t| self.factories.get(t))
            .or(self.fallback.as_ref())?;
        factory(args)
    }

    pub fn schema_reader(&self, schema: &str) -> Option<&dyn SchemaReader> {
        self.schema_readers.get(schema).map(|r| r.as_ref())
    }
}

/// The scene node a new prim node goes under: the node of the nearest
/// registered ancestor, or the world.
pub fn parent_node(args: &ReaderArgs<'_>, context: &ReaderContext<'_>, scene: &dyn TargetScene) -> NodeHandle {
    args.path()
        .parent()
        .and_then(|parent| context.node(&parent, true))
        .unwrap_or_else(|| scene.world())
}

/// Logs a scene failure for the prim being read.
pub(crate) fn log_scene_error(args: &ReaderArgs<'_>, error: &SceneError) {
    log::error!("Failed to read '{}': {error}", args.path());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReadCache;
    use crate::registry::NodeRegistry;
    use crate::scene::DagScene;
    use crate::usd::Stage;

    const SCENE: &str = r#"#usda 1.0
def Xform "World"
{
    def Mesh "Cube"
    {
    }
    def "Group"
    {
    }
    def Camera "Cam"
    {
    }
    def Camera "Moved"
    {
        double3 xformOp:translate = (1, 0, 0)
        uniform token[] xformOpOrder = ["xformOp:translate"]
    }
    def Shader "Tex"
    {
        uniform token info:id = "UsdUVTexture"
    }
    def Shader "Surface"
    {
        uniform token info:id = "UsdPreviewSurface"
    }
}
"#;

    fn reader_for(stage: &Stage, path: &str, args: &ImportArgs) -> bool {
        let registry = PrimReaderRegistry::with_builtins();
        let prim = stage.prim_at(&ScenePath::parse(path).unwrap()).unwrap();
        registry.find_or_fallback(&ReaderArgs::new(prim, args)).is_some()
    }

    #[test]
    fn test_builtin_dispatch() {
        let stage = Stage::from_usda(SCENE).unwrap();
        let args = ImportArgs::default();
        assert!(reader_for(&stage, "/World", &args));
        assert!(reader_for(&stage, "/World/Cube", &args));
        assert!(reader_for(&stage, "/World/Group", &args));
        assert!(reader_for(&stage, "/World/Moved", &args));
        assert!(reader_for(&stage, "/World/Tex", &args));
        assert!(!reader_for(&stage, "/World/Cam", &args));
        assert!(!reader_for(&stage, "/World/Surface", &args));
    }

    #[test]
    fn test_empty_registry_reads_nothing() {
        let stage = Stage::from_usda(SCENE).unwrap();
        let args = ImportArgs::default();
        let registry = PrimReaderRegistry::new();
        let prim = stage.prim_at(&ScenePath::parse("/World").unwrap()).unwrap();
        assert!(registry.find_or_fallback(&ReaderArgs::new(prim, &args)).is_none());
    }

    #[test]
    fn test_register_overrides_builtin() {
        struct Marker;
        impl PrimReader for Marker {
            fn read(&mut self, args: &ReaderArgs<'_>, context: &mut ReaderContext<'_>, scene: &mut dyn TargetScene) {
                let node = scene.create_dependency_node("marker", args.prim.name()).unwrap();
                context.register_node(args.path().as_str(), node);
            }
        }

        let stage = Stage::from_usda(SCENE).unwrap();
        let args = ImportArgs::default();
        let mut readers = PrimReaderRegistry::with_builtins();
        readers.register("Camera", |_| Some(Box::new(Marker) as Box<dyn PrimReader>));
        assert!(readers.has_reader_for("Camera"));

        let mut scene = DagScene::new();
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        let mut context = ReaderContext::new(&mut registry, &mut cache);
        let prim = stage.prim_at(&ScenePath::parse("/World/Cam").unwrap()).unwrap();
        let reader_args = ReaderArgs::new(prim, &args);
        let mut reader = readers.find_or_fallback(&reader_args).unwrap();
        reader.read(&reader_args, &mut context, &mut scene);

        let node = registry.get("/World/Cam").unwrap();
        assert_eq!(scene.node_type(node), Some("marker"));
        assert!(!scene.is_dag_node(node));
    }

    #[test]
    fn test_parent_node_falls_back_to_world() {
        let stage = Stage::from_usda(SCENE).unwrap();
        let args = ImportArgs::default();
        let scene = DagScene::new();
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        let prim = stage.prim_at(&ScenePath::parse("/World/Cube").unwrap()).unwrap();
        let reader_args = ReaderArgs::new(prim, &args);

        let context = ReaderContext::new(&mut registry, &mut cache);
        assert_eq!(parent_node(&reader_args, &context, &scene), scene.world());
        drop(context);

        registry.register("/World", NodeHandle::from_raw(7));
        let context = ReaderContext::new(&mut registry, &mut cache);
        assert_eq!(parent_node(&reader_args, &context, &scene), NodeHandle::from_raw(7));
    }
}
