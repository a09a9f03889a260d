use super::{log_scene_error, PrimReader, ReaderArgs};
use crate::context::ReaderContext;
use crate::scene::{AttrValue, NodeHandle, SceneError, TargetScene};
use crate::usd::Prim;

const UV_TEXTURE_ID: &str = "UsdUVTexture";

/// Reads `UsdUVTexture` shaders as `file` dependency nodes.
///
/// The texture path is resolved against the root layer. Its content hash is
/// computed through the import's read cache, so a texture shared by many
/// shaders is hashed once per import.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextureReader;

impl TextureReader {
    pub fn accepts(prim: &Prim<'_>) -> bool {
        prim.attribute("info:id")
            .and_then(|a| a.value_at(None))
            .is_some_and(|id| id.as_str() == Some(UV_TEXTURE_ID))
    }
}

impl PrimReader for TextureReader {
    fn read(&mut self, args: &ReaderArgs<'_>, context: &mut ReaderContext<'_>, scene: &mut dyn TargetScene) {
        let node = match scene.create_dependency_node("file", args.prim.name()) {
            Ok(node) => node,
            Err(e) => {
                log_scene_error(args, &e);
                return;
            }
        };
        context.register_node(args.path().as_str(), node);
        if let Err(e) = read_file_attributes(args, context, scene, node) {
            log_scene_error(args, &e);
        }
    }
}

fn read_file_attributes(
    args: &ReaderArgs<'_>,
    context: &mut ReaderContext<'_>,
    scene: &mut dyn TargetScene,
    node: NodeHandle,
) -> Result<(), SceneError> {
    let prim = args.prim;
    let asset = prim.attribute("inputs:file").and_then(|a| a.value_at(None));
    let Some(asset) = asset.as_ref().and_then(|v| v.as_str()) else {
        log::warn!("Texture '{}' has no inputs:file", prim.path());
        return Ok(());
    };
    let resolved = prim.stage().root_layer().resolve_asset(asset);
    scene.set_attribute(node, "fileTextureName", AttrValue::String(resolved.display().to_string()))?;
    if let Some(hash) = context.cache().file_hash(&resolved) {
        scene.set_attribute(node, "fileTextureHash", AttrValue::String(hash))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReadCache;
    use crate::job::ImportArgs;
    use crate::registry::NodeRegistry;
    use crate::scene::{DagScene, DeleteRecord, InsertPosition, Timeline};
    use crate::usd::{ScenePath, Stage};

    /// A scene that refuses every attribute edit.
    struct ReadOnlyAttributes(DagScene);

    impl TargetScene for ReadOnlyAttributes {
        fn world(&self) -> NodeHandle {
            self.0.world()
        }
        fn create_node(&mut self, node_type: &str, name: &str, parent: Option<NodeHandle>) -> Result<NodeHandle, SceneError> {
            self.0.create_node(node_type, name, parent)
        }
        fn create_dependency_node(&mut self, node_type: &str, name: &str) -> Result<NodeHandle, SceneError> {
            self.0.create_dependency_node(node_type, name)
        }
        fn is_alive(&self, node: NodeHandle) -> bool {
            self.0.is_alive(node)
        }
        fn is_dag_node(&self, node: NodeHandle) -> bool {
            self.0.is_dag_node(node)
        }
        fn node_name(&self, node: NodeHandle) -> Option<&str> {
            self.0.node_name(node)
        }
        fn node_type(&self, node: NodeHandle) -> Option<&str> {
            self.0.node_type(node)
        }
        fn add_child(&mut self, parent: NodeHandle, child: NodeHandle, position: InsertPosition, keep: bool) -> Result<(), SceneError> {
            self.0.add_child(parent, child, position, keep)
        }
        fn child_count(&self, node: NodeHandle) -> usize {
            self.0.child_count(node)
        }
        fn child_at(&self, node: NodeHandle, index: usize) -> Option<NodeHandle> {
            self.0.child_at(node, index)
        }
        fn remove_child_at(&mut self, parent: NodeHandle, index: usize) -> Result<NodeHandle, SceneError> {
            self.0.remove_child_at(parent, index)
        }
        fn parent_count(&self, node: NodeHandle) -> usize {
            self.0.parent_count(node)
        }
        fn parent_at(&self, node: NodeHandle, index: usize) -> Option<NodeHandle> {
            self.0.parent_at(node, index)
        }
        fn delete_node(&mut self, node: NodeHandle) -> Result<DeleteRecord, SceneError> {
            self.0.delete_node(node)
        }
        fn restore(&mut self, record: &DeleteRecord) -> Result<(), SceneError> {
            self.0.restore(record)
        }
        fn set_attribute(&mut self, node: NodeHandle, _name: &str, _value: AttrValue) -> Result<(), SceneError> {
            Err(SceneError::DeletedNode(node))
        }
        fn attribute(&self, node: NodeHandle, name: &str) -> Option<&AttrValue> {
            self.0.attribute(node, name)
        }
        fn remove_attribute(&mut self, node: NodeHandle, name: &str) -> Result<Option<AttrValue>, SceneError> {
            self.0.remove_attribute(node, name)
        }
        fn connect(&mut self, src: NodeHandle, src_attr: &str, dst: NodeHandle, dst_attr: &str) -> Result<(), SceneError> {
            self.0.connect(src, src_attr, dst, dst_attr)
        }
        fn time_unit_fps(&self) -> f64 {
            self.0.time_unit_fps()
        }
        fn timeline(&self) -> Timeline {
            self.0.timeline()
        }
        fn set_min_time(&mut self, time: f64) -> Result<(), SceneError> {
            self.0.set_min_time(time)
        }
        fn set_max_time(&mut self, time: f64) -> Result<(), SceneError> {
            self.0.set_max_time(time)
        }
        fn set_animation_start_time(&mut self, time: f64) -> Result<(), SceneError> {
            self.0.set_animation_start_time(time)
        }
        fn set_animation_end_time(&mut self, time: f64) -> Result<(), SceneError> {
            self.0.set_animation_end_time(time)
        }
        fn set_undo_recording_muted(&mut self, muted: bool) -> bool {
            self.0.set_undo_recording_muted(muted)
        }
    }

    #[test]
    fn test_texture_hash_shared_between_shaders() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wood.png"), b"not really a png").unwrap();
        let usda = dir.path().join("scene.usda");
        std::fs::write(
            &usda,
            r#"#usda 1.0
def Shader "A"
{
    uniform token info:id = "UsdUVTexture"
    asset inputs:file = @wood.png@
}
def Shader "B"
{
    uniform token info:id = "UsdUVTexture"
    asset inputs:file = @wood.png@
}
"#,
        )
        .unwrap();
        let stage = Stage::open(&usda).unwrap();
        let args = ImportArgs::default();
        let mut scene = DagScene::new();
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        {
            let mut context = ReaderContext::new(&mut registry, &mut cache);
            for path in ["/A", "/B"] {
                let prim = stage.prim_at(&ScenePath::parse(path).unwrap()).unwrap();
                assert!(TextureReader::accepts(&prim));
                TextureReader.read(&ReaderArgs::new(prim, &args), &mut context, &mut scene);
            }
        }

        let a = registry.get("/A").unwrap();
        assert_eq!(scene.node_type(a), Some("file"));
        assert!(!scene.is_dag_node(a));
        let name = scene.attribute(a, "fileTextureName").and_then(AttrValue::as_str).unwrap();
        assert!(name.ends_with("wood.png"));
        let b = registry.get("/B").unwrap();
        let hash = scene.attribute(a, "fileTextureHash").and_then(AttrValue::as_str).unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(scene.attribute(a, "fileTextureHash"), scene.attribute(b, "fileTextureHash"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_file_node_registered_when_attributes_fail() {
        let stage = Stage::from_usda(
            r#"#usda 1.0
def Shader "Tex"
{
    uniform token info:id = "UsdUVTexture"
    asset inputs:file = @missing.png@
}
"#,
        )
        .unwrap();
        let args = ImportArgs::default();
        let mut scene = ReadOnlyAttributes(DagScene::new());
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        {
            let mut context = ReaderContext::new(&mut registry, &mut cache);
            let prim = stage.prim_at(&ScenePath::parse("/Tex").unwrap()).unwrap();
            TextureReader.read(&ReaderArgs::new(prim, &args), &mut context, &mut scene);
        }

        let node = registry.get("/Tex").unwrap();
        assert_eq!(scene.node_type(node), Some("file"));
        assert!(scene.attribute(node, "fileTextureName").is_none());
    }
}
