use super::xformable::read_xformable;
use super::{log_scene_error, parent_node, PrimReader, ReaderArgs};
use crate::context::ReaderContext;
use crate::scene::{NodeHandle, TargetScene};

/// Reads `Xform`, `Scope` and typeless prims as `transform` nodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransformReader;

impl PrimReader for TransformReader {
    fn read(&mut self, args: &ReaderArgs<'_>, context: &mut ReaderContext<'_>, scene: &mut dyn TargetScene) {
        create_transform(args, context, scene);
    }
}

/// Creates and registers the `transform` node for a prim, then reads its
/// xformable attributes onto it.
pub(crate) fn create_transform(
    args: &ReaderArgs<'_>,
    context: &mut ReaderContext<'_>,
    scene: &mut dyn TargetScene,
) -> Option<NodeHandle> {
    let parent = parent_node(args, context, scene);
    match scene.create_node("transform", args.prim.name(), Some(parent)) {
        Ok(node) => {
            context.register_node(args.path().as_str(), node);
            read_xformable(args, context, scene, node);
            Some(node)
        }
        Err(e) => {
            log_scene_error(args, &e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ReadCache;
    use crate::job::ImportArgs;
    use crate::registry::NodeRegistry;
    use crate::scene::DagScene;
    use crate::usd::{ScenePath, Stage};

    #[test]
    fn test_nested_transforms() {
        let stage = Stage::from_usda(
            r#"#usda 1.0
def Xform "World"
{
    def Scope "Group"
    {
    }
}
"#,
        )
        .unwrap();
        let args = ImportArgs::default();
        let mut scene = DagScene::new();
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        let mut context = ReaderContext::new(&mut registry, &mut cache);

        for path in ["/World", "/World/Group"] {
            let prim = stage.prim_at(&ScenePath::parse(path).unwrap()).unwrap();
            TransformReader.read(&ReaderArgs::new(prim, &args), &mut context, &mut scene);
        }
        drop(context);

        let world = registry.get("/World").unwrap();
        let group = registry.get("/World/Group").unwrap();
        assert_eq!(scene.parents(world), vec![scene.world()]);
        assert_eq!(scene.parents(group), vec![world]);
        assert_eq!(scene.node_name(group), Some("Group"));
        assert_eq!(scene.node_type(group), Some("transform"));
    }
}
