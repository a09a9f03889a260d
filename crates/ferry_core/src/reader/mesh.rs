use super::transform::create_transform;
use super::{log_scene_error, PrimReader, ReaderArgs};
use crate::context::ReaderContext;
use crate::scene::{AttrValue, NodeHandle, SceneError, TargetScene};
use crate::usd::{Prim, ScenePath};

/// Reads `Mesh` prims as a `transform` node with a `mesh` shape child.
///
/// The shape carries `points`, `faceVertexCounts` and `faceVertexIndices`
/// at their default values. It is registered under `<prim path>.shape`, a
/// key no child prim can take.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeshReader;

impl PrimReader for MeshReader {
    fn read(&mut self, args: &ReaderArgs<'_>, context: &mut ReaderContext<'_>, scene: &mut dyn TargetScene) {
        let Some(transform) = create_transform(args, context, scene) else {
            return;
        };
        let shape_name = format!("{}Shape", args.prim.name());
        match read_shape(&args.prim, scene, transform, &shape_name) {
            Ok(shape) => context.register_node(shape_key(args.path()), shape),
            Err(e) => log_scene_error(args, &e),
        }
    }
}

/// Registry key of a mesh prim's shape node.
fn shape_key(path: &ScenePath) -> String {
    format!("{path}.shape")
}

fn read_shape(
    prim: &Prim<'_>,
    scene: &mut dyn TargetScene,
    transform: NodeHandle,
    shape_name: &str,
) -> Result<NodeHandle, SceneError> {
    let shape = scene.create_node("mesh", shape_name, Some(transform))?;

    let value = |name: &str| prim.attribute(name).and_then(|a| a.value_at(None));
    if let Some(points) = value("points").as_ref().and_then(|v| v.as_vec3_array()) {
        scene.set_attribute(shape, "points", AttrValue::Double3Array(points.to_vec()))?;
    }
    for name in ["faceVertexCounts", "faceVertexIndices"] {
        if let Some(ints) = value(name).as_ref().and_then(|v| v.as_int_array()) {
            scene.set_attribute(shape, name, AttrValue::IntArray(ints.to_vec()))?;
        }
    }
    if prim.attribute("points").is_some_and(|a| a.is_varying()) {
        log::debug!("Animated points on '{}' are read at their default value", prim.path());
    }
    Ok(shape)
}
