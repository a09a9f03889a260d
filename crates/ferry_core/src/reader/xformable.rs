//! Transform reading shared by readers and instance duplication.
//!
//! The ordered xform ops of a prim are composed into a matrix at every
//! authored time sample, then decomposed into translate / rotate / scale.
//! Constant channels become plain attributes. Varying channels get an
//! animation curve node keyed at `time * multiplier`.

use ferry_math::{filter_euler, rotation_matrix, DMat4, DQuat, RotationOrder, Trs};

use super::{log_scene_error, ReaderArgs};
use crate::context::ReaderContext;
use crate::scene::{AttrValue, NodeHandle, SceneError, TargetScene};
use crate::usd::{Prim, Value};

pub const XFORM_OP_ORDER: &str = "xformOpOrder";
const RESET_XFORM_STACK: &str = "!resetXformStack!";
const INVERT_PREFIX: &str = "!invert!";
const OP_PREFIX: &str = "xformOp:";

/// Channel values closer than this are treated as constant.
const CONSTANT_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
enum OpKind {
    Translate,
    Scale,
    RotateAxis(usize),
    Rotate(RotationOrder),
    Orient,
    Transform,
}

impl OpKind {
    fn from_stem(stem: &str) -> Option<Self> {
        match stem {
            "translate" => Some(Self::Translate),
            "scale" => Some(Self::Scale),
            "transform" => Some(Self::Transform),
            "orient" => Some(Self::Orient),
            "rotateX" => Some(Self::RotateAxis(0)),
            "rotateY" => Some(Self::RotateAxis(1)),
            "rotateZ" => Some(Self::RotateAxis(2)),
            _ => stem
                .strip_prefix("rotate")
                .and_then(RotationOrder::from_suffix)
                .map(Self::Rotate),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct XformOp {
    attribute: String,
    kind: OpKind,
    inverse: bool,
}

impl XformOp {
    fn parse(token: &str) -> Option<Self> {
        let (inverse, attribute) = match token.strip_prefix(INVERT_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let stem = attribute.strip_prefix(OP_PREFIX)?.split(':').next()?;
        Some(Self {
            attribute: attribute.to_string(),
            kind: OpKind::from_stem(stem)?,
            inverse,
        })
    }

    fn matrix(&self, prim: &Prim<'_>, time: Option<f64>) -> Option<DMat4> {
        let value = prim.attribute(&self.attribute)?.value_at(time)?;
        let matrix = match self.kind {
            OpKind::Translate => DMat4::from_translation(value.as_vec3()?),
            OpKind::Scale => DMat4::from_scale(value.as_vec3()?),
            OpKind::RotateAxis(axis) => {
                let radians = value.as_f64()?.to_radians();
                match axis {
                    0 => DMat4::from_rotation_x(radians),
                    1 => DMat4::from_rotation_y(radians),
                    _ => DMat4::from_rotation_z(radians),
                }
            }
            OpKind::Rotate(order) => rotation_matrix(order, value.as_vec3()?),
            // Quaternions are authored real part first
            OpKind::Orient => match value {
                Value::Vec4(q) => DMat4::from_quat(DQuat::from_xyzw(q.y, q.z, q.w, q.x).normalize()),
                _ => return None,
            },
            OpKind::Transform => value.as_matrix()?,
        };
        Some(if self.inverse { matrix.inverse() } else { matrix })
    }
}

/// The ordered xform ops of one prim.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XformStack {
    ops: Vec<XformOp>,
    resets: bool,
}

impl XformStack {
    pub fn from_prim(prim: &Prim<'_>) -> Self {
        let mut stack = Self::default();
        let Some(order) = prim.attribute(XFORM_OP_ORDER).and_then(|a| a.value_at(None)) else {
            return stack;
        };
        for token in order.as_token_array().unwrap_or_default() {
            if token == RESET_XFORM_STACK {
                stack.resets = true;
                stack.ops.clear();
                continue;
            }
            match XformOp::parse(token) {
                Some(op) => stack.ops.push(op),
                None => log::warn!("Unsupported xform op '{token}' on '{}'", prim.path()),
            }
        }
        stack
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// True when the prim ignores its parent transforms.
    pub fn resets_xform_stack(&self) -> bool {
        self.resets
    }

    /// Union of the authored sample times of every op, ascending.
    pub fn sample_times(&self, prim: &Prim<'_>) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .ops
            .iter()
            .filter_map(|op| prim.attribute(&op.attribute))
            .flat_map(|attr| attr.sample_times())
            .collect();
        times.sort_by(f64::total_cmp);
        times.dedup();
        times
    }

    /// Local matrix at `time` (`None` for default values). Ops whose
    /// attribute is missing or has the wrong type are skipped.
    pub fn matrix_at(&self, prim: &Prim<'_>, time: Option<f64>) -> DMat4 {
        self.ops.iter().fold(DMat4::IDENTITY, |m, op| match op.matrix(prim, time) {
            Some(op_matrix) => m * op_matrix,
            None => {
                log::debug!("Skipping xform op '{}' on '{}'", op.attribute, prim.path());
                m
            }
        })
    }
}

pub fn has_xform_ops(prim: &Prim<'_>) -> bool {
    prim.attribute(XFORM_OP_ORDER).is_some()
}

struct Channel {
    attribute: &'static str,
    curve_type: &'static str,
    value: fn(&Trs) -> f64,
}

const CHANNELS: [Channel; 9] = [
    Channel { attribute: "translateX", curve_type: "animCurveTL", value: |t| t.translate.x },
    Channel { attribute: "translateY", curve_type: "animCurveTL", value: |t| t.translate.y },
    Channel { attribute: "translateZ", curve_type: "animCurveTL", value: |t| t.translate.z },
    Channel { attribute: "rotateX", curve_type: "animCurveTA", value: |t| t.rotate_degrees().x },
    Channel { attribute: "rotateY", curve_type: "animCurveTA", value: |t| t.rotate_degrees().y },
    Channel { attribute: "rotateZ", curve_type: "animCurveTA", value: |t| t.rotate_degrees().z },
    Channel { attribute: "scaleX", curve_type: "animCurveTU", value: |t| t.scale.x },
    Channel { attribute: "scaleY", curve_type: "animCurveTU", value: |t| t.scale.y },
    Channel { attribute: "scaleZ", curve_type: "animCurveTU", value: |t| t.scale.z },
];

/// Reads the transform, visibility and inherit flag of `args.prim` onto an
/// existing transform node.
pub fn read_xformable(
    args: &ReaderArgs<'_>,
    context: &mut ReaderContext<'_>,
    scene: &mut dyn TargetScene,
    node: NodeHandle,
) {
    if let Err(e) = read_into(args, context, scene, node) {
        log_scene_error(args, &e);
    }
}

fn read_into(
    args: &ReaderArgs<'_>,
    context: &mut ReaderContext<'_>,
    scene: &mut dyn TargetScene,
    node: NodeHandle,
) -> Result<(), SceneError> {
    let prim = args.prim;
    let stack = XformStack::from_prim(&prim);

    if stack.resets_xform_stack() || context.force_reset_xform() {
        scene.set_attribute(node, "inheritsTransform", AttrValue::Bool(false))?;
    }

    let invisible = prim
        .attribute("visibility")
        .and_then(|a| a.value_at(None))
        .is_some_and(|v| v.as_str() == Some("invisible"));
    if invisible {
        scene.set_attribute(node, "visibility", AttrValue::Bool(false))?;
    }

    if stack.is_empty() {
        return Ok(());
    }

    let times = stack.sample_times(&prim);
    if times.len() < 2 {
        let trs = Trs::from_matrix(&stack.matrix_at(&prim, times.first().copied()));
        return set_static(scene, node, &trs);
    }

    let mut samples: Vec<Trs> = times
        .iter()
        .map(|t| Trs::from_matrix(&stack.matrix_at(&prim, Some(*t))))
        .collect();
    if args.args.apply_euler_filter {
        for i in 1..samples.len() {
            samples[i].rotate = filter_euler(samples[i - 1].rotate, samples[i].rotate);
        }
    }
    set_static(scene, node, &samples[0])?;

    let base_name = scene.node_name(node).unwrap_or(prim.name()).to_string();
    let multiplier = context.time_sample_multiplier();
    for channel in &CHANNELS {
        let values: Vec<f64> = samples.iter().map(channel.value).collect();
        if values.iter().all(|v| (v - values[0]).abs() <= CONSTANT_EPSILON) {
            continue;
        }
        let keys = times.iter().zip(values).map(|(t, v)| (t * multiplier, v)).collect();
        let curve = scene.create_dependency_node(channel.curve_type, &format!("{base_name}_{}", channel.attribute))?;
        scene.set_attribute(curve, "keys", AttrValue::Keys(keys))?;
        scene.connect(curve, "output", node, channel.attribute)?;
        context.register_node(format!("{}.{}", prim.path(), channel.attribute), curve);
    }
    Ok(())
}

fn set_static(scene: &mut dyn TargetScene, node: NodeHandle, trs: &Trs) -> Result<(), SceneError> {
    scene.set_attribute(node, "translate", AttrValue::Double3(trs.translate))?;
    scene.set_attribute(node, "rotate", AttrValue::Double3(trs.rotate_degrees()))?;
    scene.set_attribute(node, "scale", AttrValue::Double3(trs.scale))
}
