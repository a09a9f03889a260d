// Transform composition and decomposition
//
// Rotations are XYZ Euler angles in radians unless noted otherwise. An XYZ
// rotation applies X first, then Y, then Z, so its matrix is Rz * Ry * Rx in
// glam's column-vector convention.

use glam::{DMat4, DQuat, DVec3, EulerRot};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Axis application order of a three-angle rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationOrder {
    Xyz,
    Xzy,
    Yxz,
    Yzx,
    Zxy,
    Zyx,
}

impl RotationOrder {
    /// Parses the suffix of a rotate op name, e.g. `"XYZ"` from `rotateXYZ`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "XYZ" => Some(Self::Xyz),
            "XZY" => Some(Self::Xzy),
            "YXZ" => Some(Self::Yxz),
            "YZX" => Some(Self::Yzx),
            "ZXY" => Some(Self::Zxy),
            "ZYX" => Some(Self::Zyx),
            _ => None,
        }
    }

    /// Axis indices in application order.
    fn axes(self) -> [usize; 3] {
        match self {
            Self::Xyz => [0, 1, 2],
            Self::Xzy => [0, 2, 1],
            Self::Yxz => [1, 0, 2],
            Self::Yzx => [1, 2, 0],
            Self::Zxy => [2, 0, 1],
            Self::Zyx => [2, 1, 0],
        }
    }
}

fn axis_rotation(axis: usize, radians: f64) -> DMat4 {
    match axis {
        0 => DMat4::from_rotation_x(radians),
        1 => DMat4::from_rotation_y(radians),
        _ => DMat4::from_rotation_z(radians),
    }
}

/// Builds the matrix of a three-angle rotation given in degrees.
pub fn rotation_matrix(order: RotationOrder, degrees: DVec3) -> DMat4 {
    let radians = degrees * (PI / 180.0);
    let angles = radians.to_array();
    order
        .axes()
        .iter()
        .fold(DMat4::IDENTITY, |m, &axis| axis_rotation(axis, angles[axis]) * m)
}

/// Translate / rotate / scale channels of a decomposed transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs {
    pub translate: DVec3,
    /// XYZ Euler angles in radians.
    pub rotate: DVec3,
    pub scale: DVec3,
}

impl Default for Trs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Trs {
    pub const IDENTITY: Trs = Trs {
        translate: DVec3::ZERO,
        rotate: DVec3::ZERO,
        scale: DVec3::ONE,
    };

    /// Decomposes an affine matrix. Shear is discarded.
    pub fn from_matrix(matrix: &DMat4) -> Self {
        let (scale, rotation, translate) = matrix.to_scale_rotation_translation();
        // glam's ZYX from_euler is qz * qy * qx, which is an XYZ application order
        let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
        Self {
            translate,
            rotate: DVec3::new(x, y, z),
            scale,
        }
    }

    pub fn to_matrix(&self) -> DMat4 {
        let rotation = DQuat::from_euler(EulerRot::ZYX, self.rotate.z, self.rotate.y, self.rotate.x);
        DMat4::from_scale_rotation_translation(self.scale, rotation, self.translate)
    }

    /// Rotation in degrees, the unit scene attributes carry.
    pub fn rotate_degrees(&self) -> DVec3 {
        self.rotate * (180.0 / PI)
    }
}

fn wrap_towards(previous: f64, current: f64) -> f64 {
    current + TAU * ((previous - current) / TAU).round()
}

fn wrap_all(previous: DVec3, current: DVec3) -> DVec3 {
    DVec3::new(
        wrap_towards(previous.x, current.x),
        wrap_towards(previous.y, current.y),
        wrap_towards(previous.z, current.z),
    )
}

/// Returns the XYZ Euler triple equivalent to `current` that is closest to
/// `previous`, removing 360 degree jumps and gimbal flips between keys.
pub fn filter_euler(previous: DVec3, current: DVec3) -> DVec3 {
    let naive = wrap_all(previous, current);
    let flipped = wrap_all(
        previous,
        DVec3::new(current.x + PI, PI - current.y, current.z + PI),
    );

    let distance = |v: DVec3| (v - previous).abs().element_sum();
    if distance(flipped) < distance(naive) {
        flipped
    } else {
        naive
    }
}

/// Component-wise comparison within `epsilon`.
pub fn is_close(a: DVec3, b: DVec3, epsilon: f64) -> bool {
    (a - b).abs().max_element() <= epsilon
}
