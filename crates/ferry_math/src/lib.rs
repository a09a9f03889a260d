// Re-export glam for convenience
pub use glam::*;

// Ferry math types
mod interval;
mod transform;

pub use interval::TimeInterval;
pub use transform::{filter_euler, is_close, rotation_matrix, RotationOrder, Trs};
