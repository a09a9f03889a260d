//! The target scene: a mutable node graph that imports write into.
//!
//! [`TargetScene`] is the capability the importer needs from a host
//! application. [`DagScene`] is an in-memory implementation.

mod dag;

use std::ops::{Deref, DerefMut};

use ferry_math::DVec3;
use thiserror::Error;

pub use dag::DagScene;

/// Opaque handle to a node in a target scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Where `add_child` places the new child in the parent's child list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InsertPosition {
    /// After the existing children.
    #[default]
    Next,
    At(usize),
}

/// An attribute value on a target node.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Double3(DVec3),
    String(String),
    IntArray(Vec<i64>),
    Double3Array(Vec<DVec3>),
    /// Animation keys as `(frame, value)` pairs.
    Keys(Vec<(f64, f64)>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_double3(&self) -> Option<DVec3> {
        match self {
            AttrValue::Double3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_keys(&self) -> Option<&[(f64, f64)]> {
        match self {
            AttrValue::Keys(k) => Some(k),
            _ => None,
        }
    }
}

/// The scene's visible and playable frame ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeline {
    pub min: f64,
    pub max: f64,
    pub animation_start: f64,
    pub animation_end: f64,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 120.0,
            animation_start: 1.0,
            animation_end: 200.0,
        }
    }
}

/// A parent/child link removed by a deletion, with both list positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParentLink {
    pub parent: NodeHandle,
    pub child: NodeHandle,
    pub child_index: usize,
    pub parent_index: usize,
}

/// An attribute connection between two nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub src: NodeHandle,
    pub src_attr: String,
    pub dst: NodeHandle,
    pub dst_attr: String,
}

/// Everything a deletion removed, in removal order. Restoring it undoes the
/// deletion exactly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteRecord {
    pub nodes: Vec<NodeHandle>,
    pub links: Vec<ParentLink>,
    pub connections: Vec<(usize, Connection)>,
}

impl DeleteRecord {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Errors reported by a target scene.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeHandle),

    #[error("Node {0:?} has been deleted")]
    DeletedNode(NodeHandle),

    #[error("Node {0:?} is not a DAG node")]
    NotDagNode(NodeHandle),

    #[error("Child index {index} out of range for node {parent:?}")]
    InvalidChildIndex { parent: NodeHandle, index: usize },

    #[error("Parenting {child:?} under {parent:?} would create a cycle")]
    WouldCreateCycle { parent: NodeHandle, child: NodeHandle },

    #[error("The world node cannot be deleted")]
    CannotDeleteWorld,

    #[error("Invalid time value {0}")]
    InvalidTime(f64),
}

/// The operations an import performs on a host scene graph.
///
/// DAG nodes form a hierarchy under [`TargetScene::world`] and may have
/// several parents. Dependency nodes live outside the hierarchy.
pub trait TargetScene {
    /// The implicit root of the DAG.
    fn world(&self) -> NodeHandle;

    /// Creates a DAG node. `None` parents it under the world.
    fn create_node(&mut self, node_type: &str, name: &str, parent: Option<NodeHandle>)
        -> Result<NodeHandle, SceneError>;

    /// Creates a node outside the DAG.
    fn create_dependency_node(&mut self, node_type: &str, name: &str) -> Result<NodeHandle, SceneError>;

    fn is_alive(&self, node: NodeHandle) -> bool;

    fn is_dag_node(&self, node: NodeHandle) -> bool;

    fn node_name(&self, node: NodeHandle) -> Option<&str>;

    fn node_type(&self, node: NodeHandle) -> Option<&str>;

    /// Adds `child` under `parent`. Unless `keep_existing_parents`, the child
    /// is first removed from its current parents.
    fn add_child(
        &mut self,
        parent: NodeHandle,
        child: NodeHandle,
        position: InsertPosition,
        keep_existing_parents: bool,
    ) -> Result<(), SceneError>;

    fn child_count(&self, node: NodeHandle) -> usize;

    fn child_at(&self, node: NodeHandle, index: usize) -> Option<NodeHandle>;

    /// Removes one child link and returns the child.
    fn remove_child_at(&mut self, parent: NodeHandle, index: usize) -> Result<NodeHandle, SceneError>;

    fn parent_count(&self, node: NodeHandle) -> usize;

    fn parent_at(&self, node: NodeHandle, index: usize) -> Option<NodeHandle>;

    /// Deletes a node together with every descendant that has no other
    /// parent. Deleting an already deleted node returns an empty record.
    fn delete_node(&mut self, node: NodeHandle) -> Result<DeleteRecord, SceneError>;

    /// Undoes a deletion.
    fn restore(&mut self, record: &DeleteRecord) -> Result<(), SceneError>;

    fn set_attribute(&mut self, node: NodeHandle, name: &str, value: AttrValue) -> Result<(), SceneError>;

    fn attribute(&self, node: NodeHandle, name: &str) -> Option<&AttrValue>;

    /// Removes an attribute, returning its previous value.
    fn remove_attribute(&mut self, node: NodeHandle, name: &str) -> Result<Option<AttrValue>, SceneError>;

    fn connect(&mut self, src: NodeHandle, src_attr: &str, dst: NodeHandle, dst_attr: &str) -> Result<(), SceneError>;

    /// The scene's time unit as frames per second.
    fn time_unit_fps(&self) -> f64;

    /// Internal distance unit.
    fn meters_per_unit(&self) -> f64 {
        0.01
    }

    fn timeline(&self) -> Timeline;

    fn set_min_time(&mut self, time: f64) -> Result<(), SceneError>;

    fn set_max_time(&mut self, time: f64) -> Result<(), SceneError>;

    fn set_animation_start_time(&mut self, time: f64) -> Result<(), SceneError>;

    fn set_animation_end_time(&mut self, time: f64) -> Result<(), SceneError>;

    /// Mutes or unmutes the scene's own undo recording; returns the
    /// previous state.
    fn set_undo_recording_muted(&mut self, muted: bool) -> bool;

    fn children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        (0..self.child_count(node)).filter_map(|i| self.child_at(node, i)).collect()
    }

    fn parents(&self, node: NodeHandle) -> Vec<NodeHandle> {
        (0..self.parent_count(node)).filter_map(|i| self.parent_at(node, i)).collect()
    }

    /// True if `ancestor` is reachable by walking up from `node`.
    fn is_descendant_of(&self, node: NodeHandle, ancestor: NodeHandle) -> bool {
        let mut pending = self.parents(node);
        let mut seen = Vec::new();
        while let Some(parent) = pending.pop() {
            if parent == ancestor {
                return true;
            }
            if !seen.contains(&parent) {
                seen.push(parent);
                pending.extend(self.parents(parent));
            }
        }
        false
    }
}

/// Mutes a scene's undo recording for as long as the guard lives.
pub struct RecordingMute<'a> {
    scene: &'a mut dyn TargetScene,
    previous: bool,
}

impl<'a> RecordingMute<'a> {
    pub fn new(scene: &'a mut dyn TargetScene) -> Self {
        let previous = scene.set_undo_recording_muted(true);
        Self { scene, previous }
    }
}

impl Drop for RecordingMute<'_> {
    fn drop(&mut self) {
        self.scene.set_undo_recording_muted(self.previous);
    }
}

impl<'a> Deref for RecordingMute<'a> {
    type Target = dyn TargetScene + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.scene
    }
}

impl<'a> DerefMut for RecordingMute<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.scene
    }
}
