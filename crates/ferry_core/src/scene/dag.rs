//! In-memory DAG implementation of [`TargetScene`].

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::{
    AttrValue, Connection, DeleteRecord, InsertPosition, NodeHandle, ParentLink, SceneError, TargetScene, Timeline,
};

#[derive(Clone, Debug)]
struct Node {
    name: String,
    node_type: String,
    dag: bool,
    alive: bool,
    parents: Vec<NodeHandle>,
    children: Vec<NodeHandle>,
    attributes: BTreeMap<String, AttrValue>,
}

/// A node arena with a world root, multi-parent DAG nodes and free-standing
/// dependency nodes. Deleted nodes keep their slot so a [`DeleteRecord`] can
/// bring them back.
#[derive(Clone, Debug)]
pub struct DagScene {
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    fps: f64,
    meters_per_unit: f64,
    timeline: Timeline,
    recording_muted: bool,
    recorded_operations: usize,
}

impl Default for DagScene {
    fn default() -> Self {
        Self::new()
    }
}

impl DagScene {
    /// An empty scene at 24 fps.
    pub fn new() -> Self {
        Self::with_fps(24.0)
    }

    pub fn with_fps(fps: f64) -> Self {
        let world = Node {
            name: "world".to_string(),
            node_type: "world".to_string(),
            dag: true,
            alive: true,
            parents: Vec::new(),
            children: Vec::new(),
            attributes: BTreeMap::new(),
        };
        Self {
            nodes: vec![world],
            connections: Vec::new(),
            fps,
            meters_per_unit: 0.01,
            timeline: Timeline::default(),
            recording_muted: false,
            recorded_operations: 0,
        }
    }

    pub fn set_meters_per_unit(&mut self, meters_per_unit: f64) {
        self.meters_per_unit = meters_per_unit;
    }

    pub fn is_recording_muted(&self) -> bool {
        self.recording_muted
    }

    /// Edits made while recording was not muted.
    pub fn recorded_operations(&self) -> usize {
        self.recorded_operations
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive).count()
    }

    /// Live DAG nodes, excluding the world.
    pub fn live_dag_count(&self) -> usize {
        self.nodes.iter().skip(1).filter(|n| n.alive && n.dag).count()
    }

    /// Live nodes with the given name.
    pub fn find_by_name(&self, name: &str) -> Vec<NodeHandle> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.alive && n.name == name)
            .map(|(i, _)| NodeHandle::from_raw(i as u32))
            .collect()
    }

    /// Connections whose destination is `node`.
    pub fn connections_to(&self, node: NodeHandle) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.dst == node).collect()
    }

    /// Indented listing of the DAG under the world.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(self.world(), 0, &mut out);
        out
    }

    fn dump_node(&self, node: NodeHandle, depth: usize, out: &mut String) {
        if let Some(n) = self.get(node) {
            let _ = writeln!(out, "{}{} ({})", "  ".repeat(depth), n.name, n.node_type);
            for &child in &n.children {
                self.dump_node(child, depth + 1, out);
            }
        }
    }

    fn get(&self, node: NodeHandle) -> Option<&Node> {
        self.nodes.get(node.raw() as usize)
    }

    fn live(&self, node: NodeHandle) -> Result<&Node, SceneError> {
        match self.get(node) {
            None => Err(SceneError::UnknownNode(node)),
            Some(n) if !n.alive => Err(SceneError::DeletedNode(node)),
            Some(n) => Ok(n),
        }
    }

    fn live_mut(&mut self, node: NodeHandle) -> Result<&mut Node, SceneError> {
        match self.nodes.get_mut(node.raw() as usize) {
            None => Err(SceneError::UnknownNode(node)),
            Some(n) if !n.alive => Err(SceneError::DeletedNode(node)),
            Some(n) => Ok(n),
        }
    }

    fn node_mut(&mut self, node: NodeHandle) -> Result<&mut Node, SceneError> {
        self.nodes
            .get_mut(node.raw() as usize)
            .ok_or(SceneError::UnknownNode(node))
    }

    fn live_dag(&self, node: NodeHandle) -> Result<&Node, SceneError> {
        let n = self.live(node)?;
        if n.dag {
            Ok(n)
        } else {
            Err(SceneError::NotDagNode(node))
        }
    }

    fn record(&mut self) {
        if !self.recording_muted {
            self.recorded_operations += 1;
        }
    }

    fn push_node(&mut self, node_type: &str, name: &str, dag: bool) -> NodeHandle {
        let handle = NodeHandle::from_raw(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.to_string(),
            node_type: node_type.to_string(),
            dag,
            alive: true,
            parents: Vec::new(),
            children: Vec::new(),
            attributes: BTreeMap::new(),
        });
        handle
    }

    fn link(&mut self, parent: NodeHandle, child: NodeHandle, child_index: usize, parent_index: usize) -> Result<(), SceneError> {
        let children = &mut self.node_mut(parent)?.children;
        let child_index = child_index.min(children.len());
        children.insert(child_index, child);
        let parents = &mut self.node_mut(child)?.parents;
        let parent_index = parent_index.min(parents.len());
        parents.insert(parent_index, parent);
        Ok(())
    }

    /// Removes one parent/child link and reports where it was.
    fn unlink(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<ParentLink, SceneError> {
        let parent_node = self.node_mut(parent)?;
        let child_index = parent_node
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(SceneError::UnknownNode(child))?;
        parent_node.children.remove(child_index);

        let child_node = self.node_mut(child)?;
        let parent_index = child_node
            .parents
            .iter()
            .position(|&p| p == parent)
            .ok_or(SceneError::UnknownNode(parent))?;
        child_node.parents.remove(parent_index);

        Ok(ParentLink {
            parent,
            child,
            child_index,
            parent_index,
        })
    }

    /// `node` plus every descendant whose parents would all be deleted.
    fn doomed_set(&self, node: NodeHandle) -> Vec<NodeHandle> {
        let mut descendants = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(n) = self.get(current) {
                for &child in &n.children {
                    if child != node && !descendants.contains(&child) {
                        descendants.push(child);
                        stack.push(child);
                    }
                }
            }
        }

        let mut doomed = vec![node];
        let mut changed = true;
        while changed {
            changed = false;
            for &candidate in &descendants {
                if doomed.contains(&candidate) {
                    continue;
                }
                let orphaned = self
                    .get(candidate)
                    .is_some_and(|n| n.parents.iter().all(|p| doomed.contains(p)));
                if orphaned {
                    doomed.push(candidate);
                    changed = true;
                }
            }
        }
        doomed
    }
}

impl TargetScene for DagScene {
    fn world(&self) -> NodeHandle {
        NodeHandle::from_raw(0)
    }

    fn create_node(&mut self, node_type: &str, name: &str, parent: Option<NodeHandle>) -> Result<NodeHandle, SceneError> {
        let parent = parent.unwrap_or(self.world());
        self.live_dag(parent)?;
        let handle = self.push_node(node_type, name, true);
        let index = self.child_count(parent);
        self.link(parent, handle, index, 0)?;
        self.record();
        log::debug!("Created {node_type} node '{name}' ({handle:?})");
        Ok(handle)
    }

    fn create_dependency_node(&mut self, node_type: &str, name: &str) -> Result<NodeHandle, SceneError> {
        let handle = self.push_node(node_type, name, false);
        self.record();
        log::debug!("Created {node_type} dependency node '{name}' ({handle:?})");
        Ok(handle)
    }

    fn is_alive(&self, node: NodeHandle) -> bool {
        self.get(node).is_some_and(|n| n.alive)
    }

    fn is_dag_node(&self, node: NodeHandle) -> bool {
        self.get(node).is_some_and(|n| n.alive && n.dag)
    }

    fn node_name(&self, node: NodeHandle) -> Option<&str> {
        self.get(node).map(|n| n.name.as_str())
    }

    fn node_type(&self, node: NodeHandle) -> Option<&str> {
        self.get(node).map(|n| n.node_type.as_str())
    }

    fn add_child(
        &mut self,
        parent: NodeHandle,
        child: NodeHandle,
        position: InsertPosition,
        keep_existing_parents: bool,
    ) -> Result<(), SceneError> {
        let existing = self.live_dag(parent)?.children.contains(&child);
        self.live_dag(child)?;
        if child == self.world() || child == parent || self.is_descendant_of(parent, child) {
            return Err(SceneError::WouldCreateCycle { parent, child });
        }
        if existing {
            return Ok(());
        }

        if !keep_existing_parents {
            for old in self.parents(child) {
                self.unlink(old, child)?;
            }
        }
        let index = match position {
            InsertPosition::Next => self.child_count(parent),
            InsertPosition::At(index) => {
                if index > self.child_count(parent) {
                    return Err(SceneError::InvalidChildIndex { parent, index });
                }
                index
            }
        };
        let parent_index = self.parent_count(child);
        self.link(parent, child, index, parent_index)?;
        self.record();
        Ok(())
    }

    fn child_count(&self, node: NodeHandle) -> usize {
        self.get(node).map_or(0, |n| n.children.len())
    }

    fn child_at(&self, node: NodeHandle, index: usize) -> Option<NodeHandle> {
        self.get(node)?.children.get(index).copied()
    }

    fn remove_child_at(&mut self, parent: NodeHandle, index: usize) -> Result<NodeHandle, SceneError> {
        let child = self
            .live(parent)?
            .children
            .get(index)
            .copied()
            .ok_or(SceneError::InvalidChildIndex { parent, index })?;
        self.unlink(parent, child)?;

        // A DAG node always has a parent: orphans go back under the world
        if self.parent_count(child) == 0 && self.is_alive(child) {
            let world = self.world();
            let end = self.child_count(world);
            self.link(world, child, end, 0)?;
        }
        self.record();
        Ok(child)
    }

    fn parent_count(&self, node: NodeHandle) -> usize {
        self.get(node).map_or(0, |n| n.parents.len())
    }

    fn parent_at(&self, node: NodeHandle, index: usize) -> Option<NodeHandle> {
        self.get(node)?.parents.get(index).copied()
    }

    fn delete_node(&mut self, node: NodeHandle) -> Result<DeleteRecord, SceneError> {
        if node == self.world() {
            return Err(SceneError::CannotDeleteWorld);
        }
        match self.get(node) {
            None => return Err(SceneError::UnknownNode(node)),
            Some(n) if !n.alive => return Ok(DeleteRecord::default()),
            Some(_) => {}
        }

        let doomed = self.doomed_set(node);
        let mut record = DeleteRecord::default();

        let mut pairs = Vec::new();
        for &d in &doomed {
            if let Some(n) = self.get(d) {
                pairs.extend(n.parents.iter().map(|&p| (p, d)));
                pairs.extend(n.children.iter().filter(|c| !doomed.contains(c)).map(|&c| (d, c)));
            }
        }
        for (parent, child) in pairs {
            record.links.push(self.unlink(parent, child)?);
        }

        let mut index = 0;
        while index < self.connections.len() {
            let c = &self.connections[index];
            if doomed.contains(&c.src) || doomed.contains(&c.dst) {
                let removed = self.connections.remove(index);
                record.connections.push((index, removed));
            } else {
                index += 1;
            }
        }

        for &d in &doomed {
            self.node_mut(d)?.alive = false;
        }
        record.nodes = doomed;
        self.record();
        log::debug!("Deleted {} node(s) starting at {node:?}", record.nodes.len());
        Ok(record)
    }

    fn restore(&mut self, record: &DeleteRecord) -> Result<(), SceneError> {
        for &node in &record.nodes {
            self.node_mut(node)?.alive = true;
        }
        for link in record.links.iter().rev() {
            self.link(link.parent, link.child, link.child_index, link.parent_index)?;
        }
        for (index, connection) in record.connections.iter().rev() {
            let index = (*index).min(self.connections.len());
            self.connections.insert(index, connection.clone());
        }
        if !record.is_empty() {
            self.record();
        }
        Ok(())
    }

    fn set_attribute(&mut self, node: NodeHandle, name: &str, value: AttrValue) -> Result<(), SceneError> {
        self.live_mut(node)?.attributes.insert(name.to_string(), value);
        self.record();
        Ok(())
    }

    fn attribute(&self, node: NodeHandle, name: &str) -> Option<&AttrValue> {
        self.get(node)?.attributes.get(name)
    }

    fn remove_attribute(&mut self, node: NodeHandle, name: &str) -> Result<Option<AttrValue>, SceneError> {
        let previous = self.live_mut(node)?.attributes.remove(name);
        self.record();
        Ok(previous)
    }

    fn connect(&mut self, src: NodeHandle, src_attr: &str, dst: NodeHandle, dst_attr: &str) -> Result<(), SceneError> {
        self.live(src)?;
        self.live(dst)?;
        // An input takes a single connection
        self.connections.retain(|c| !(c.dst == dst && c.dst_attr == dst_attr));
        self.connections.push(Connection {
            src,
            src_attr: src_attr.to_string(),
            dst,
            dst_attr: dst_attr.to_string(),
        });
        self.record();
        Ok(())
    }

    fn time_unit_fps(&self) -> f64 {
        self.fps
    }

    fn meters_per_unit(&self) -> f64 {
        self.meters_per_unit
    }

    fn timeline(&self) -> Timeline {
        self.timeline
    }

    fn set_min_time(&mut self, time: f64) -> Result<(), SceneError> {
        if !time.is_finite() {
            return Err(SceneError::InvalidTime(time));
        }
        self.timeline.min = time;
        Ok(())
    }

    fn set_max_time(&mut self, time: f64) -> Result<(), SceneError> {
        if !time.is_finite() {
            return Err(SceneError::InvalidTime(time));
        }
        self.timeline.max = time;
        Ok(())
    }

    fn set_animation_start_time(&mut self, time: f64) -> Result<(), SceneError> {
        if !time.is_finite() {
            return Err(SceneError::InvalidTime(time));
        }
        self.timeline.animation_start = time;
        Ok(())
    }

    fn set_animation_end_time(&mut self, time: f64) -> Result<(), SceneError> {
        if !time.is_finite() {
            return Err(SceneError::InvalidTime(time));
        }
        self.timeline.animation_end = time;
        Ok(())
    }

    fn set_undo_recording_muted(&mut self, muted: bool) -> bool {
        std::mem::replace(&mut self.recording_muted, muted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scene_has_world() {
        let scene = DagScene::new();
        assert!(scene.is_dag_node(scene.world()));
        assert_eq!(scene.node_name(scene.world()), Some("world"));
        assert_eq!(scene.time_unit_fps(), 24.0);
        assert_eq!(scene.live_dag_count(), 0);
    }

    #[test]
    fn test_create_nodes() {
        let mut scene = DagScene::new();
        let a = scene.create_node("transform", "a", None).unwrap();
        let b = scene.create_node("mesh", "aShape", Some(a)).unwrap();
        assert_eq!(scene.children(scene.world()), vec![a]);
        assert_eq!(scene.children(a), vec![b]);
        assert_eq!(scene.parents(b), vec![a]);
        assert_eq!(scene.node_type(b), Some("mesh"));

        let dep = scene.create_dependency_node("animCurveTL", "curve").unwrap();
        assert!(!scene.is_dag_node(dep));
        assert_eq!(scene.parent_count(dep), 0);
        assert!(scene.create_node("transform", "bad", Some(dep)).is_err());
    }

    #[test]
    fn test_multi_parent_children() {
        let mut scene = DagScene::new();
        let proto = scene.create_node("transform", "proto", None).unwrap();
        let geo = scene.create_node("mesh", "geo", Some(proto)).unwrap();
        let i1 = scene.create_node("transform", "i1", None).unwrap();
        let i2 = scene.create_node("transform", "i2", None).unwrap();
        scene.add_child(i1, geo, InsertPosition::Next, true).unwrap();
        scene.add_child(i2, geo, InsertPosition::Next, true).unwrap();
        assert_eq!(scene.parents(geo), vec![proto, i1, i2]);

        // Detaching from the prototype keeps the instance links
        scene.remove_child_at(proto, 0).unwrap();
        assert_eq!(scene.parents(geo), vec![i1, i2]);
        scene.delete_node(proto).unwrap();
        assert!(scene.is_alive(geo));
    }

    #[test]
    fn test_add_child_reparents_without_keep() {
        let mut scene = DagScene::new();
        let a = scene.create_node("transform", "a", None).unwrap();
        let b = scene.create_node("transform", "b", None).unwrap();
        scene.add_child(a, b, InsertPosition::At(0), false).unwrap();
        assert_eq!(scene.parents(b), vec![a]);
        assert_eq!(scene.children(scene.world()), vec![a]);
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let mut scene = DagScene::new();
        let a = scene.create_node("transform", "a", None).unwrap();
        let b = scene.create_node("transform", "b", Some(a)).unwrap();
        assert!(matches!(
            scene.add_child(b, a, InsertPosition::Next, false),
            Err(SceneError::WouldCreateCycle { .. })
        ));
    }

    #[test]
    fn test_remove_child_at_orphans_to_world() {
        let mut scene = DagScene::new();
        let a = scene.create_node("transform", "a", None).unwrap();
        let b = scene.create_node("transform", "b", Some(a)).unwrap();
        assert_eq!(scene.remove_child_at(a, 0).unwrap(), b);
        assert_eq!(scene.parents(b), vec![scene.world()]);
        assert!(scene.remove_child_at(a, 0).is_err());
    }

    #[test]
    fn test_delete_and_restore() {
        let mut scene = DagScene::new();
        let keep = scene.create_node("transform", "keep", None).unwrap();
        let a = scene.create_node("transform", "a", None).unwrap();
        let b = scene.create_node("transform", "b", Some(a)).unwrap();
        let c = scene.create_node("mesh", "c", Some(b)).unwrap();
        let curve = scene.create_dependency_node("animCurveTL", "curve").unwrap();
        scene.connect(curve, "output", b, "translateX").unwrap();
        let before = scene.dump();

        let record = scene.delete_node(a).unwrap();
        assert_eq!(record.nodes.len(), 3);
        assert!(!scene.is_alive(c));
        assert!(scene.is_alive(keep));
        assert!(scene.is_alive(curve));
        assert!(scene.connections_to(b).is_empty());
        assert_eq!(scene.children(scene.world()), vec![keep]);

        scene.restore(&record).unwrap();
        assert_eq!(scene.dump(), before);
        assert_eq!(scene.connections_to(b).len(), 1);
        assert_eq!(scene.children(scene.world()), vec![keep, a]);
    }

    #[test]
    fn test_delete_keeps_shared_children() {
        let mut scene = DagScene::new();
        let i1 = scene.create_node("transform", "i1", None).unwrap();
        let i2 = scene.create_node("transform", "i2", None).unwrap();
        let geo = scene.create_node("mesh", "geo", Some(i1)).unwrap();
        scene.add_child(i2, geo, InsertPosition::Next, true).unwrap();

        let first = scene.delete_node(i1).unwrap();
        assert!(scene.is_alive(geo));
        assert_eq!(scene.parents(geo), vec![i2]);

        let second = scene.delete_node(i2).unwrap();
        assert!(!scene.is_alive(geo));

        scene.restore(&second).unwrap();
        scene.restore(&first).unwrap();
        assert_eq!(scene.parents(geo), vec![i1, i2]);
    }

    #[test]
    fn test_delete_twice_is_empty() {
        let mut scene = DagScene::new();
        let a = scene.create_node("transform", "a", None).unwrap();
        scene.delete_node(a).unwrap();
        assert!(scene.delete_node(a).unwrap().is_empty());
        assert!(matches!(scene.delete_node(scene.world()), Err(SceneError::CannotDeleteWorld)));
    }

    #[test]
    fn test_attributes() {
        let mut scene = DagScene::new();
        let a = scene.create_node("transform", "a", None).unwrap();
        scene.set_attribute(a, "visibility", AttrValue::Bool(false)).unwrap();
        assert_eq!(scene.attribute(a, "visibility").and_then(AttrValue::as_bool), Some(false));
        assert_eq!(scene.remove_attribute(a, "visibility").unwrap(), Some(AttrValue::Bool(false)));
        assert!(scene.attribute(a, "visibility").is_none());
    }

    #[test]
    fn test_timeline_setters() {
        let mut scene = DagScene::new();
        scene.set_min_time(-10.0).unwrap();
        scene.set_max_time(500.0).unwrap();
        assert_eq!(scene.timeline().min, -10.0);
        assert_eq!(scene.timeline().max, 500.0);
        assert!(scene.set_min_time(f64::NAN).is_err());
    }

    #[test]
    fn test_dump() {
        let mut scene = DagScene::new();
        let a = scene.create_node("transform", "a", None).unwrap();
        scene.create_node("mesh", "aShape", Some(a)).unwrap();
        assert_eq!(scene.dump(), "world (world)\n  a (transform)\n    aShape (mesh)\n");
    }
}
