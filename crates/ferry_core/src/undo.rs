//! The deletion journal behind an import's undo and redo.

use crate::registry::NodeRegistry;
use crate::scene::{DeleteRecord, NodeHandle, SceneError, TargetScene};

/// An ordered list of node deletions, seeded once from a [`NodeRegistry`].
///
/// [`UndoJournal::do_it`] performs the deletions and [`UndoJournal::undo_it`]
/// restores them. Both are no-ops when the journal is already in that state.
#[derive(Debug, Default)]
pub struct UndoJournal {
    seeded: bool,
    nodes: Vec<NodeHandle>,
    records: Vec<DeleteRecord>,
    applied: bool,
}

impl UndoJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// True while the deletions are in effect.
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Nodes the journal deletes, in registry order.
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Collects the registered nodes to delete. With an anchor, only DAG
    /// nodes below it qualify; without one, only DAG nodes that have a
    /// parent. Dependency nodes always qualify. Later calls do nothing.
    pub fn seed(&mut self, registry: &NodeRegistry, anchor: Option<NodeHandle>, scene: &dyn TargetScene) {
        if self.seeded {
            return;
        }
        self.seeded = true;

        for (key, node) in registry.iter() {
            if Some(node) == anchor || self.nodes.contains(&node) {
                continue;
            }
            let wanted = !scene.is_dag_node(node)
                || match anchor {
                    Some(anchor) => scene.is_descendant_of(node, anchor),
                    None => scene.parent_count(node) > 0,
                };
            if wanted {
                self.nodes.push(node);
            } else {
                log::debug!("Undo leaves '{key}' ({node:?}) alone");
            }
        }
        log::debug!("Undo journal seeded with {} nodes", self.nodes.len());
    }

    /// Deletes the journal's nodes.
    pub fn do_it(&mut self, scene: &mut dyn TargetScene) -> Result<(), SceneError> {
        if self.applied {
            return Ok(());
        }
        self.records.clear();
        for node in &self.nodes {
            let record = scene.delete_node(*node)?;
            self.records.push(record);
        }
        self.applied = true;
        Ok(())
    }

    /// Restores everything [`UndoJournal::do_it`] deleted.
    pub fn undo_it(&mut self, scene: &mut dyn TargetScene) -> Result<(), SceneError> {
        if !self.applied {
            return Ok(());
        }
        for record in self.records.iter().rev() {
            scene.restore(record)?;
        }
        self.records.clear();
        self.applied = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::DagScene;

    fn build() -> (DagScene, NodeRegistry, NodeHandle, NodeHandle, NodeHandle) {
        let mut scene = DagScene::new();
        let existing = scene.create_node("transform", "existing", None).unwrap();
        let a = scene.create_node("transform", "a", None).unwrap();
        let b = scene.create_node("transform", "b", Some(a)).unwrap();
        let mut registry = NodeRegistry::new();
        registry.register("/", scene.world());
        registry.register("/A", a);
        registry.register("/A/B", b);
        (scene, registry, existing, a, b)
    }

    #[test]
    fn test_seed_without_anchor_skips_world() {
        let (mut scene, mut registry, _, a, b) = build();
        let curve = scene.create_dependency_node("animCurveTL", "c").unwrap();
        registry.register("/A.translateX", curve);

        let mut journal = UndoJournal::new();
        journal.seed(&registry, None, &scene);
        assert!(journal.is_seeded());
        assert!(!journal.nodes().contains(&scene.world()));
        assert!(journal.nodes().contains(&a));
        assert!(journal.nodes().contains(&b));
        assert!(journal.nodes().contains(&curve));
    }

    #[test]
    fn test_seed_with_anchor() {
        let (mut scene, mut registry, _, a, b) = build();
        let anchor = scene.create_node("transform", "anchor", None).unwrap();
        let c = scene.create_node("transform", "c", Some(anchor)).unwrap();
        registry.register("/", anchor);
        registry.register("/C", c);

        let mut journal = UndoJournal::new();
        journal.seed(&registry, Some(anchor), &scene);
        assert_eq!(journal.nodes(), &[c]);
        assert!(!journal.nodes().contains(&a));
        assert!(!journal.nodes().contains(&b));
    }

    #[test]
    fn test_seed_happens_once() {
        let (scene, mut registry, _, a, _) = build();
        let mut journal = UndoJournal::new();
        journal.seed(&registry, None, &scene);
        let seeded = journal.nodes().to_vec();
        registry.erase("/A");
        journal.seed(&registry, None, &scene);
        assert_eq!(journal.nodes(), seeded.as_slice());
        assert!(journal.nodes().contains(&a));
    }

    #[test]
    fn test_delete_and_restore() {
        let (mut scene, registry, existing, a, b) = build();
        let before = scene.dump();
        let mut journal = UndoJournal::new();
        journal.seed(&registry, None, &scene);

        journal.do_it(&mut scene).unwrap();
        assert!(journal.is_applied());
        assert!(!scene.is_alive(a));
        assert!(!scene.is_alive(b));
        assert!(scene.is_alive(existing));

        // Idempotent while applied
        journal.do_it(&mut scene).unwrap();

        journal.undo_it(&mut scene).unwrap();
        assert!(!journal.is_applied());
        assert!(scene.is_alive(a) && scene.is_alive(b));
        assert_eq!(scene.dump(), before);

        journal.do_it(&mut scene).unwrap();
        assert!(!scene.is_alive(a));
    }
}
