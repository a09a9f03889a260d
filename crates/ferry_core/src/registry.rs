//! Source path to target node bookkeeping for one import.

use std::collections::BTreeMap;

use crate::scene::NodeHandle;
use crate::usd::ScenePath;

/// Every node an import created, keyed by the source path it came from.
///
/// Keys are prim paths, plus a few extra keys such as `"usdStage"` for the
/// animation-cache node and `"<prim path>.<attribute>"` for animation
/// curves. Iteration is sorted by key.
#[derive(Clone, Debug, Default)]
pub struct NodeRegistry {
    entries: BTreeMap<String, NodeHandle>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the node for `key`.
    pub fn register(&mut self, key: impl Into<String>, node: NodeHandle) {
        let key = key.into();
        if let Some(previous) = self.entries.insert(key.clone(), node) {
            if previous != node {
                log::debug!("Registry entry '{key}' replaced ({previous:?} -> {node:?})");
            }
        }
    }

    /// The node registered for `path`; with `find_ancestors`, the node of
    /// the nearest registered ancestor.
    pub fn lookup(&self, path: &ScenePath, find_ancestors: bool) -> Option<NodeHandle> {
        if !find_ancestors {
            return self.get(path.as_str());
        }
        path.ancestors().find_map(|p| self.get(p.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<NodeHandle> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn erase(&mut self, key: &str) -> Option<NodeHandle> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeHandle)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ScenePath {
        ScenePath::parse(s).unwrap()
    }

    fn node(raw: u32) -> NodeHandle {
        NodeHandle::from_raw(raw)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = NodeRegistry::new();
        registry.register("/World", node(1));
        assert_eq!(registry.lookup(&path("/World"), false), Some(node(1)));
        assert_eq!(registry.lookup(&path("/World/Cube"), false), None);
    }

    #[test]
    fn test_register_overwrites() {
        let mut registry = NodeRegistry::new();
        registry.register("/World", node(1));
        registry.register("/World", node(2));
        assert_eq!(registry.get("/World"), Some(node(2)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_ancestors() {
        let mut registry = NodeRegistry::new();
        registry.register("/", node(0));
        registry.register("/World", node(1));
        assert_eq!(registry.lookup(&path("/World/A/B"), true), Some(node(1)));
        assert_eq!(registry.lookup(&path("/Other"), true), Some(node(0)));

        registry.erase("/");
        assert_eq!(registry.lookup(&path("/Other"), true), None);
    }

    #[test]
    fn test_iteration_is_sorted() {
        let mut registry = NodeRegistry::new();
        registry.register("/World/B", node(3));
        registry.register("/World", node(1));
        registry.register("/World/A", node(2));
        let keys: Vec<&str> = registry.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["/World", "/World/A", "/World/B"]);
    }
}
