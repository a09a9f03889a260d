//! Per-prim reader state and the import-scoped read cache.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::registry::NodeRegistry;
use crate::scene::NodeHandle;
use crate::usd::ScenePath;

/// Memoized work shared by readers during one import. Cleared at the end of
/// every read so nothing leaks into the next import.
#[derive(Debug, Default)]
pub struct ReadCache {
    file_hashes: HashMap<PathBuf, String>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex SHA-256 of a file's contents, computed once per import.
    pub fn file_hash(&mut self, path: &Path) -> Option<String> {
        if let Some(hash) = self.file_hashes.get(path) {
            return Some(hash.clone());
        }
        match std::fs::read(path) {
            Ok(bytes) => {
                let hash = hex::encode(Sha256::digest(&bytes));
                self.file_hashes.insert(path.to_path_buf(), hash.clone());
                Some(hash)
            }
            Err(e) => {
                log::warn!("Could not hash '{}': {e}", path.display());
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.file_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_hashes.is_empty()
    }

    pub fn clear(&mut self) {
        self.file_hashes.clear();
    }
}

/// State handed to a prim reader for one traversal step.
///
/// Registration goes through to the job's [`NodeRegistry`]. While tracking
/// is active every registered node is also appended to a side list.
pub struct ReaderContext<'r> {
    registry: &'r mut NodeRegistry,
    cache: &'r mut ReadCache,
    prune_children: bool,
    time_sample_multiplier: f64,
    force_reset_xform: bool,
    tracking: bool,
    tracked: Vec<NodeHandle>,
}

impl<'r> ReaderContext<'r> {
    pub fn new(registry: &'r mut NodeRegistry, cache: &'r mut ReadCache) -> Self {
        Self {
            registry,
            cache,
            prune_children: false,
            time_sample_multiplier: 1.0,
            force_reset_xform: false,
            tracking: false,
            tracked: Vec::new(),
        }
    }

    /// The node registered for `path`, optionally falling back to the
    /// nearest registered ancestor.
    pub fn node(&self, path: &ScenePath, find_ancestors: bool) -> Option<NodeHandle> {
        self.registry.lookup(path, find_ancestors)
    }

    /// Registers a node created by a reader.
    pub fn register_node(&mut self, key: impl Into<String>, node: NodeHandle) {
        self.registry.register(key, node);
        if self.tracking {
            self.tracked.push(node);
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        self.registry
    }

    pub fn cache(&mut self) -> &mut ReadCache {
        self.cache
    }

    /// Starts collecting registered nodes. Restarting an active scope is a
    /// programming error; it is logged and the list starts over.
    pub fn start_tracking(&mut self) {
        if self.tracking {
            log::error!("Node tracking started while already active; restarting the list");
        }
        self.tracking = true;
        self.tracked.clear();
    }

    /// Stops collecting. The list stays readable.
    pub fn stop_tracking(&mut self) {
        self.tracking = false;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn tracked_nodes(&self) -> &[NodeHandle] {
        &self.tracked
    }

    pub fn set_prune_children(&mut self, prune: bool) {
        self.prune_children = prune;
    }

    pub fn prune_children(&self) -> bool {
        self.prune_children
    }

    pub fn set_time_sample_multiplier(&mut self, multiplier: f64) {
        self.time_sample_multiplier = multiplier;
    }

    pub fn time_sample_multiplier(&self) -> f64 {
        self.time_sample_multiplier
    }

    pub fn set_force_reset_xform(&mut self, reset: bool) {
        self.force_reset_xform = reset;
    }

    pub fn force_reset_xform(&self) -> bool {
        self.force_reset_xform
    }
}

/// Tracks new nodes for exactly one reader call: tracking starts on
/// construction and stops on drop.
pub struct NodeTrackingScope<'c, 'r> {
    context: &'c mut ReaderContext<'r>,
}

impl<'c, 'r> NodeTrackingScope<'c, 'r> {
    pub fn new(context: &'c mut ReaderContext<'r>) -> Self {
        context.start_tracking();
        Self { context }
    }
}

impl Drop for NodeTrackingScope<'_, '_> {
    fn drop(&mut self) {
        self.context.stop_tracking();
    }
}

impl<'r> Deref for NodeTrackingScope<'_, 'r> {
    type Target = ReaderContext<'r>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl<'r> DerefMut for NodeTrackingScope<'_, 'r> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(raw: u32) -> NodeHandle {
        NodeHandle::from_raw(raw)
    }

    #[test]
    fn test_defaults() {
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        let ctx = ReaderContext::new(&mut registry, &mut cache);
        assert!(!ctx.prune_children());
        assert!(!ctx.force_reset_xform());
        assert_eq!(ctx.time_sample_multiplier(), 1.0);
        assert!(ctx.tracked_nodes().is_empty());
    }

    #[test]
    fn test_register_goes_to_registry() {
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        {
            let mut ctx = ReaderContext::new(&mut registry, &mut cache);
            ctx.register_node("/A", node(1));
            assert_eq!(ctx.node(&ScenePath::parse("/A/B").unwrap(), true), Some(node(1)));
            assert!(ctx.tracked_nodes().is_empty());
        }
        assert_eq!(registry.get("/A"), Some(node(1)));
    }

    #[test]
    fn test_tracking_scope() {
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        let mut ctx = ReaderContext::new(&mut registry, &mut cache);
        {
            let mut scope = NodeTrackingScope::new(&mut ctx);
            scope.register_node("/A", node(1));
            scope.register_node("/A.translateX", node(2));
            assert!(scope.is_tracking());
        }
        assert!(!ctx.is_tracking());
        assert_eq!(ctx.tracked_nodes(), &[node(1), node(2)]);

        // Not tracked once the scope ended
        ctx.register_node("/B", node(3));
        assert_eq!(ctx.tracked_nodes().len(), 2);
    }

    #[test]
    fn test_restart_tracking_clears_list() {
        let mut registry = NodeRegistry::new();
        let mut cache = ReadCache::new();
        let mut ctx = ReaderContext::new(&mut registry, &mut cache);
        ctx.start_tracking();
        ctx.register_node("/A", node(1));
        ctx.start_tracking();
        assert!(ctx.tracked_nodes().is_empty());
        ctx.register_node("/B", node(2));
        assert_eq!(ctx.tracked_nodes(), &[node(2)]);
    }

    #[test]
    fn test_file_hash_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tex.png");
        std::fs::write(&file, b"abc").unwrap();

        let mut cache = ReadCache::new();
        let first = cache.file_hash(&file).unwrap();
        assert_eq!(first, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        std::fs::write(&file, b"other pixels").unwrap();
        assert_eq!(cache.file_hash(&file).as_deref(), Some(first.as_str()));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_ne!(cache.file_hash(&file).as_deref(), Some(first.as_str()));
        assert!(cache.file_hash(&dir.path().join("missing.png")).is_none());
    }
}
