//! The walk that turns a prim subtree into scene nodes.
//!
//! Every selected root gets its own pre-and-post visit walk. Prims are read
//! on the way down; readers that asked for it get a second call on the way
//! back up. When instances are built, an instance is only handled on its
//! post-visit: its prototype is materialized once, then a new container
//! node shares the prototype's child nodes.

use std::collections::HashMap;

use crate::context::{NodeTrackingScope, ReadCache, ReaderContext};
use crate::error::ImportError;
use crate::job::{ImportArgs, ImportHooks};
use crate::reader::{xformable, PrimReader, PrimReaderRegistry, ReaderArgs};
use crate::registry::NodeRegistry;
use crate::scene::{InsertPosition, TargetScene};
use crate::usd::{Prim, PrimPredicate, PrimRange, ScenePath, Stage};

/// Readers waiting for their post-subtree call, keyed by prim path.
type PendingReads = HashMap<ScenePath, Box<dyn PrimReader>>;

pub(crate) struct Traversal<'j> {
    stage: &'j Stage,
    args: &'j ImportArgs,
    readers: &'j PrimReaderRegistry,
    hooks: &'j mut dyn ImportHooks,
    registry: &'j mut NodeRegistry,
    cache: &'j mut ReadCache,
    time_sample_multiplier: f64,
    force_reset_xform: bool,
    /// Selects prototype content; set by [`Traversal::run`].
    prototype_predicate: PrimPredicate,
}

impl<'j> Traversal<'j> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        stage: &'j Stage,
        args: &'j ImportArgs,
        readers: &'j PrimReaderRegistry,
        hooks: &'j mut dyn ImportHooks,
        registry: &'j mut NodeRegistry,
        cache: &'j mut ReadCache,
        time_sample_multiplier: f64,
        force_reset_xform: bool,
    ) -> Self {
        Self {
            stage,
            args,
            readers,
            hooks,
            registry,
            cache,
            time_sample_multiplier,
            force_reset_xform,
            prototype_predicate: PrimPredicate::DEFAULT,
        }
    }

    fn context(&mut self) -> ReaderContext<'_> {
        let mut context = ReaderContext::new(&mut *self.registry, &mut *self.cache);
        context.set_time_sample_multiplier(self.time_sample_multiplier);
        context.set_force_reset_xform(self.force_reset_xform);
        context
    }

    /// Imports `root` and its selected descendants. An empty selection
    /// fails the import.
    pub(crate) fn run(
        &mut self,
        root: Prim<'_>,
        predicate: PrimPredicate,
        scene: &mut dyn TargetScene,
    ) -> Result<(), ImportError> {
        let build_instances = self.args.import_instances;
        self.prototype_predicate = PrimPredicate {
            instance_proxies: false,
            ..predicate
        };
        let walk_predicate = if build_instances {
            predicate
        } else {
            predicate.traverse_instance_proxies()
        };

        let mut roots = PrimRange::new(root, walk_predicate);
        if roots.is_empty() {
            return Err(ImportError::EmptyRange(root.path().clone()));
        }

        while let Some(visit) = roots.next() {
            let prim = visit.prim;
            if prim == root && self.hooks.skip_root_prim(prim.is_pseudo_root()) {
                continue;
            }
            roots.prune_children();
            log::debug!("Importing root '{}'", prim.path());
            self.walk(prim, walk_predicate, build_instances, scene)?;
        }
        Ok(())
    }

    fn walk(
        &mut self,
        start: Prim<'_>,
        predicate: PrimPredicate,
        build_instances: bool,
        scene: &mut dyn TargetScene,
    ) -> Result<(), ImportError> {
        let mut range = PrimRange::pre_and_post_visit(start, predicate);
        let mut pending = PendingReads::new();

        while let Some(visit) = range.next() {
            let prim = visit.prim;
            if build_instances && prim.is_instance() {
                if visit.is_post_visit {
                    self.import_instance(prim, scene)?;
                }
                continue;
            }

            if visit.is_post_visit {
                if let Some(mut reader) = pending.remove(prim.path()) {
                    let args = ReaderArgs::new(prim, self.args);
                    let force_reset_xform = self.force_reset_xform;
                    let mut context = self.context();
                    context.set_force_reset_xform(force_reset_xform);
                    reader.post_read_subtree(&args, &mut context, scene);
                }
                continue;
            }

            if self.read_prim(prim, &mut pending, scene) {
                log::debug!("Pruning children of '{}'", prim.path());
                range.prune_children();
            }
        }
        Ok(())
    }

    /// Reads one prim. Returns whether its children should be skipped.
    fn read_prim(&mut self, prim: Prim<'_>, pending: &mut PendingReads, scene: &mut dyn TargetScene) -> bool {
        if prim.is_pseudo_root() {
            return false;
        }
        let args = ReaderArgs::new(prim, self.args);
        let readers = self.readers;
        let force_reset_xform = self.force_reset_xform;

        let mut context = ReaderContext::new(&mut *self.registry, &mut *self.cache);
        context.set_time_sample_multiplier(self.time_sample_multiplier);
        context.set_force_reset_xform(force_reset_xform);

        if self.hooks.override_prim_reader(&args, &mut context, scene) {
            return context.prune_children();
        }
        let Some(mut reader) = readers.find_or_fallback(&args) else {
            log::debug!("No reader for '{}' ({:?})", prim.path(), prim.type_name());
            return false;
        };
        {
            let mut scope = NodeTrackingScope::new(&mut context);
            scope.set_force_reset_xform(force_reset_xform);
            reader.read(&args, &mut scope, scene);
            log::debug!("Read '{}' into {} node(s)", prim.path(), scope.tracked_nodes().len());
        }
        if reader.has_post_read_subtree() {
            pending.insert(prim.path().clone(), reader);
        }

        for schema in prim.api_schemas() {
            if let Some(schema_reader) = readers.schema_reader(schema) {
                schema_reader.read(&args, &mut context, scene);
            }
        }
        context.prune_children()
    }

    /// Builds an instance container that shares its prototype's nodes.
    fn import_instance(&mut self, prim: Prim<'_>, scene: &mut dyn TargetScene) -> Result<(), ImportError> {
        let Some(prototype) = prim.prototype() else {
            log::warn!("Instance '{}' has no prototype", prim.path());
            return Ok(());
        };
        if !self.registry.contains(prototype.path().as_str()) {
            self.import_prototype(prototype, scene)?;
        }
        let Some(prototype_node) = self.registry.get(prototype.path().as_str()) else {
            return Ok(());
        };

        let parent = self
            .registry
            .lookup(&prim.path().parent_or_root(), true)
            .unwrap_or_else(|| scene.world());
        let node = match scene.create_node("transform", prim.name(), Some(parent)) {
            Ok(node) => node,
            Err(e) => {
                log::error!("Could not create instance '{}': {e}", prim.path());
                return Ok(());
            }
        };
        self.registry.register(prim.path().as_str(), node);
        for child in scene.children(prototype_node) {
            if let Err(e) = scene.add_child(node, child, InsertPosition::Next, true) {
                log::error!("Could not share prototype child with '{}': {e}", prim.path());
                return Ok(());
            }
        }
        log::debug!("Instanced '{}' from '{}'", prim.path(), prototype.path());

        let args = ReaderArgs::new(prim, self.args);
        let mut context = self.context();
        xformable::read_xformable(&args, &mut context, scene, node);
        Ok(())
    }

    /// Materializes a prototype under a container node registered at the
    /// prototype's path. Nested instances are always built as instances.
    fn import_prototype(&mut self, prototype: Prim<'_>, scene: &mut dyn TargetScene) -> Result<(), ImportError> {
        let container = scene.create_node("transform", prototype.name(), None)?;
        self.registry.register(prototype.path().as_str(), container);
        log::debug!("Materializing prototype '{}'", prototype.path());

        let predicate = self.prototype_predicate;
        for child in prototype.children(predicate) {
            self.walk(child, predicate, true, scene)?;
        }
        Ok(())
    }

    /// Detaches and deletes every materialized prototype container. The
    /// prototypes' child nodes live on under the instances that share them.
    pub(crate) fn remove_prototypes(&mut self, scene: &mut dyn TargetScene) -> Result<(), ImportError> {
        for prototype in self.stage.prototypes() {
            let Some(container) = self.registry.erase(prototype.path().as_str()) else {
                continue;
            };
            while scene.child_count(container) > 0 {
                scene.remove_child_at(container, 0)?;
            }
            scene.delete_node(container)?;
            log::debug!("Removed prototype container for '{}'", prototype.path());
        }
        Ok(())
    }
}
