//! The import job: everything from opening a file to undo and redo.
//!
//! [`ImportJob::read`] runs these steps, stopping at the first fatal error:
//!
//! 1. Check the import data and open the stage, with a session layer that
//!    holds the requested root variant selections
//! 2. Compute the time-sample multiplier and widen the timeline
//! 3. Resolve the root prim and apply variant selections
//! 4. Traverse the root's subtree into the target scene
//! 5. Report the nodes of the top imported prims and run chasers
//!
//! The read cache is cleared on every exit path. Recoverable problems are
//! returned as [`ImportWarning`]s on the report.

mod args;
mod hooks;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use ferry_math::TimeInterval;

pub use args::{time_sample_multiplier, ImportArgs, ImportData, VariantSelections};
pub use hooks::{DefaultHooks, ImportHooks};

use crate::chaser::{Chaser, ChaserContext, ChaserRegistry};
use crate::context::ReadCache;
use crate::error::{ImportError, ImportWarning};
use crate::reader::PrimReaderRegistry;
use crate::registry::NodeRegistry;
use crate::scene::{AttrValue, NodeHandle, RecordingMute, SceneError, TargetScene, Timeline};
use crate::traversal::Traversal;
use crate::undo::UndoJournal;
use crate::usd::{Layer, PrimPredicate, ScenePath, SessionLayer, Stage, StageError};

/// Registry key of the animation-cache node.
pub const ANIMATION_CACHE_KEY: &str = "usdStage";

/// Tolerance when comparing distance units.
const UNIT_EPSILON: f64 = 1e-9;

/// What a successful read produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportReport {
    /// DAG nodes of the top imported prims, in document order.
    pub added_nodes: Vec<NodeHandle>,
    /// Source paths of `added_nodes`, index for index.
    pub source_paths: Vec<ScenePath>,
    pub warnings: Vec<ImportWarning>,
}

/// One import of one file into one target scene, plus its undo and redo.
pub struct ImportJob {
    data: ImportData,
    args: ImportArgs,
    readers: PrimReaderRegistry,
    chaser_registry: ChaserRegistry,
    hooks: Box<dyn ImportHooks>,
    pull_stage: Option<Stage>,
    stage: Option<Stage>,
    anchor: Option<NodeHandle>,
    registry: NodeRegistry,
    cache: ReadCache,
    time_sample_multiplier: f64,
    chasers: Vec<(String, Box<dyn Chaser>)>,
    undo_journal: UndoJournal,
    warnings: Vec<ImportWarning>,
    report: Option<ImportReport>,
}

impl ImportJob {
    /// A job with the built-in readers and chasers.
    pub fn new(data: ImportData, args: ImportArgs) -> Self {
        Self {
            data,
            args,
            readers: PrimReaderRegistry::with_builtins(),
            chaser_registry: ChaserRegistry::with_builtins(),
            hooks: Box::new(DefaultHooks),
            pull_stage: None,
            stage: None,
            anchor: None,
            registry: NodeRegistry::new(),
            cache: ReadCache::new(),
            time_sample_multiplier: 1.0,
            chasers: Vec::new(),
            undo_journal: UndoJournal::new(),
            warnings: Vec::new(),
            report: None,
        }
    }

    /// Imports from an already open stage instead of opening the file.
    /// A population mask still reopens the file.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.pull_stage = Some(stage);
        self
    }

    pub fn with_hooks(mut self, hooks: impl ImportHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn data(&self) -> &ImportData {
        &self.data
    }

    pub fn args(&self) -> &ImportArgs {
        &self.args
    }

    pub fn readers_mut(&mut self) -> &mut PrimReaderRegistry {
        &mut self.readers
    }

    pub fn chaser_registry_mut(&mut self) -> &mut ChaserRegistry {
        &mut self.chaser_registry
    }

    /// The DAG node imported prims go under; `None` means the world.
    pub fn anchor(&self) -> Option<NodeHandle> {
        self.anchor
    }

    pub fn set_anchor(&mut self, anchor: Option<NodeHandle>) {
        self.anchor = anchor;
    }

    pub fn time_sample_multiplier(&self) -> f64 {
        self.time_sample_multiplier
    }

    pub fn node_registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn chaser_count(&self) -> usize {
        self.chasers.len()
    }

    /// The stage of the last successful read.
    pub fn stage(&self) -> Option<&Stage> {
        self.stage.as_ref()
    }

    pub fn last_report(&self) -> Option<&ImportReport> {
        self.report.as_ref()
    }

    /// Runs the import. `reset_xform` makes every imported transform ignore
    /// its parents.
    pub fn read(&mut self, scene: &mut dyn TargetScene, reset_xform: bool) -> Result<ImportReport, ImportError> {
        let mut scene = RecordingMute::new(scene);
        self.warnings.clear();
        let result = self.do_read(&mut *scene, reset_xform);
        self.cache.clear();

        match &result {
            Ok(report) => {
                log::info!(
                    "Imported '{}': {} top node(s), {} registered, {} warning(s)",
                    self.data.filename.display(),
                    report.added_nodes.len(),
                    self.registry.len(),
                    report.warnings.len()
                );
                self.report = Some(report.clone());
            }
            Err(e) => log::error!("Import of '{}' failed: {e}", self.data.filename.display()),
        }
        result
    }

    fn do_read(&mut self, scene: &mut dyn TargetScene, reset_xform: bool) -> Result<ImportReport, ImportError> {
        if self.data.is_empty() {
            return Err(ImportError::EmptyImportData);
        }
        let mut stage = self.open_stage()?;

        let multiplier = time_sample_multiplier(scene.time_unit_fps(), stage.time_codes_per_second());
        self.time_sample_multiplier = multiplier;
        log::debug!("Time sample multiplier {multiplier}");

        if let Some(interval) = self.args.time_interval.filter(TimeInterval::is_inverted) {
            return Err(ImportError::InvalidFrameRange {
                min: interval.min,
                max: interval.max,
            });
        }
        let mut scene = TimelineRestore::new(scene, self.args.preserve_timeline);
        self.expand_timeline(&stage, &mut *scene, multiplier);

        let root_path = self.resolve_root(&stage)?;
        select_variants(&mut stage, &root_path, &self.data.root_variant_selections, &mut self.warnings);
        for (path, selections) in &self.data.prim_variant_selections {
            match ScenePath::parse(path) {
                Ok(path) => select_variants(&mut stage, &path, selections, &mut self.warnings),
                Err(_) => push_warning(&mut self.warnings, ImportWarning::InvalidVariantPrim(path.clone())),
            }
        }

        if stage.has_authored_meters_per_unit()
            && (stage.meters_per_unit() - scene.meters_per_unit()).abs() > UNIT_EPSILON
        {
            let warning = ImportWarning::DistanceUnit {
                stage: stage.meters_per_unit(),
                scene: scene.meters_per_unit(),
            };
            push_warning(&mut self.warnings, warning);
        }

        if self.args.use_as_animation_cache {
            match create_cache_node(&mut *scene, &self.data.filename.display().to_string()) {
                Ok(node) => self.registry.register(ANIMATION_CACHE_KEY, node),
                Err(e) => push_warning(&mut self.warnings, ImportWarning::AnimationCacheNode(e.to_string())),
            }
        }

        let anchor = self.anchor.unwrap_or_else(|| scene.world());
        self.registry.register(ScenePath::root().as_str(), anchor);

        let mut predicate = PrimPredicate::DEFAULT;
        self.hooks.pre_import(&mut predicate);

        let root = stage
            .prim_at(&root_path)
            .ok_or_else(|| StageError::NoSuchPrim(root_path.clone()))?;
        {
            let mut traversal = Traversal::new(
                &stage,
                &self.args,
                &self.readers,
                self.hooks.as_mut(),
                &mut self.registry,
                &mut self.cache,
                multiplier,
                reset_xform,
            );
            traversal.run(root, predicate, &mut *scene)?;
            if self.args.import_instances {
                traversal.remove_prototypes(&mut *scene)?;
            }
        }

        let top_paths: Vec<ScenePath> = if root.is_pseudo_root() {
            root.children(predicate).iter().map(|p| p.path().clone()).collect()
        } else {
            vec![root_path.clone()]
        };
        let mut added_nodes = Vec::new();
        let mut source_paths = Vec::new();
        for path in top_paths {
            if let Some(node) = self.registry.get(path.as_str()).filter(|n| scene.is_dag_node(*n)) {
                added_nodes.push(node);
                source_paths.push(path);
            }
        }

        self.run_chasers(&stage, predicate, &added_nodes, &source_paths, &mut *scene)?;

        drop(scene);
        self.stage = Some(stage);
        Ok(ImportReport {
            added_nodes,
            source_paths,
            warnings: self.warnings.clone(),
        })
    }

    fn open_stage(&mut self) -> Result<Stage, ImportError> {
        let mask = self.population_mask();
        if mask.is_empty() {
            if let Some(stage) = &self.pull_stage {
                return Ok(stage.clone());
            }
        }

        let layer = Layer::open(&self.data.filename)?;
        let session = SessionLayer::for_variant_selections(layer.model_name(), &self.data.root_variant_selections);
        let stage = if mask.is_empty() {
            Stage::open_layer(layer, session)
        } else {
            Stage::open_masked(layer, session, mask)
        };
        log::info!("Opened stage '{}'", self.data.filename.display());
        Ok(stage)
    }

    fn population_mask(&mut self) -> Vec<ScenePath> {
        let mut mask = Vec::new();
        for text in &self.data.population_mask {
            match ScenePath::parse(text) {
                Ok(path) => mask.push(path),
                Err(_) => push_warning(&mut self.warnings, ImportWarning::InvalidMaskPath(text.clone())),
            }
        }
        mask
    }

    /// Widens the visible range to cover the requested (or authored) range.
    fn expand_timeline(&self, stage: &Stage, scene: &mut dyn TargetScene, multiplier: f64) {
        let interval = match self.args.time_interval {
            Some(interval) if interval.is_finite() => interval,
            _ if stage.has_authored_time_code_range() => {
                TimeInterval::new(stage.start_time_code(), stage.end_time_code())
            }
            _ => return,
        };
        let frames = interval.scaled(multiplier);
        let timeline = scene.timeline();
        if frames.min < timeline.min {
            if let Err(e) = scene.set_min_time(frames.min) {
                log::error!("Could not set the timeline start: {e}");
            }
        }
        if frames.max > timeline.max {
            if let Err(e) = scene.set_max_time(frames.max) {
                log::error!("Could not set the timeline end: {e}");
            }
        }
    }

    fn resolve_root(&mut self, stage: &Stage) -> Result<ScenePath, ImportError> {
        let text = self.data.root_prim_path.trim();
        if text.is_empty() {
            return stage
                .default_prim()
                .map(|prim| prim.path().clone())
                .ok_or(ImportError::NoDefaultPrim);
        }
        match ScenePath::parse(text).ok().filter(|path| stage.prim_at(path).is_some()) {
            Some(path) => Ok(path),
            None => {
                push_warning(&mut self.warnings, ImportWarning::UnresolvedRootPrim(text.to_string()));
                Ok(ScenePath::root())
            }
        }
    }

    fn run_chasers(
        &mut self,
        stage: &Stage,
        predicate: PrimPredicate,
        added_nodes: &[NodeHandle],
        source_paths: &[ScenePath],
        scene: &mut dyn TargetScene,
    ) -> Result<(), ImportError> {
        self.chasers.clear();
        let context = ChaserContext {
            predicate,
            stage,
            added_nodes,
            source_paths,
            args: &self.args,
        };
        for name in &self.args.chaser_names {
            match self.chaser_registry.create(name, &context) {
                Some(chaser) => self.chasers.push((name.clone(), chaser)),
                None => push_warning(&mut self.warnings, ImportWarning::MissingChaser(name.clone())),
            }
        }
        if self.chasers.is_empty() {
            return Ok(());
        }

        let map: BTreeMap<String, NodeHandle> = self
            .registry
            .iter()
            .filter(|(key, node)| *key != ScenePath::root().as_str() && scene.is_dag_node(*node))
            .map(|(key, node)| (key.to_string(), node))
            .collect();
        for (_, chaser) in &mut self.chasers {
            chaser.set_source_to_target_map(&map);
        }
        for (name, chaser) in &mut self.chasers {
            if !chaser.post_import(scene) {
                return Err(ImportError::ChaserFailed(name.clone()));
            }
            log::debug!("Chaser '{name}' done");
        }
        Ok(())
    }

    /// Undoes every chaser, then deletes what the import created. A chaser
    /// failure is reported after the deletions have run.
    pub fn undo(&mut self, scene: &mut dyn TargetScene) -> Result<(), ImportError> {
        let mut scene = RecordingMute::new(scene);
        let mut failed = None;
        for (name, chaser) in &mut self.chasers {
            if !chaser.undo(&mut *scene) {
                log::error!("Chaser '{name}' failed to undo");
                failed.get_or_insert_with(|| name.clone());
            }
        }

        self.undo_journal.seed(&self.registry, self.anchor, &*scene);
        self.undo_journal.do_it(&mut *scene)?;
        log::info!("Undo removed {} node(s)", self.undo_journal.nodes().len());

        match failed {
            Some(name) => Err(ImportError::ChaserUndo(name)),
            None => Ok(()),
        }
    }

    /// Restores what [`ImportJob::undo`] deleted, then redoes every chaser.
    pub fn redo(&mut self, scene: &mut dyn TargetScene) -> Result<(), ImportError> {
        let mut scene = RecordingMute::new(scene);
        self.undo_journal.undo_it(&mut *scene)?;
        for (name, chaser) in &mut self.chasers {
            if !chaser.redo(&mut *scene) {
                return Err(ImportError::ChaserRedo(name.clone()));
            }
        }
        Ok(())
    }
}

fn push_warning(warnings: &mut Vec<ImportWarning>, warning: ImportWarning) {
    log::warn!("{warning}");
    warnings.push(warning);
}

/// Applies the selections that name an existing set and variant; the rest
/// are skipped with a warning.
fn select_variants(
    stage: &mut Stage,
    path: &ScenePath,
    selections: &BTreeMap<String, String>,
    warnings: &mut Vec<ImportWarning>,
) {
    for (set, selection) in selections {
        let warning = match stage.prim_at(path) {
            None => Some(ImportWarning::InvalidVariantPrim(path.to_string())),
            Some(prim) => {
                let variant_set = prim.variant_set(set);
                if !variant_set.is_valid() || variant_set.variant_names().is_empty() {
                    Some(ImportWarning::InvalidVariantSet {
                        path: path.clone(),
                        set: set.clone(),
                    })
                } else if !variant_set.has_variant(selection) {
                    Some(ImportWarning::InvalidVariantSelection {
                        path: path.clone(),
                        set: set.clone(),
                        selection: selection.clone(),
                    })
                } else if variant_set.selection() == Some(selection.as_str()) {
                    continue;
                } else {
                    None
                }
            }
        };
        match warning {
            Some(warning) => push_warning(warnings, warning),
            None => {
                if let Err(e) = stage.set_variant_selection(path, set, selection) {
                    log::warn!("Could not select {set}={selection} on '{path}': {e}");
                }
            }
        }
    }
}

fn create_cache_node(scene: &mut dyn TargetScene, file_path: &str) -> Result<NodeHandle, SceneError> {
    let node = scene.create_dependency_node("usdStage", ANIMATION_CACHE_KEY)?;
    scene.set_attribute(node, "filePath", AttrValue::String(file_path.to_string()))?;
    Ok(node)
}

/// Puts the scene's timeline back as it was when dropped, unless asked to
/// keep it. Failures are logged.
struct TimelineRestore<'a> {
    scene: &'a mut dyn TargetScene,
    original: Timeline,
    preserve: bool,
}

impl<'a> TimelineRestore<'a> {
    fn new(scene: &'a mut dyn TargetScene, preserve: bool) -> Self {
        let original = scene.timeline();
        Self {
            scene,
            original,
            preserve,
        }
    }
}

impl Drop for TimelineRestore<'_> {
    fn drop(&mut self) {
        if self.preserve || self.scene.timeline() == self.original {
            return;
        }
        let original = self.original;
        let results = [
            self.scene.set_min_time(original.min),
            self.scene.set_max_time(original.max),
            self.scene.set_animation_start_time(original.animation_start),
            self.scene.set_animation_end_time(original.animation_end),
        ];
        for e in results.into_iter().filter_map(Result::err) {
            log::error!("Could not restore the timeline: {e}");
        }
    }
}

impl<'a> Deref for TimelineRestore<'a> {
    type Target = dyn TargetScene + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.scene
    }
}

impl<'a> DerefMut for TimelineRestore<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.scene
    }
}
