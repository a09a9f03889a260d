//! The composed stage: layers plus session overrides, resolved into a tree
//! of prims.
//!
//! Composition is evaluated eagerly when the stage is opened and again
//! whenever a variant selection changes. Each prim is composed from an
//! ordered list of sources, strongest first: the local spec, the bodies of
//! its selected variants, then the targets of its references (internal or
//! in another `.usda` file).
//!
//! An `instanceable` prim with references becomes an instance. Instances
//! with the same references and variant selections share one prototype,
//! addressable as `/__Prototype_N` and numbered in discovery order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::layer::{Layer, SessionLayer};
use super::parser::ParseError;
use super::types::{Attribute, PrimSpec, Reference, Specifier};
use super::ScenePath;

/// Composition arcs deeper than this are treated as a cycle.
const MAX_COMPOSITION_DEPTH: usize = 32;

/// Errors from opening or editing a stage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{identifier}': {source}")]
    Parse {
        identifier: String,
        #[source]
        source: ParseError,
    },

    #[error("No prim at path '{0}'")]
    NoSuchPrim(ScenePath),
}

/// A variant set as seen on a composed prim.
#[derive(Clone, Debug, PartialEq)]
pub struct VariantSetInfo {
    pub name: String,
    pub variants: Vec<String>,
    pub selection: Option<String>,
}

#[derive(Clone, Debug)]
struct PrimEntry {
    name: String,
    type_name: Option<String>,
    specifier: Specifier,
    active: bool,
    is_abstract: bool,
    kind: Option<String>,
    attributes: Vec<Attribute>,
    api_schemas: Vec<String>,
    variant_sets: Vec<VariantSetInfo>,
    children: Vec<String>,
    prototype: Option<ScenePath>,
    instance_proxy: bool,
    in_prototype: bool,
}

impl PrimEntry {
    fn pseudo_root(children: Vec<String>) -> Self {
        Self {
            name: String::new(),
            type_name: None,
            specifier: Specifier::Def,
            active: true,
            is_abstract: false,
            kind: None,
            attributes: Vec::new(),
            api_schemas: Vec::new(),
            variant_sets: Vec::new(),
            children,
            prototype: None,
            instance_proxy: false,
            in_prototype: false,
        }
    }
}

/// Selects which prims a traversal visits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimPredicate {
    pub require_active: bool,
    pub require_defined: bool,
    pub allow_abstract: bool,
    pub instance_proxies: bool,
}

impl PrimPredicate {
    /// Active, defined, non-abstract prims.
    pub const DEFAULT: PrimPredicate = PrimPredicate {
        require_active: true,
        require_defined: true,
        allow_abstract: false,
        instance_proxies: false,
    };

    /// Every prim.
    pub const ALL: PrimPredicate = PrimPredicate {
        require_active: false,
        require_defined: false,
        allow_abstract: true,
        instance_proxies: false,
    };

    /// The same predicate, also descending below instances.
    pub fn traverse_instance_proxies(self) -> Self {
        Self {
            instance_proxies: true,
            ..self
        }
    }

    pub fn matches(&self, prim: &Prim<'_>) -> bool {
        (!self.require_active || prim.is_active())
            && (!self.require_defined || prim.is_defined())
            && (self.allow_abstract || !prim.is_abstract())
            && (self.instance_proxies || !prim.is_instance_proxy())
    }
}

impl Default for PrimPredicate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A composed scene: the root layer, any layers it references, and the
/// session layer holding variant selections.
#[derive(Clone, Debug)]
pub struct Stage {
    layers: Vec<Arc<Layer>>,
    layer_index: HashMap<PathBuf, usize>,
    session: SessionLayer,
    mask: Option<Vec<ScenePath>>,
    root_path: ScenePath,
    root_entry: PrimEntry,
    prims: HashMap<ScenePath, PrimEntry>,
    prototypes: Vec<ScenePath>,
}

impl Stage {
    /// Opens a `.usda` file with an empty session layer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StageError> {
        Ok(Self::open_layer(Layer::open(path)?, SessionLayer::new()))
    }

    /// Builds a stage from text, mostly useful in tests.
    pub fn from_usda(content: &str) -> Result<Self, StageError> {
        Ok(Self::open_layer(Layer::from_string("anon.usda", content)?, SessionLayer::new()))
    }

    /// Composes a root layer and session layer.
    pub fn open_layer(root: Layer, session: SessionLayer) -> Self {
        Self::build(root, session, None)
    }

    /// Like [`Stage::open_layer`], but only prims on or above the mask paths
    /// (and everything below them) are populated.
    pub fn open_masked(root: Layer, session: SessionLayer, mask: Vec<ScenePath>) -> Self {
        Self::build(root, session, Some(mask))
    }

    fn build(root: Layer, session: SessionLayer, mask: Option<Vec<ScenePath>>) -> Self {
        let mut stage = Self {
            layers: vec![Arc::new(root)],
            layer_index: HashMap::new(),
            session,
            mask,
            root_path: ScenePath::root(),
            root_entry: PrimEntry::pseudo_root(Vec::new()),
            prims: HashMap::new(),
            prototypes: Vec::new(),
        };
        stage.load_referenced_layers();
        stage.recompose();
        stage
    }

    /// Opens every layer reachable through external references.
    fn load_referenced_layers(&mut self) {
        if let Some(path) = self.layers[0].real_path.clone() {
            self.layer_index.insert(path, 0);
        }

        let mut next = 0;
        while next < self.layers.len() {
            let layer = Arc::clone(&self.layers[next]);
            next += 1;

            let mut assets = Vec::new();
            for spec in &layer.root_prims {
                collect_assets(spec, &mut assets);
            }
            for asset in assets {
                let resolved = layer.resolve_asset(&asset);
                if self.layer_index.contains_key(&resolved) {
                    continue;
                }
                match Layer::open(&resolved) {
                    Ok(loaded) => {
                        self.layer_index.insert(resolved, self.layers.len());
                        self.layers.push(Arc::new(loaded));
                    }
                    Err(e) => log::warn!("Could not open referenced layer '{asset}': {e}"),
                }
            }
        }
    }

    fn recompose(&mut self) {
        let mut composer = Composer {
            layers: &self.layers,
            layer_index: &self.layer_index,
            session: &self.session,
            mask: self.mask.as_deref(),
            prims: HashMap::new(),
            prototype_keys: Vec::new(),
            queue: VecDeque::new(),
        };
        let root_children = composer.compose_all();
        let Composer {
            prims, prototype_keys, ..
        } = composer;

        self.root_entry = PrimEntry::pseudo_root(root_children);
        self.prims = prims;
        self.prototypes = prototype_keys.into_iter().map(|(_, path)| path).collect();
        log::debug!(
            "Composed {} prims, {} prototypes",
            self.prims.len(),
            self.prototypes.len()
        );
    }

    pub fn root_layer(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn session_layer(&self) -> &SessionLayer {
        &self.session
    }

    pub fn population_mask(&self) -> Option<&[ScenePath]> {
        self.mask.as_deref()
    }

    /// The prim at `path`, including instance proxies and prototype prims.
    pub fn prim_at(&self, path: &ScenePath) -> Option<Prim<'_>> {
        if path.is_root() {
            return Some(self.pseudo_root());
        }
        let (path, entry) = self.prims.get_key_value(path)?;
        Some(Prim {
            stage: self,
            path,
            entry,
        })
    }

    pub fn pseudo_root(&self) -> Prim<'_> {
        Prim {
            stage: self,
            path: &self.root_path,
            entry: &self.root_entry,
        }
    }

    /// The root prim named by the layer's `defaultPrim` metadata.
    pub fn default_prim(&self) -> Option<Prim<'_>> {
        let path = self.root_layer().default_prim_path()?;
        self.prim_at(&path)
    }

    /// Prototype prims in numbering order.
    pub fn prototypes(&self) -> Vec<Prim<'_>> {
        self.prototypes.iter().filter_map(|p| self.prim_at(p)).collect()
    }

    /// Time codes per second; falls back to frames per second, then 24.
    pub fn time_codes_per_second(&self) -> f64 {
        let metadata = &self.root_layer().metadata;
        metadata
            .time_codes_per_second
            .or(metadata.frames_per_second)
            .unwrap_or(24.0)
    }

    pub fn start_time_code(&self) -> f64 {
        self.root_layer().metadata.start_time_code.unwrap_or(0.0)
    }

    pub fn end_time_code(&self) -> f64 {
        self.root_layer().metadata.end_time_code.unwrap_or(0.0)
    }

    pub fn has_authored_time_code_range(&self) -> bool {
        let metadata = &self.root_layer().metadata;
        metadata.start_time_code.is_some() && metadata.end_time_code.is_some()
    }

    pub fn meters_per_unit(&self) -> f64 {
        self.root_layer().metadata.meters_per_unit.unwrap_or(0.01)
    }

    pub fn has_authored_meters_per_unit(&self) -> bool {
        self.root_layer().metadata.meters_per_unit.is_some()
    }

    /// Records a variant selection in the session layer and recomposes.
    pub fn set_variant_selection(&mut self, path: &ScenePath, set: &str, selection: &str) -> Result<(), StageError> {
        if !self.prims.contains_key(path) {
            return Err(StageError::NoSuchPrim(path.clone()));
        }
        self.session.set_selection(path, set, selection);
        self.recompose();
        Ok(())
    }
}

fn collect_assets(spec: &PrimSpec, out: &mut Vec<String>) {
    for reference in &spec.references {
        if let Some(asset) = &reference.asset {
            out.push(asset.clone());
        }
    }
    for child in &spec.children {
        collect_assets(child, out);
    }
    for set in &spec.variant_sets {
        for variant in &set.variants {
            collect_assets(variant, out);
        }
    }
}

#[derive(Clone, Copy)]
struct Source<'a> {
    layer: usize,
    spec: &'a PrimSpec,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Proxy,
    Prototype,
}

type PrototypeKey = (Vec<(usize, ScenePath)>, BTreeMap<String, String>);

struct Composer<'a> {
    layers: &'a [Arc<Layer>],
    layer_index: &'a HashMap<PathBuf, usize>,
    session: &'a SessionLayer,
    mask: Option<&'a [ScenePath]>,
    prims: HashMap<ScenePath, PrimEntry>,
    prototype_keys: Vec<(PrototypeKey, ScenePath)>,
    queue: VecDeque<(ScenePath, Vec<Source<'a>>)>,
}

impl<'a> Composer<'a> {
    /// Composes every prim and returns the pseudo-root's child names.
    fn compose_all(&mut self) -> Vec<String> {
        let layers = self.layers;
        let root_layer: &'a Layer = &layers[0];
        let mut names = Vec::new();
        for spec in &root_layer.root_prims {
            let path = ScenePath::root().child(&spec.name);
            if names.contains(&spec.name) || !self.mask_includes(&path) {
                continue;
            }
            let sources = self.expand(&path, vec![Source { layer: 0, spec }]);
            self.compose_prim(path, sources, false, Mode::Normal);
            names.push(spec.name.clone());
        }
        while let Some((path, sources)) = self.queue.pop_front() {
            self.compose_prim(path, sources, false, Mode::Prototype);
        }
        names
    }

    fn mask_includes(&self, path: &ScenePath) -> bool {
        match self.mask {
            None => true,
            Some(mask) => mask.iter().any(|m| path.has_prefix(m) || m.has_prefix(path)),
        }
    }

    /// Expands seed specs into the full strength-ordered source list.
    fn expand(&self, path: &ScenePath, seeds: Vec<Source<'a>>) -> Vec<Source<'a>> {
        let mut out = Vec::new();
        for seed in seeds {
            self.expand_into(path, seed, &mut out, 0);
        }
        out
    }

    fn expand_into(&self, path: &ScenePath, source: Source<'a>, out: &mut Vec<Source<'a>>, depth: usize) {
        if depth > MAX_COMPOSITION_DEPTH {
            log::warn!("Composition cycle detected at '{path}'; ignoring deeper arcs");
            return;
        }
        out.push(source);

        for set in &source.spec.variant_sets {
            let selection = self
                .session
                .selection(path, &set.name)
                .map(str::to_string)
                .or_else(|| {
                    out.iter()
                        .find_map(|s| s.spec.variant_selections.get(&set.name).cloned())
                });
            let Some(selection) = selection else { continue };
            if let Some(body) = set.variants.iter().find(|v| v.name == selection) {
                let variant = Source {
                    layer: source.layer,
                    spec: body,
                };
                self.expand_into(path, variant, out, depth + 1);
            }
        }

        for reference in &source.spec.references {
            if let Some(target) = self.resolve_reference(source.layer, reference) {
                self.expand_into(path, target, out, depth + 1);
            }
        }
    }

    fn reference_target(&self, layer: usize, reference: &Reference) -> Option<(usize, ScenePath)> {
        let target_layer = match &reference.asset {
            Some(asset) => {
                let resolved = self.layers[layer].resolve_asset(asset);
                *self.layer_index.get(&resolved)?
            }
            None => layer,
        };
        let path = match &reference.prim_path {
            Some(path) => path.clone(),
            None => self.layers[target_layer].default_prim_path()?,
        };
        Some((target_layer, path))
    }

    fn resolve_reference(&self, layer: usize, reference: &Reference) -> Option<Source<'a>> {
        let Some((target_layer, path)) = self.reference_target(layer, reference) else {
            log::warn!("Unresolved reference {reference:?} in '{}'", self.layers[layer].identifier);
            return None;
        };
        let layers = self.layers;
        let target: &'a Layer = &layers[target_layer];
        match target.prim_spec_at(&path) {
            Some(spec) => Some(Source {
                layer: target_layer,
                spec,
            }),
            None => {
                log::warn!("Reference target '{path}' not found in '{}'", target.identifier);
                None
            }
        }
    }

    fn prototype_key(&self, sources: &[Source<'a>], variant_sets: &[VariantSetInfo]) -> PrototypeKey {
        let mut targets = Vec::new();
        for source in sources {
            for reference in &source.spec.references {
                if let Some(target) = self.reference_target(source.layer, reference) {
                    targets.push(target);
                }
            }
        }
        let selections = variant_sets
            .iter()
            .filter_map(|v| Some((v.name.clone(), v.selection.clone()?)))
            .collect();
        (targets, selections)
    }

    fn build_entry(&self, path: &ScenePath, sources: &[Source<'a>], parent_abstract: bool) -> PrimEntry {
        let specifier = sources
            .iter()
            .map(|s| s.spec.specifier)
            .find(|s| *s != Specifier::Over)
            .unwrap_or(Specifier::Over);

        let mut attributes: Vec<Attribute> = Vec::new();
        let mut api_schemas: Vec<String> = Vec::new();
        let mut set_names: Vec<String> = Vec::new();
        for source in sources {
            for attr in &source.spec.attributes {
                match attributes.iter_mut().find(|a| a.name == attr.name) {
                    None => attributes.push(attr.clone()),
                    Some(existing) if !existing.has_value() && attr.has_value() => *existing = attr.clone(),
                    Some(_) => {}
                }
            }
            for schema in &source.spec.api_schemas {
                if !api_schemas.contains(schema) {
                    api_schemas.push(schema.clone());
                }
            }
            for name in &source.spec.variant_set_names {
                if !set_names.contains(name) {
                    set_names.push(name.clone());
                }
            }
        }

        let variant_sets = set_names
            .into_iter()
            .map(|name| {
                let mut variants: Vec<String> = Vec::new();
                for set in sources.iter().filter_map(|s| s.spec.variant_set(&name)) {
                    for variant in &set.variants {
                        if !variants.contains(&variant.name) {
                            variants.push(variant.name.clone());
                        }
                    }
                }
                let selection = self
                    .session
                    .selection(path, &name)
                    .map(str::to_string)
                    .or_else(|| sources.iter().find_map(|s| s.spec.variant_selections.get(&name).cloned()));
                VariantSetInfo {
                    name,
                    variants,
                    selection,
                }
            })
            .collect();

        PrimEntry {
            name: path.name().to_string(),
            type_name: sources.iter().find_map(|s| s.spec.type_name.clone()),
            specifier,
            active: sources.iter().find_map(|s| s.spec.active).unwrap_or(true),
            is_abstract: parent_abstract || specifier == Specifier::Class,
            kind: sources.iter().find_map(|s| s.spec.kind.clone()),
            attributes,
            api_schemas,
            variant_sets,
            children: Vec::new(),
            prototype: None,
            instance_proxy: false,
            in_prototype: false,
        }
    }

    fn compose_prim(&mut self, path: ScenePath, sources: Vec<Source<'a>>, parent_abstract: bool, mode: Mode) {
        let mut entry = self.build_entry(&path, &sources, parent_abstract);
        entry.instance_proxy = mode == Mode::Proxy;
        entry.in_prototype = mode == Mode::Prototype;

        let instanceable = sources.iter().find_map(|s| s.spec.instanceable).unwrap_or(false);
        let has_references = sources.iter().any(|s| !s.spec.references.is_empty());
        let is_prototype_root = mode == Mode::Prototype && path.depth() == 1;
        let is_instance = mode != Mode::Proxy && !is_prototype_root && instanceable && has_references;
        if is_instance {
            let key = self.prototype_key(&sources, &entry.variant_sets);
            let existing = self
                .prototype_keys
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, path)| path.clone());
            let prototype = match existing {
                Some(existing) => existing,
                None => {
                    let prototype = ScenePath::root().child(&format!("__Prototype_{}", self.prototype_keys.len() + 1));
                    self.prototype_keys.push((key, prototype.clone()));
                    self.queue.push_back((prototype.clone(), sources.clone()));
                    prototype
                }
            };
            entry.prototype = Some(prototype);
        }

        if entry.active {
            let child_mode = if is_instance { Mode::Proxy } else { mode };
            let mut names: Vec<&'a str> = Vec::new();
            for source in &sources {
                let spec: &'a PrimSpec = source.spec;
                for child in &spec.children {
                    if !names.contains(&child.name.as_str()) {
                        names.push(&child.name);
                    }
                }
            }

            for name in names {
                let child_path = path.child(name);
                if mode != Mode::Prototype && !self.mask_includes(&child_path) {
                    continue;
                }
                let seeds = sources
                    .iter()
                    .filter_map(|s| {
                        s.spec.child(name).map(|spec| Source {
                            layer: s.layer,
                            spec,
                        })
                    })
                    .collect();
                let child_sources = self.expand(&child_path, seeds);
                let is_abstract = entry.is_abstract;
                self.compose_prim(child_path, child_sources, is_abstract, child_mode);
                entry.children.push(name.to_string());
            }
        }

        self.prims.insert(path, entry);
    }
}

/// A read-only view of one composed prim.
#[derive(Clone, Copy)]
pub struct Prim<'s> {
    stage: &'s Stage,
    path: &'s ScenePath,
    entry: &'s PrimEntry,
}

impl std::fmt::Debug for Prim<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prim")
            .field("path", self.path)
            .field("type_name", &self.entry.type_name)
            .finish()
    }
}

impl PartialEq for Prim<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.stage, other.stage) && self.path == other.path
    }
}

impl<'s> Prim<'s> {
    pub fn stage(&self) -> &'s Stage {
        self.stage
    }

    pub fn path(&self) -> &'s ScenePath {
        self.path
    }

    pub fn name(&self) -> &'s str {
        &self.entry.name
    }

    /// Schema type name; `None` for typeless prims and the pseudo-root.
    pub fn type_name(&self) -> Option<&'s str> {
        self.entry.type_name.as_deref()
    }

    pub fn is_pseudo_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn is_active(&self) -> bool {
        self.entry.active
    }

    pub fn is_defined(&self) -> bool {
        self.entry.specifier != Specifier::Over
    }

    pub fn is_abstract(&self) -> bool {
        self.entry.is_abstract
    }

    pub fn kind(&self) -> Option<&'s str> {
        self.entry.kind.as_deref()
    }

    pub fn is_instance(&self) -> bool {
        self.entry.prototype.is_some()
    }

    /// True for prims below an instance, reached through the instance's
    /// namespace rather than its prototype.
    pub fn is_instance_proxy(&self) -> bool {
        self.entry.instance_proxy
    }

    pub fn is_in_prototype(&self) -> bool {
        self.entry.in_prototype
    }

    /// The shared prototype of an instance.
    pub fn prototype(&self) -> Option<Prim<'s>> {
        let path = self.entry.prototype.as_ref()?;
        self.stage.prim_at(path)
    }

    pub fn parent(&self) -> Option<Prim<'s>> {
        self.stage.prim_at(&self.path.parent()?)
    }

    /// Children that satisfy `predicate`, in authored order. An instance has
    /// no children unless the predicate traverses instance proxies.
    pub fn children(&self, predicate: PrimPredicate) -> Vec<Prim<'s>> {
        if self.is_instance() && !predicate.instance_proxies {
            return Vec::new();
        }
        self.entry
            .children
            .iter()
            .filter_map(|name| self.stage.prim_at(&self.path.child(name)))
            .filter(|child| predicate.matches(child))
            .collect()
    }

    pub fn attributes(&self) -> &'s [Attribute] {
        &self.entry.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&'s Attribute> {
        self.entry.attributes.iter().find(|a| a.name == name)
    }

    pub fn api_schemas(&self) -> &'s [String] {
        &self.entry.api_schemas
    }

    pub fn has_api_schema(&self, name: &str) -> bool {
        self.entry.api_schemas.iter().any(|s| s == name)
    }

    pub fn variant_sets(&self) -> &'s [VariantSetInfo] {
        &self.entry.variant_sets
    }

    /// The named variant set; check [`VariantSet::is_valid`] before use.
    pub fn variant_set(&self, name: &str) -> VariantSet<'s> {
        VariantSet {
            name: name.to_string(),
            info: self.entry.variant_sets.iter().find(|v| v.name == name),
        }
    }
}

/// A variant set lookup result on one prim.
#[derive(Clone, Debug)]
pub struct VariantSet<'s> {
    name: String,
    info: Option<&'s VariantSetInfo>,
}

impl<'s> VariantSet<'s> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// False when the prim has no variant set of this name.
    pub fn is_valid(&self) -> bool {
        self.info.is_some()
    }

    pub fn variant_names(&self) -> &'s [String] {
        self.info.map_or(&[], |info| info.variants.as_slice())
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variant_names().iter().any(|v| v == name)
    }

    pub fn selection(&self) -> Option<&'s str> {
        self.info?.selection.as_deref()
    }
}
