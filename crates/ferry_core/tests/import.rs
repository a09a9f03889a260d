//! End-to-end imports of `.usda` fixtures into an in-memory scene.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ferry_core::chaser::SOURCE_PATH_CHASER;
use ferry_core::{
    AttrValue, Chaser, DagScene, ImportArgs, ImportData, ImportError, ImportJob, ImportWarning, NodeHandle,
    PrimReader, ReaderArgs, ReaderContext, ScenePath, TargetScene,
};
use tempfile::TempDir;

const BASIC: &str = r#"#usda 1.0
(
    defaultPrim = "World"
)

def Xform "World"
{
    def Mesh "Cube"
    {
        point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]
        int[] faceVertexCounts = [3]
        int[] faceVertexIndices = [0, 1, 2]
    }
}

def Xform "Other"
{
}
"#;

const INSTANCED: &str = r#"#usda 1.0
(
    defaultPrim = "World"
)

def Xform "World"
{
    def Xform "Tree1" (
        instanceable = true
        references = @tree.usda@
    )
    {
        double3 xformOp:translate = (5, 0, 0)
        uniform token[] xformOpOrder = ["xformOp:translate"]
    }
    def Xform "Tree2" (
        instanceable = true
        references = @tree.usda@
    )
    {
    }
}
"#;

const TREE: &str = r#"#usda 1.0
(
    defaultPrim = "Tree"
)

def Xform "Tree"
{
    def Mesh "Trunk"
    {
    }
    def Mesh "Leaves"
    {
    }
}
"#;

const VARIANTS: &str = r#"#usda 1.0
(
    defaultPrim = "Car"
)

def Xform "Car" (
    variants = {
        string paint = "red"
    }
    prepend variantSets = "paint"
)
{
    variantSet "paint" = {
        "red" {
            def Xform "RedBody"
            {
            }
        }
        "blue" {
            def Xform "BlueBody"
            {
            }
        }
    }
    def Xform "Wheel" (
        variants = {
            string size = "small"
        }
        prepend variantSets = "size"
    )
    {
        variantSet "size" = {
            "small" {
                def Xform "Small"
                {
                }
            }
            "large" {
                def Xform "Large"
                {
                }
            }
        }
    }
}
"#;

fn fixture(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).unwrap();
    }
    let main = dir.path().join(files[0].0);
    (dir, main)
}

fn node(job: &ImportJob, path: &str) -> NodeHandle {
    job.node_registry()
        .get(path)
        .unwrap_or_else(|| panic!("nothing registered at {path}"))
}

#[test]
fn test_default_prim_import_and_undo() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let mut scene = DagScene::new();
    let existing = scene.create_node("transform", "existing", None).unwrap();
    let before = scene.dump();

    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    let report = job.read(&mut scene, false).unwrap();

    let registry = job.node_registry();
    assert_eq!(registry.get("/"), Some(scene.world()));
    assert!(registry.contains("/World"));
    assert!(registry.contains("/World/Cube"));
    assert!(!registry.contains("/Other"));

    let world = node(&job, "/World");
    let cube = node(&job, "/World/Cube");
    assert_eq!(report.added_nodes, vec![world]);
    assert_eq!(report.source_paths, vec![ScenePath::parse("/World").unwrap()]);
    assert!(report.warnings.is_empty());
    assert_eq!(scene.parents(cube), vec![world]);

    job.undo(&mut scene).unwrap();
    assert!(!scene.is_alive(world));
    assert!(!scene.is_alive(cube));
    assert!(scene.is_alive(existing));
    assert_eq!(scene.dump(), before);

    job.redo(&mut scene).unwrap();
    assert!(scene.is_alive(world));
    assert_eq!(scene.parents(cube), vec![world]);
    let shape = node(&job, "/World/Cube.shape");
    assert_eq!(scene.attribute(shape, "faceVertexIndices"), Some(&AttrValue::IntArray(vec![0, 1, 2])));
}

#[test]
fn test_missing_chaser_is_a_warning() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let mut scene = DagScene::new();
    let args = ImportArgs {
        chaser_names: vec!["Nonexistent".to_string()],
        ..ImportArgs::default()
    };
    let mut job = ImportJob::new(ImportData::new(&path), args);
    let report = job.read(&mut scene, false).unwrap();
    assert_eq!(report.warnings, vec![ImportWarning::MissingChaser("Nonexistent".to_string())]);
    assert_eq!(job.chaser_count(), 0);
    assert_eq!(job.last_report(), Some(&report));
}

#[test]
fn test_unresolved_root_falls_back_to_pseudo_root() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let mut scene = DagScene::new();
    let data = ImportData::new(&path).with_root_prim_path("/Missing");
    let mut job = ImportJob::new(data, ImportArgs::default());
    let report = job.read(&mut scene, false).unwrap();

    assert_eq!(report.warnings, vec![ImportWarning::UnresolvedRootPrim("/Missing".to_string())]);
    assert_eq!(report.added_nodes, vec![node(&job, "/World"), node(&job, "/Other")]);
    assert_eq!(
        report.source_paths,
        vec![ScenePath::parse("/World").unwrap(), ScenePath::parse("/Other").unwrap()]
    );
}

#[test]
fn test_explicit_root() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let mut scene = DagScene::new();
    let data = ImportData::new(&path).with_root_prim_path("/World/Cube");
    let mut job = ImportJob::new(data, ImportArgs::default());
    let report = job.read(&mut scene, false).unwrap();

    let cube = node(&job, "/World/Cube");
    assert_eq!(report.added_nodes, vec![cube]);
    assert!(!job.node_registry().contains("/World"));
    assert_eq!(scene.parents(cube), vec![scene.world()]);
}

#[test]
fn test_no_default_prim_fails() {
    let (_dir, path) = fixture(&[("scene.usda", "#usda 1.0\n")]);
    let mut scene = DagScene::new();
    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    assert!(matches!(job.read(&mut scene, false), Err(ImportError::NoDefaultPrim)));
}

#[test]
fn test_parse_error_fails() {
    let (_dir, path) = fixture(&[("scene.usda", "#usda 1.0\ndef Xform \"Broken\" {\n")]);
    let mut scene = DagScene::new();
    let data = ImportData::new(&path).with_root_prim_path("/");
    let mut job = ImportJob::new(data, ImportArgs::default());
    assert!(matches!(job.read(&mut scene, false), Err(ImportError::Stage(_))));
    assert_eq!(scene.live_dag_count(), 0);
}

#[test]
fn test_instances_share_one_prototype() {
    let (_dir, path) = fixture(&[("scene.usda", INSTANCED), ("tree.usda", TREE)]);
    let mut scene = DagScene::new();
    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    job.read(&mut scene, false).unwrap();

    let tree1 = node(&job, "/World/Tree1");
    let tree2 = node(&job, "/World/Tree2");
    let children1 = scene.children(tree1);
    assert_eq!(children1.len(), 2);
    assert_eq!(children1, scene.children(tree2));
    assert_eq!(scene.find_by_name("Trunk").len(), 1);
    assert_eq!(scene.find_by_name("Leaves").len(), 1);
    assert_eq!(scene.children(scene.world()), vec![node(&job, "/World")]);

    let translate = scene.attribute(tree1, "translate").and_then(AttrValue::as_double3).unwrap();
    assert_eq!(translate.x, 5.0);

    job.undo(&mut scene).unwrap();
    assert_eq!(scene.live_dag_count(), 0);
    job.redo(&mut scene).unwrap();
    assert_eq!(scene.children(tree1), children1);
    assert_eq!(scene.children(tree2), children1);
}

const NESTED_INSTANCES: &str = r#"#usda 1.0
(
    defaultPrim = "World"
)

def Xform "Leaf"
{
    def Mesh "Geo"
    {
    }
}

def Xform "Branch"
{
    def Xform "L" (
        instanceable = true
        references = </Leaf>
    )
    {
    }
}

def Xform "World"
{
    def Xform "B1" (
        instanceable = true
        references = </Branch>
    )
    {
    }
    def Xform "B2" (
        instanceable = true
        references = </Branch>
    )
    {
    }
}
"#;

#[test]
fn test_instances_inside_prototypes_are_shared() {
    let (_dir, path) = fixture(&[("nested.usda", NESTED_INSTANCES)]);
    let mut scene = DagScene::new();
    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    job.read(&mut scene, false).unwrap();

    let b1 = node(&job, "/World/B1");
    let b2 = node(&job, "/World/B2");
    let leaf = node(&job, "/__Prototype_2/L");
    let geo = node(&job, "/__Prototype_1/Geo");
    assert_eq!(scene.children(b1), vec![leaf]);
    assert_eq!(scene.children(b2), vec![leaf]);
    assert_eq!(scene.children(leaf), vec![geo]);
    assert_eq!(scene.find_by_name("L").len(), 1);
    assert_eq!(scene.find_by_name("Geo").len(), 1);
    assert_eq!(scene.find_by_name("GeoShape").len(), 1);

    // Prototype containers are gone from the registry and the scene
    assert!(!job.node_registry().contains("/__Prototype_1"));
    assert!(!job.node_registry().contains("/__Prototype_2"));
    assert_eq!(scene.children(scene.world()), vec![node(&job, "/World")]);

    let imported = scene.dump();
    job.undo(&mut scene).unwrap();
    assert_eq!(scene.live_dag_count(), 0);
    job.redo(&mut scene).unwrap();
    assert_eq!(scene.dump(), imported);
    assert_eq!(scene.parents(leaf), vec![b1, b2]);
}

#[test]
fn test_instances_copied_when_not_instancing() {
    let (_dir, path) = fixture(&[("scene.usda", INSTANCED), ("tree.usda", TREE)]);
    let mut scene = DagScene::new();
    let args = ImportArgs {
        import_instances: false,
        ..ImportArgs::default()
    };
    let mut job = ImportJob::new(ImportData::new(&path), args);
    job.read(&mut scene, false).unwrap();

    assert_eq!(scene.find_by_name("Trunk").len(), 2);
    let trunk1 = node(&job, "/World/Tree1/Trunk");
    assert_eq!(scene.parents(trunk1), vec![node(&job, "/World/Tree1")]);
}

#[test]
fn test_root_and_prim_variant_selections() {
    let (_dir, path) = fixture(&[("car.usda", VARIANTS)]);
    let mut scene = DagScene::new();
    let mut data = ImportData::new(&path);
    data.root_variant_selections.insert("paint".to_string(), "blue".to_string());
    data.prim_variant_selections.insert(
        "/Car/Wheel".to_string(),
        BTreeMap::from([("size".to_string(), "large".to_string())]),
    );
    let mut job = ImportJob::new(data, ImportArgs::default());
    let report = job.read(&mut scene, false).unwrap();

    assert!(report.warnings.is_empty());
    assert!(job.node_registry().contains("/Car/BlueBody"));
    assert!(!job.node_registry().contains("/Car/RedBody"));
    assert!(job.node_registry().contains("/Car/Wheel/Large"));
    let stage = job.stage().unwrap();
    let car = stage.prim_at(&ScenePath::parse("/Car").unwrap()).unwrap();
    assert_eq!(car.variant_set("paint").selection(), Some("blue"));
}

#[test]
fn test_invalid_variant_selections_are_skipped() {
    let (_dir, path) = fixture(&[("car.usda", VARIANTS)]);
    let mut scene = DagScene::new();
    let mut data = ImportData::new(&path);
    data.root_variant_selections.insert("paint".to_string(), "green".to_string());
    data.prim_variant_selections.insert(
        "/Car/Wheel".to_string(),
        BTreeMap::from([("color".to_string(), "black".to_string())]),
    );
    data.prim_variant_selections.insert(
        "/Car/Nope".to_string(),
        BTreeMap::from([("size".to_string(), "large".to_string())]),
    );
    let mut job = ImportJob::new(data, ImportArgs::default());
    let report = job.read(&mut scene, false).unwrap();

    assert_eq!(report.warnings.len(), 3);
    assert!(report.warnings.iter().any(|w| matches!(w, ImportWarning::InvalidVariantSelection { .. })));
    assert!(report.warnings.iter().any(|w| matches!(w, ImportWarning::InvalidVariantSet { .. })));
    assert!(report.warnings.contains(&ImportWarning::InvalidVariantPrim("/Car/Nope".to_string())));
    // The unknown root selection composes no variant body at all
    assert!(!job.node_registry().contains("/Car/RedBody"));
    assert!(!job.node_registry().contains("/Car/BlueBody"));
    assert!(job.node_registry().contains("/Car/Wheel/Small"));
}

#[test]
fn test_population_mask() {
    let (_dir, path) = fixture(&[("car.usda", VARIANTS)]);
    let mut scene = DagScene::new();
    let mut data = ImportData::new(&path);
    data.population_mask = vec!["/Car/Wheel".to_string(), "not a path".to_string()];
    let mut job = ImportJob::new(data, ImportArgs::default());
    let report = job.read(&mut scene, false).unwrap();

    assert_eq!(report.warnings, vec![ImportWarning::InvalidMaskPath("not a path".to_string())]);
    assert!(job.node_registry().contains("/Car/Wheel"));
    assert!(!job.node_registry().contains("/Car/RedBody"));
}

#[test]
fn test_source_path_chaser_round_trip() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let mut scene = DagScene::new();
    let args = ImportArgs {
        chaser_names: vec![SOURCE_PATH_CHASER.to_string()],
        ..ImportArgs::default()
    };
    let mut job = ImportJob::new(ImportData::new(&path), args);
    job.read(&mut scene, false).unwrap();
    assert_eq!(job.chaser_count(), 1);

    let cube = node(&job, "/World/Cube");
    let stamped = |scene: &DagScene| {
        scene
            .attribute(cube, "usdSourcePath")
            .and_then(AttrValue::as_str)
            .map(str::to_string)
    };
    assert_eq!(stamped(&scene).as_deref(), Some("/World/Cube"));
    assert!(scene.attribute(scene.world(), "usdSourcePath").is_none());

    job.undo(&mut scene).unwrap();
    job.redo(&mut scene).unwrap();
    assert_eq!(stamped(&scene).as_deref(), Some("/World/Cube"));
}

struct Logging {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
    fail_post: bool,
}

impl Chaser for Logging {
    fn post_import(&mut self, _scene: &mut dyn TargetScene) -> bool {
        self.log.borrow_mut().push(format!("post {}", self.name));
        !self.fail_post
    }

    fn undo(&mut self, _scene: &mut dyn TargetScene) -> bool {
        self.log.borrow_mut().push(format!("undo {}", self.name));
        self.name != "second"
    }

    fn redo(&mut self, _scene: &mut dyn TargetScene) -> bool {
        self.log.borrow_mut().push(format!("redo {}", self.name));
        true
    }
}

fn logging_job(path: &Path, log: &Rc<RefCell<Vec<String>>>, fail_post: bool) -> ImportJob {
    let args = ImportArgs {
        chaser_names: vec!["first".to_string(), "second".to_string()],
        ..ImportArgs::default()
    };
    let mut job = ImportJob::new(ImportData::new(path), args);
    for name in ["first", "second"] {
        let log = Rc::clone(log);
        job.chaser_registry_mut().register(name, move |_| {
            Some(Box::new(Logging {
                name,
                log: Rc::clone(&log),
                fail_post: fail_post && name == "second",
            }) as Box<dyn Chaser>)
        });
    }
    job
}

#[test]
fn test_chasers_run_in_declared_order() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut scene = DagScene::new();
    let mut job = logging_job(&path, &log, false);
    job.read(&mut scene, false).unwrap();

    // The second chaser fails to undo: reported, but the nodes still go
    let world = node(&job, "/World");
    assert!(matches!(job.undo(&mut scene), Err(ImportError::ChaserUndo(name)) if name == "second"));
    assert!(!scene.is_alive(world));

    job.redo(&mut scene).unwrap();
    assert!(scene.is_alive(world));
    assert_eq!(
        *log.borrow(),
        vec!["post first", "post second", "undo first", "undo second", "redo first", "redo second"]
    );
}

#[test]
fn test_failing_chaser_fails_import() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut scene = DagScene::new();
    let mut job = logging_job(&path, &log, true);
    assert!(matches!(job.read(&mut scene, false), Err(ImportError::ChaserFailed(name)) if name == "second"));
}

#[test]
fn test_anchor_is_left_alone_by_undo() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let mut scene = DagScene::new();
    let anchor = scene.create_node("transform", "anchor", None).unwrap();
    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    job.set_anchor(Some(anchor));
    job.read(&mut scene, false).unwrap();

    let world = node(&job, "/World");
    assert_eq!(scene.parents(world), vec![anchor]);
    assert_eq!(job.node_registry().get("/"), Some(anchor));

    job.undo(&mut scene).unwrap();
    assert!(scene.is_alive(anchor));
    assert!(!scene.is_alive(world));
    assert_eq!(scene.child_count(anchor), 0);
}

#[test]
fn test_distance_unit_warning() {
    let usda = "#usda 1.0\n(\n    defaultPrim = \"World\"\n    metersPerUnit = 1\n)\ndef Xform \"World\"\n{\n}\n";
    let (_dir, path) = fixture(&[("scene.usda", usda)]);
    let mut scene = DagScene::new();
    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    let report = job.read(&mut scene, false).unwrap();
    assert_eq!(
        report.warnings,
        vec![ImportWarning::DistanceUnit {
            stage: 1.0,
            scene: 0.01
        }]
    );
}

#[test]
fn test_reset_xform_and_animation_keys() {
    let usda = r#"#usda 1.0
(
    defaultPrim = "Ball"
    timeCodesPerSecond = 24
)

def Xform "Ball"
{
    double3 xformOp:translate.timeSamples = {
        0: (0, 0, 0),
        24: (0, 10, 0),
    }
    uniform token[] xformOpOrder = ["xformOp:translate"]
}
"#;
    let (_dir, path) = fixture(&[("ball.usda", usda)]);
    let mut scene = DagScene::with_fps(30.0);
    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    job.read(&mut scene, true).unwrap();

    let ball = node(&job, "/Ball");
    assert_eq!(scene.attribute(ball, "inheritsTransform"), Some(&AttrValue::Bool(false)));
    let curve = node(&job, "/Ball.translateY");
    let keys = scene.attribute(curve, "keys").and_then(AttrValue::as_keys).unwrap();
    assert_eq!(keys, &[(0.0, 0.0), (30.0, 10.0)]);

    job.undo(&mut scene).unwrap();
    assert!(!scene.is_alive(curve));
    job.redo(&mut scene).unwrap();
    assert_eq!(scene.connections_to(ball).len(), 1);
}

struct Pruning;

impl PrimReader for Pruning {
    fn read(&mut self, args: &ReaderArgs<'_>, context: &mut ReaderContext<'_>, scene: &mut dyn TargetScene) {
        let node = scene.create_node("transform", args.prim.name(), None).unwrap();
        context.register_node(args.path().as_str(), node);
        context.set_prune_children(true);
    }
}

#[test]
fn test_pruning_reader_skips_descendants() {
    let (_dir, path) = fixture(&[("scene.usda", BASIC)]);
    let mut scene = DagScene::new();
    let mut job = ImportJob::new(ImportData::new(&path), ImportArgs::default());
    job.readers_mut().register("Xform", |_| Some(Box::new(Pruning) as Box<dyn PrimReader>));
    job.read(&mut scene, false).unwrap();

    assert!(job.node_registry().contains("/World"));
    assert!(!job.node_registry().contains("/World/Cube"));
}
