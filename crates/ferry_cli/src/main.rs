//! `ferry`: import a `.usda` file into an in-memory scene and print it.

use anyhow::{Context, Result};
use clap::Parser;
use ferry_core::{DagScene, ImportArgs, ImportData, ImportJob, TargetScene};

/// Command line options.
#[derive(Parser, Debug)]
#[command(name = "ferry", about = "Import a USDA file into an in-memory scene graph")]
struct Options {
    /// The `.usda` file to import
    file: String,

    /// Import this prim instead of the default prim
    #[arg(long)]
    root: Option<String>,

    /// Read import arguments from a JSON file
    #[arg(long = "args", value_name = "FILE")]
    args_file: Option<String>,

    /// Copy instance children instead of sharing them
    #[arg(long)]
    no_instances: bool,

    /// Select a variant on the root prim, as `set=selection`
    #[arg(long = "variant", value_name = "SET=SEL", value_parser = parse_variant)]
    variants: Vec<(String, String)>,

    /// Run a chaser after the import
    #[arg(long = "chaser", value_name = "NAME")]
    chasers: Vec<String>,

    /// Undo and redo the import and report node counts
    #[arg(long)]
    undo: bool,
}

fn parse_variant(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(set, selection)| (set.to_string(), selection.to_string()))
        .ok_or_else(|| format!("expected set=selection, found '{value}'"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let options = Options::parse();

    let mut args = match &options.args_file {
        Some(path) => ImportArgs::from_json_file(path).with_context(|| format!("Failed to read import arguments from '{path}'"))?,
        None => ImportArgs::default(),
    };
    if options.no_instances {
        args.import_instances = false;
    }
    args.chaser_names.extend(options.chasers.iter().cloned());

    let mut data = ImportData::new(&options.file);
    if let Some(root) = &options.root {
        data.root_prim_path = root.clone();
    }
    data.root_variant_selections.extend(options.variants.iter().cloned());

    let mut scene = DagScene::new();
    let mut job = ImportJob::new(data, args);
    let report = job
        .read(&mut scene, false)
        .with_context(|| format!("Failed to import '{}'", options.file))?;

    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    println!("Imported {} top-level node(s):", report.added_nodes.len());
    for (path, node) in report.source_paths.iter().zip(&report.added_nodes) {
        println!("  {path} -> {}", scene.node_name(*node).unwrap_or("?"));
    }
    print!("{}", scene.dump());

    if options.undo {
        let imported = scene.live_node_count();
        job.undo(&mut scene).context("Undo failed")?;
        println!("After undo: {} live node(s), was {imported}", scene.live_node_count());
        job.redo(&mut scene).context("Redo failed")?;
        println!("After redo: {} live node(s)", scene.live_node_count());
    }

    Ok(())
}
