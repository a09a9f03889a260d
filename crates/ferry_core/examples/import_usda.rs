//! Example: Import a USDA file into an in-memory scene and inspect it.
//!
//! Run with: cargo run --example import_usda -- scene.usda

use std::env;

use ferry_core::{DagScene, ImportArgs, ImportData, ImportJob, TargetScene};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: import_usda <path-to-usda-file> [root-prim-path]");
        println!("\nExamples:");
        println!("  cargo run --example import_usda -- scene.usda");
        println!("  cargo run --example import_usda -- scene.usda /World/Props");
        return;
    }

    let path = &args[1];
    println!("Importing USDA file: {}", path);

    let mut data = ImportData::new(path);
    if let Some(root) = args.get(2) {
        data.root_prim_path = root.clone();
    }

    let mut scene = DagScene::new();
    let mut job = ImportJob::new(data, ImportArgs::default());

    match job.read(&mut scene, false) {
        Ok(report) => {
            println!("\n=== Imported ===");
            for (path, node) in report.source_paths.iter().zip(&report.added_nodes) {
                println!("  {} -> {} ({:?})", path, scene.node_name(*node).unwrap_or("?"), node);
            }
            println!("Registered nodes: {}", job.node_registry().len());
            println!("Time sample multiplier: {}", job.time_sample_multiplier());

            if !report.warnings.is_empty() {
                println!("\n--- Warnings ---");
                for warning in &report.warnings {
                    println!("  {}", warning);
                }
            }

            println!("\n--- Scene ---");
            print!("{}", scene.dump());
        }
        Err(e) => {
            eprintln!("Error importing USDA file: {}", e);
        }
    }
}
