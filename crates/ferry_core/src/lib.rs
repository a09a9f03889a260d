//! Ferry Core - USD stage to scene graph import.
//!
//! This crate provides:
//!
//! - **Source stage**: a USDA subset with references, variants and instancing
//!   ([`usd`])
//! - **Target scene**: the [`TargetScene`] capability and an in-memory
//!   [`DagScene`]
//! - **Import pipeline**: prim readers, the traversal engine, chasers and
//!   undo/redo, driven by [`ImportJob`]
//!
//! # Example
//!
//! ```ignore
//! use ferry_core::{DagScene, ImportArgs, ImportData, ImportJob};
//!
//! let mut scene = DagScene::new();
//! let mut job = ImportJob::new(ImportData::new("scene.usda"), ImportArgs::default());
//! let report = job.read(&mut scene, false)?;
//! println!("Imported {} top-level nodes", report.added_nodes.len());
//! job.undo(&mut scene)?;
//! ```

pub mod chaser;
pub mod context;
pub mod error;
pub mod job;
pub mod reader;
pub mod registry;
pub mod scene;
mod traversal;
pub mod undo;
pub mod usd;

// Re-export commonly used types
pub use chaser::{Chaser, ChaserContext, ChaserRegistry, SourcePathChaser};
pub use context::{NodeTrackingScope, ReadCache, ReaderContext};
pub use error::{ImportError, ImportWarning};
pub use job::{time_sample_multiplier, DefaultHooks, ImportArgs, ImportData, ImportHooks, ImportJob, ImportReport};
pub use reader::{PrimReader, PrimReaderRegistry, ReaderArgs, SchemaReader};
pub use registry::NodeRegistry;
pub use scene::{AttrValue, DagScene, NodeHandle, SceneError, TargetScene};
pub use usd::{Prim, PrimPredicate, ScenePath, Stage};
