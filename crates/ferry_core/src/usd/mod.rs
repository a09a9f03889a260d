//! In-memory USD stage: the source side of an import.
//!
//! This module parses USDA (ASCII) layers and composes them into a stage that
//! the importer traverses. It covers the parts of USD the import pipeline
//! relies on.
//!
//! ## Supported Features
//!
//! - Prim hierarchy with `def`, `over` and `class` specifiers
//! - Attributes with default values and time samples
//! - Variant sets and session-layer variant selections
//! - Internal and external references
//! - Instancing with deduplicated prototypes
//! - Population masks
//!
//! ## Not Supported
//!
//! - Binary `.usdc` and packaged `.usdz` files
//! - Payloads, inherits, specializes and sublayers
//! - Relationships and attribute connections (parsed and skipped)
//!
//! # Example
//!
//! ```ignore
//! use ferry_core::usd::{PrimPredicate, PrimRange, Stage};
//!
//! let stage = Stage::open("scene.usda")?;
//! for visit in PrimRange::new(stage.pseudo_root(), PrimPredicate::DEFAULT) {
//!     println!("{}", visit.prim.path());
//! }
//! ```

mod layer;
mod parser;
mod path;
mod range;
mod stage;
mod types;

pub use layer::*;
pub use parser::*;
pub use path::*;
pub use range::*;
pub use stage::*;
pub use types::*;
