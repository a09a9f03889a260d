//! Extension points of an import job.

use crate::context::ReaderContext;
use crate::reader::ReaderArgs;
use crate::scene::TargetScene;
use crate::usd::PrimPredicate;

/// Customizes an import without replacing the job.
pub trait ImportHooks {
    /// Called before traversal with the predicate that selects prims.
    fn pre_import(&mut self, _predicate: &mut PrimPredicate) {}

    /// Whether the selected root prim itself is skipped, importing only its
    /// children as separate roots.
    fn skip_root_prim(&self, is_pseudo_root: bool) -> bool {
        is_pseudo_root
    }

    /// Reads a prim in place of the registered reader. Returns true when
    /// the prim was handled.
    fn override_prim_reader(
        &mut self,
        _args: &ReaderArgs<'_>,
        _context: &mut ReaderContext<'_>,
        _scene: &mut dyn TargetScene,
    ) -> bool {
        false
    }
}

/// The base behaviour: skip only the pseudo-root, never override readers.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl ImportHooks for DefaultHooks {}
