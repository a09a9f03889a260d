//! Depth-first prim iteration with optional post-visits and pruning.

use super::{Prim, PrimPredicate};

/// One step of a [`PrimRange`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Visit<'s> {
    pub prim: Prim<'s>,
    /// False on the way down, true on the way back up (pre-and-post ranges
    /// only).
    pub is_post_visit: bool,
}

struct Frame<'s> {
    prim: Prim<'s>,
    children: Option<Vec<Prim<'s>>>,
    next_child: usize,
}

/// Walks a prim and its descendants that satisfy a predicate.
///
/// If the start prim does not satisfy the predicate the range is empty.
/// Call [`PrimRange::prune_children`] right after a pre-visit to skip that
/// prim's descendants.
pub struct PrimRange<'s> {
    predicate: PrimPredicate,
    post_visits: bool,
    start: Option<Prim<'s>>,
    stack: Vec<Frame<'s>>,
    prune_pending: bool,
}

impl<'s> PrimRange<'s> {
    /// Pre-order only.
    pub fn new(start: Prim<'s>, predicate: PrimPredicate) -> Self {
        Self::build(start, predicate, false)
    }

    /// Every prim is visited twice: before and after its descendants.
    pub fn pre_and_post_visit(start: Prim<'s>, predicate: PrimPredicate) -> Self {
        Self::build(start, predicate, true)
    }

    fn build(start: Prim<'s>, predicate: PrimPredicate, post_visits: bool) -> Self {
        let start = predicate.matches(&start).then_some(start);
        Self {
            predicate,
            post_visits,
            start,
            stack: Vec::new(),
            prune_pending: false,
        }
    }

    pub fn predicate(&self) -> PrimPredicate {
        self.predicate
    }

    /// True when nothing is left to visit.
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.stack.is_empty()
    }

    /// Skip the descendants of the prim just pre-visited.
    pub fn prune_children(&mut self) {
        match self.stack.last() {
            Some(frame) if frame.children.is_none() => self.prune_pending = true,
            _ => log::error!("prune_children called outside a pre-visit"),
        }
    }

    /// Drops the first visit, so iteration begins below the start prim.
    pub fn increment_begin(&mut self) {
        self.next();
    }
}

impl<'s> Iterator for PrimRange<'s> {
    type Item = Visit<'s>;

    fn next(&mut self) -> Option<Visit<'s>> {
        if let Some(start) = self.start.take() {
            self.stack.push(Frame {
                prim: start,
                children: None,
                next_child: 0,
            });
            return Some(Visit {
                prim: start,
                is_post_visit: false,
            });
        }

        loop {
            let prune = std::mem::take(&mut self.prune_pending);
            let predicate = self.predicate;
            let frame = self.stack.last_mut()?;
            let prim = frame.prim;
            let children = frame.children.get_or_insert_with(|| {
                if prune {
                    Vec::new()
                } else {
                    prim.children(predicate)
                }
            });

            if let Some(&child) = children.get(frame.next_child) {
                frame.next_child += 1;
                self.stack.push(Frame {
                    prim: child,
                    children: None,
                    next_child: 0,
                });
                return Some(Visit {
                    prim: child,
                    is_post_visit: false,
                });
            }

            let done = self.stack.pop()?;
            if self.post_visits {
                return Some(Visit {
                    prim: done.prim,
                    is_post_visit: true,
                });
            }
        }
    }
}
