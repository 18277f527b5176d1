//! Coalescent point of the dominant lineage
//!
//! The cache remembers which dominant genotype it was computed from. It is
//! recomputed when the dominant genotype changes or when it is marked stale:
//! a genotype with parents is created, the cached node is re-bucketed, a
//! genotype is reactivated or collected, or a reference count changes.

use super::Registry;
use crate::genotype::{Genotype, GenotypeId};

#[derive(Debug, Default)]
pub(crate) struct CoalescentCache {
    node: Option<GenotypeId>,
    depth: Option<u32>,
    computed_from: Option<GenotypeId>,
    stale: bool,
}

impl CoalescentCache {
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn node(&self) -> Option<GenotypeId> {
        self.node
    }

    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    fn is_current(&self, dominant: Option<GenotypeId>) -> bool {
        !self.stale && self.computed_from == dominant
    }

    fn store(&mut self, node: Option<GenotypeId>, depth: Option<u32>, from: Option<GenotypeId>) {
        self.node = node;
        self.depth = depth;
        self.computed_from = from;
        self.stale = false;
    }
}

impl Registry {
    /// Most recent ancestor of the dominant genotype from which more than one
    /// still-relevant lineage branches. Only the first parent is followed.
    pub fn coalescent(&mut self) -> Option<GenotypeId> {
        self.refresh_coalescent();
        self.coalescent.node
    }

    pub fn coalescent_depth(&mut self) -> Option<u32> {
        self.refresh_coalescent();
        self.coalescent.depth
    }

    pub(super) fn refresh_coalescent(&mut self) {
        let best = self.best_genotype();
        if self.coalescent.is_current(best) {
            return;
        }

        let first_parent = |g: &Genotype| g.parents().first().copied();
        let mut found = best;
        let mut cursor = best
            .and_then(|id| self.genotypes.get(&id))
            .and_then(first_parent);
        while let Some(id) = cursor {
            let Some(ancestor) = self.genotypes.get(&id) else {
                break;
            };
            if ancestor.has_live_claim() || ancestor.passive_references() > 1 {
                found = Some(id);
            }
            cursor = first_parent(ancestor);
        }

        let depth = found
            .and_then(|id| self.genotypes.get(&id))
            .map(Genotype::depth);
        self.coalescent.store(found, depth, best);
    }
}
