//! Phylogenetic relationship between two genotypes
//!
//! Each genotype lazily gets an [`AncestorSnapshot`] stored in its extension
//! bag: the ids of its first two parents followed by the first two parents of
//! each of those. Comparing two snapshots classifies the pair up to first
//! cousins without walking the tree again.

use crate::genotype::GenotypeId;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parent and grandparent ids of one genotype
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AncestorSnapshot {
    /// `[parent1, parent2, gp1, gp2, gp3, gp4]`; grandparents 1-2 come from
    /// parent1, 3-4 from parent2
    slots: [Option<GenotypeId>; 6],
}

impl AncestorSnapshot {
    pub fn parents(&self) -> impl Iterator<Item = GenotypeId> + '_ {
        self.slots[..2].iter().flatten().copied()
    }

    pub fn grandparents(&self) -> impl Iterator<Item = GenotypeId> + '_ {
        self.slots[2..].iter().flatten().copied()
    }

    pub fn slots(&self) -> &[Option<GenotypeId>; 6] {
        &self.slots
    }

    fn has_parent(&self, id: GenotypeId) -> bool {
        self.parents().any(|p| p == id)
    }

    fn has_grandparent(&self, id: GenotypeId) -> bool {
        self.grandparents().any(|g| g == id)
    }
}

fn first_two(parents: &[GenotypeId]) -> [Option<GenotypeId>; 2] {
    [parents.first().copied(), parents.get(1).copied()]
}

fn intersects(mut a: impl Iterator<Item = GenotypeId>, b: &[GenotypeId]) -> bool {
    a.any(|id| b.contains(&id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Identical,
    /// Either genotype is a direct parent of the other
    Parent,
    /// Either genotype is a grandparent of the other
    Grandparent,
    Sibling,
    /// One genotype's parent is the other's grandparent
    AuntUncle,
    Cousin,
    /// Nothing in common within two generations
    Unrelated,
}

impl Relationship {
    pub fn distance(self) -> u8 {
        match self {
            Relationship::Identical => 0,
            Relationship::Parent => 1,
            Relationship::Grandparent | Relationship::Sibling => 2,
            Relationship::AuntUncle => 3,
            Relationship::Cousin => 4,
            Relationship::Unrelated => 5,
        }
    }

    fn classify(a: GenotypeId, sa: &AncestorSnapshot, b: GenotypeId, sb: &AncestorSnapshot) -> Self {
        if a == b {
            return Relationship::Identical;
        }
        if sa.has_parent(b) || sb.has_parent(a) {
            return Relationship::Parent;
        }
        if sa.has_grandparent(b) || sb.has_grandparent(a) {
            return Relationship::Grandparent;
        }

        let b_parents: Vec<GenotypeId> = sb.parents().collect();
        if intersects(sa.parents(), &b_parents) {
            return Relationship::Sibling;
        }

        let b_grand: Vec<GenotypeId> = sb.grandparents().collect();
        if intersects(sa.parents(), &b_grand) || intersects(sa.grandparents(), &b_parents) {
            return Relationship::AuntUncle;
        }
        if intersects(sa.grandparents(), &b_grand) {
            return Relationship::Cousin;
        }
        Relationship::Unrelated
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Relationship::Identical => "identical",
            Relationship::Parent => "parent",
            Relationship::Grandparent => "grandparent",
            Relationship::Sibling => "sibling",
            Relationship::AuntUncle => "aunt/uncle",
            Relationship::Cousin => "cousin",
            Relationship::Unrelated => "unrelated",
        };
        f.write_str(label)
    }
}

impl Registry {
    /// Cached ancestor snapshot of `id`, computed on first use.
    ///
    /// Grandparents are read from the parent's cached snapshot when it has
    /// one, otherwise straight from the parent's links. Parents are never
    /// given a snapshot as a side effect.
    pub fn ancestor_snapshot(&mut self, id: GenotypeId) -> Option<AncestorSnapshot> {
        let g = self.genotype(id)?;
        if let Some(cached) = g.extensions().get::<AncestorSnapshot>() {
            return Some(*cached);
        }

        let [p1, p2] = first_two(g.parents());
        let grandparents = |parent: Option<GenotypeId>| {
            parent
                .and_then(|pid| self.genotype(pid))
                .map(|pg| match pg.extensions().get::<AncestorSnapshot>() {
                    Some(snapshot) => [snapshot.slots[0], snapshot.slots[1]],
                    None => first_two(pg.parents()),
                })
                .unwrap_or([None, None])
        };
        let [gp1, gp2] = grandparents(p1);
        let [gp3, gp4] = grandparents(p2);

        let snapshot = AncestorSnapshot {
            slots: [p1, p2, gp1, gp2, gp3, gp4],
        };
        self.extensions_mut(id)?.insert(snapshot);
        Some(snapshot)
    }

    /// `None` when either genotype is no longer held by the registry
    pub fn relationship(&mut self, a: GenotypeId, b: GenotypeId) -> Option<Relationship> {
        let sa = self.ancestor_snapshot(a)?;
        let sb = self.ancestor_snapshot(b)?;
        Some(Relationship::classify(a, &sa, b, &sb))
    }

    /// Relationship distance from 0 (identical) to 5 (unrelated)
    pub fn distance(&mut self, a: GenotypeId, b: GenotypeId) -> Option<u8> {
        self.relationship(a, b).map(Relationship::distance)
    }
}
