//! Index structures over active genotypes
//!
//! `PopulationBuckets` groups active ids by current population so the
//! dominant genotype is the head of the highest occupied bucket.
//! `HashIndex` maps the genome dispersion hash to candidate ids.

use crate::genotype::{Genome, GenotypeId};
use std::collections::{BTreeMap, HashMap};

/// Size-indexed buckets with stable insertion order inside each bucket
///
/// Every entry carries an ordering key. Back inserts take increasing keys and
/// front inserts take decreasing keys, so the head of a bucket is its
/// smallest key and removal is a keyed lookup instead of a scan.
#[derive(Debug)]
pub(crate) struct PopulationBuckets {
    buckets: Vec<BTreeMap<i64, GenotypeId>>,
    slots: HashMap<GenotypeId, (usize, i64)>,
    next_back: i64,
    next_front: i64,
}

impl PopulationBuckets {
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
            slots: HashMap::new(),
            next_back: 0,
            next_front: -1,
        }
    }

    pub fn push_back(&mut self, size: usize, id: GenotypeId) {
        let key = self.next_back;
        self.next_back += 1;
        self.insert(size, id, key);
    }

    pub fn push_front(&mut self, size: usize, id: GenotypeId) {
        let key = self.next_front;
        self.next_front -= 1;
        self.insert(size, id, key);
    }

    fn insert(&mut self, size: usize, id: GenotypeId, key: i64) {
        debug_assert!(!self.slots.contains_key(&id), "genotype {} already bucketed", id);
        if self.buckets.len() <= size {
            self.buckets.resize_with(size + 1, BTreeMap::new);
        }
        self.buckets[size].insert(key, id);
        self.slots.insert(id, (size, key));
    }

    /// Remove `id` if it sits in bucket `size`. Returns whether it was there.
    pub fn remove(&mut self, size: usize, id: GenotypeId) -> bool {
        match self.slots.get(&id) {
            Some(&(bucket, key)) if bucket == size => {
                self.slots.remove(&id);
                self.buckets[bucket].remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Bucket currently holding `id`
    pub fn size_of(&self, id: GenotypeId) -> Option<usize> {
        self.slots.get(&id).map(|&(size, _)| size)
    }

    pub fn is_empty_at(&self, size: usize) -> bool {
        self.buckets.get(size).map_or(true, BTreeMap::is_empty)
    }

    pub fn head(&self, size: usize) -> Option<GenotypeId> {
        self.buckets
            .get(size)
            .and_then(|bucket| bucket.values().next().copied())
    }

    /// Ids in bucket `size`, front to back
    pub fn bucket(&self, size: usize) -> impl Iterator<Item = GenotypeId> + '_ {
        self.buckets
            .get(size)
            .into_iter()
            .flat_map(|bucket| bucket.values().copied())
    }

    /// Occupied sizes from largest to smallest, each with its ids front to back
    pub fn iter_descending(&self) -> impl Iterator<Item = (usize, GenotypeId)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .rev()
            .flat_map(|(size, bucket)| bucket.values().map(move |&id| (size, id)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Dispersion-hash slots of active genotype ids
#[derive(Debug)]
pub(crate) struct HashIndex {
    slots: Vec<Vec<GenotypeId>>,
}

impl HashIndex {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![Vec::new(); size.max(1)],
        }
    }

    pub fn slot_for(&self, genome: &Genome) -> usize {
        (genome.dispersion_hash() % self.slots.len() as u64) as usize
    }

    pub fn candidates(&self, slot: usize) -> &[GenotypeId] {
        &self.slots[slot]
    }

    pub fn insert(&mut self, slot: usize, id: GenotypeId) {
        self.slots[slot].push(id);
    }

    pub fn remove(&mut self, slot: usize, id: GenotypeId) -> bool {
        let entries = &mut self.slots[slot];
        match entries.iter().position(|&entry| entry == id) {
            Some(pos) => {
                entries.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }
}
