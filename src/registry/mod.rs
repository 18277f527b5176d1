//! Registry: owns every genotype and classifies new units
//!
//! The registry is the only owner of genotype nodes. Everything else refers
//! to a genotype by [`GenotypeId`]: the hash index, the population buckets,
//! the historic set and every parent link. Lifecycle per genotype:
//!
//! - **active**: in the hash index and exactly one population bucket
//! - **historic**: no living units and no active references, kept only while
//!   child genotypes hold passive references to it
//! - **collected**: both reference counts reached zero; the node is dropped
//!   and one passive reference is released on each parent, which may cascade
//!   further up the tree (always child before parent)

mod buckets;
mod coalescent;
mod events;
mod stats;

pub use events::{ThresholdEvent, ThresholdListener};
pub use stats::{RegistryStats, STAT_NAMES};

use crate::config::RegistryConfig;
use crate::error::{ReferenceKind, RegistryError};
use crate::genotype::{
    Breed, Extensions, GestationSample, Genotype, GenotypeId, GenotypeRecord, GenotypeSink, Unit,
};
use buckets::{HashIndex, PopulationBuckets};
use chrono::{DateTime, Utc};
use coalescent::CoalescentCache;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Minimum number of letters in a generated genotype name
const NAME_LETTERS: usize = 3;

/// Header plus every genotype record, ready for a serializer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub created_at: DateTime<Utc>,
    pub update: i64,
    pub stats: RegistryStats,
    pub genotypes: Vec<GenotypeRecord>,
}

/// Owner of every genotype, active or historic
pub struct Registry {
    /// Settings fixed at construction
    config: RegistryConfig,
    /// Arena of all live nodes; every other structure holds ids into it
    genotypes: HashMap<GenotypeId, Genotype>,
    /// Dispersion-hash slots over active genotypes
    hash_index: HashIndex,
    /// Active genotypes grouped by current population
    by_size: PopulationBuckets,
    /// Highest occupied bucket
    dominant_size: usize,
    /// Deactivated genotypes kept alive by references
    historic: BTreeSet<GenotypeId>,
    /// Id handed to the next new genotype
    next_id: u64,
    /// Update stamped on births and deactivations
    current_update: i64,
    /// Lazily recomputed coalescent point of the dominant lineage
    coalescent: CoalescentCache,
    /// Result of the last statistics pass
    stats: RegistryStats,
    /// Next name counter per genome length
    name_counters: HashMap<usize, u64>,
    /// Active genotypes currently marked thresholded
    current_thresholded: usize,
    /// Threshold crossings over the whole run
    total_thresholded: u64,
    /// Observers of threshold changes, called in registration order
    listeners: Vec<Box<dyn ThresholdListener + Send>>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: RegistryConfig) -> Self {
        Self {
            hash_index: HashIndex::new(config.hash_table_size),
            config,
            genotypes: HashMap::new(),
            by_size: PopulationBuckets::new(),
            dominant_size: 0,
            historic: BTreeSet::new(),
            next_id: 1,
            current_update: 0,
            coalescent: CoalescentCache::default(),
            stats: RegistryStats::default(),
            name_counters: HashMap::new(),
            current_thresholded: 0,
            total_thresholded: 0,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn current_update(&self) -> i64 {
        self.current_update
    }

    /// Register an observer for threshold changes
    pub fn add_listener(&mut self, listener: Box<dyn ThresholdListener + Send>) {
        self.listeners.push(listener);
    }

    /// Find or create the genotype of a newborn unit and count the birth.
    ///
    /// `parents` lists the genotypes of the unit's parents (empty for
    /// founders). `hint` is a genotype id carried by a previously serialized
    /// organism; a historic genotype found this way is reactivated.
    pub fn classify<U: Unit + ?Sized>(
        &mut self,
        unit: &U,
        parents: &[GenotypeId],
        hint: Option<GenotypeId>,
    ) -> Result<GenotypeId, RegistryError> {
        if let (true, Some(hint_id)) = (self.config.honor_hints, hint) {
            if hint_id.0 == 0 || hint_id.0 >= self.next_id {
                return Err(RegistryError::InvalidHint(hint_id));
            }
            if self.find_by_hint(hint_id) {
                debug_assert!(
                    self.genotypes[&hint_id].matches(unit.genome()),
                    "hint {} does not match the unit's genome",
                    hint_id
                );
                self.record_birth(hint_id, parents);
                return Ok(hint_id);
            }
        }

        let genome = unit.genome();
        let slot = self.hash_index.slot_for(genome);
        let found = self
            .hash_index
            .candidates(slot)
            .iter()
            .copied()
            .find(|id| self.genotypes.get(id).is_some_and(|g| g.matches(genome)));
        if let Some(found) = found {
            self.record_birth(found, parents);
            return Ok(found);
        }

        self.create_genotype(unit, parents, slot)
    }

    /// True when `id` is live; a historic hit is moved back to the active set
    fn find_by_hint(&mut self, id: GenotypeId) -> bool {
        match self.genotypes.get(&id) {
            Some(g) if g.is_active() => true,
            Some(_) => {
                self.reactivate(id);
                true
            }
            None => false,
        }
    }

    fn create_genotype<U: Unit + ?Sized>(
        &mut self,
        unit: &U,
        parents: &[GenotypeId],
        slot: usize,
    ) -> Result<GenotypeId, RegistryError> {
        let id = GenotypeId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(RegistryError::IdSpaceExhausted)?;

        let lineage: Vec<(GenotypeId, u32)> = if self.config.record_lineage {
            parents
                .iter()
                .filter_map(|&parent| match self.genotypes.get(&parent) {
                    Some(pg) => Some((parent, pg.depth())),
                    None => {
                        warn!("Parent genotype {} of new genotype {} is not live, skipping", parent, id);
                        None
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        for &(parent, _) in &lineage {
            if let Some(pg) = self.genotypes.get_mut(&parent) {
                pg.add_passive_reference();
                pg.add_offspring_genotype();
            }
        }
        if !lineage.is_empty() {
            self.coalescent.invalidate();
        }

        let genotype = Genotype::new(
            id,
            unit.genome().clone(),
            unit.source(),
            lineage,
            unit.generation(),
            self.current_update,
        );
        debug!(
            "Created genotype {} (depth {}, parents {})",
            id,
            genotype.depth(),
            genotype.parent_description()
        );
        self.hash_index.insert(slot, id);
        self.genotypes.insert(id, genotype);
        self.record_birth(id, parents);
        Ok(id)
    }

    fn record_birth(&mut self, id: GenotypeId, parents: &[GenotypeId]) {
        let breed = if parents.is_empty() {
            Breed::Founder
        } else if parents.contains(&id) {
            Breed::True
        } else {
            Breed::In
        };

        let Some(g) = self.genotypes.get_mut(&id) else {
            return;
        };
        let old_size = g.num_units();
        g.notify_new_unit(breed);
        let new_size = g.num_units();

        if breed == Breed::In {
            for parent in parents {
                if let Some(pg) = self.genotypes.get_mut(parent) {
                    pg.notify_breed_out();
                }
            }
        }
        self.adjust_genotype(id, old_size, new_size);
    }

    /// Record a completed gestation for a unit of genotype `id`
    pub fn notify_gestation(
        &mut self,
        id: GenotypeId,
        sample: &GestationSample,
    ) -> Result<(), RegistryError> {
        let g = self
            .genotypes
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGenotype(id))?;
        g.notify_gestation(sample);
        Ok(())
    }

    /// A unit of genotype `id` died
    pub fn remove_unit(&mut self, id: GenotypeId) -> Result<(), RegistryError> {
        let g = self
            .genotypes
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGenotype(id))?;
        let old_size = g.num_units();
        if !g.remove_unit() {
            return Err(RegistryError::PopulationUnderflow(id));
        }
        self.adjust_genotype(id, old_size, old_size - 1);
        Ok(())
    }

    /// Move `id` from population bucket `old_size` to `new_size`, updating
    /// dominance and threshold state. A genotype reaching zero units with no
    /// active references is handed to collection. Callers have already
    /// applied the unit change, so `new_size` equals the current count.
    pub(crate) fn adjust_genotype(&mut self, id: GenotypeId, old_size: usize, new_size: usize) {
        let Some(g) = self.genotypes.get(&id) else {
            debug_assert!(false, "adjusting unknown genotype {}", id);
            return;
        };
        debug_assert_eq!(
            new_size,
            g.num_units(),
            "genotype {} adjusted to {} units but holds {}",
            id,
            new_size,
            g.num_units()
        );
        let active_refs = g.active_references();

        let removed = self.by_size.remove(old_size, id);
        debug_assert!(
            removed || (old_size == 0 && self.by_size.size_of(id).is_none()),
            "genotype {} is not in population bucket {}",
            id,
            old_size
        );

        if old_size == self.dominant_size {
            while self.dominant_size > 0 && self.by_size.is_empty_at(self.dominant_size) {
                self.dominant_size -= 1;
            }
        }

        if new_size == 0 && active_refs == 0 {
            self.remove_genotype(id);
            return;
        }

        // a shrinking genotype keeps its lead among same-size peers
        if new_size < old_size && new_size == self.dominant_size {
            self.by_size.push_front(new_size, id);
        } else {
            self.by_size.push_back(new_size, id);
        }
        if new_size > self.dominant_size {
            self.dominant_size = new_size;
        }

        let dominant = new_size > 0 && self.best_genotype() == Some(id);
        let thresholded = self.genotypes.get(&id).is_some_and(Genotype::is_thresholded);
        if !thresholded && (new_size >= self.config.population_threshold || dominant) {
            self.mark_thresholded(id);
        }

        if self.coalescent.node() == Some(id) {
            self.coalescent.invalidate();
        }
    }

    fn mark_thresholded(&mut self, id: GenotypeId) {
        let Some(length) = self.genotypes.get(&id).map(|g| g.genome().len()) else {
            return;
        };
        let needs_name = self.genotypes.get(&id).is_some_and(|g| g.name().is_none());
        let name = needs_name.then(|| self.next_name(length));

        let Some(g) = self.genotypes.get_mut(&id) else {
            return;
        };
        g.set_thresholded(true);
        if let Some(name) = name {
            g.assign_name(name);
        }
        self.current_thresholded += 1;
        self.total_thresholded += 1;
        info!(
            "Genotype {} '{}' reached threshold ({} units)",
            id,
            g.name().unwrap_or_default(),
            g.num_units()
        );
        self.notify(ThresholdEvent::Reached, id);
    }

    fn next_name(&mut self, length: usize) -> String {
        let counter = self.name_counters.entry(length).or_insert(0);
        let n = *counter;
        *counter += 1;
        format!("{:03}-{}", length, base26(n))
    }

    fn notify(&mut self, event: ThresholdEvent, id: GenotypeId) {
        if let Some(g) = self.genotypes.get(&id) {
            for listener in self.listeners.iter_mut() {
                listener.on_threshold_event(event, g);
            }
        }
    }

    /// Collect `id` and any ancestors it was the last thing keeping alive
    fn remove_genotype(&mut self, id: GenotypeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(g) = self.genotypes.get(&id) else {
                continue;
            };
            if g.active_references() > 0 {
                continue;
            }
            if g.is_active() {
                self.deactivate(id);
            }

            if self.genotypes.get(&id).is_some_and(Genotype::is_thresholded) {
                if let Some(g) = self.genotypes.get_mut(&id) {
                    g.set_thresholded(false);
                }
                self.current_thresholded = self.current_thresholded.saturating_sub(1);
                self.notify(ThresholdEvent::Lost, id);
            }

            if self.genotypes.get(&id).is_some_and(|g| g.passive_references() > 0) {
                continue;
            }

            let Some(collected) = self.genotypes.remove(&id) else {
                continue;
            };
            self.historic.remove(&id);
            self.coalescent.invalidate();
            debug!("Collected genotype {} (depth {})", id, collected.depth());

            for &parent in collected.parents() {
                if let Some(pg) = self.genotypes.get_mut(&parent) {
                    pg.remove_passive_reference();
                    if !pg.is_active() && pg.total_references() == 0 {
                        pending.push(parent);
                    }
                }
            }
        }
    }

    fn deactivate(&mut self, id: GenotypeId) {
        let Some(g) = self.genotypes.get(&id) else {
            return;
        };
        let slot = self.hash_index.slot_for(g.genome());
        let unindexed = self.hash_index.remove(slot, id);
        debug_assert!(unindexed, "active genotype {} missing from hash index", id);
        let parents = g.parents().to_vec();

        for parent in &parents {
            if let Some(pg) = self.genotypes.get_mut(parent) {
                pg.remove_offspring_genotype();
            }
        }
        if let Some(g) = self.genotypes.get_mut(&id) {
            g.deactivate(self.current_update);
        }
        self.historic.insert(id);
        debug!("Genotype {} moved to history at update {}", id, self.current_update);
    }

    fn reactivate(&mut self, id: GenotypeId) {
        let Some(g) = self.genotypes.get_mut(&id) else {
            return;
        };
        g.reactivate();
        let slot = self.hash_index.slot_for(g.genome());
        self.coalescent.invalidate();
        let parents = g.parents().to_vec();

        for parent in &parents {
            if let Some(pg) = self.genotypes.get_mut(parent) {
                pg.add_offspring_genotype();
            }
        }
        self.historic.remove(&id);
        self.hash_index.insert(slot, id);
        debug!("Genotype {} reactivated from history", id);
    }

    pub fn add_active_reference(&mut self, id: GenotypeId) -> Result<(), RegistryError> {
        self.genotypes
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGenotype(id))?
            .add_active_reference();
        self.coalescent.invalidate();
        Ok(())
    }

    /// Release an active claim. A genotype left with no units and no active
    /// references is collected immediately.
    pub fn remove_active_reference(&mut self, id: GenotypeId) -> Result<(), RegistryError> {
        let g = self
            .genotypes
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGenotype(id))?;
        let reached_zero = g
            .remove_active_reference()
            .ok_or(RegistryError::ReferenceUnderflow {
                id,
                kind: ReferenceKind::Active,
            })?;
        self.coalescent.invalidate();
        if reached_zero && g.num_units() == 0 {
            self.adjust_genotype(id, 0, 0);
        }
        Ok(())
    }

    pub fn add_passive_reference(&mut self, id: GenotypeId) -> Result<(), RegistryError> {
        self.genotypes
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGenotype(id))?
            .add_passive_reference();
        self.coalescent.invalidate();
        Ok(())
    }

    /// Release an external passive claim. Collection, if due, happens in the
    /// historic sweep of the next `perform_update`.
    pub fn remove_passive_reference(&mut self, id: GenotypeId) -> Result<(), RegistryError> {
        self.genotypes
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGenotype(id))?
            .remove_passive_reference()
            .ok_or(RegistryError::ReferenceUnderflow {
                id,
                kind: ReferenceKind::Passive,
            })?;
        self.coalescent.invalidate();
        Ok(())
    }

    /// End-of-step bookkeeping for the update that just finished.
    ///
    /// Interval counters of active thresholded genotypes roll over first,
    /// then unreferenced historic genotypes are collected, then statistics
    /// are recomputed.
    pub fn perform_update(&mut self, update: i64) {
        self.current_update = update + 1;

        for (_, id) in self.by_size.iter_descending() {
            if let Some(g) = self.genotypes.get_mut(&id) {
                if g.is_thresholded() {
                    g.update_reset();
                }
            }
        }

        let collectible: Vec<GenotypeId> = self
            .historic
            .iter()
            .copied()
            .filter(|id| self.genotypes.get(id).is_some_and(|g| g.total_references() == 0))
            .collect();
        for id in collectible {
            self.remove_genotype(id);
        }

        self.compute_statistics();
    }

    /// Look a genotype up by id; `None` once it has been collected
    pub fn genotype(&self, id: GenotypeId) -> Option<&Genotype> {
        self.genotypes.get(&id)
    }

    pub fn contains(&self, id: GenotypeId) -> bool {
        self.genotypes.contains_key(&id)
    }

    /// Attached analyses for a live genotype
    pub fn extensions_mut(&mut self, id: GenotypeId) -> Option<&mut Extensions> {
        self.genotypes.get_mut(&id).map(Genotype::extensions_mut)
    }

    /// Every live genotype, active and historic, in no particular order
    pub fn genotypes(&self) -> impl Iterator<Item = &Genotype> {
        self.genotypes.values()
    }

    /// Head of the highest occupied population bucket
    pub fn best_genotype(&self) -> Option<GenotypeId> {
        if self.dominant_size == 0 {
            return None;
        }
        self.by_size.head(self.dominant_size)
    }

    pub fn best(&self) -> Option<&Genotype> {
        self.best_genotype().and_then(|id| self.genotypes.get(&id))
    }

    pub fn dominant_size(&self) -> usize {
        self.dominant_size
    }

    /// Active genotypes, largest population first, bucket order within a size
    pub fn active_ids(&self) -> Vec<GenotypeId> {
        self.by_size.iter_descending().map(|(_, id)| id).collect()
    }

    /// Historic genotypes in creation order
    pub fn historic_ids(&self) -> impl Iterator<Item = GenotypeId> + '_ {
        self.historic.iter().copied()
    }

    pub fn num_active(&self) -> usize {
        self.by_size.len()
    }

    pub fn num_historic(&self) -> usize {
        self.historic.len()
    }

    pub fn total_created(&self) -> u64 {
        self.next_id - 1
    }

    pub fn current_thresholded(&self) -> usize {
        self.current_thresholded
    }

    pub fn total_thresholded(&self) -> u64 {
        self.total_thresholded
    }

    /// First-parent chain from `id` up to its root, starting with `id`
    pub fn lineage(&self, id: GenotypeId) -> Vec<GenotypeId> {
        let mut chain = Vec::new();
        let mut cursor = self.genotypes.get(&id).map(|_| id);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self
                .genotypes
                .get(&current)
                .and_then(|g| g.parents().first().copied())
                .filter(|parent| self.genotypes.contains_key(parent));
        }
        chain
    }

    /// Hand every active genotype, then every historic one, to `sink`
    pub fn serialize(&self, sink: &mut dyn GenotypeSink) {
        for (_, id) in self.by_size.iter_descending() {
            if let Some(g) = self.genotypes.get(&id) {
                sink.write_genotype(g.to_record());
            }
        }
        for id in &self.historic {
            if let Some(g) = self.genotypes.get(id) {
                sink.write_genotype(g.to_record());
            }
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut genotypes = Vec::with_capacity(self.genotypes.len());
        self.serialize(&mut genotypes);
        RegistrySnapshot {
            created_at: Utc::now(),
            update: self.current_update,
            stats: self.stats.clone(),
            genotypes,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_valid_config(RegistryConfig::default())
    }
}

/// Letters for a name counter: 0 -> "aaa", 1 -> "aab", 26 -> "aba"
fn base26(mut n: u64) -> String {
    let mut letters = Vec::with_capacity(NAME_LETTERS);
    loop {
        letters.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    while letters.len() < NAME_LETTERS {
        letters.push('a');
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::{Genome, Newborn, Source};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::{Arc, Mutex};

    fn genome(opcodes: &[u8]) -> Genome {
        Genome::from_opcodes("heads_default", opcodes)
    }

    fn unit(opcodes: &[u8]) -> Newborn {
        Newborn::new(genome(opcodes), Source::Divide)
    }

    fn registry() -> Registry {
        let _ = env_logger::builder().is_test(true).try_init();
        Registry::default()
    }

    /// Structural checks that must hold between any two registry calls
    fn assert_consistent(reg: &Registry) {
        let mut max_active = 0;
        for id in reg.active_ids() {
            let g = &reg.genotypes[&id];
            assert!(g.is_active());
            assert!(!reg.historic.contains(&id));
            assert_eq!(reg.by_size.size_of(id), Some(g.num_units()));
            max_active = max_active.max(g.num_units());
        }
        assert_eq!(reg.dominant_size, max_active);
        if let Some(best) = reg.best() {
            assert_eq!(best.num_units(), max_active);
        }
        for id in &reg.historic {
            let g = &reg.genotypes[id];
            assert!(!g.is_active());
            assert_eq!(g.num_units(), 0);
            assert_eq!(reg.by_size.size_of(*id), None);
        }
        assert_eq!(reg.num_active() + reg.num_historic(), reg.genotypes.len());
        assert_eq!(reg.hash_index.len(), reg.num_active());

        // every parent link resolves and passive counts equal child links
        let mut expected_passive: HashMap<GenotypeId, usize> = HashMap::new();
        for g in reg.genotypes.values() {
            for parent in g.parents() {
                assert!(reg.contains(*parent), "dangling parent {} of {}", parent, g.id());
                *expected_passive.entry(*parent).or_default() += 1;
            }
        }
        for g in reg.genotypes.values() {
            let expected = expected_passive.get(&g.id()).copied().unwrap_or(0);
            assert_eq!(g.passive_references(), expected, "passive refs of {}", g.id());
            if g.is_thresholded() {
                assert!(g.name().is_some());
            }
        }
    }

    #[test]
    fn test_founder_scenario() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1, 2, 3]), &[], None).unwrap();
        assert_eq!(reg.dominant_size(), 1);
        let fg = reg.genotype(f).unwrap();
        assert!(fg.is_thresholded());
        assert_eq!(fg.name(), Some("003-aaa"));

        for _ in 0..5 {
            assert_eq!(reg.classify(&unit(&[1, 2, 3]), &[f], None).unwrap(), f);
        }
        assert_eq!(reg.genotype(f).unwrap().num_units(), 6);
        assert_eq!(reg.best_genotype(), Some(f));

        let m = reg.classify(&unit(&[1, 2, 4]), &[f], None).unwrap();
        assert_ne!(m, f);
        assert_eq!(reg.genotype(m).unwrap().depth(), 1);
        assert_eq!(reg.genotype(f).unwrap().passive_references(), 1);
        assert_consistent(&reg);

        for _ in 0..6 {
            reg.remove_unit(f).unwrap();
        }
        let fg = reg.genotype(f).expect("founder retained for ancestry");
        assert_eq!(fg.num_units(), 0);
        assert!(!fg.is_active());
        assert!(!fg.is_thresholded());
        assert_eq!(fg.name(), Some("003-aaa"));
        assert_eq!(reg.historic_ids().collect::<Vec<_>>(), vec![f]);
        assert_consistent(&reg);

        reg.remove_unit(m).unwrap();
        assert!(reg.genotype(m).is_none());
        assert!(reg.genotype(f).is_none());
        assert_eq!(reg.num_historic(), 0);
        assert_eq!(reg.num_active(), 0);
        assert_eq!(reg.dominant_size(), 0);
        assert_consistent(&reg);
    }

    #[test]
    fn test_classification_determinism_and_divergence() {
        let mut reg = registry();
        let a = reg.classify(&unit(&[5, 5, 5]), &[], None).unwrap();
        let b = reg.classify(&unit(&[5, 5, 5]), &[], None).unwrap();
        assert_eq!(a, b);

        let c = reg.classify(&unit(&[5, 5, 6]), &[a], None).unwrap();
        let d = reg.classify(&unit(&[6, 5, 5]), &[a], None).unwrap();
        assert!(c > a && d > c);
        assert_eq!(reg.total_created(), 3);
    }

    #[test]
    fn test_hash_collisions_resolved_by_equality() {
        let config = RegistryConfig {
            hash_table_size: 1,
            ..RegistryConfig::default()
        };
        let mut reg = Registry::new(config).unwrap();
        let a = reg.classify(&unit(&[1, 2]), &[], None).unwrap();
        let b = reg.classify(&unit(&[2, 1]), &[], None).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.classify(&unit(&[2, 1]), &[], None).unwrap(), b);
        assert_eq!(reg.genotype(b).unwrap().num_units(), 2);
    }

    #[test]
    fn test_breed_counters() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        reg.classify(&unit(&[1]), &[f], None).unwrap();
        let m = reg.classify(&unit(&[2]), &[f], None).unwrap();
        let fg = reg.genotype(f).unwrap();
        assert_eq!(fg.breed_true().total(), 1);
        assert_eq!(fg.breed_out().total(), 1);
        assert_eq!(fg.active_offspring_genotypes(), 1);
        assert_eq!(reg.genotype(m).unwrap().breed_in().total(), 1);
    }

    #[test]
    fn test_dominance_and_threshold() {
        let mut reg = registry();
        let a = reg.classify(&unit(&[1]), &[], None).unwrap();
        let b = reg.classify(&unit(&[2]), &[a], None).unwrap();
        assert!(!reg.genotype(b).unwrap().is_thresholded());

        reg.classify(&unit(&[2]), &[b], None).unwrap();
        assert_eq!(reg.best_genotype(), Some(b));
        assert!(reg.genotype(b).unwrap().is_thresholded());
        assert_eq!(reg.genotype(b).unwrap().name(), Some("001-aab"));
        assert_eq!(reg.current_thresholded(), 2);
        assert_eq!(reg.total_thresholded(), 2);

        reg.classify(&unit(&[2]), &[b], None).unwrap();
        assert_eq!(reg.dominant_size(), 3);
        reg.remove_unit(b).unwrap();
        reg.remove_unit(b).unwrap();
        assert_eq!(reg.dominant_size(), 1);
        assert_consistent(&reg);
    }

    #[test]
    fn test_shrinking_genotype_keeps_lead() {
        let mut reg = registry();
        let a = reg.classify(&unit(&[1]), &[], None).unwrap();
        let b = reg.classify(&unit(&[2]), &[], None).unwrap();
        reg.classify(&unit(&[1]), &[a], None).unwrap();
        reg.classify(&unit(&[2]), &[b], None).unwrap();
        // both at 2, a inserted first
        assert_eq!(reg.best_genotype(), Some(a));

        reg.classify(&unit(&[2]), &[b], None).unwrap();
        assert_eq!(reg.best_genotype(), Some(b));
        reg.remove_unit(b).unwrap();
        // b shrank back into the dominant bucket and stays in front of a
        assert_eq!(reg.dominant_size(), 2);
        assert_eq!(reg.best_genotype(), Some(b));
        assert_consistent(&reg);
    }

    #[test]
    fn test_first_created_first_dominant() {
        let mut reg = registry();
        let a = reg.classify(&unit(&[1]), &[], None).unwrap();
        let _b = reg.classify(&unit(&[2]), &[], None).unwrap();
        let _c = reg.classify(&unit(&[3]), &[], None).unwrap();
        assert_eq!(reg.best_genotype(), Some(a));
    }

    #[test]
    fn test_threshold_listener_events() {
        let mut reg = registry();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        reg.add_listener(Box::new(move |event: ThresholdEvent, g: &Genotype| {
            sink.lock().unwrap().push((event, g.id()));
        }));

        let f = reg.classify(&unit(&[1, 1]), &[], None).unwrap();
        reg.remove_unit(f).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![(ThresholdEvent::Reached, f), (ThresholdEvent::Lost, f)]
        );
    }

    #[test]
    fn test_registry_can_move_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<Registry>();
    }

    #[test]
    fn test_active_reference_delays_collection() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        reg.add_active_reference(f).unwrap();
        reg.remove_unit(f).unwrap();

        let fg = reg.genotype(f).unwrap();
        assert!(fg.is_active());
        assert_eq!(fg.num_units(), 0);
        assert_eq!(reg.dominant_size(), 0);
        assert_eq!(reg.best_genotype(), None);
        assert_consistent(&reg);

        // a new unit of the same genome finds the held genotype
        assert_eq!(reg.classify(&unit(&[1]), &[], None).unwrap(), f);
        reg.remove_unit(f).unwrap();

        reg.remove_active_reference(f).unwrap();
        assert!(reg.genotype(f).is_none());
        assert!(matches!(
            reg.remove_active_reference(f),
            Err(RegistryError::UnknownGenotype(_))
        ));
    }

    #[test]
    fn test_reference_underflow_is_an_error() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        assert!(matches!(
            reg.remove_active_reference(f),
            Err(RegistryError::ReferenceUnderflow { kind: ReferenceKind::Active, .. })
        ));
        assert!(matches!(
            reg.remove_passive_reference(f),
            Err(RegistryError::ReferenceUnderflow { kind: ReferenceKind::Passive, .. })
        ));
        reg.remove_unit(f).unwrap();
        assert!(reg.remove_unit(f).is_err());
    }

    #[test]
    fn test_population_underflow() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        let m = reg.classify(&unit(&[2]), &[f], None).unwrap();
        reg.remove_unit(f).unwrap();
        // f is historic with zero units
        assert!(matches!(
            reg.remove_unit(f),
            Err(RegistryError::PopulationUnderflow(id)) if id == f
        ));
        assert!(reg.contains(m));
    }

    #[test]
    fn test_external_passive_reference_swept_on_update() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        reg.add_passive_reference(f).unwrap();
        reg.remove_unit(f).unwrap();
        assert_eq!(reg.num_historic(), 1);

        reg.remove_passive_reference(f).unwrap();
        assert!(reg.contains(f));
        reg.perform_update(0);
        assert!(!reg.contains(f));
        assert_eq!(reg.current_update(), 1);
    }

    #[test]
    fn test_hint_reactivates_historic() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1, 2]), &[], None).unwrap();
        let m = reg.classify(&unit(&[3, 4]), &[f], None).unwrap();
        reg.remove_unit(f).unwrap();
        assert!(!reg.genotype(f).unwrap().is_active());
        assert_eq!(reg.genotype(f).unwrap().update_deactivated(), 0);

        let again = reg.classify(&unit(&[1, 2]), &[], Some(f)).unwrap();
        assert_eq!(again, f);
        let fg = reg.genotype(f).unwrap();
        assert!(fg.is_active());
        assert_eq!(fg.num_units(), 1);
        assert_eq!(fg.update_deactivated(), crate::genotype::STILL_ACTIVE);
        assert_eq!(fg.active_offspring_genotypes(), 1);
        assert!(reg.contains(m));
        assert_consistent(&reg);
    }

    #[test]
    fn test_invalid_hint() {
        let mut reg = registry();
        let err = reg.classify(&unit(&[1]), &[], Some(GenotypeId(99))).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidHint(GenotypeId(99))));
    }

    #[test]
    fn test_collected_hint_falls_back_to_genome() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        reg.remove_unit(f).unwrap();
        assert!(!reg.contains(f));
        let g = reg.classify(&unit(&[1]), &[], Some(f)).unwrap();
        assert_ne!(g, f);
    }

    #[test]
    fn test_hints_ignored_when_disabled() {
        let mut reg = Registry::new(RegistryConfig::strict()).unwrap();
        let f = reg.classify(&unit(&[1]), &[], Some(GenotypeId(500))).unwrap();
        assert_eq!(f, GenotypeId(1));
    }

    #[test]
    fn test_without_lineage() {
        let mut reg = Registry::new(RegistryConfig::without_lineage()).unwrap();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        let m = reg.classify(&unit(&[2]), &[f], None).unwrap();
        let mg = reg.genotype(m).unwrap();
        assert!(mg.parents().is_empty());
        assert_eq!(mg.depth(), 0);
        assert_eq!(reg.genotype(f).unwrap().passive_references(), 0);

        reg.remove_unit(f).unwrap();
        assert!(!reg.contains(f));
    }

    #[test]
    fn test_cascading_collection_down_a_chain() {
        let mut reg = registry();
        let mut parent = reg.classify(&unit(&[0]), &[], None).unwrap();
        let root = parent;
        for op in 1..50u8 {
            let child = reg.classify(&unit(&[op]), &[parent], None).unwrap();
            reg.remove_unit(parent).unwrap();
            parent = child;
        }
        assert_eq!(reg.num_historic(), 49);
        assert_eq!(reg.genotype(parent).unwrap().depth(), 49);
        assert_eq!(reg.lineage(parent).len(), 50);
        assert_eq!(reg.lineage(parent).last(), Some(&root));

        reg.remove_unit(parent).unwrap();
        assert_eq!(reg.genotypes().count(), 0);
    }

    #[test]
    fn test_sexual_parents() {
        let mut reg = registry();
        let a = reg.classify(&unit(&[1]), &[], None).unwrap();
        let b = reg.classify(&unit(&[2]), &[], None).unwrap();
        reg.classify(&unit(&[2]), &[b], None).unwrap();
        let c = reg.classify(&unit(&[3]), &[a, b], None).unwrap();
        let cg = reg.genotype(c).unwrap();
        assert_eq!(cg.depth(), 1);
        assert_eq!(cg.parent_description(), "1,2");
        assert_eq!(reg.genotype(a).unwrap().passive_references(), 1);
        assert_eq!(reg.genotype(b).unwrap().passive_references(), 1);

        reg.remove_unit(a).unwrap();
        reg.remove_unit(c).unwrap();
        assert!(!reg.contains(a));
        assert!(reg.contains(b));
        assert_consistent(&reg);
    }

    #[test]
    fn test_coalescent_tracks_branch_point() {
        let mut reg = registry();
        let root = reg.classify(&unit(&[0]), &[], None).unwrap();
        let left = reg.classify(&unit(&[1]), &[root], None).unwrap();
        let right = reg.classify(&unit(&[2]), &[root], None).unwrap();
        let deep = reg.classify(&unit(&[3]), &[left], None).unwrap();
        for _ in 0..3 {
            reg.classify(&unit(&[3]), &[deep], None).unwrap();
        }
        reg.remove_unit(root).unwrap();
        reg.remove_unit(left).unwrap();
        assert_eq!(reg.best_genotype(), Some(deep));

        // root has two children still referencing it
        assert_eq!(reg.coalescent(), Some(root));
        assert_eq!(reg.coalescent_depth(), Some(0));

        // once the right branch dies the dominant lineage is all that remains
        reg.remove_unit(right).unwrap();
        assert!(!reg.contains(right));
        assert!(reg.contains(root));
        assert_eq!(reg.coalescent(), Some(deep));
        assert_eq!(reg.coalescent_depth(), Some(2));
    }

    /// r -> a -> d with r and a dead, d dominant
    fn historic_chain(reg: &mut Registry) -> (GenotypeId, GenotypeId, GenotypeId) {
        let r = reg.classify(&unit(&[0, 0]), &[], None).unwrap();
        let a = reg.classify(&unit(&[1, 1]), &[r], None).unwrap();
        let d = reg.classify(&unit(&[2, 2]), &[a], None).unwrap();
        reg.remove_unit(r).unwrap();
        reg.remove_unit(a).unwrap();
        (r, a, d)
    }

    #[test]
    fn test_coalescent_follows_active_references() {
        let mut reg = registry();
        let (r, _, d) = historic_chain(&mut reg);
        assert_eq!(reg.coalescent(), Some(d));

        reg.add_active_reference(r).unwrap();
        assert_eq!(reg.coalescent(), Some(r));
        assert_eq!(reg.coalescent_depth(), Some(0));

        reg.remove_active_reference(r).unwrap();
        assert!(reg.contains(r));
        assert_eq!(reg.coalescent(), Some(d));
    }

    #[test]
    fn test_coalescent_follows_passive_references() {
        let mut reg = registry();
        let r = reg.classify(&unit(&[0]), &[], None).unwrap();
        let a = reg.classify(&unit(&[1]), &[r], None).unwrap();
        reg.add_passive_reference(r).unwrap();
        reg.remove_unit(r).unwrap();
        assert_eq!(reg.best_genotype(), Some(a));
        assert_eq!(reg.coalescent(), Some(r));

        reg.remove_passive_reference(r).unwrap();
        assert_eq!(reg.coalescent(), Some(a));
    }

    #[test]
    fn test_coalescent_follows_hint_reactivation() {
        let mut reg = registry();
        let (r, _, d) = historic_chain(&mut reg);
        assert_eq!(reg.coalescent(), Some(d));

        reg.classify(&unit(&[0, 0]), &[], Some(r)).unwrap();
        assert_eq!(reg.best_genotype(), Some(d));
        assert_eq!(reg.coalescent(), Some(r));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "adjusted to 2 units but holds 1")]
    fn test_adjust_rejects_size_out_of_step() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        reg.adjust_genotype(f, 1, 2);
    }

    #[test]
    fn test_threshold_recrossing_counts_again() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1, 2]), &[], None).unwrap();
        reg.classify(&unit(&[3, 4]), &[f], None).unwrap();
        assert_eq!(reg.total_thresholded(), 1);

        reg.remove_unit(f).unwrap();
        assert_eq!(reg.current_thresholded(), 0);

        for _ in 0..3 {
            reg.classify(&unit(&[1, 2]), &[], Some(f)).unwrap();
        }
        let fg = reg.genotype(f).unwrap();
        assert!(fg.is_thresholded());
        assert_eq!(fg.name(), Some("002-aaa"));
        assert_eq!(reg.current_thresholded(), 1);
        assert_eq!(reg.total_thresholded(), 2);
        assert_eq!(reg.name_counters[&2], 1);
        assert_consistent(&reg);
    }

    #[test]
    fn test_perform_update_rolls_counters() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        reg.classify(&unit(&[1]), &[f], None).unwrap();
        reg.notify_gestation(
            f,
            &GestationSample {
                gestation_time: 10,
                ..GestationSample::default()
            },
        )
        .unwrap();
        reg.perform_update(0);
        let fg = reg.genotype(f).unwrap();
        assert_eq!(fg.births().current(), 0);
        assert_eq!(fg.births().last(), 2);
        assert_eq!(fg.gestations().last(), 1);
        assert_eq!(fg.last_num_units(), 2);
        assert_eq!(reg.statistics().update, 1);
    }

    #[test]
    fn test_statistics_pass() {
        let mut reg = registry();
        let f = reg.classify(&Newborn::new(genome(&[1, 1]), Source::Injected), &[], None).unwrap();
        for _ in 0..3 {
            reg.classify(&unit(&[1, 1]), &[f], None).unwrap();
        }
        reg.perform_update(0);
        let stats = reg.statistics().clone();
        assert_eq!(stats.total_units, 4);
        assert_eq!(stats.entropy, 0.0);
        assert!(stats.entropy.is_sign_positive());
        assert_eq!(stats.dominant_id, Some(f));
        assert_eq!(stats.get("age.mean"), Some(1.0));
        assert_eq!(stats.get("genome_length.mean"), Some(2.0));

        reg.perform_update(1);
        let m = reg.classify(&unit(&[1, 2, 3]), &[f], None).unwrap();
        let stats = reg.compute_statistics().clone();
        assert_eq!(stats.total_units, 5);
        let p_f = 0.8f64;
        let p_m = 0.2f64;
        let expected = -(p_f * p_f.ln() + p_m * p_m.ln());
        assert!((stats.entropy - expected).abs() < 1e-12);
        assert!((stats.depth.mean - 0.2).abs() < 1e-12);
        assert_eq!(stats.active, 2);
        assert!(reg.contains(m));
        for name in STAT_NAMES {
            if *name != "dominant_id" && *name != "coalescent_depth" {
                assert!(stats.get(name).is_some(), "missing statistic {}", name);
            }
        }
    }

    #[test]
    fn test_snapshot_and_serialize() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        let m = reg.classify(&unit(&[2]), &[f], None).unwrap();
        reg.remove_unit(f).unwrap();

        let mut records: Vec<GenotypeRecord> = Vec::new();
        reg.serialize(&mut records);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, m);
        assert_eq!(records[1].id, f);
        assert!(!records[1].active);
        assert_eq!(records[0].parent_ids, vec![f]);

        let snapshot = reg.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.genotypes, snapshot.genotypes);
    }

    #[test]
    fn test_name_counters_per_length() {
        assert_eq!(base26(0), "aaa");
        assert_eq!(base26(1), "aab");
        assert_eq!(base26(26), "aba");
        assert_eq!(base26(17575), "zzz");
        assert_eq!(base26(17576), "baaa");

        let mut reg = registry();
        let a = reg.classify(&unit(&[1, 2]), &[], None).unwrap();
        let config_threshold = reg.config().population_threshold;
        let b = reg.classify(&unit(&[1, 2, 3]), &[], None).unwrap();
        let c = reg.classify(&unit(&[2, 2, 3]), &[], None).unwrap();
        for _ in 0..config_threshold {
            reg.classify(&unit(&[1, 2, 3]), &[b], None).unwrap();
            reg.classify(&unit(&[2, 2, 3]), &[c], None).unwrap();
        }
        assert_eq!(reg.genotype(a).unwrap().name(), Some("002-aaa"));
        assert_eq!(reg.genotype(b).unwrap().name(), Some("003-aaa"));
        assert_eq!(reg.genotype(c).unwrap().name(), Some("003-aab"));
    }

    #[test]
    fn test_extensions_through_registry() {
        let mut reg = registry();
        let f = reg.classify(&unit(&[1]), &[], None).unwrap();
        reg.extensions_mut(f).unwrap().insert(0.25f64);
        assert_eq!(reg.genotype(f).unwrap().extensions().get::<f64>(), Some(&0.25));
        assert!(reg.extensions_mut(GenotypeId(42)).is_none());
    }

    #[test]
    fn test_random_interleaving_preserves_invariants() {
        let mut reg = registry();
        let mut rng = StdRng::seed_from_u64(7);
        let mut alive: Vec<(GenotypeId, Vec<u8>)> = Vec::new();
        let mut held: Vec<GenotypeId> = Vec::new();

        for step in 0..3000 {
            let roll: f64 = rng.gen();
            if alive.is_empty() || roll < 0.5 {
                let (parents, mut code) = match alive.is_empty() {
                    true => (Vec::new(), vec![0u8; 4]),
                    false => {
                        let (pid, code) = alive[rng.gen_range(0..alive.len())].clone();
                        (vec![pid], code)
                    }
                };
                if rng.gen_bool(0.2) {
                    let pos = rng.gen_range(0..code.len());
                    code[pos] = rng.gen_range(0..6);
                }
                let id = reg.classify(&unit(&code), &parents, None).unwrap();
                alive.push((id, code));
            } else if roll < 0.95 {
                let idx = rng.gen_range(0..alive.len());
                let (id, _) = alive.swap_remove(idx);
                reg.remove_unit(id).unwrap();
            } else if roll < 0.975 {
                let (id, _) = alive[rng.gen_range(0..alive.len())].clone();
                reg.add_active_reference(id).unwrap();
                held.push(id);
            } else if let Some(id) = held.pop() {
                reg.remove_active_reference(id).unwrap();
            }

            if step % 25 == 0 {
                reg.perform_update(step / 25);
            }

            let total: usize = reg.active_ids().iter().map(|id| reg.genotype(*id).unwrap().num_units()).sum();
            assert_eq!(total, alive.len());
            for (id, _) in &alive {
                assert!(reg.genotype(*id).unwrap().is_active());
            }
            for id in &held {
                assert!(reg.contains(*id));
            }
            if step % 100 == 0 {
                assert_consistent(&reg);
                assert!(reg.compute_statistics().entropy >= 0.0);
            }
        }
        assert_consistent(&reg);
    }
}
