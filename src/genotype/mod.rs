//! Genotype: one phylogenetic unit
//!
//! A genotype groups every organism that carries a structurally equal genome.
//! It records where it came from (parents, depth, source), how many units it
//! has now and ever had, per-interval birth/death/breeding counters, and
//! running statistics of its members' gestation measurements.
//!
//! Lifetime is governed by two reference tiers. Active references are claims
//! from things that are alive; passive references are held by child genotypes
//! so ancestry chains never dangle. Only the registry mutates a genotype.

mod counters;
mod extensions;
mod genome;
mod record;
mod unit;

pub use counters::{IntervalCount, Moments, RunningStats};
pub use extensions::Extensions;
pub use genome::{Genome, Instruction};
pub use record::{GenotypeRecord, GenotypeSink, LEGACY_HEADER};
pub use unit::{Breed, GestationSample, Newborn, Source, Unit};

use serde::{Deserialize, Serialize};

/// Process-unique genotype identifier, assigned in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenotypeId(pub u64);

impl std::fmt::Display for GenotypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Update number used while a genotype is still active
pub const STILL_ACTIVE: i64 = -1;

/// One node of the phylogeny, owned by the registry
#[derive(Debug)]
pub struct Genotype {
    /// Creation-order id, never reused
    id: GenotypeId,
    /// Copy of the founding unit's genome
    genome: Genome,
    /// Set once, the first time the genotype is thresholded
    name: Option<String>,
    /// How the first unit arose
    source: Source,
    /// Parent genotypes in the order supplied at creation
    parents: Vec<GenotypeId>,
    /// Parent ids joined for display, `(none)` for founders
    parent_description: String,
    /// Zero for founders, else one more than the deepest parent
    depth: u32,

    /// Units alive now
    num_units: usize,
    /// `num_units` at the last interval reset
    last_num_units: usize,
    total_units_ever: u64,
    /// Child genotypes that are still active
    active_offspring_genotypes: usize,

    births: IntervalCount,
    deaths: IntervalCount,
    breed_in: IntervalCount,
    breed_true: IntervalCount,
    breed_out: IntervalCount,
    gestations: IntervalCount,

    /// Per-gestation measurements
    copied_size: RunningStats,
    executed_size: RunningStats,
    gestation_time: RunningStats,
    repro_rate: RunningStats,
    merit: RunningStats,
    fitness: RunningStats,

    generation_born: u32,
    update_born: i64,
    /// [`STILL_ACTIVE`] until the genotype moves to history
    update_deactivated: i64,

    /// Reached the population threshold or dominance while active
    thresholded: bool,
    /// In the hash index and a population bucket
    active: bool,
    /// Claims that keep the genotype active with zero units
    active_references: usize,
    /// Child links and external holders keeping the node in history
    passive_references: usize,

    /// Analysis data attached by other modules
    extensions: Extensions,
}

impl Genotype {
    /// A fresh, active genotype with no units yet
    pub(crate) fn new(
        id: GenotypeId,
        genome: Genome,
        source: Source,
        parents: Vec<(GenotypeId, u32)>,
        generation_born: u32,
        update_born: i64,
    ) -> Self {
        let depth = parents
            .iter()
            .map(|&(_, depth)| depth + 1)
            .max()
            .unwrap_or(0);
        let parents: Vec<GenotypeId> = parents.into_iter().map(|(id, _)| id).collect();
        let parent_description = describe_parents(&parents);
        Self {
            id,
            genome,
            name: None,
            source,
            parents,
            parent_description,
            depth,
            num_units: 0,
            last_num_units: 0,
            total_units_ever: 0,
            active_offspring_genotypes: 0,
            births: IntervalCount::default(),
            deaths: IntervalCount::default(),
            breed_in: IntervalCount::default(),
            breed_true: IntervalCount::default(),
            breed_out: IntervalCount::default(),
            gestations: IntervalCount::default(),
            copied_size: RunningStats::default(),
            executed_size: RunningStats::default(),
            gestation_time: RunningStats::default(),
            repro_rate: RunningStats::default(),
            merit: RunningStats::default(),
            fitness: RunningStats::default(),
            generation_born,
            update_born,
            update_deactivated: STILL_ACTIVE,
            thresholded: false,
            active: true,
            active_references: 0,
            passive_references: 0,
            extensions: Extensions::default(),
        }
    }

    /// Exact structural equality with the founding genome
    pub fn matches(&self, genome: &Genome) -> bool {
        self.genome == *genome
    }

    pub(crate) fn notify_new_unit(&mut self, breed: Breed) {
        self.num_units += 1;
        self.total_units_ever += 1;
        self.births.inc();
        match breed {
            Breed::True => self.breed_true.inc(),
            Breed::In => self.breed_in.inc(),
            Breed::Founder => {}
        }
    }

    pub(crate) fn notify_breed_out(&mut self) {
        self.breed_out.inc();
    }

    pub(crate) fn notify_gestation(&mut self, sample: &GestationSample) {
        self.gestations.inc();
        self.copied_size.add(sample.copied_size as f64);
        self.executed_size.add(sample.executed_size as f64);
        self.gestation_time.add(sample.gestation_time as f64);
        self.repro_rate.add(sample.reproduction_rate());
        self.merit.add(sample.merit);
        self.fitness.add(sample.fitness);
    }

    /// Returns false, changing nothing, when there is no unit to remove
    pub(crate) fn remove_unit(&mut self) -> bool {
        if self.num_units == 0 {
            return false;
        }
        self.num_units -= 1;
        self.deaths.inc();
        true
    }

    pub(crate) fn update_reset(&mut self) {
        self.last_num_units = self.num_units;
        self.births.update_reset();
        self.deaths.update_reset();
        self.breed_in.update_reset();
        self.breed_true.update_reset();
        self.breed_out.update_reset();
        self.gestations.update_reset();
    }

    pub(crate) fn deactivate(&mut self, update: i64) {
        self.active = false;
        self.update_deactivated = update;
    }

    pub(crate) fn reactivate(&mut self) {
        self.active = true;
        self.update_deactivated = STILL_ACTIVE;
    }

    pub(crate) fn set_thresholded(&mut self, thresholded: bool) {
        self.thresholded = thresholded;
    }

    /// Names are permanent; a second call keeps the first name
    pub(crate) fn assign_name(&mut self, name: String) {
        if self.name.is_none() {
            self.name = Some(name);
        }
    }

    pub(crate) fn add_active_reference(&mut self) {
        self.active_references += 1;
    }

    /// Returns `None` when no reference is held, otherwise whether the count reached zero
    pub(crate) fn remove_active_reference(&mut self) -> Option<bool> {
        self.active_references = self.active_references.checked_sub(1)?;
        Some(self.active_references == 0)
    }

    pub(crate) fn add_passive_reference(&mut self) {
        self.passive_references += 1;
    }

    pub(crate) fn remove_passive_reference(&mut self) -> Option<bool> {
        self.passive_references = self.passive_references.checked_sub(1)?;
        Some(self.passive_references == 0)
    }

    pub(crate) fn add_offspring_genotype(&mut self) {
        self.active_offspring_genotypes += 1;
    }

    pub(crate) fn remove_offspring_genotype(&mut self) {
        self.active_offspring_genotypes = self.active_offspring_genotypes.saturating_sub(1);
    }

    pub fn id(&self) -> GenotypeId {
        self.id
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn parents(&self) -> &[GenotypeId] {
        &self.parents
    }

    pub fn parent_description(&self) -> &str {
        &self.parent_description
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn num_units(&self) -> usize {
        self.num_units
    }

    pub fn last_num_units(&self) -> usize {
        self.last_num_units
    }

    pub fn total_units_ever(&self) -> u64 {
        self.total_units_ever
    }

    pub fn active_offspring_genotypes(&self) -> usize {
        self.active_offspring_genotypes
    }

    pub fn births(&self) -> &IntervalCount {
        &self.births
    }

    pub fn deaths(&self) -> &IntervalCount {
        &self.deaths
    }

    pub fn breed_in(&self) -> &IntervalCount {
        &self.breed_in
    }

    pub fn breed_true(&self) -> &IntervalCount {
        &self.breed_true
    }

    pub fn breed_out(&self) -> &IntervalCount {
        &self.breed_out
    }

    pub fn gestations(&self) -> &IntervalCount {
        &self.gestations
    }

    pub fn copied_size(&self) -> &RunningStats {
        &self.copied_size
    }

    pub fn executed_size(&self) -> &RunningStats {
        &self.executed_size
    }

    pub fn gestation_time(&self) -> &RunningStats {
        &self.gestation_time
    }

    pub fn repro_rate(&self) -> &RunningStats {
        &self.repro_rate
    }

    pub fn merit(&self) -> &RunningStats {
        &self.merit
    }

    pub fn fitness(&self) -> &RunningStats {
        &self.fitness
    }

    pub fn generation_born(&self) -> u32 {
        self.generation_born
    }

    pub fn update_born(&self) -> i64 {
        self.update_born
    }

    /// [`STILL_ACTIVE`] while active
    pub fn update_deactivated(&self) -> i64 {
        self.update_deactivated
    }

    pub fn is_thresholded(&self) -> bool {
        self.thresholded
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn active_references(&self) -> usize {
        self.active_references
    }

    pub fn passive_references(&self) -> usize {
        self.passive_references
    }

    pub fn total_references(&self) -> usize {
        self.active_references + self.passive_references
    }

    /// Living units or an active claim
    pub fn has_live_claim(&self) -> bool {
        self.num_units > 0 || self.active_references > 0
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Export the full field set for a serializer
    pub fn to_record(&self) -> GenotypeRecord {
        GenotypeRecord::from_genotype(self)
    }
}

fn describe_parents(parents: &[GenotypeId]) -> String {
    if parents.is_empty() {
        return "(none)".to_string();
    }
    parents
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
