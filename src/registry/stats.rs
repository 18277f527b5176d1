//! Aggregate statistics over the active population
//!
//! Recomputed at the end of every `perform_update`, or on demand through
//! [`Registry::compute_statistics`]. Every value can be looked up by name.

use super::Registry;
use crate::genotype::{GenotypeId, Moments, RunningStats};
use serde::{Deserialize, Serialize};

/// Names accepted by [`RegistryStats::get`]
pub const STAT_NAMES: &[&str] = &[
    "update",
    "total_created",
    "active",
    "historic",
    "current_thresholded",
    "total_thresholded",
    "dominant_id",
    "dominant_size",
    "coalescent_depth",
    "total_units",
    "entropy",
    "age.mean",
    "age.variance",
    "age.std_error",
    "abundance.mean",
    "abundance.variance",
    "abundance.std_error",
    "depth.mean",
    "depth.variance",
    "depth.std_error",
    "genome_length.mean",
    "genome_length.variance",
    "genome_length.std_error",
    "threshold_age.mean",
    "threshold_age.variance",
    "threshold_age.std_error",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub update: i64,
    pub total_created: u64,
    pub active: usize,
    pub historic: usize,
    pub current_thresholded: usize,
    /// Threshold crossings, counting a genotype again when it returns from history
    pub total_thresholded: u64,
    pub dominant_id: Option<GenotypeId>,
    pub dominant_size: usize,
    pub coalescent_depth: Option<u32>,
    pub total_units: usize,
    /// Shannon entropy of the genotype frequency distribution (natural log)
    pub entropy: f64,
    /// Population-weighted, in updates since birth
    pub age: Moments,
    pub abundance: Moments,
    pub depth: Moments,
    pub genome_length: Moments,
    /// Age restricted to thresholded genotypes
    pub threshold_age: Moments,
}

impl RegistryStats {
    /// Look a statistic up by name; `None` for unknown names or absent values
    pub fn get(&self, name: &str) -> Option<f64> {
        if let Some((field, moment)) = name.split_once('.') {
            let moments = match field {
                "age" => &self.age,
                "abundance" => &self.abundance,
                "depth" => &self.depth,
                "genome_length" => &self.genome_length,
                "threshold_age" => &self.threshold_age,
                _ => return None,
            };
            return match moment {
                "mean" => Some(moments.mean),
                "variance" => Some(moments.variance),
                "std_error" => Some(moments.std_error),
                _ => None,
            };
        }
        match name {
            "update" => Some(self.update as f64),
            "total_created" => Some(self.total_created as f64),
            "active" => Some(self.active as f64),
            "historic" => Some(self.historic as f64),
            "current_thresholded" => Some(self.current_thresholded as f64),
            "total_thresholded" => Some(self.total_thresholded as f64),
            "dominant_id" => self.dominant_id.map(|id| id.0 as f64),
            "dominant_size" => Some(self.dominant_size as f64),
            "coalescent_depth" => self.coalescent_depth.map(f64::from),
            "total_units" => Some(self.total_units as f64),
            "entropy" => Some(self.entropy),
            _ => None,
        }
    }
}

/// `-sum p ln p` over population counts. A single holder of the whole
/// population contributes exactly zero.
pub(crate) fn shannon_entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .copied()
        .filter(|&n| n > 0 && (n as f64) < total)
        .map(|n| {
            let p = n as f64 / total;
            -p * p.ln()
        })
        .fold(0.0, |acc, h| acc + h)
}

impl Registry {
    /// Last statistics computed by `perform_update` or `compute_statistics`
    pub fn statistics(&self) -> &RegistryStats {
        &self.stats
    }

    pub fn compute_statistics(&mut self) -> &RegistryStats {
        self.refresh_coalescent();

        let mut age = RunningStats::new();
        let mut abundance = RunningStats::new();
        let mut depth = RunningStats::new();
        let mut genome_length = RunningStats::new();
        let mut threshold_age = RunningStats::new();
        let mut total_units = 0usize;
        let mut counts = Vec::with_capacity(self.by_size.len());

        for (_, id) in self.by_size.iter_descending() {
            let Some(g) = self.genotypes.get(&id) else {
                continue;
            };
            let units = g.num_units();
            if units == 0 {
                continue;
            }
            let weight = units as f64;
            let g_age = (self.current_update - g.update_born()) as f64;
            total_units += units;
            counts.push(units);
            age.add_weighted(g_age, weight);
            abundance.add_weighted(weight, weight);
            depth.add_weighted(g.depth() as f64, weight);
            genome_length.add_weighted(g.genome().len() as f64, weight);
            if g.is_thresholded() {
                threshold_age.add_weighted(g_age, weight);
            }
        }

        let entropy = shannon_entropy(&counts);

        self.stats = RegistryStats {
            update: self.current_update,
            total_created: self.total_created(),
            active: self.by_size.len(),
            historic: self.historic.len(),
            current_thresholded: self.current_thresholded,
            total_thresholded: self.total_thresholded,
            dominant_id: self.best_genotype(),
            dominant_size: self.dominant_size,
            coalescent_depth: self.coalescent.depth(),
            total_units,
            entropy,
            age: Moments::from(&age),
            abundance: Moments::from(&abundance),
            depth: Moments::from(&depth),
            genome_length: Moments::from(&genome_length),
            threshold_age: Moments::from(&threshold_age),
        };
        &self.stats
    }
}
