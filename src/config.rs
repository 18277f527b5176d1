//! RegistryConfig: knobs supplied by the surrounding simulation
//!
//! The registry only needs a handful of settings: when a genotype counts as
//! significant, whether parent lineage is recorded at all, whether
//! classification hints from serialized organisms are honoured, and how many
//! hash slots the active index uses.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default number of slots in the active hash index
pub const DEFAULT_HASH_TABLE_SIZE: usize = 3203;

/// Configuration for a [`Registry`](crate::Registry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Population at which a genotype is marked thresholded and named
    pub population_threshold: usize,
    /// Record parent genotypes on new genotypes (false discards lineage)
    pub record_lineage: bool,
    /// Honour genotype id hints carried by previously serialized organisms
    pub honor_hints: bool,
    /// Number of slots in the active hash index
    pub hash_table_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            population_threshold: 3,
            record_lineage: true,
            honor_hints: true,
            hash_table_size: DEFAULT_HASH_TABLE_SIZE,
        }
    }
}

impl RegistryConfig {
    /// Classification without ancestry: every genotype is a founder
    pub fn without_lineage() -> Self {
        Self {
            record_lineage: false,
            ..Self::default()
        }
    }

    /// High significance bar, hints ignored
    pub fn strict() -> Self {
        Self {
            population_threshold: 10,
            record_lineage: true,
            honor_hints: false,
            hash_table_size: DEFAULT_HASH_TABLE_SIZE,
        }
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_threshold < 1 {
            return Err(ConfigError::OutOfRange {
                field: "population_threshold",
                min: 1,
                value: self.population_threshold,
            });
        }
        if self.hash_table_size < 1 {
            return Err(ConfigError::OutOfRange {
                field: "hash_table_size",
                min: 1,
                value: self.hash_table_size,
            });
        }
        Ok(())
    }
}
