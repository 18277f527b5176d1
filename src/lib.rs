//! Phylo: runtime genotype registry for digital-evolution simulations
//!
//! Every newborn organism is classified into a genotype (a heritable lineage
//! defined by an exact genome). The registry tracks population per genotype,
//! the dominant genotype, threshold crossings, and keeps just enough extinct
//! ancestry to answer lineage, coalescent and relationship queries.

pub mod config;
pub mod error;
pub mod genotype;
pub mod registry;
pub mod relationship;

pub use config::RegistryConfig;
pub use error::{ConfigError, GenomeError, ReferenceKind, RegistryError};
pub use genotype::{
    Genome, GestationSample, Genotype, GenotypeId, GenotypeRecord, GenotypeSink, Instruction,
    Newborn, Source, Unit,
};
pub use registry::{Registry, RegistrySnapshot, RegistryStats, ThresholdEvent, ThresholdListener};
pub use relationship::{AncestorSnapshot, Relationship};
