//! Error types for the genotype registry.

use crate::genotype::GenotypeId;

/// Errors surfaced by registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("genotype id space exhausted")]
    IdSpaceExhausted,

    #[error("classification hint references genotype {0}, which was never issued")]
    InvalidHint(GenotypeId),

    #[error("unknown genotype: {0}")]
    UnknownGenotype(GenotypeId),

    #[error("genotype {0} has no living units to remove")]
    PopulationUnderflow(GenotypeId),

    #[error("genotype {id} holds no {kind} reference to release")]
    ReferenceUnderflow { id: GenotypeId, kind: ReferenceKind },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Which of the two reference tiers an operation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Active,
    Passive,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Active => f.write_str("active"),
            ReferenceKind::Passive => f.write_str("passive"),
        }
    }
}

/// Configuration parsing and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} must be at least {min}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: usize,
        value: usize,
    },
}

/// Genome construction errors
#[derive(Debug, thiserror::Error)]
pub enum GenomeError {
    #[error("invalid instruction symbol '{symbol}' at position {position}")]
    InvalidSymbol { symbol: char, position: usize },

    #[error("opcode {0} has no symbol (maximum is 51)")]
    OpcodeOutOfRange(u8),
}
