//! Genome: the opaque, comparable sequence that defines a genotype
//!
//! The registry never interprets instructions. It needs structural equality,
//! a cheap dispersion hash over opcodes and, for export, a printable form.

use crate::error::GenomeError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Added to every opcode before weighting by position in [`Genome::dispersion_hash`]
const HASH_OPCODE_OFFSET: u64 = 3;

/// One instruction, identified by its opcode within the instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instruction(pub u8);

impl Instruction {
    pub fn opcode(self) -> u8 {
        self.0
    }

    pub fn symbol(self) -> Result<char, GenomeError> {
        match self.0 {
            op @ 0..=25 => Ok((b'a' + op) as char),
            op @ 26..=51 => Ok((b'A' + op - 26) as char),
            op => Err(GenomeError::OpcodeOutOfRange(op)),
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'a'..='z' => Some(Self(symbol as u8 - b'a')),
            'A'..='Z' => Some(Self(symbol as u8 - b'A' + 26)),
            _ => None,
        }
    }
}

/// An immutable instruction sequence tagged with its instruction set
///
/// Equality covers the instruction set and the sequence. The property bag is
/// carried for display and export only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    inst_set: String,
    sequence: Vec<Instruction>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.inst_set == other.inst_set && self.sequence == other.sequence
    }
}

impl Eq for Genome {}

impl std::hash::Hash for Genome {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inst_set.hash(state);
        self.sequence.hash(state);
    }
}

impl Genome {
    pub fn new(inst_set: impl Into<String>, sequence: Vec<Instruction>) -> Self {
        Self {
            inst_set: inst_set.into(),
            sequence,
            properties: BTreeMap::new(),
        }
    }

    /// Build from raw opcodes
    pub fn from_opcodes(inst_set: impl Into<String>, opcodes: &[u8]) -> Self {
        Self::new(inst_set, opcodes.iter().copied().map(Instruction).collect())
    }

    /// Parse the symbol form (`a-z` for opcodes 0-25, `A-Z` for 26-51)
    pub fn from_symbols(inst_set: impl Into<String>, symbols: &str) -> Result<Self, GenomeError> {
        let sequence = symbols
            .chars()
            .enumerate()
            .map(|(position, symbol)| {
                Instruction::from_symbol(symbol)
                    .ok_or(GenomeError::InvalidSymbol { symbol, position })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(inst_set, sequence))
    }

    pub fn to_symbols(&self) -> Result<String, GenomeError> {
        self.sequence.iter().map(|inst| inst.symbol()).collect()
    }

    /// Attach a display property; does not affect equality
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn inst_set(&self) -> &str {
        &self.inst_set
    }

    pub fn sequence(&self) -> &[Instruction] {
        &self.sequence
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Cheap position-weighted opcode sum used to pick a hash slot.
    /// Not collision free; callers always confirm with `==`.
    pub fn dispersion_hash(&self) -> u64 {
        self.sequence
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, inst)| {
                acc.wrapping_add((inst.0 as u64 + HASH_OPCODE_OFFSET).wrapping_mul(i as u64))
            })
    }

    /// SHA-256 over instruction set and opcodes, hex encoded
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.inst_set.as_bytes());
        hasher.update([0u8]);
        let opcodes: Vec<u8> = self.sequence.iter().map(|inst| inst.0).collect();
        hasher.update(&opcodes);
        hex::encode(hasher.finalize())
    }
}
