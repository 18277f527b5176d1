//! The organism side of classification
//!
//! Organisms live outside this crate. The registry only asks a unit for its
//! genome, how it came to exist and its generation.

use super::Genome;
use serde::{Deserialize, Serialize};

/// How the first member of a genotype arose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Unknown,
    /// Loaded from a saved population or genome file
    FileLoad,
    /// Produced by an organism dividing
    Divide,
    /// Injected by the experimenter
    Injected,
    /// Random genome
    Random,
    /// Built by a test harness
    TestHarness,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Unknown => "unknown",
            Source::FileLoad => "file_load",
            Source::Divide => "div",
            Source::Injected => "inject",
            Source::Random => "random",
            Source::TestHarness => "test",
        }
    }
}

/// A newly created organism as seen by the registry
pub trait Unit {
    fn genome(&self) -> &Genome;

    fn source(&self) -> Source {
        Source::Unknown
    }

    fn generation(&self) -> u32 {
        0
    }
}

/// Plain unit for drivers that do not have their own organism type
#[derive(Debug, Clone)]
pub struct Newborn {
    pub genome: Genome,
    pub source: Source,
    pub generation: u32,
}

impl Newborn {
    pub fn new(genome: Genome, source: Source) -> Self {
        Self {
            genome,
            source,
            generation: 0,
        }
    }

    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }
}

impl Unit for Newborn {
    fn genome(&self) -> &Genome {
        &self.genome
    }

    fn source(&self) -> Source {
        self.source
    }

    fn generation(&self) -> u32 {
        self.generation
    }
}

/// How a birth relates to its parents' genotypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breed {
    /// No parent genotype (founder or test organism)
    Founder,
    /// A parent belongs to the same genotype
    True,
    /// Parents belong to other genotypes
    In,
}

/// Measurements reported when an organism completes a gestation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GestationSample {
    pub copied_size: usize,
    pub executed_size: usize,
    pub gestation_time: u32,
    pub merit: f64,
    pub fitness: f64,
}

impl GestationSample {
    /// Offspring per time step; zero for a zero-length gestation
    pub fn reproduction_rate(&self) -> f64 {
        if self.gestation_time > 0 {
            1.0 / self.gestation_time as f64
        } else {
            0.0
        }
    }
}
