//! Serializer-facing view of a genotype
//!
//! The registry does no I/O. Persistence code receives a `GenotypeRecord`
//! per genotype through a [`GenotypeSink`] and writes it wherever it likes.

use super::{Genotype, GenotypeId, Instruction, Source};
use serde::{Deserialize, Serialize};

/// Column names for [`GenotypeRecord::legacy_line`]
pub const LEGACY_HEADER: &str = "id src parents num_units total_units length merit gest_time fitness gen_born update_born update_deactivated depth sequence";

/// Everything a serializer needs to persist or display one genotype
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenotypeRecord {
    pub id: GenotypeId,
    pub name: Option<String>,
    pub source: Source,
    pub parent_ids: Vec<GenotypeId>,
    pub parent_description: String,
    pub depth: u32,
    pub inst_set: String,
    pub sequence: Vec<u8>,
    /// Hex SHA-256 of instruction set and opcodes
    pub genome_digest: String,
    pub num_units: usize,
    pub last_num_units: usize,
    pub total_units_ever: u64,
    pub active_offspring_genotypes: usize,
    pub births: u64,
    pub deaths: u64,
    pub breed_in: u64,
    pub breed_true: u64,
    pub breed_out: u64,
    pub gestations: u64,
    pub ave_copied_size: f64,
    pub ave_executed_size: f64,
    pub ave_gestation_time: f64,
    pub ave_repro_rate: f64,
    pub ave_merit: f64,
    pub ave_fitness: f64,
    pub generation_born: u32,
    pub update_born: i64,
    pub update_deactivated: i64,
    pub thresholded: bool,
    pub active: bool,
    pub active_references: usize,
    pub passive_references: usize,
}

impl GenotypeRecord {
    pub fn from_genotype(g: &Genotype) -> Self {
        Self {
            id: g.id(),
            name: g.name().map(str::to_string),
            source: g.source(),
            parent_ids: g.parents().to_vec(),
            parent_description: g.parent_description().to_string(),
            depth: g.depth(),
            inst_set: g.genome().inst_set().to_string(),
            sequence: g.genome().sequence().iter().map(|inst| inst.opcode()).collect(),
            genome_digest: g.genome().digest(),
            num_units: g.num_units(),
            last_num_units: g.last_num_units(),
            total_units_ever: g.total_units_ever(),
            active_offspring_genotypes: g.active_offspring_genotypes(),
            births: g.births().total(),
            deaths: g.deaths().total(),
            breed_in: g.breed_in().total(),
            breed_true: g.breed_true().total(),
            breed_out: g.breed_out().total(),
            gestations: g.gestations().total(),
            ave_copied_size: g.copied_size().mean(),
            ave_executed_size: g.executed_size().mean(),
            ave_gestation_time: g.gestation_time().mean(),
            ave_repro_rate: g.repro_rate().mean(),
            ave_merit: g.merit().mean(),
            ave_fitness: g.fitness().mean(),
            generation_born: g.generation_born(),
            update_born: g.update_born(),
            update_deactivated: g.update_deactivated(),
            thresholded: g.is_thresholded(),
            active: g.is_active(),
            active_references: g.active_references(),
            passive_references: g.passive_references(),
        }
    }

    /// Space separated columns in [`LEGACY_HEADER`] order
    pub fn legacy_line(&self) -> String {
        let sequence: String = self
            .sequence
            .iter()
            .map(|&op| Instruction(op).symbol().unwrap_or('?'))
            .collect();
        let parents = if self.parent_ids.is_empty() {
            "(none)".to_string()
        } else {
            self.parent_description.clone()
        };
        format!(
            "{} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            self.id,
            self.source.as_str(),
            parents,
            self.num_units,
            self.total_units_ever,
            self.sequence.len(),
            self.ave_merit,
            self.ave_gestation_time,
            self.ave_fitness,
            self.generation_born,
            self.update_born,
            self.update_deactivated,
            self.depth,
            sequence,
        )
    }
}

/// Receives genotype records from [`Registry::serialize`](crate::Registry::serialize)
pub trait GenotypeSink {
    fn write_genotype(&mut self, record: GenotypeRecord);
}

impl GenotypeSink for Vec<GenotypeRecord> {
    fn write_genotype(&mut self, record: GenotypeRecord) {
        self.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::{Breed, Genome};

    fn sample() -> Genotype {
        let genome = Genome::from_symbols("heads_default", "rucav").unwrap();
        let mut g = Genotype::new(
            GenotypeId(12),
            genome,
            Source::Divide,
            vec![(GenotypeId(3), 1), (GenotypeId(5), 0)],
            2,
            40,
        );
        g.notify_new_unit(Breed::In);
        g
    }

    #[test]
    fn test_record_fields() {
        let record = sample().to_record();
        assert_eq!(record.id, GenotypeId(12));
        assert_eq!(record.parent_ids, vec![GenotypeId(3), GenotypeId(5)]);
        assert_eq!(record.parent_description, "3,5");
        assert_eq!(record.depth, 2);
        assert_eq!(record.num_units, 1);
        assert_eq!(record.breed_in, 1);
        assert_eq!(record.genome_digest.len(), 64);
        assert!(record.active);
    }

    #[test]
    fn test_legacy_line_columns() {
        let line = sample().to_record().legacy_line();
        let columns: Vec<&str> = line.split(' ').collect();
        assert_eq!(columns.len(), LEGACY_HEADER.split(' ').count());
        assert_eq!(columns[0], "12");
        assert_eq!(columns[1], "div");
        assert_eq!(columns[2], "3,5");
        assert_eq!(columns[5], "5");
        assert_eq!(columns[13], "rucav");
    }

    #[test]
    fn test_record_json() {
        let record = sample().to_record();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"parent_ids\":[3,5]"));
        let back: GenotypeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<GenotypeRecord> = Vec::new();
        sink.write_genotype(sample().to_record());
        assert_eq!(sink.len(), 1);
    }
}
