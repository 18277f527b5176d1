//! Phylo CLI: drives a toy population through the genotype registry
//!
//! Commands:
//!   phylo demo [updates] [seed] [config.json]  run a mutating population
//!   phylo help                                 show usage

use log::info;
use phylo_core::{
    Genome, GestationSample, GenotypeId, Newborn, Registry, RegistryConfig, Source, ThresholdEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::env;

const INST_SET: &str = "heads_default";
const GENOME_LENGTH: usize = 24;
const OPCODES: u8 = 26;
const CAPACITY: usize = 400;
const BIRTH_RATE: f64 = 0.25;
const MUTATION_RATE: f64 = 0.015;
const DEATH_RATE: f64 = 0.02;

fn print_usage() {
    println!(
        r#"
Phylo: genotype registry demo

Usage: phylo <command> [options]

Commands:
  demo [updates] [seed] [config.json]   Run a toy population (default 200 updates, seed 42)
  help                                  Show this message

Examples:
  phylo demo
  phylo demo 1000 7
  RUST_LOG=debug phylo demo 50 1 strict.json
"#
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "demo" => {
            if let Err(e) = cmd_demo(&args[2..]) {
                eprintln!("  Demo failed: {}", e);
                std::process::exit(1);
            }
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
        }
    }
}

/// One simulated organism: its genotype and its own copy of the code
struct Organism {
    genotype: GenotypeId,
    code: Vec<u8>,
    generation: u32,
}

fn load_config(path: Option<&String>) -> Result<RegistryConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let config = RegistryConfig::from_json(&json)?;
            println!("  Loaded config from {}", path);
            Ok(config)
        }
        None => Ok(RegistryConfig::default()),
    }
}

fn mutate(code: &[u8], rng: &mut StdRng) -> Vec<u8> {
    code.iter()
        .map(|&op| {
            if rng.gen_bool(MUTATION_RATE) {
                rng.gen_range(0..OPCODES)
            } else {
                op
            }
        })
        .collect()
}

fn cmd_demo(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let updates: i64 = match args.first() {
        Some(s) => s.parse()?,
        None => 200,
    };
    let seed: u64 = match args.get(1) {
        Some(s) => s.parse()?,
        None => 42,
    };
    let config = load_config(args.get(2))?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut registry = Registry::new(config)?;
    registry.add_listener(Box::new(|event: ThresholdEvent, g: &phylo_core::Genotype| {
        if event == ThresholdEvent::Lost {
            info!(
                "Genotype {} lost threshold after {} units",
                g.name().unwrap_or_default(),
                g.total_units_ever()
            );
        }
    }));

    println!("\n  Phylo demo: {} updates, seed {}", updates, seed);
    println!("  {}", "=".repeat(60));

    let founder_code: Vec<u8> = (0..GENOME_LENGTH).map(|_| rng.gen_range(0..OPCODES)).collect();
    let founder = Newborn::new(Genome::from_opcodes(INST_SET, &founder_code), Source::Injected);
    let mut population = vec![Organism {
        genotype: registry.classify(&founder, &[], None)?,
        code: founder_code,
        generation: 0,
    }];

    for update in 0..updates {
        let mut newborns = Vec::new();
        for parent in &population {
            if !rng.gen_bool(BIRTH_RATE) {
                continue;
            }
            let sample = GestationSample {
                copied_size: parent.code.len(),
                executed_size: parent.code.len(),
                gestation_time: rng.gen_range(4..12),
                merit: parent.code.len() as f64,
                fitness: rng.gen_range(0.5..1.5),
            };
            registry.notify_gestation(parent.genotype, &sample)?;

            let code = mutate(&parent.code, &mut rng);
            let generation = parent.generation + 1;
            let unit = Newborn::new(Genome::from_opcodes(INST_SET, &code), Source::Divide)
                .with_generation(generation);
            let genotype = registry.classify(&unit, &[parent.genotype], None)?;
            newborns.push(Organism {
                genotype,
                code,
                generation,
            });
        }
        population.extend(newborns);

        let mut survivors = Vec::with_capacity(population.len());
        for organism in population {
            if rng.gen_bool(DEATH_RATE) {
                registry.remove_unit(organism.genotype)?;
            } else {
                survivors.push(organism);
            }
        }
        population = survivors;

        while population.len() > CAPACITY {
            let victim = population.swap_remove(rng.gen_range(0..population.len()));
            registry.remove_unit(victim.genotype)?;
        }

        registry.perform_update(update);
        if update % 25 == 0 || update + 1 == updates {
            let stats = registry.statistics();
            info!(
                "Update {}: {} units, {} active, {} historic, dominant {:?} ({}), entropy {:.3}, coalescent depth {:?}",
                stats.update,
                stats.total_units,
                stats.active,
                stats.historic,
                stats.dominant_id,
                stats.dominant_size,
                stats.entropy,
                stats.coalescent_depth
            );
        }
        if population.is_empty() {
            println!("  Population went extinct at update {}", update);
            break;
        }
    }

    let stats = registry.statistics().clone();
    println!("\n  Registry Statistics");
    println!("  {}", "-".repeat(40));
    println!("  Genotypes created:  {}", stats.total_created);
    println!("  Active / historic:  {} / {}", stats.active, stats.historic);
    println!("  Thresholded:        {} (ever {})", stats.current_thresholded, stats.total_thresholded);
    println!("  Mean depth:         {:.2}", stats.depth.mean);
    println!("  Mean age:           {:.2}", stats.age.mean);
    println!("  Entropy:            {:.4}", stats.entropy);

    if let Some(best) = registry.best_genotype() {
        let lineage = registry.lineage(best);
        println!("  Dominant lineage:   {} genotypes back to founder", lineage.len());
        if let Some(&ancestor) = lineage.get(2) {
            if let Some(relation) = registry.relationship(best, ancestor) {
                println!("  Dominant vs {}:     {}", ancestor, relation);
            }
        }
        if let Some(g) = registry.genotype(best) {
            println!("\n  Dominant genotype:");
            println!("{}", serde_json::to_string_pretty(&g.to_record())?);
        }
    }

    println!("\n  Thresholded genotypes:");
    println!("  {}", phylo_core::genotype::LEGACY_HEADER);
    for g in registry.genotypes().filter(|g| g.is_thresholded()) {
        println!("  {}", g.to_record().legacy_line());
    }
    Ok(())
}
