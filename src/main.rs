//! # LEPTOPROP-RS
//!
//! Propagates a batch of leptons through one sector and prints a summary.
//!
//! ```bash
//! leptoprop --energy 1e6 --distance 1e5 --count 100
//! leptoprop --config sector.json --seed 7
//! RUST_LOG=debug leptoprop --medium ice --scattering highland
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use leptoprop_rs::*;

#[derive(Parser, Debug)]
#[command(name = "leptoprop")]
#[command(about = "Monte Carlo propagation of high-energy leptons through matter")]
struct Args {
    /// Sector definition (JSON); defaults apply without it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Particle name, overrides the definition
    #[arg(long)]
    particle: Option<String>,

    /// Medium name, overrides the definition
    #[arg(long)]
    medium: Option<String>,

    /// Scattering model (none, highland), overrides the definition
    #[arg(long)]
    scattering: Option<String>,

    /// Initial energy (MeV)
    #[arg(long, default_value_t = 1e6)]
    energy: f64,

    /// Requested distance (cm); the sphere border when omitted
    #[arg(long)]
    distance: Option<f64>,

    /// Number of propagated particles
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "propagation failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    println!("{}", info());
    println!();

    let mut definition = match &args.config {
        Some(path) => SectorDefinition::load(path)?,
        None => SectorDefinition::default(),
    };
    if let Some(particle) = args.particle {
        definition.particle = particle;
    }
    if let Some(medium) = args.medium {
        definition.medium = medium;
    }
    if let Some(scattering) = args.scattering {
        definition.scattering = scattering.parse()?;
    }
    definition.validate()?;

    let start = Instant::now();
    let utility = Arc::new(PropagationUtility::from_definition(&definition, &ParametrizationRegistry::standard())?);
    info!(elapsed = ?start.elapsed(), "{}", utility.summary());

    let mut sector = Sector::with_utility(&definition, Arc::clone(&utility));
    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);

    let mut reached = 0usize;
    let mut decayed = 0usize;
    let mut stopped = 0usize;
    let mut final_energy = 0.0;
    let mut range = 0.0;
    let mut losses = 0usize;
    let mut weight = 0.0;

    let start = Instant::now();
    for _ in 0..args.count {
        sector.launch(args.energy, Vec3::zero(), Vec3::unit_z());
        let result = match args.distance {
            Some(distance) => sector.propagate(distance, &mut rng),
            None => sector.propagate_to_border(&mut rng),
        };
        losses += result.secondaries.len();
        weight += result.weighting.weight;
        match result.termination {
            Termination::DistanceReached => {
                reached += 1;
                final_energy += result.value;
            }
            Termination::Stopped => {
                stopped += 1;
                range -= result.value;
            }
            Termination::Decayed => {
                decayed += 1;
                range -= result.value;
            }
        }
    }
    let elapsed = start.elapsed();

    let mean = |sum: f64, n: usize| if n > 0 { sum / n as f64 } else { 0.0 };
    println!("Sector: {}", utility.summary());
    println!("  Medium:      {}", utility.medium().summary());
    println!("  Scattering:  {}", sector.scattering().name());
    println!("  Particles:   {} at {:.3e} MeV", args.count, args.energy);
    println!();
    println!("  Reached:     {reached} (mean energy {:.4e} MeV)", mean(final_energy, reached));
    println!("  Stopped:     {stopped}");
    println!("  Decayed:     {decayed}");
    println!("  Mean range:  {:.4e} cm", mean(range, stopped + decayed));
    println!("  Secondaries: {losses}");
    println!("  Mean weight: {:.4}", mean(weight, args.count));
    println!();
    println!("Wall-clock time: {:.3} s", elapsed.as_secs_f64());
    Ok(())
}
