//! gravlens command-line interface.
//!
//! Run lensing jobs from TOML configuration files:
//! ```sh
//! gravlens-cli run job.toml
//! gravlens-cli validate job.toml
//! gravlens-cli models
//! gravlens-cli distance 0.5 2.0
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gravlens_core::ModelKind;
use gravlens_cosmology::{Cosmology, DistanceModel};

#[derive(Parser)]
#[command(name = "gravlens-cli")]
#[command(about = "gravlens: Gravitational Lens Field Simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a lensing job from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without evaluating any fields.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the available lens models and their parameters.
    Models,
    /// Angular diameter distance between two redshifts (default ΛCDM).
    Distance {
        z1: f64,
        z2: f64,
        /// Dimensionless Hubble parameter.
        #[arg(long, default_value_t = 0.7)]
        h: f64,
        /// Matter density.
        #[arg(long, default_value_t = 0.3)]
        omega_m: f64,
        /// Vacuum density.
        #[arg(long, default_value_t = 0.7)]
        omega_v: f64,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("gravlens Field Simulator");
            println!("========================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            runner::write_outputs(&result, &job, &out_dir)?;

            println!("Run complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let plane = runner::build_plane(&job)?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  {} components, {} sources, {}x{} grid",
                plane.components().len(),
                plane.sources().len(),
                plane.grid().size,
                plane.grid().size
            );
            Ok(())
        }
        Commands::Models => {
            println!("Available lens models:");
            println!();
            for kind in ModelKind::ALL {
                println!(
                    "  {:>2}  {:<11} {}",
                    kind.tag(),
                    kind.name(),
                    kind.description()
                );
                println!("      params: {}", kind.required_keys().join(", "));
            }
            Ok(())
        }
        Commands::Distance {
            z1,
            z2,
            h,
            omega_m,
            omega_v,
        } => {
            let cosmology = Cosmology::new(h, omega_m, 0.0, omega_v, -1.0)?;
            println!(
                "D_A({}, {}) = {:.6} Mpc  [{}]",
                z1,
                z2,
                cosmology.angular_diameter_distance(z1, z2),
                cosmology.name()
            );
            Ok(())
        }
    }
}
