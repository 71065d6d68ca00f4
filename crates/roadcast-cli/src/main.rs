//! Roadcast Command-Line Interface
//!
//! Tools for running vehicular routing scenarios without a network:
//! - Simulating a fleet on a grid road map and reporting delivery stats
//! - Printing and validating protocol configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roadcast_core::{Motion, Position, ProtocolConfig, RoadMap, RoadSim, Trail, TrailSet};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "roadcast")]
#[command(author, version, about = "Vehicular geographic routing CLI", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a fleet simulation on a straight multi-junction road
    Run {
        /// Number of vehicles, spread evenly along the road
        #[arg(long, default_value = "8")]
        vehicles: usize,

        /// Number of junctions in the row
        #[arg(long, default_value = "6")]
        junctions: usize,

        /// Road segment length in meters
        #[arg(long, default_value = "200")]
        spacing: f64,

        /// Simulated duration in seconds
        #[arg(long, default_value = "30")]
        duration: f64,

        /// Seconds into the run at which the first vehicle sends to the last
        #[arg(long, default_value = "3")]
        send_at: f64,

        /// Protocol configuration file (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default protocol configuration as JSON
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { vehicles, junctions, spacing, duration, send_at, config } => {
            cmd_run(vehicles, junctions, spacing, duration, send_at, config)
        }
        Commands::Config => cmd_config(),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ProtocolConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(ProtocolConfig::default()),
    }
}

fn cmd_run(
    vehicles: usize,
    junctions: usize,
    spacing: f64,
    duration: f64,
    send_at: f64,
    config_path: Option<PathBuf>,
) -> Result<()> {
    if vehicles < 2 {
        bail!("need at least 2 vehicles (a sender and a destination)");
    }
    if junctions < 2 {
        bail!("need at least 2 junctions");
    }

    let mut config = load_config(config_path)?;
    config.junction_count = junctions;
    config.rendezvous_junction = junctions - 1;

    let map = RoadMap::grid(junctions, 1, spacing);
    let road_len = spacing * (junctions - 1) as f64;
    let mut sim = RoadSim::new(config, map);

    // Spread the fleet evenly along the road; each vehicle's trail covers
    // the segment it sits on
    let mut addrs = Vec::with_capacity(vehicles);
    for i in 0..vehicles {
        let x = road_len * i as f64 / (vehicles - 1) as f64;
        let seg = ((x / spacing) as usize).min(junctions - 2);
        let trails = TrailSet::new(vec![Trail {
            start: Position::new(x, 0.0),
            junctions: vec![seg, seg + 1],
        }]);
        let addr = sim.add_node(Motion::Fixed(Position::new(x, 0.0)), &trails, Duration::ZERO)?;
        addrs.push(addr);
    }

    let src = addrs[0];
    let dst = *addrs.last().expect("at least two vehicles");
    info!(%src, %dst, send_at, "scheduling payload");
    sim.send_at(
        Duration::from_secs_f64(send_at),
        src,
        dst,
        b"roadcast probe".to_vec(),
        32,
    );
    sim.run_until(Duration::from_secs_f64(duration));

    let report = sim.report();
    println!("vehicles:  {vehicles} on {junctions} junctions ({road_len} m)");
    println!("delivered: {}", report.delivered.len());
    for d in &report.delivered {
        println!("  {} -> {} at {} ({} bytes)", d.src, d.dst, d.at, d.payload.len());
    }
    println!("dropped:   {}", report.dropped.len());
    for d in &report.dropped {
        println!("  {} -> {} at {} ({:?})", d.src, d.dst, d.at, d.reason);
    }
    println!("stored:    {}", report.stored);
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = ProtocolConfig::default();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
