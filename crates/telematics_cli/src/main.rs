mod console;

use std::io;
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use telematics_core::config::{load_driver_configs, DriverConfig, SimulationConfig};
use telematics_core::publish::{BroadcastUpdate, ChannelBroadcastSink};
use telematics_core::routing::{FileRouteSource, RouteSource};
use telematics_core::runner::Simulation;

/// Capacity of the dashboard channel; updates beyond it are dropped.
const DASHBOARD_CAPACITY: usize = 1_024;

#[derive(Parser)]
#[command(
    name = "telematics-sim",
    about = "Fleet telematics driver simulation",
    long_about = "Simulates a fleet of insured drivers moving along routes and \
                  emits one telemetry record per tick, including crash events."
)]
struct Cli {
    /// Simulation configuration file (JSON)
    #[arg(long, env = "TELEMATICS_CONFIG")]
    config: Option<PathBuf>,
    /// Driver configuration file (JSON array)
    #[arg(long, env = "TELEMATICS_DRIVERS")]
    drivers: Option<PathBuf>,
    /// Directory of route files; a `daily/` subdirectory is also read
    #[arg(long, env = "TELEMATICS_ROUTES")]
    routes: Option<PathBuf>,
    /// Number of demo drivers when no driver file is given
    #[arg(long, default_value_t = 5)]
    demo_drivers: u32,
    /// Stop after this many loop iterations instead of running until `stop`
    #[arg(long)]
    ticks: Option<usize>,
    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// Enable random accidents regardless of the configuration file
    #[arg(long)]
    enable_accidents: bool,
    /// Base tick interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.interval_ms = interval_ms;
    }
    if cli.enable_accidents {
        config.crash.random_accidents_enabled = true;
    }

    let routes = load_routes(cli.routes.as_ref());
    let drivers = match &cli.drivers {
        Some(path) => load_driver_configs(path)
            .with_context(|| format!("loading drivers from {}", path.display()))?,
        None => demo_drivers(cli.demo_drivers),
    };

    let (sink, updates) = ChannelBroadcastSink::bounded(DASHBOARD_CAPACITY);
    let dashboard = thread::Builder::new()
        .name("dashboard".into())
        .spawn(move || {
            let mut received = 0u64;
            for BroadcastUpdate { snapshot, record } in updates.iter() {
                received += 1;
                debug!(
                    "dashboard | driver {} {} {:.1} mph on {} | g={:.2}{}",
                    snapshot.driver_id,
                    snapshot.state,
                    snapshot.speed_mph,
                    snapshot.street,
                    record.g_force,
                    record
                        .accident_type
                        .map(|a| format!(" {a}"))
                        .unwrap_or_default()
                );
            }
            received
        })
        .context("spawning dashboard thread")?;

    let mut sim = Simulation::builder(config)
        .drivers(drivers)
        .routes(routes)
        .broadcast(Box::new(sink))
        .build()
        .context("building simulation")?;
    if sim.driver_count() == 0 {
        warn!("no drivers could be spawned; nothing to simulate");
    }

    if !cli.no_console {
        let handle = sim.control_handle();
        // Detached: a blocked stdin read must not hold up shutdown.
        thread::Builder::new()
            .name("console".into())
            .spawn(move || console::run(io::stdin().lock(), &handle))
            .context("spawning console thread")?;
        info!("{}", console::HELP);
    }

    match cli.ticks {
        Some(ticks) => {
            let done = sim.run_for(ticks);
            info!("ran {done} iterations, {} messages sent", sim.messages_sent());
            sim.log_final_stats();
        }
        None => sim.run(),
    }
    info!("publish totals: {}", sim.metrics().summary());

    drop(sim);
    match dashboard.join() {
        Ok(received) => info!("dashboard received {received} updates"),
        Err(_) => warn!("dashboard thread panicked"),
    }
    Ok(())
}

/// `RUST_LOG` overrides the level chosen by `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_routes(dir: Option<&PathBuf>) -> Box<dyn RouteSource> {
    match dir {
        Some(dir) => match FileRouteSource::load_dir(dir) {
            Ok(source) => Box::new(source),
            Err(err) => {
                warn!("{err}; using the built-in demo route");
                Box::new(FileRouteSource::demo())
            }
        },
        None => Box::new(FileRouteSource::demo()),
    }
}

/// Drivers homed in lower Manhattan with sequential identifiers.
fn demo_drivers(count: u32) -> Vec<DriverConfig> {
    (1..=count)
        .map(|i| DriverConfig {
            driver_id: i,
            policy_id: 200_000 + i,
            vehicle_id: 300_000 + i,
            vin: format!("1HGCM82633A{:06}", 4_350 + i),
            home_latitude: 40.7128 + f64::from(i) * 0.001,
            home_longitude: -74.0060,
            preferred_route: None,
            aggressive: i % 4 == 0,
            driver_name: Some(format!("Demo Driver {i}")),
        })
        .collect()
}
