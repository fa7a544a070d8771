//! loadshed entry point: CLI wiring for replay and simulation runs.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use loadshed::config::{Config, parse_loads_json};
use loadshed::engine::{Clock, SystemClock};
use loadshed::journal::export_csv;
use loadshed::runner::{self, RunError, RunReport};
use loadshed::sink::JsonLinesSink;

#[derive(Parser)]
#[command(name = "loadshed")]
#[command(about = "Staged load shedding driven by a meter's overload warning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed JSON-lines messages to the engine and print its outputs
    Replay {
        /// TOML configuration supplying the load list
        #[arg(long, conflicts_with = "loads_json")]
        config: Option<PathBuf>,
        /// Load list as a JSON array, e.g. '[{"name":"pool","minOnSec":60}]'
        #[arg(long)]
        loads_json: Option<String>,
        /// Input file (defaults to stdin)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Clock start in ms since the Unix epoch (defaults to now)
        #[arg(long)]
        start_ms: Option<u64>,
        /// Export committed commands to CSV
        #[arg(long)]
        journal_out: Option<PathBuf>,
    },
    /// Run the simulated meter through the telemetry node into the engine
    Simulate {
        /// TOML configuration file
        #[arg(long, conflicts_with = "preset")]
        config: Option<PathBuf>,
        /// Built-in preset (see `presets`)
        #[arg(long)]
        preset: Option<String>,
        /// Override random seed
        #[arg(long)]
        seed: Option<u64>,
        /// Override number of poller steps
        #[arg(long)]
        steps: Option<usize>,
        /// Export committed commands to CSV
        #[arg(long)]
        journal_out: Option<PathBuf>,
        /// Start REST API server after the run
        #[cfg(feature = "api")]
        #[arg(long)]
        serve: bool,
        /// API server port
        #[cfg(feature = "api")]
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// List built-in presets
    Presets,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            config,
            loads_json,
            input,
            start_ms,
            journal_out,
        } => cmd_replay(config, loads_json, input, start_ms, journal_out),
        Commands::Simulate {
            config,
            preset,
            seed,
            steps,
            journal_out,
            #[cfg(feature = "api")]
            serve,
            #[cfg(feature = "api")]
            port,
        } => cmd_simulate(config, preset, seed, steps, journal_out).and_then(|report| {
            #[cfg(feature = "api")]
            if serve {
                return cmd_serve(report, port);
            }
            #[cfg(not(feature = "api"))]
            let _ = report;
            Ok(())
        }),
        Commands::Presets => {
            for name in Config::PRESETS {
                println!("{name}");
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_replay(
    config: Option<PathBuf>,
    loads_json: Option<String>,
    input: Option<PathBuf>,
    start_ms: Option<u64>,
    journal_out: Option<PathBuf>,
) -> Result<(), RunError> {
    let loads = match (config, loads_json) {
        (Some(path), _) => Config::from_toml_file(&path)?.loads,
        (None, Some(raw)) => parse_loads_json(&raw),
        (None, None) => Vec::new(),
    };
    let start_ms = start_ms.unwrap_or_else(|| SystemClock.now_ms());
    let sink = JsonLinesSink::new(io::stdout().lock());

    let (report, _) = match input {
        Some(path) => {
            let file = File::open(&path)?;
            runner::replay(&loads, BufReader::new(file), start_ms, sink)?
        }
        None => runner::replay(&loads, io::stdin().lock(), start_ms, sink)?,
    };

    finish(&report, journal_out.as_deref())
}

fn cmd_simulate(
    config: Option<PathBuf>,
    preset: Option<String>,
    seed: Option<u64>,
    steps: Option<usize>,
    journal_out: Option<PathBuf>,
) -> Result<RunReport, RunError> {
    // --config takes priority, then --preset, then household
    let mut cfg = match (config, preset) {
        (Some(path), _) => Config::from_toml_file(&path)?,
        (None, Some(name)) => Config::from_preset(&name)?,
        (None, None) => Config::household(),
    };
    if let Some(seed) = seed {
        cfg.simulation.seed = seed;
    }
    if let Some(steps) = steps {
        cfg.simulation.steps = steps;
    }

    let sink = JsonLinesSink::new(io::stdout().lock());
    let (report, _) = runner::simulate(&cfg, sink)?;
    finish(&report, journal_out.as_deref())?;
    Ok(report)
}

fn finish(report: &RunReport, journal_out: Option<&Path>) -> Result<(), RunError> {
    eprint!("{report}");
    if let Some(path) = journal_out {
        export_csv(&report.journal, path).map_err(|source| RunError::Journal {
            path: path.to_path_buf(),
            source,
        })?;
        eprintln!("Journal written to {}", path.display());
    }
    Ok(())
}

#[cfg(feature = "api")]
fn cmd_serve(report: RunReport, port: u16) -> Result<(), RunError> {
    use std::net::SocketAddr;
    use std::sync::Arc;

    let state = Arc::new(loadshed::api::AppState::from(report));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let rt = tokio::runtime::Runtime::new().map_err(RunError::Serve)?;
    rt.block_on(loadshed::api::serve(state, addr))
        .map_err(RunError::Serve)
}
