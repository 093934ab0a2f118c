//! Headless simulation daemon.
//!
//! Loads a settings file, begins play and serves the per-class protocol
//! endpoints until the process is terminated. The main thread runs the
//! render tick, which logs status messages and sends telemetry.
//!
//! # Usage
//!
//! ```sh
//! drover --settings settings.json --threads 4
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use drover::vehicle::{ClassRegistry, RenderedState};
use drover::{ConfigError, Settings, SimError, SimMode};

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Render tick period on the main thread.
const RENDER_PERIOD: Duration = Duration::from_millis(16);

struct Args {
    settings: Option<PathBuf>,
    threads: Option<usize>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("drover: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    drover::init_tracing();

    let mut settings = match &args.settings {
        Some(path) => Settings::from_path(path)?,
        None => Settings::default(),
    };
    if let Some(threads) = args.threads {
        settings.api_server_threads = threads;
    }
    eprintln!(
        "drover: api on port {} ({} thread(s)), physics period {:?}",
        settings.api_server_port,
        settings.api_server_threads,
        settings.physics_loop_period()
    );

    let mut mode = SimMode::new(settings, ClassRegistry::standard());
    mode.begin_play()?;
    eprintln!("drover: ready");

    mode.start_api_server(false)?;
    // Runs until the router is stopped; Ctrl+C terminates the process.
    if let Some(stop) = mode.api_stop_handle() {
        let dt = RENDER_PERIOD.as_secs_f32();
        while !stop.is_stopped() {
            mode.render_tick(dt, &mut |_: &RenderedState| {});
            thread::sleep(RENDER_PERIOD);
        }
    }

    mode.end_play();
    eprintln!("drover: stopped");
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Args, CliError> {
    let mut parsed = Args {
        settings: None,
        threads: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--settings" | "-s" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| CliError::Usage("missing value for --settings".into()))?;
                parsed.settings = Some(PathBuf::from(value));
            }
            "--threads" | "-t" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| CliError::Usage("missing value for --threads".into()))?;
                let threads = value
                    .parse()
                    .map_err(|e| CliError::Usage(format!("invalid --threads {value}: {e}")))?;
                parsed.threads = Some(threads);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => return Err(CliError::Usage(format!("unknown argument: {arg}"))),
        }
        i += 1;
    }
    Ok(parsed)
}

fn print_usage() {
    eprintln!(
        r#"drover - vehicle simulation core

USAGE:
    drover [OPTIONS]

OPTIONS:
    -s, --settings <PATH>   Settings JSON (default: built-in defaults)
    -t, --threads <N>       Primary API server threads, clamped to [1, 8]
    -h, --help              Print this help message

EXAMPLE:
    drover --settings ~/Documents/settings.json --threads 4
"#
    );
}
