use std::{path::PathBuf, str::FromStr};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use pilot_core::MpcSettings;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod fit;

#[derive(Debug, Parser)]
#[command(name = "pilot-cli")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Settings file. Created with the defaults if it does not exist.
    #[clap(long, global = true)]
    settings: Option<PathBuf>,

    #[clap(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write JSON logs to this file.
    #[clap(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Solve a single cycle and print the command as JSON.
    #[clap(name = "solve")]
    Solve {
        /// Vehicle state `x,y,psi,v,cte,epsi` in the vehicle frame.
        #[clap(long, value_delimiter = ',', allow_hyphen_values = true)]
        state: Vec<f64>,
        /// Reference coefficients `c0,c1,c2[,c3]`, ascending powers.
        #[clap(long, value_delimiter = ',', allow_hyphen_values = true)]
        coeffs: Vec<f64>,
    },

    /// Closed-loop simulation along a world-frame reference polynomial. Prints one JSON
    /// line per cycle.
    #[clap(name = "sim")]
    Sim {
        #[clap(long, default_value = "100")]
        steps: usize,
        /// World-frame reference coefficients, ascending powers.
        #[clap(long, value_delimiter = ',', allow_hyphen_values = true)]
        coeffs: Vec<f64>,
        /// Initial lateral offset from the path \[m].
        #[clap(long, default_value = "0", allow_hyphen_values = true)]
        cte0: f64,
        /// Initial heading error \[rad].
        #[clap(long, default_value = "0", allow_hyphen_values = true)]
        epsi0: f64,
        /// Initial speed \[m/s].
        #[clap(long, default_value = "0")]
        v0: f64,
        /// Override the reference speed from the settings.
        #[clap(long)]
        ref_v: Option<f64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = tracing::Level::from_str(&args.log_level)
        .map_err(|_| anyhow!("Invalid log level: {}", args.log_level))?;
    let (logfile_layer, _guard) = match &args.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking_appender, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::Layer::default()
                .json()
                .with_ansi(false)
                .with_writer(non_blocking_appender);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let subscriber = fmt::Subscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    subscriber
        .with(logfile_layer)
        .try_init()
        .context("Unable to set global tracing subscriber")?;

    let settings = match &args.settings {
        Some(path) => MpcSettings::load_or_insert(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => MpcSettings::default(),
    };

    match args.command {
        Command::Solve { state, coeffs } => commands::solve::run(settings, &state, &coeffs),
        Command::Sim {
            steps,
            coeffs,
            cte0,
            epsi0,
            v0,
            ref_v,
        } => {
            let mut settings = settings;
            if let Some(ref_v) = ref_v {
                if !ref_v.is_finite() {
                    bail!("Invalid reference speed: {ref_v}");
                }
                settings.ref_v = ref_v;
            }
            let initial = commands::sim::InitialOffset { cte0, epsi0, v0 };
            commands::sim::run(settings, steps, &coeffs, initial)
        }
    }
}
