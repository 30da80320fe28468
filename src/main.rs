//! fieldnet - Network Runner
//!
//! Loads a network description, starts every looped trigger, runs for a
//! while and reports loop statistics.
//!
//! ```text
//! fieldnet <network.{json,toml}> [seconds] [--settings settings.toml]
//! ```

use anyhow::{bail, Context};
use fieldnet::{
    config::{EngineSettings, NetworkConfig},
    graph::{ElementType, KernelRegistry, Network},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_RUN_SECONDS: f64 = 5.0;

struct Args {
    network: PathBuf,
    seconds: f64,
    settings: Option<PathBuf>,
}

/// Run time in seconds: finite and not negative
fn parse_seconds(arg: &str) -> anyhow::Result<f64> {
    let seconds = arg
        .parse::<f64>()
        .with_context(|| format!("invalid duration '{}'", arg))?;
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("duration must be a finite number of seconds, got '{}'", arg);
    }
    Ok(seconds)
}

fn parse_args() -> anyhow::Result<Args> {
    let mut network = None;
    let mut seconds = None;
    let mut settings = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                settings = Some(PathBuf::from(
                    args.next().context("--settings needs a file")?,
                ))
            }
            _ if network.is_none() => network = Some(PathBuf::from(arg)),
            _ if seconds.is_none() => seconds = Some(parse_seconds(&arg)?),
            _ => bail!("unexpected argument '{}'", arg),
        }
    }

    let Some(network) = network else {
        bail!("usage: fieldnet <network.{{json,toml}}> [seconds] [--settings settings.toml]");
    };
    Ok(Args {
        network,
        seconds: seconds.unwrap_or(DEFAULT_RUN_SECONDS),
        settings,
    })
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let settings = match args.settings.as_ref() {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default_path()
            .map(EngineSettings::load_or_default)
            .unwrap_or_default(),
    };

    // Initialize logging; the guard flushes the file writer on exit
    let (file_layer, _guard) = match settings.log_directory.as_ref() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fieldnet.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fieldnet=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!("Loading network from {:?}", args.network);
    let config = NetworkConfig::load(&args.network)?;
    let network = Network::from_configuration(&config, &KernelRegistry::with_builtins(), settings)
        .with_context(|| format!("building network from {:?}", args.network))?;

    network.start_all()?;
    std::thread::sleep(Duration::from_secs_f64(args.seconds));
    tracing::info!("Shutting down...");
    network.stop_all()?;

    for id in network.elements() {
        if network.element_type(id)? != ElementType::LoopedTrigger {
            continue;
        }
        let stats = network.loop_statistics(id)?;
        tracing::info!(
            "{}: {} ticks, average wave {:?}, {} overruns",
            network.name(id)?,
            stats.ticks,
            stats.average_wave,
            stats.overruns
        );
    }
    Ok(())
}
