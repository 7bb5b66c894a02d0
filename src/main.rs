use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use procpulse::config::{self, OutputFormat, load_config, load_config_from_path};
use procpulse::report::Reporter;
use procpulse::system::cache::SamplingCache;
use procpulse::system::poller::{DEFAULT_INTERVAL, Poller, SnapshotSubscriber};
use procpulse::system::provider::MetricsProvider;
use procpulse::system::terminate::{TerminateResult, terminate_process};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "procpulse",
    about = "System and per-process resource telemetry with rate-normalized I/O"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Explicit path to the native helper library
    #[arg(long)]
    native_lib: Option<PathBuf>,

    /// Skip the native helper and use generic enumeration
    #[arg(long, default_value_t = false)]
    no_native: bool,

    /// Output format: text, json
    #[arg(long)]
    format: Option<String>,

    /// Number of processes listed per snapshot in text output
    #[arg(long)]
    top: Option<usize>,

    /// Print a single snapshot and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Log filter directive, e.g. `info` or `procpulse=debug`
    #[arg(long)]
    log_level: Option<String>,

    /// Terminate the given PID and exit
    #[arg(long, value_name = "PID")]
    terminate: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;
    let config = load_config_for_cli(&cli)?;

    if let Some(pid) = cli.terminate {
        return match terminate_process(pid) {
            TerminateResult::Success(pid) => {
                println!("terminated {pid}");
                Ok(())
            }
            TerminateResult::NotFound(pid) => Err(eyre!("no process with PID {pid}")),
            TerminateResult::Failed(_, reason) => Err(eyre!(reason)),
        };
    }

    let reporter = Reporter::from_config(&config.output);
    let native = config.native.clone();
    let provider = tokio::task::spawn_blocking(move || MetricsProvider::new(&native))
        .await
        .wrap_err("backend selection panicked")?;
    if let Some(reason) = provider.fallback_reason() {
        info!(reason, "running on generic enumeration");
    }

    if cli.once {
        return run_once(provider, reporter).await;
    }

    let interval = Duration::from_millis(config.general.interval_ms);
    let cache = Arc::new(SamplingCache::new(provider));
    let mut poller = Poller::new(cache, interval);
    poller.add_subscriber(Arc::new(reporter));
    poller.start();

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for ctrl-c")?;
    info!("shutting down");
    poller.stop();
    poller.join().await;
    Ok(())
}

async fn run_once(mut provider: MetricsProvider, reporter: Reporter) -> Result<()> {
    let snapshot = tokio::task::spawn_blocking(move || {
        // The first sample only primes rate and CPU baselines.
        provider.sample()?;
        std::thread::sleep(Duration::from_millis(250));
        provider.sample()
    })
    .await
    .wrap_err("sampling panicked")??;
    reporter.on_snapshot(&snapshot);
    Ok(())
}

fn init_tracing(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .wrap_err_with(|| format!("invalid --log-level `{directive}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> Result<config::Config> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(interval) = cli.interval_ms {
        config.general.interval_ms = interval;
    }
    if config.general.interval_ms == 0 {
        let fallback = DEFAULT_INTERVAL.as_millis() as u64;
        warn!(fallback, "interval_ms must be positive");
        config.general.interval_ms = fallback;
    }
    if let Some(ref path) = cli.native_lib {
        config.native.library_path = Some(path.clone());
    }
    if cli.no_native {
        config.native.enabled = false;
    }
    if let Some(ref format) = cli.format {
        config.output.format = OutputFormat::from_str_config(format)
            .ok_or_else(|| eyre!("unknown --format `{format}` (expected text or json)"))?;
    }
    if let Some(top) = cli.top {
        config.output.top = top;
    }

    Ok(config)
}
