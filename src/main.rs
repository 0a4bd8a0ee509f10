mod conf;
mod display;
mod logging;
mod poller;
mod producer;
mod protocol;
mod reduce;
mod server;
mod socket;
mod source;
mod spectrum;
mod store;
mod transport;
mod waterfall;

use crate::conf::Settings;
use crate::display::{OutputFormat, emit_updates, read_view_updates};
use crate::poller::{Display, Poller, run_poller};
use crate::producer::{TimestampMode, run_producer};
use crate::protocol::ServerMessage;
use crate::reduce::{BinReduction, ReductionRequest};
use crate::server::StoreServer;
use crate::socket::expand_socket_path;
use crate::source::{ReplayHeader, ReplaySource, ReplayWriter, SpectrumSource, SyntheticSource};
use crate::spectrum::FrequencyAxis;
use crate::store::{LatestSlot, LatestValueStore, StoreClient};
use crate::transport::{LocalTransport, SocketTransport};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Rows buffered between the poller and stdout before new ones are dropped
const DISPLAY_QUEUE: usize = 16;

#[derive(Parser)]
#[command(name = "rfmon")]
#[command(about = "Live RF spectrum waterfall: producer, latest-value store and poller")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/rfmon/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store service socket path (overrides the config file)
    #[arg(long, global = true)]
    socket_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the latest-value store service
    Store,

    /// Produce integrations and push them to the store service
    Produce {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Poll the store service and print waterfall updates
    Monitor {
        #[command(flatten)]
        view: ViewArgs,

        /// Take the frequency axis from this replay file instead of the config
        #[arg(long)]
        axis_from: Option<PathBuf>,
    },

    /// Producer, store and poller in a single process
    Run {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Simulate a fixed duration and write it to a replay file
    Generate {
        /// Output file (NDJSON)
        output: PathBuf,

        /// Seconds of signal to simulate (default from config)
        #[arg(long)]
        duration: Option<f64>,

        /// Noise seed, for reproducible files
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check store service health
    Status,
}

#[derive(Args)]
struct SourceArgs {
    /// Replay this file instead of simulating
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Timestamp source for published integrations
    #[arg(long, value_enum)]
    timestamps: Option<TimestampMode>,

    /// Integration period in milliseconds
    #[arg(long)]
    period_ms: Option<u64>,
}

#[derive(Args)]
struct ViewArgs {
    /// Lower frequency bound in Hz (default: bottom of the band)
    #[arg(long, allow_negative_numbers = true)]
    f1: Option<f64>,

    /// Upper frequency bound in Hz (default: top of the band)
    #[arg(long, allow_negative_numbers = true)]
    f2: Option<f64>,

    /// Output width in points
    #[arg(long)]
    width: Option<usize>,

    /// How wide selections are downsampled
    #[arg(long, value_enum)]
    reduction: Option<BinReduction>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Read view changes as JSON lines from stdin
    #[arg(long)]
    view_input: bool,
}

impl ViewArgs {
    fn request(&self, axis: &FrequencyAxis, settings: &Settings) -> Result<ReductionRequest> {
        let width = self.width.unwrap_or(settings.monitor.width);
        let request = match (self.f1, self.f2) {
            (None, None) => ReductionRequest::full_range(axis, width),
            (f1, f2) => ReductionRequest::new(
                f1.unwrap_or(axis.min()),
                f2.unwrap_or(axis.max()),
                width,
            ),
        };
        request.context("Invalid view")
    }
}

/// Token cancelled on the first Ctrl-C
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
        }
        trigger.cancel();
    });
    token
}

fn build_source(settings: &Settings, replay: Option<&Path>) -> Result<Box<dyn SpectrumSource>> {
    match replay.or(settings.producer.replay.as_deref()) {
        Some(path) => {
            let source = ReplaySource::load(path)
                .with_context(|| format!("Failed to load replay file: {}", path.display()))?;
            tracing::info!(integrations = source.rows(), "replaying");
            Ok(Box::new(source))
        }
        None => {
            let source = SyntheticSource::new(settings.synthetic_config(None))
                .context("Failed to configure simulator")?;
            Ok(Box::new(source))
        }
    }
}

fn spectrum_axis(settings: &Settings, replay: Option<&Path>) -> Result<FrequencyAxis> {
    match replay {
        Some(path) => {
            let source = ReplaySource::load(path)
                .with_context(|| format!("Failed to load replay file: {}", path.display()))?;
            Ok(source.axis().clone())
        }
        None => FrequencyAxis::fft_shifted(
            settings.spectrum.sample_rate,
            settings.spectrum.bins,
            settings.spectrum.center_frequency,
        )
        .context("Invalid spectrum settings"),
    }
}

/// Poll `store` and print updates until shutdown
async fn monitor<S: LatestValueStore>(
    store: &S,
    axis: FrequencyAxis,
    view: &ViewArgs,
    settings: &Settings,
    shutdown: CancellationToken,
) -> Result<()> {
    let request = view.request(&axis, settings)?;
    let method = view.reduction.unwrap_or(settings.monitor.reduction);
    let poller = Poller::new(axis, settings.monitor.waterfall_height, &request, method)?;

    tracing::info!(
        f1 = request.f1(),
        f2 = request.f2(),
        width = request.width(),
        height = settings.monitor.waterfall_height.get(),
        "monitoring"
    );

    let (view_tx, view_rx) = watch::channel(request);
    let (rows_tx, rows_rx) = mpsc::channel(DISPLAY_QUEUE);
    let (snapshots_tx, snapshots_rx) = watch::channel(Arc::new(poller.snapshot()));

    if view.view_input {
        tokio::spawn(read_view_updates(
            BufReader::new(tokio::io::stdin()),
            view_tx,
            shutdown.clone(),
        ));
    }
    let printer = tokio::spawn(emit_updates(
        view.format,
        rows_rx,
        snapshots_rx,
        shutdown.clone(),
    ));

    run_poller(
        poller,
        store,
        settings.poll_interval(),
        view_rx,
        Display {
            rows: rows_tx,
            snapshots: snapshots_tx,
        },
        shutdown,
    )
    .await;

    printer.await.context("Output task failed")?
}

fn generate(settings: &Settings, output: &Path, duration: f64, seed: Option<u64>) -> Result<()> {
    let mut config = settings.synthetic_config(Some(duration));
    config.seed = seed.or(config.seed);
    let mut source = SyntheticSource::new(config).context("Failed to configure simulator")?;

    let header = ReplayHeader {
        sample_rate: settings.spectrum.sample_rate,
        bins: settings.spectrum.bins,
        noise_power: settings.simulation.noise_power,
        duration,
        frequencies: source.axis().clone(),
    };
    let mut writer = ReplayWriter::create(output, &header)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    tracing::info!(
        output = %output.display(),
        integrations = source.integration_limit(),
        "generating"
    );

    while let Some(integration) = source.next_integration() {
        writer.write(&integration)?;
        if (integration.timestamp() + 1) % 1000 == 0 {
            tracing::debug!(written = integration.timestamp() + 1, "progress");
        }
    }

    let written = writer.finish()?;
    tracing::info!(written, "replay file complete");
    Ok(())
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let socket_path = match &cli.socket_path {
        Some(path) => expand_socket_path(path),
        None => settings.socket_path(),
    };

    match cli.command {
        Commands::Store => {
            let shutdown = shutdown_on_ctrl_c();
            let slot = Arc::new(LatestSlot::new());
            let mut server = StoreServer::bind(&socket_path, slot)
                .with_context(|| format!("Failed to start store at {}", socket_path))?;

            tracing::info!(socket = %socket_path, "store service started");
            server.run(shutdown).await?;
        }

        Commands::Produce { source } => {
            let shutdown = shutdown_on_ctrl_c();
            let spectrum_source = build_source(&settings, source.replay.as_deref())?;
            let period = source
                .period_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| settings.integration_period());

            tracing::info!(socket = %socket_path, "producing to store");
            run_producer(
                spectrum_source,
                SocketTransport::new(socket_path),
                period,
                source.timestamps.unwrap_or(settings.producer.timestamps),
                shutdown,
            )
            .await;
        }

        Commands::Monitor { view, axis_from } => {
            let shutdown = shutdown_on_ctrl_c();
            let axis = spectrum_axis(&settings, axis_from.as_deref())?;
            let store = StoreClient::new(socket_path);
            monitor(&store, axis, &view, &settings, shutdown).await?;
        }

        Commands::Run { source, view } => {
            let shutdown = shutdown_on_ctrl_c();
            let slot = Arc::new(LatestSlot::new());
            let spectrum_source = build_source(&settings, source.replay.as_deref())?;
            let axis = spectrum_source.axis().clone();
            let period = source
                .period_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| settings.integration_period());

            let producer = tokio::spawn(run_producer(
                spectrum_source,
                LocalTransport::new(Arc::clone(&slot)),
                period,
                source.timestamps.unwrap_or(settings.producer.timestamps),
                shutdown.clone(),
            ));

            let result = monitor(&slot, axis, &view, &settings, shutdown.clone()).await;
            shutdown.cancel();
            producer.await.context("Producer task failed")?;
            result?;
        }

        Commands::Generate {
            output,
            duration,
            seed,
        } => {
            let duration = duration.unwrap_or(settings.simulation.duration);
            tokio::task::spawn_blocking(move || generate(&settings, &output, duration, seed))
                .await
                .context("Generator task failed")??;
        }

        Commands::Status => {
            let client = StoreClient::new(socket_path);
            match client.status().await? {
                ServerMessage::Status {
                    uptime_seconds,
                    writes,
                    last_timestamp,
                    bins,
                    ..
                } => {
                    let status_json = serde_json::json!({
                        "uptime_seconds": uptime_seconds,
                        "writes": writes,
                        "last_timestamp": last_timestamp,
                        "bins": bins,
                    });
                    println!("{}", serde_json::to_string_pretty(&status_json)?);
                }
                other => anyhow::bail!("Unexpected response from store: {:?}", other),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (settings, config_file) = match Settings::load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };

    logging::init_logging(&settings.logging);
    match &config_file {
        Some(path) => tracing::info!(config = %path.display(), "loaded settings"),
        None => tracing::info!("no config file, using defaults"),
    }

    // Exit without waiting on a blocked stdin reader
    let code = match run(cli, settings).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
