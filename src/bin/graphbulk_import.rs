//! graphbulk-import - bulk-load CSV files into a graph store
//!
//! Usage:
//!   graphbulk-import import.yaml [--dry-run] [--url host:port] [--graph name] [--mode strict|lenient]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use graphbulk::config::{ConversionMode, ImportConfig};
use graphbulk::pipeline::CancelFlag;
use graphbulk::protocol::{DryRunTransport, RespTransport, Transport};
use graphbulk::Importer;

/// Bulk importer for GRAPH.BULK-capable stores
#[derive(Parser, Debug)]
#[command(name = "graphbulk-import", version)]
struct Args {
    /// Import configuration (YAML, or JSON with a .json extension)
    config: PathBuf,

    /// Decode and log batches instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Store address, overrides store.url
    #[arg(long, env = "GRAPHBULK_URL")]
    url: Option<String>,

    /// Target graph, overrides store.graph
    #[arg(long)]
    graph: Option<String>,

    /// Conversion mode, overrides import.mode
    #[arg(long)]
    mode: Option<ConversionMode>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(Args::parse()) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = ImportConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(url) = args.url {
        config.store.url = url;
    }
    if let Some(graph) = args.graph {
        config.store.graph = graph;
    }
    if let Some(mode) = args.mode {
        config.import.mode = mode;
    }

    let cancel = CancelFlag::new();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, cancel.as_arc())
            .context("registering signal handler")?;
    }

    let transport: Box<dyn Transport> = if args.dry_run {
        info!("dry run: nothing will be sent to {}", config.store.url);
        Box::new(DryRunTransport::new())
    } else {
        let transport = RespTransport::connect(
            &config.store.url,
            config.store.username.as_deref(),
            config.store.password.as_deref(),
        )
        .with_context(|| format!("connecting to {}", config.store.url))?;
        Box::new(transport)
    };

    info!(
        "importing {} file(s) into graph {} ({:?} mode)",
        config.files.len(),
        config.store.graph,
        config.import.mode
    );
    let mut importer = Importer::from_config(transport, &config, cancel);
    let stats = importer
        .run(&config.files)
        .with_context(|| format!("importing into graph {}", config.store.graph))?;

    info!(
        "done: {} nodes, {} edges in {} batches",
        stats.nodes, stats.edges, stats.batches
    );
    Ok(())
}
