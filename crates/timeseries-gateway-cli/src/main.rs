//! CLI tool for inspecting availability and replaying backend responses.

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use log::info;
use snafu::ResultExt;
use timeseries_gateway_core::{
    availability::ConcreteAvailability,
    config::GatewayConfig,
    constraint::{PhysicalDataSourceConstraint, PhysicalNameMapping},
    datasource::BackendQuery,
    metadata::{DataSourceName, InMemoryMetadataStore},
    nesting::{BackendResponse, full_response_strategy},
    pipeline::ResponsePipeline,
    response::{ChannelResponseProcessor, LoggingContext, PartialDataProcessor},
    table::PhysicalTable,
};

use crate::error::{
    BuildResponseSnafu, CliResult, LoadConfigSnafu, LoadMetadataSnafu, NoOutcomeSnafu,
    ParseLogicalMapSnafu, ReadBodySnafu, ReadLogicalMapSnafu, RenderSnafu, RequestSnafu,
    StrategySnafu,
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the intervals where every requested column is available
    Resolve {
        /// Metadata snapshot: {"<source>": {"<column>": ["<start>/<end>", ...]}}
        #[arg(long)]
        metadata: PathBuf,

        #[arg(long)]
        source: String,

        /// Repeatable column names (logical if --logical-map is given)
        #[arg(long = "column")]
        columns: Vec<String>,

        /// JSON object mapping logical column names to physical ones
        #[arg(long = "logical-map")]
        logical_map: Option<PathBuf>,
    },

    /// Run a captured backend response through the partial-data chain
    Process {
        /// File holding the response body
        #[arg(long)]
        body: PathBuf,

        /// Raw value of the response-context header (omit to send none)
        #[arg(long)]
        context: Option<String>,

        #[arg(long, default_value_t = 200)]
        status: u16,

        /// Gateway config JSON (default: built-in settings)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Parser)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

fn load_logical_map(path: &Path) -> CliResult<PhysicalNameMapping> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).context(ReadLogicalMapSnafu {
        path: display.clone(),
    })?;
    serde_json::from_str(&text).context(ParseLogicalMapSnafu { path: display })
}

fn cmd_resolve(
    metadata: &Path,
    source: String,
    columns: Vec<String>,
    logical_map: Option<&Path>,
) -> CliResult<()> {
    let store = Arc::new(InMemoryMetadataStore::load_snapshot(metadata).context(LoadMetadataSnafu)?);

    let mapping = match logical_map {
        Some(path) => load_logical_map(path)?,
        None => PhysicalNameMapping::default(),
    };
    let constraint = PhysicalDataSourceConstraint::from_logical(
        columns.iter().map(String::as_str),
        std::iter::empty::<&str>(),
        &mapping,
    );

    let availability = Arc::new(ConcreteAvailability::new(
        DataSourceName::new(source.clone()),
        store,
    ));
    let table = PhysicalTable::new(source, availability).with_constraint(constraint);
    let available = table.available_intervals();
    info!("{} available interval(s) for {}", available.len(), table.name());

    println!("{}", serde_json::to_string(&available).context(RenderSnafu)?);
    Ok(())
}

fn backend_response(
    status: u16,
    header: &str,
    context: Option<String>,
    body: Vec<u8>,
) -> CliResult<BackendResponse> {
    let mut builder = http::Response::builder().status(status);
    if let Some(context) = context {
        builder = builder.header(header, context);
    }
    builder
        .body(Bytes::from(body))
        .context(BuildResponseSnafu { status })
}

async fn cmd_process(
    body: &Path,
    context: Option<String>,
    status: u16,
    config: Option<&Path>,
) -> CliResult<()> {
    let config = match config {
        Some(path) => GatewayConfig::load(path).context(LoadConfigSnafu)?,
        None => GatewayConfig::default(),
    };
    let body = std::fs::read(body).context(ReadBodySnafu {
        path: body.display().to_string(),
    })?;
    let response = backend_response(status, &config.response_context_header, context, body)?;

    let (terminal, outcome) = ChannelResponseProcessor::new();
    let head = PartialDataProcessor::new(terminal, &config);
    let strategy = full_response_strategy(&config).context(StrategySnafu)?;
    let pipeline = ResponsePipeline::new(strategy, head);

    let query = BackendQuery::default();
    let logging = LoggingContext::new("cli").with_field("status", status.to_string());
    pipeline.complete(&response, &query, &logging);

    let delivered = outcome.await.context(NoOutcomeSnafu)?.context(RequestSnafu)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&delivered).context(RenderSnafu)?
    );
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Resolve {
            metadata,
            source,
            columns,
            logical_map,
        } => cmd_resolve(&metadata, source, columns, logical_map.as_deref()),

        Command::Process {
            body,
            context,
            status,
            config,
        } => cmd_process(&body, context, status, config.as_deref()).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
