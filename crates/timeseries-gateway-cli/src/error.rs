use timeseries_gateway_core::{
    config::ConfigError,
    metadata::MetadataError,
    nesting::ConstructionError,
    response::GatewayFailure,
};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Failed to load availability metadata: {source}"))]
    LoadMetadata { source: MetadataError },

    #[snafu(display("Failed to read logical name map at {path}: {source}"))]
    ReadLogicalMap {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "Invalid logical name map at {path}: {source}. \
         Expected a JSON object of logical -> physical column names."
    ))]
    ParseLogicalMap {
        path: String,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to load gateway config: {source}"))]
    LoadConfig { source: ConfigError },

    #[snafu(display("Failed to read response body at {path}: {source}"))]
    ReadBody {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Cannot build a backend response with status {status}: {source}"))]
    BuildResponse { status: u16, source: http::Error },

    #[snafu(display("Invalid response strategy: {source}"))]
    Strategy { source: ConstructionError },

    #[snafu(display("{source}"))]
    Request {
        #[snafu(source(from(GatewayFailure, Box::new)))]
        source: Box<GatewayFailure>,
    },

    #[snafu(display("Response pipeline ended without an outcome"))]
    NoOutcome {
        source: tokio::sync::oneshot::error::RecvError,
    },

    #[snafu(display("Failed to render output: {source}"))]
    Render { source: serde_json::Error },
}
