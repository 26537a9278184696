//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! This binary is useful for development and debugging when you only want
//! the REST server (with OpenAPI/Swagger UI). The workspace's main
//! `report-run` binary adds `.env` loading on top of the same boot path.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{config_from_env, serve, AppState, DEFAULT_REST_ADDR};
use report_core::ReportService;

/// Main entry point for the report REST API server
///
/// Starts the REST API server on the configured address (default:
/// 0.0.0.0:3000) and wires the report service from environment
/// configuration.
///
/// # Environment Variables
/// - `REPORT_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - plus the variables documented on [`api_rest::config_from_env`]
///
/// # Returns
/// * `Ok(())` - If server starts and runs successfully
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("report_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("REPORT_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let cfg = Arc::new(config_from_env()?);
    let report_service = Arc::new(ReportService::from_config(cfg)?);

    serve(&addr, AppState::new(report_service)).await
}
