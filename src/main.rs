use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{config_from_env, serve, AppState, DEFAULT_REST_ADDR};
use report_core::ReportService;

/// Main entry point for the patient report service
///
/// Loads `.env`, resolves configuration once, wires the report service
/// (patient cache, resilient resolver with primary/fallback sources,
/// template store) and serves the REST API.
///
/// # Environment Variables
/// - `REPORT_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PATIENT_SERVICE_URL`: primary patient source base URL
/// - `PATIENT_SERVICE_FALLBACK_URL`: optional direct fallback source
/// - `REPORT_TEMPLATE` / `REPORT_TEMPLATE_URL`: template file or remote
///   template document
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("report_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("REPORT_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    tracing::info!("++ Starting patient report service on {}", rest_addr);

    let cfg = Arc::new(config_from_env()?);
    tracing::info!(
        primary = cfg.primary_base_url(),
        fallback = cfg.fallback_base_url().unwrap_or("<none>"),
        "patient sources configured"
    );

    let report_service = Arc::new(ReportService::from_config(cfg)?);

    serve(&rest_addr, AppState::new(report_service)).await
}
