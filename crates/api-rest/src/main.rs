//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the CDS Hooks REST server on its own.
//!
//! ## Intended use
//! Useful for development and debugging against a sandbox FHIR server. The workspace's main
//! `cds-run` binary serves the same router and additionally loads a `.env` file.

use api_rest::{router, AppState, DEFAULT_REST_ADDR};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the CDS REST API server
///
/// # Environment Variables
/// - `CDS_REST_ADDR`: Server address (default: "0.0.0.0:8000")
/// - `CONFIG_FILE`, `TIMEOUT` and the classification pattern variables (see [`AppState::from_env`])
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration cannot be resolved,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("cds_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CDS_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());
    let state = AppState::from_env()?;

    tracing::info!("-- Starting CDS REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
