use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, DEFAULT_REST_ADDR, router};

/// Main entry point for the CDS eligibility service
///
/// Loads a `.env` file when present, resolves the configuration and serves the CDS Hooks REST
/// API.
///
/// # Environment Variables
/// - `CDS_REST_ADDR`: REST server address (default: "0.0.0.0:8000")
/// - `CONFIG_FILE`: JSON configuration file (default: "config.json")
/// - `TIMEOUT`: per-request upstream timeout in seconds (default: 30)
/// - `ANTI_ASTHMATIC_REGEX`, `BIOLOGIC_REGEX`, `CONTROLLER_REGEX`, `ICSF_REGEX`,
///   `STEROID_REGEX`, `ASTHMA_ICD_REGEX`, `CSN_SYSTEM_REGEX`, `ENC_TYPE_SYSTEM_REGEX`:
///   classification patterns
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, binding or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cds_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CDS_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());
    let state = AppState::from_env()?;

    tracing::info!("++ Starting CDS REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
