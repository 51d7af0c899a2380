//! build-relay server
//!
//! Reads configuration from the environment (and a `.env` file if present),
//! then serves the webhook until SIGTERM or SIGINT.

use build_relay::{Config, Relay, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; real deployments set the environment directly
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        address = %config.webhook.bind_address,
        artifact_dir = ?config.transfer.artifact_dir,
        upload_url = %config.distribution.upload_url(),
        retries = config.retry.max_attempts,
        "configuration loaded"
    );

    let relay = Relay::new(config)?;
    run_with_shutdown(relay).await?;

    Ok(())
}
