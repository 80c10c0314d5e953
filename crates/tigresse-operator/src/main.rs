//! Operator entrypoint.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = kube::Client::try_default().await?;
    info!("starting tigresse operator");

    tigresse_operator::run(client).await?;

    info!("tigresse operator stopped");
    Ok(())
}
