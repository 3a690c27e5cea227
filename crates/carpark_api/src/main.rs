use anyhow::Context;
use carpark_api::{config::CarparkConfig, create_app};
use carpark_core::{ChargingPark, FileStateStore};
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments for the carpark server
#[derive(Parser, Debug)]
#[command(name = "carpark")]
#[command(about = "Car park charging current manager")]
struct Args {
    /// Path to the car park configuration JSON file
    #[arg(short, long)]
    config: PathBuf,

    /// Port to bind the server to
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().pretty().init();

    let config = CarparkConfig::load(&args.config).await?;
    tracing::info!(
        "Loaded car park config from {}: {} charging points, {}A max",
        args.config.display(),
        config.charging_points.len(),
        config.max_current
    );

    let store = FileStateStore::new(&config.state_file_directory);
    let park = ChargingPark::new(&config.park_config(), store)
        .context("Could not initialize the charging points")?;

    let app = create_app(park);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
