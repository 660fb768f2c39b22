//! Tally - analytics ingestion and query gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally::{
    client::{ClientConfig, HttpClientManager},
    config::Args,
    db::MongoClient,
    server::{self, AppState},
    services::Mailer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tally={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Tally - Analytics Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("MongoDB: {}", args.mongo_uri);
    info!("Database: {}", args.db_name);
    info!("Outbound retries: {}", args.http_retries);
    info!("Outbound in-flight cap: {}", args.http_max_in_flight);
    info!("Email: {}", if args.smtp_host.is_some() { "enabled" } else { "disabled" });
    info!("======================================");

    // Connect to MongoDB; indexes are applied as collections open
    let mongo = match MongoClient::new(&args.mongo_uri, &args.db_name).await {
        Ok(client) => client,
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    // The single shared outbound client, created up front so the first
    // metric fetch never pays initialization cost
    let http = Arc::new(HttpClientManager::new(ClientConfig::from_args(&args)));
    http.initialize().await?;

    let mailer = match Mailer::from_args(&args) {
        Ok(mailer) => {
            if mailer.is_none() {
                warn!("SMTP not configured; email notifications disabled");
            }
            mailer
        }
        Err(e) => {
            error!("Mailer configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(args, &mongo, Arc::clone(&http), mailer).await?);

    info!("Tally started");

    tokio::select! {
        result = server::run(Arc::clone(&state)) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // Bounded drain of in-flight third-party requests
    if !http.shutdown().await {
        warn!("HTTP client did not close cleanly");
    }
    info!("Tally shut down");

    Ok(())
}
