use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tentacles_connector::config::Config;
use tentacles_connector::config_store::FirestoreConfigStore;
use tentacles_connector::dispatcher::{Dispatcher, HandlerRegistry};
use tentacles_connector::google_ads_client::GoogleAdsClientFactory;
use tentacles_connector::handlers::{self, AppState};

/// Main entry point for the application.
///
/// Initializes logging, loads configuration, wires the Firestore config
/// store and Google Ads client factory into the dispatcher, and serves the
/// Pub/Sub push endpoint.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tentacles_connector=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let config_store = FirestoreConfigStore::from_config(&config)?;
    tracing::info!(
        "✓ Firestore config store initialized: {}",
        config.firestore_base_url
    );

    let ads_factory = GoogleAdsClientFactory::from_config(&config)?;
    tracing::info!(
        "✓ Google Ads client factory initialized: {}/{}",
        config.google_ads_api_base_url,
        config.google_ads_api_version
    );

    let dispatcher = Dispatcher::new(
        Arc::new(config_store),
        HandlerRegistry::with_defaults(Arc::new(ads_factory)),
    );

    let port = config.port;
    let app_state = Arc::new(AppState { config, dispatcher });
    let app = handlers::router(app_state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
