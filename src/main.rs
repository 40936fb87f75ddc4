use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use choice_awards::{
    abuse::AbuseConfig, api, auth::AuthConfig, config::ServerConfig, identity::IdentityConfig,
    state::AppState, store::MemoryStore,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "choice_awards=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Choice Awards...");

    let config = ServerConfig::from_env();
    let auth_config = AuthConfig::from_env();
    let identity_config = IdentityConfig::from_env();
    let abuse_config = AbuseConfig::from_env();

    let store = match &config.data_file {
        Some(path) => match MemoryStore::open(path).await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("Failed to open data file: {}", e);
                std::process::exit(1);
            }
        },
        None => MemoryStore::new(),
    };

    // Spawn background task dropping expired rate limit entries
    abuse_config.spawn_cleanup();

    let state = AppState::new(Arc::new(store), identity_config, abuse_config, auth_config);
    let app = api::router(state, &config.static_dir);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", config.bind_addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
