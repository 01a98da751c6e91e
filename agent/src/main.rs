//! Fieldsync Agent - offline queue, replay and route cache for the promoter app.

use fieldsync_agent::config::Config;
use fieldsync_agent::connectivity::{self, Connectivity};
use fieldsync_agent::remote::ApiClient;
use fieldsync_agent::session::Session;
use fieldsync_agent::{app, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldsync_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        remote = %config.api_base_url,
        "Starting Fieldsync Agent on {}:{}",
        config.host,
        config.port
    );

    // Open the durable store
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let session = Session::new_shared(config.auth_token.clone());
    let client = ApiClient::new(&config.api_base_url, session, config.request_timeout)?
        .with_probe_path(&config.probe_path);

    // First probe decides the starting state; the loop keeps it current
    let connectivity = Connectivity::new_shared(client.probe().await);
    connectivity::spawn_probe(
        connectivity.clone(),
        client.clone(),
        config.probe_interval,
    );

    let state = AppState::new(pool, client, connectivity);
    state.engine.spawn_reconnect_listener();

    let pending = state.engine.pending_count().await?;
    tracing::info!(pending, online = state.connectivity.is_online(), "Queue loaded");
    if pending > 0 {
        state.engine.trigger();
    }

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Loopback API listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
