use anyhow::{Context, Result};
use locale_runtime::{config::Config, scheduler, server, I18nContext};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("locale_runtime=info".parse()?)
        )
        .init();

    info!("Starting locale runtime");

    // Load configuration from environment
    let config = Config::from_env()?;
    let port = config.port;
    let api_key = config.api_key.clone();
    let schedule = config.maintenance_schedule.clone();

    // Step 1: Build components and load critical namespaces
    let context = Arc::new(I18nContext::from_config(config)?);
    let language = context
        .initialize()
        .await
        .context("Failed to load critical namespaces")?;
    info!("✓ Initialized with language {}", language);

    // Step 2: Periodic cache and telemetry maintenance
    let _scheduler = scheduler::start_scheduler(Arc::clone(&context), &schedule).await?;

    if api_key.is_none() {
        info!("API_KEY not set; mutating routes are open");
    }

    // Step 3: Diagnostics server
    let app = server::router(server::AppState { context, api_key });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("✓ Listening on port {}", port);
    axum::serve(listener, app).await?;

    Ok(())
}
