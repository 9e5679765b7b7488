use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use backoffice_api::{
    app_router, config, db,
    events::{process_events, EventSender},
    services::reconciliation::VariantResolution,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::load_config().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(app_config.log_level.clone())),
        )
        .init();

    let pool = db::establish_connection(&app_config.database_url)
        .await
        .context("failed to connect to database")?;
    if app_config.auto_create_schema {
        db::setup_schema(&pool)
            .await
            .context("failed to create schema")?;
    }
    let pool = Arc::new(pool);

    let (tx, rx) = mpsc::channel(256);
    let event_sender = EventSender::new(tx);
    tokio::spawn(process_events(rx));

    let state = AppState::new(
        pool,
        app_config.clone(),
        event_sender,
        VariantResolution::RequireExplicit,
    );

    let addr = app_config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, app_router(state))
        .await
        .context("server error")?;

    Ok(())
}
