use std::{net::SocketAddr, sync::Arc};

use rms_server::{
    build_router,
    config::Config,
    db::Database,
    services::{
        auth::ensure_admin,
        notifier::{LogNotifier, Notifier, SmtpNotifier},
    },
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rms_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database
    let db = Database::connect(&config.database_url).await?;
    db.run_migrations().await?;

    if let Some(seed) = &config.admin_seed {
        ensure_admin(&db, seed).await?;
    }

    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpNotifier::new(smtp)?),
        None => {
            tracing::warn!("SMTP_HOST not set, contact notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // Build application state
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(db, config, notifier);

    // Leftovers from a previous run are never needed.
    let purged = state.uploads.init().await?;
    if purged > 0 {
        tracing::info!("Removed {purged} stale upload(s)");
    }

    let app = build_router(state);

    // Start server
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
