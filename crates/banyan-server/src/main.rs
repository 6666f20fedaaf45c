mod auth;
mod dto;
mod error;
mod hooks;
mod routes;
mod state;

use anyhow::Result;

use banyan_core::lock::LockRegistry;
use banyan_core::notifier::Notifier;
use banyan_db::config::ServerConfig;
use banyan_db::pool;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    let db_pool = pool::create_pool(&config.db).await?;
    pool::run_migrations(&db_pool).await?;

    let locks = LockRegistry::new();
    let notifier = Notifier::new();

    tokio::spawn(banyan_core::availability::run(
        db_pool.clone(),
        notifier.clone(),
        locks.clone(),
        banyan_core::availability::DEFAULT_POLL_INTERVAL,
    ));

    let state = AppState { pool: db_pool.clone(), locks, notifier };
    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    tracing::info!("banyan-server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("banyan-server shut down");
    db_pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
