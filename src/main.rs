use std::sync::Arc;

use curriculum_backend::config::Config;
use curriculum_backend::db::{migrate, CurriculumStore, InMemoryStore, PgStore};
use curriculum_backend::logging;
use curriculum_backend::state::AppState;
use curriculum_backend::workers::WorkerManager;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.logging);

    let store = connect_store(&config).await;

    let workers = WorkerManager::new();
    let state = AppState::start(Arc::clone(&store), config.generation, &workers);

    match state.generator().recover_stale_jobs().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "stale generation jobs marked failed"),
        Err(e) => tracing::warn!(error = %e, "stale job recovery failed"),
    }

    let app = curriculum_backend::create_app(state);

    let addr = config.bind_addr();
    tracing::info!(%addr, store = store.backend(), "curriculum-backend listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener failed");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");
    workers.shutdown().await;
    tracing::info!("Graceful shutdown complete");
}

async fn connect_store(config: &Config) -> Arc<dyn CurriculumStore> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory store");
        return Arc::new(InMemoryStore::new());
    };

    let store = match PgStore::connect(url, config.db_max_connections).await {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(error = %e, "database not reachable, using in-memory store");
            return Arc::new(InMemoryStore::new());
        }
    };

    if config.run_migrations {
        match migrate::run_migrations(store.pool()).await {
            Ok(applied) if !applied.is_empty() => {
                tracing::info!(count = applied.len(), "database migrations completed")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "migrations failed"),
        }
    }

    Arc::new(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
