mod api;
mod middleware;

use std::sync::Arc;
use std::time::Duration;

use cpdb_pipeline::{BatchOptions, PgProfileStore, PipelineSettings, ProfileProcessor};
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = cpdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cpdb_db::PoolConfig::from_app_config(&config);
    let pool = cpdb_db::connect_pool(&config.database_url, pool_config).await?;
    cpdb_db::run_migrations(&pool).await?;

    let collaborators = cpdb_collectors::collaborators_from_config(&config)
        .map_err(|e| anyhow::anyhow!("failed to build collaborators: {e}"))?;
    let processor = Arc::new(ProfileProcessor::new(
        Arc::new(PgProfileStore::new(pool.clone())),
        collaborators,
        PipelineSettings::from_app_config(&config),
    ));

    let state = AppState {
        pool,
        processor,
        batch_defaults: BatchOptions {
            concurrency_limit: config.max_concurrent_profiles,
            deadline: config.batch_deadline_secs.map(Duration::from_secs),
            force: false,
        },
    };
    let app = build_app(state);

    tracing::info!(bind_addr = %config.bind_addr, env = %config.env, "cpdb-server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
