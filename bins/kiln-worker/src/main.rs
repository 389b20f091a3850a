mod code_server;
mod code_store;
mod sandbox;
mod worker;

use std::sync::Arc;

use anyhow::Context;
use bollard::Docker;
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use kiln_common::settings::Settings;

use crate::code_store::CodeStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    let settings = Arc::new(Settings::from_env());

    info!("Kiln worker booting...");

    let docker =
        Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;

    let client =
        redis::Client::open(settings.redis_url()).context("Failed to create Redis client")?;
    info!("Connecting to Redis: {}", settings.redis_url());

    let store = CodeStore::new();

    // Loopback endpoint the executor containers fetch source from.
    let listener = TcpListener::bind(("0.0.0.0", settings.worker_port))
        .await
        .with_context(|| format!("Failed to bind code endpoint on port {}", settings.worker_port))?;
    let code_app = code_server::routes(store.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, code_app).await {
            error!(error = %e, "Code endpoint server error");
        }
    });
    info!("Code endpoint listening on port {}", settings.worker_port);

    let token = CancellationToken::new();
    let mut workers = JoinSet::new();
    for i in 1..=settings.worker_count {
        // BRPOP parks a connection, so every worker gets its own instead
        // of sharing one multiplexed pipeline.
        let conn = ConnectionManager::new(client.clone())
            .await
            .context("Failed to connect to Redis")?;
        workers.spawn(worker::run(
            i,
            settings.clone(),
            docker.clone(),
            store.clone(),
            conn,
            token.clone(),
        ));
    }
    info!("{} workers ready, waiting for jobs", settings.worker_count);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-c received, shutting down...");
        }
        Some(res) = workers.join_next() => {
            error!("A worker terminated unexpectedly: {res:?}");
        }
    }

    token.cancel();
    info!("Shutdown signal sent to workers, waiting for them to finish...");
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            error!("Worker handle finished with error: {e:?}");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
