mod db;
mod handlers;
mod routes;

use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::{info, warn};

use kiln_common::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub redis: ConnectionManager,
    pub db: Option<PgPool>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    let settings = Settings::from_env();

    info!("Kiln API booting...");

    let client = redis::Client::open(settings.redis_url())
        .expect("Failed to create Redis client");
    let redis_conn = ConnectionManager::new(client)
        .await
        .expect("Failed to connect to Redis");
    info!("Connected to Redis: {}", settings.redis_url());

    // The metadata store only feeds test-vector hydration. Without it the
    // API still serves free runs, so a missing or unreachable database is
    // a warning, not a boot failure.
    let db = match &settings.database_url {
        Some(url) => match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => {
                info!("Connected to metadata store");
                Some(pool)
            }
            Err(e) => {
                warn!(error = %e, "Metadata store unreachable, serving runs only");
                None
            }
        },
        None => {
            warn!("DATABASE_URL not set, serving runs only");
            None
        }
    };

    let state = AppState { redis: redis_conn, db };

    let app = routes::routes().with_state(state);

    let listener = TcpListener::bind(&settings.api_addr)
        .await
        .expect("Failed to bind to address");

    info!("HTTP server listening on {}", settings.api_addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app).await.expect("Server error");
}
