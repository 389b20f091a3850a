use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/execute", post(handlers::submit_job))
        .route("/result/{id}", get(handlers::get_job_result))
        .route("/health", get(handlers::health_check))
}
