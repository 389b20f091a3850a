// Loopback HTTP endpoint executor containers fetch source from.
//
// Serving code by URL keeps host files out of the containers and works
// the same for one-shot and long-lived container modes. The endpoint is
// only reachable from the sandbox network; it carries no authentication.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::debug;

use crate::code_store::CodeStore;

pub fn routes(store: CodeStore) -> Router {
    Router::new()
        .route("/code", get(serve_code))
        .with_state(store)
}

async fn serve_code(
    State(store): State<CodeStore>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(code_id) = params.get("id") else {
        return (StatusCode::BAD_REQUEST, "Code ID is required").into_response();
    };

    match store.get(code_id) {
        Some(source) => {
            debug!(code_id = %code_id, bytes = source.len(), "Serving code blob");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain")],
                source,
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Code not found").into_response(),
    }
}
