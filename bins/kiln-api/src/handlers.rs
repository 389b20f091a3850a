// HTTP route handlers for the Kiln dispatch API

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use kiln_common::languages::Language;
use kiln_common::queue;
use kiln_common::types::Job;

use crate::db;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub language: String,
    pub code: String,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default, rename = "probId")]
    pub prob_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// POST /execute - validate, hydrate test vectors, enqueue.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    // Deserialization stays in the handler so that a missing field is a
    // 400 with a message, not a framework rejection.
    let payload: SubmitRequest = match serde_json::from_value(body) {
        Ok(payload) => payload,
        Err(e) => return bad_request(format!("Invalid request payload: {e}")),
    };

    if payload.language.is_empty() || payload.code.is_empty() {
        return bad_request("Missing required fields (language, code)".to_string());
    }

    let language: Language = match payload.language.parse() {
        Ok(lang) => lang,
        Err(e) => return bad_request(e.to_string()),
    };

    if let Some(user_id) = &payload.user_id {
        info!(user_id = %user_id, "Received execution request");
    }

    // A problem reference upgrades the run to a graded submission. A
    // failed lookup downgrades it back to a run instead of failing the
    // request, which keeps this the only submission endpoint.
    let (inputs, outputs) = match (payload.prob_id, &state.db) {
        (Some(problem_id), Some(pool)) => match db::fetch_test_vectors(pool, problem_id).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(problem_id, error = %e, "Test vector lookup failed, grading as free run");
                (vec![], vec![])
            }
        },
        (Some(problem_id), None) => {
            warn!(problem_id, "No metadata store configured, grading as free run");
            (vec![], vec![])
        }
        (None, _) => (vec![], vec![]),
    };

    let job = Job::new(language, payload.code, inputs, outputs);
    let job_id = job.id.clone();

    let mut conn = state.redis.clone();
    if let Err(e) = queue::push_job(&mut conn, &job).await {
        error!(job_id = %job_id, error = %e, "Failed to enqueue job");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Failed to enqueue job" })),
        )
            .into_response();
    }

    // Advisory status hint; losing it only costs observability.
    if let Err(e) = queue::mark_pending(&mut conn, &job_id).await {
        warn!(job_id = %job_id, error = %e, "Failed to record pending status");
    }

    info!(
        job_id = %job_id,
        language = %job.language,
        test_cases = job.inputs.len(),
        "Job queued"
    );

    (StatusCode::CREATED, Json(SubmitResponse { job_id })).into_response()
}

/// GET /result/{id} - poll for a stored verdict.
pub async fn get_job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let mut conn = state.redis.clone();
    match queue::fetch_result_raw(&mut conn, &job_id).await {
        // The worker wrote the record; return it verbatim.
        Ok(Some(raw)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            raw,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::OK,
            Json(serde_json::json!({ "job_id": job_id, "status": "pending" })),
        )
            .into_response(),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Failed to fetch job result");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Error retrieving job result" })),
            )
                .into_response()
        }
    }
}

/// GET /health - liveness probe.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_accepts_minimal_payload() {
        let req: SubmitRequest =
            serde_json::from_str(r#"{"language": "python", "code": "print(1)"}"#).unwrap();
        assert_eq!(req.language, "python");
        assert!(req.user_id.is_none());
        assert!(req.prob_id.is_none());
    }

    #[test]
    fn submit_request_reads_client_field_names() {
        let req: SubmitRequest = serde_json::from_str(
            r#"{"language": "cpp", "code": "int main(){}", "userId": "u-1", "probId": 7}"#,
        )
        .unwrap();
        assert_eq!(req.user_id.as_deref(), Some("u-1"));
        assert_eq!(req.prob_id, Some(7));
    }

    #[test]
    fn unknown_language_fails_parse_with_supported_list() {
        let err = "rust".parse::<Language>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Unsupported language: rust"));
        assert!(message.contains("python"));
        assert!(message.contains("csharp"));
    }
}
