//! Redis queue and result-store semantics.
//!
//! The queue is the only coupling between the dispatch API and the worker
//! pool, so every key and verb lives here; the two binaries can never
//! drift. Producers LPUSH onto `code_jobs`, consumers BRPOP, results live
//! under `result:{job_id}` for 24 hours.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};

use crate::types::{Job, JobResult};

/// FIFO list of JSON-encoded jobs.
pub const JOB_LIST: &str = "code_jobs";

/// Advisory per-job hash, field `status`. Not load-bearing.
pub const STATUS_FIELD: &str = "status";

/// Results expire after 24 hours; clients that poll later see `pending`.
pub const RESULT_TTL_SECS: u64 = 24 * 60 * 60;

pub fn result_key(job_id: &str) -> String {
    format!("result:{job_id}")
}

pub fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

/// Append a job to the left of the work list.
pub async fn push_job(conn: &mut ConnectionManager, job: &Job) -> RedisResult<()> {
    let payload = serde_json::to_string(job).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "job serialization", e.to_string()))
    })?;
    conn.lpush(JOB_LIST, payload).await
}

/// Block up to `timeout_secs` for the next job payload.
///
/// Returns the raw JSON string so the caller owns parse-failure policy:
/// a malformed entry is the worker's to log and drop, not a transport
/// error.
pub async fn pop_job(
    conn: &mut ConnectionManager,
    timeout_secs: f64,
) -> RedisResult<Option<String>> {
    let popped: Option<(String, String)> = conn.brpop(JOB_LIST, timeout_secs).await?;
    Ok(popped.map(|(_, payload)| payload))
}

/// Overwrite the job's terminal verdict, with expiry.
pub async fn store_result(conn: &mut ConnectionManager, result: &JobResult) -> RedisResult<()> {
    let payload = serde_json::to_string(result).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "result serialization",
            e.to_string(),
        ))
    })?;
    conn.set_ex(result_key(&result.job_id), payload, RESULT_TTL_SECS)
        .await
}

/// Fetch the stored verdict verbatim, if any.
pub async fn fetch_result_raw(
    conn: &mut ConnectionManager,
    job_id: &str,
) -> RedisResult<Option<String>> {
    conn.get(result_key(job_id)).await
}

/// Record the advisory `pending` status hint. Best effort only.
pub async fn mark_pending(conn: &mut ConnectionManager, job_id: &str) -> RedisResult<()> {
    let key = job_key(job_id);
    let _: () = conn.hset(&key, STATUS_FIELD, "pending").await?;
    conn.expire(&key, RESULT_TTL_SECS as i64).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_keys_are_deterministic() {
        let id = "4f2c9a6e-1d3b-4c5a-9e7f-0a1b2c3d4e5f";
        assert_eq!(result_key(id), format!("result:{id}"));
        assert_eq!(result_key(id), result_key(id));
    }

    #[test]
    fn job_key_prefix() {
        assert_eq!(job_key("abc"), "job:abc");
    }

    #[test]
    fn list_name_matches_wire_protocol() {
        // Producers and consumers both compile against this constant, but
        // external tooling still expects the literal name.
        assert_eq!(JOB_LIST, "code_jobs");
    }
}
