//! Worker loop: pop, drive the sandbox, persist the verdict.

use std::sync::Arc;
use std::time::Duration;

use bollard::Docker;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kiln_common::queue;
use kiln_common::settings::Settings;
use kiln_common::types::Job;

use crate::code_store::CodeStore;
use crate::sandbox;

/// Bounded wait on the queue so shutdown is observed promptly.
const POP_TIMEOUT_SECS: f64 = 5.0;

pub async fn run(
    id: usize,
    settings: Arc<Settings>,
    docker: Docker,
    store: CodeStore,
    mut conn: ConnectionManager,
    token: CancellationToken,
) {
    info!(worker = id, "Worker initialized");

    loop {
        let popped = tokio::select! {
            _ = token.cancelled() => {
                info!(worker = id, "Worker received shutdown signal, stopping");
                break;
            }
            popped = queue::pop_job(&mut conn, POP_TIMEOUT_SECS) => popped,
        };

        let payload = match popped {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(e) => {
                warn!(worker = id, error = %e, "Queue pop failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        // Malformed entries are dropped, not retried; nothing useful can
        // come of re-queueing bytes that will not parse.
        let job: Job = match serde_json::from_str(&payload) {
            Ok(job) => job,
            Err(e) => {
                error!(worker = id, error = %e, "Discarding unparseable job payload");
                continue;
            }
        };

        info!(
            worker = id,
            job_id = %job.id,
            language = %job.language,
            test_cases = job.inputs.len(),
            "Processing job"
        );

        let result = sandbox::execute(&docker, &store, &settings, &job).await;

        info!(
            worker = id,
            job_id = %job.id,
            status = %result.status,
            exec_time_ms = result.exec_time_ms,
            "Job finished"
        );

        // A lost write means the client polls `pending` until the TTL
        // would have lapsed; the job itself is done either way.
        if let Err(e) = queue::store_result(&mut conn, &result).await {
            error!(worker = id, job_id = %job.id, error = %e, "Failed to store job result");
        }
    }

    info!(worker = id, "Worker has shut down gracefully");
}
