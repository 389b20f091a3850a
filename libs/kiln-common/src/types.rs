use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::languages::Language;

/// One unit of submitted work, as it travels through the queue.
///
/// `inputs` and `outputs` are parallel arrays of test vectors. Both empty
/// means a free run; non-empty means a graded submission. The two lengths
/// must match; the sandbox driver rejects a mismatch with a terminal
/// `error` verdict rather than grading partially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub language: Language,
    pub code: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Job {
    pub fn new(language: Language, code: String, inputs: Vec<String>, outputs: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            language,
            code,
            submitted_at: Utc::now(),
            inputs,
            outputs,
        }
    }

    /// A job with no test vectors is a free run; output is captured but not compared.
    pub fn is_graded(&self) -> bool {
        !self.inputs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Success,
    Accept,
    Fail,
    Timeout,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Success => "success",
            JobStatus::Accept => "accept",
            JobStatus::Fail => "fail",
            JobStatus::Timeout => "timeout",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Terminal verdict written exactly once per job by the worker.
///
/// The grading counters are only present for graded submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    pub exec_time_ms: i64,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests_passed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests_total: Option<u32>,
}

impl JobResult {
    fn terminal(job_id: &str, status: JobStatus, exec_time_ms: i64) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            output: String::new(),
            error: String::new(),
            // A verdict always carries a non-negative wall clock.
            exec_time_ms: exec_time_ms.max(0),
            completed_at: Utc::now(),
            tests_passed: None,
            tests_total: None,
        }
    }

    pub fn success(job_id: &str, output: String, exec_time_ms: i64) -> Self {
        Self {
            output,
            ..Self::terminal(job_id, JobStatus::Success, exec_time_ms)
        }
    }

    pub fn accept(job_id: &str, tests_total: u32, exec_time_ms: i64) -> Self {
        Self {
            output: "All tests passed.".to_string(),
            tests_passed: Some(tests_total),
            tests_total: Some(tests_total),
            ..Self::terminal(job_id, JobStatus::Accept, exec_time_ms)
        }
    }

    pub fn fail(
        job_id: &str,
        output: String,
        tests_passed: u32,
        tests_total: u32,
        exec_time_ms: i64,
    ) -> Self {
        Self {
            output,
            tests_passed: Some(tests_passed),
            tests_total: Some(tests_total),
            ..Self::terminal(job_id, JobStatus::Fail, exec_time_ms)
        }
    }

    pub fn timeout(job_id: &str, exec_time_ms: i64) -> Self {
        Self {
            error: "Code execution timed out".to_string(),
            ..Self::terminal(job_id, JobStatus::Timeout, exec_time_ms)
        }
    }

    pub fn execution_error(job_id: &str, error: String, exec_time_ms: i64) -> Self {
        Self {
            error,
            ..Self::terminal(job_id, JobStatus::Error, exec_time_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Accept).unwrap(), "\"accept\"");
        assert_eq!(serde_json::to_string(&JobStatus::Timeout).unwrap(), "\"timeout\"");
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"pending\"").unwrap(),
            JobStatus::Pending
        );
    }

    #[test]
    fn free_run_result_omits_grading_counters() {
        let result = JobResult::success("job-1", "hi\n".to_string(), 120);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["status"], "success");
        assert_eq!(json["exec_time_ms"], 120);
        assert!(json.get("tests_passed").is_none());
        assert!(json.get("tests_total").is_none());
    }

    #[test]
    fn graded_result_carries_counters() {
        let result = JobResult::fail("job-2", "Test #2 failed".to_string(), 1, 3, 88);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], "fail");
        assert_eq!(json["tests_passed"], 1);
        assert_eq!(json["tests_total"], 3);
    }

    #[test]
    fn exec_time_is_clamped_non_negative() {
        let result = JobResult::execution_error("job-3", "boom".to_string(), -5);
        assert_eq!(result.exec_time_ms, 0);
    }

    #[test]
    fn job_with_vectors_is_graded() {
        let graded = Job::new(
            Language::Python,
            "print(input())".to_string(),
            vec!["1\n".to_string()],
            vec!["1".to_string()],
        );
        let free = Job::new(Language::Python, "print('hi')".to_string(), vec![], vec![]);

        assert!(graded.is_graded());
        assert!(!free.is_graded());
        assert_ne!(graded.id, free.id);
    }

    #[test]
    fn queue_payload_without_vectors_parses_as_free_run() {
        // Producers that predate grading omit the vector fields entirely.
        let payload = r#"{
            "id": "abc",
            "language": "python",
            "code": "print(1)",
            "submitted_at": "2026-07-01T12:00:00Z"
        }"#;
        let job: Job = serde_json::from_str(payload).unwrap();
        assert!(!job.is_graded());
        assert!(job.outputs.is_empty());
    }
}
